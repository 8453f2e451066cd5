//! Certificate field types consumed by the path builder.

use crate::name_constraints::NameConstraints;
use serde::Serialize;
use std::hash::{Hash, Hasher};

/// Distinguished name with ordered components.
///
/// Components are kept in encoding order (most significant RDN first, e.g.
/// `C`, `O`, `CN`). Equality and hashing use a canonical form: attribute
/// types compared case-insensitively, values lowercased with internal
/// whitespace collapsed, so that names that differ only in case or spacing
/// chain to each other.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DistinguishedName {
    /// Ordered list of (attribute_type, value) pairs.
    /// Attribute types use short names where known (e.g., "CN", "O", "C").
    pub components: Vec<(String, String)>,
}

impl DistinguishedName {
    pub fn new(components: Vec<(String, String)>) -> Self {
        DistinguishedName { components }
    }

    /// Parse the one-line form produced by [`DistinguishedName::to_oneline`]
    /// (`"C = US, O = Org, CN = example.com"`). Spaces around `=` are
    /// optional, and `\,`, `\=` and `\\` escapes are honoured. Components
    /// without an `=` are ignored.
    pub fn parse(s: &str) -> Self {
        let mut components = Vec::new();
        for part in split_unescaped(s, ',') {
            let mut kv = split_unescaped(&part, '=').into_iter();
            let Some(k) = kv.next() else {
                continue;
            };
            let rest: Vec<String> = kv.collect();
            if rest.is_empty() {
                continue;
            }
            let key = unescape(k.trim());
            let value = unescape(rest.join("=").trim());
            if !key.is_empty() {
                components.push((key, value));
            }
        }
        DistinguishedName { components }
    }

    /// Format as a comma-separated one-line string matching OpenSSL's default format.
    /// Example: "C = US, O = Org, CN = example.com"
    ///
    /// Values containing commas, equals signs, or backslashes are escaped
    /// to prevent ambiguous output.
    pub fn to_oneline(&self) -> String {
        let mut result = String::new();
        for (i, (k, v)) in self.components.iter().enumerate() {
            if i > 0 {
                result.push_str(", ");
            }
            result.push_str(k);
            result.push_str(" = ");
            for ch in v.chars() {
                match ch {
                    '\\' => result.push_str("\\\\"),
                    ',' => result.push_str("\\,"),
                    '=' => result.push_str("\\="),
                    _ => result.push(ch),
                }
            }
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Value of the first component with the given attribute type.
    pub fn get(&self, attr: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(attr))
            .map(|(_, v)| v.as_str())
    }

    /// Short human-readable identifier: CN, then O, then OU, else "Unknown".
    pub fn short_name(&self) -> String {
        ["CN", "O", "OU"]
            .iter()
            .find_map(|attr| self.get(attr))
            .unwrap_or("Unknown")
            .to_string()
    }

    /// `emailAddress` attribute values (PKCS#9), used by name constraints.
    pub fn email_addresses(&self) -> impl Iterator<Item = &str> {
        self.components
            .iter()
            .filter(|(k, _)| k == "emailAddress" || k.eq_ignore_ascii_case("email"))
            .map(|(_, v)| v.as_str())
    }

    /// Whether `base` is a leading RDN sequence of this name, i.e. this name
    /// lies in the directory subtree rooted at `base`. An empty base contains
    /// every name.
    pub fn is_within(&self, base: &DistinguishedName) -> bool {
        base.components.len() <= self.components.len()
            && base
                .components
                .iter()
                .zip(self.components.iter())
                .all(|(b, c)| canonical_component(b) == canonical_component(c))
    }

    fn canonical(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.components.iter().map(canonical_component)
    }
}

fn canonical_component((k, v): &(String, String)) -> (String, String) {
    (
        k.to_ascii_lowercase(),
        v.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase(),
    )
}

fn split_unescaped(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            current.push(ch);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if ch == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    parts.push(current);
    parts
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

impl PartialEq for DistinguishedName {
    fn eq(&self, other: &Self) -> bool {
        self.components.len() == other.components.len() && self.canonical().eq(other.canonical())
    }
}

impl Eq for DistinguishedName {}

impl Hash for DistinguishedName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for component in self.canonical() {
            component.hash(state);
        }
    }
}

impl std::fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_oneline())
    }
}

impl From<&str> for DistinguishedName {
    fn from(s: &str) -> Self {
        DistinguishedName::parse(s)
    }
}

/// A name form as carried by subject alternative names and name-constraint
/// subtrees.
///
/// `Ip` holds 4 or 16 address bytes in a SAN entry and 8 or 32 bytes
/// (address followed by mask) in a constraint subtree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum GeneralName {
    Dns(String),
    Email(String),
    Ip(Vec<u8>),
    Uri(String),
    DirName(DistinguishedName),
    Other(String),
}

impl std::fmt::Display for GeneralName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneralName::Dns(v) => write!(f, "DNS:{}", v),
            GeneralName::Email(v) => write!(f, "email:{}", v),
            GeneralName::Ip(v) => write!(f, "IP Address:{}", crate::util::format_ip_bytes(v)),
            GeneralName::Uri(v) => write!(f, "URI:{}", v),
            GeneralName::DirName(v) => write!(f, "DirName:{}", v),
            GeneralName::Other(v) => write!(f, "othername:{}", v),
        }
    }
}

/// Basic constraints extension value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BasicConstraints {
    pub ca: bool,
    pub path_len: Option<u32>,
}

/// Key usage bits, indexed as in RFC 5280 Section 4.2.1.3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeyUsage(u16);

impl KeyUsage {
    pub const DIGITAL_SIGNATURE: u8 = 0;
    pub const NON_REPUDIATION: u8 = 1;
    pub const KEY_ENCIPHERMENT: u8 = 2;
    pub const DATA_ENCIPHERMENT: u8 = 3;
    pub const KEY_AGREEMENT: u8 = 4;
    pub const KEY_CERT_SIGN: u8 = 5;
    pub const CRL_SIGN: u8 = 6;
    pub const ENCIPHER_ONLY: u8 = 7;
    pub const DECIPHER_ONLY: u8 = 8;

    const NAMES: [&'static str; 9] = [
        "Digital Signature",
        "Non Repudiation",
        "Key Encipherment",
        "Data Encipherment",
        "Key Agreement",
        "Certificate Sign",
        "CRL Sign",
        "Encipher Only",
        "Decipher Only",
    ];

    pub fn empty() -> Self {
        KeyUsage(0)
    }

    pub fn from_bits(bits: u16) -> Self {
        KeyUsage(bits & 0x01ff)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    /// Return a copy with `bit` set. Bits beyond `DECIPHER_ONLY` are ignored.
    pub fn with(self, bit: u8) -> Self {
        if bit > Self::DECIPHER_ONLY {
            return self;
        }
        KeyUsage(self.0 | (1 << bit))
    }

    pub fn has(self, bit: u8) -> bool {
        bit <= Self::DECIPHER_ONLY && self.0 & (1 << bit) != 0
    }

    pub fn key_cert_sign(self) -> bool {
        self.has(Self::KEY_CERT_SIGN)
    }

    /// Human-readable names of the asserted bits, in bit order.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .enumerate()
            .filter(|(i, _)| self.has(*i as u8))
            .map(|(_, n)| *n)
            .collect()
    }
}

/// A certificate extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extension {
    /// OID as a dotted-decimal string.
    pub oid: String,
    /// Whether this extension is marked critical.
    pub critical: bool,
    /// Parsed extension value.
    pub value: ExtensionValue,
}

/// The extensions the builder understands. Anything else is `Other`, and an
/// `Other` marked critical makes the certificate unusable in a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum ExtensionValue {
    BasicConstraints(BasicConstraints),
    KeyUsage(KeyUsage),
    /// Extended key usage purposes as dotted OIDs.
    ExtendedKeyUsage(Vec<String>),
    NameConstraints(NameConstraints),
    SubjectAltName(Vec<GeneralName>),
    SubjectKeyIdentifier(Vec<u8>),
    AuthorityKeyIdentifier(Option<Vec<u8>>),
    Other,
}

impl Extension {
    /// Human-readable extension name (or the OID when unknown).
    pub fn name(&self) -> &str {
        use crate::oid;
        match self.oid.as_str() {
            oid::EXT_SUBJECT_KEY_ID => "Subject Key Identifier",
            oid::EXT_KEY_USAGE => "Key Usage",
            oid::EXT_SUBJECT_ALT_NAME => "Subject Alternative Name",
            oid::EXT_BASIC_CONSTRAINTS => "Basic Constraints",
            oid::EXT_NAME_CONSTRAINTS => "Name Constraints",
            oid::EXT_AUTHORITY_KEY_ID => "Authority Key Identifier",
            oid::EXT_EXTENDED_KEY_USAGE => "Extended Key Usage",
            other => other,
        }
    }
}

/// Date-time representation.
#[derive(Debug, Clone, Serialize)]
pub struct DateTime {
    /// ISO 8601 formatted string.
    pub iso8601: String,
    /// Unix timestamp.
    pub timestamp: i64,
}

impl DateTime {
    pub fn from_timestamp(ts: i64) -> Self {
        let iso8601 = match ::time::OffsetDateTime::from_unix_timestamp(ts) {
            Ok(dt) => format!(
                "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
                dt.year(),
                u8::from(dt.month()),
                dt.day(),
                dt.hour(),
                dt.minute(),
                dt.second()
            ),
            Err(_) => format!("{}", ts),
        };
        DateTime {
            iso8601,
            timestamp: ts,
        }
    }

    /// Format in OpenSSL's default date style: `Feb  3 23:57:06 2026 GMT`.
    pub fn to_openssl(&self) -> String {
        match ::time::OffsetDateTime::from_unix_timestamp(self.timestamp) {
            Ok(dt) => {
                let month = match u8::from(dt.month()) {
                    1 => "Jan",
                    2 => "Feb",
                    3 => "Mar",
                    4 => "Apr",
                    5 => "May",
                    6 => "Jun",
                    7 => "Jul",
                    8 => "Aug",
                    9 => "Sep",
                    10 => "Oct",
                    11 => "Nov",
                    12 => "Dec",
                    _ => "???",
                };
                format!(
                    "{} {:2} {:02}:{:02}:{:02} {} GMT",
                    month,
                    dt.day(),
                    dt.hour(),
                    dt.minute(),
                    dt.second(),
                    dt.year()
                )
            }
            Err(_) => self.iso8601.clone(),
        }
    }
}

impl std::fmt::Display for DateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_openssl())
    }
}
