//! Read-only certificate view used by the path builder.
//!
//! A [`Certificate`] is either produced from DER by [`crate::parse_der`] and
//! friends, or assembled directly with [`Certificate::builder`]. Once built
//! it is shared behind `Arc` and never mutated.

use crate::fields::{
    BasicConstraints, DateTime, DistinguishedName, Extension, ExtensionValue, GeneralName,
    KeyUsage,
};
use crate::name_constraints::NameConstraints;
use crate::oid;
use crate::selector::Selector;
use crate::util;
use serde::Serialize;

/// An X.509 certificate reduced to the fields path building needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// Certificate version (1, 2, or 3).
    pub version: u32,
    /// Serial number as big-endian bytes, leading zeros stripped.
    pub serial: Vec<u8>,
    pub issuer: DistinguishedName,
    pub subject: DistinguishedName,
    /// Validity window as Unix timestamps, inclusive on both ends.
    pub not_before: i64,
    pub not_after: i64,
    /// DER-encoded SubjectPublicKeyInfo.
    pub spki: Vec<u8>,
    pub extensions: Vec<Extension>,
    /// The encoding this view was parsed from. Empty for built certificates.
    pub raw_der: Vec<u8>,
}

/// What makes two certificates "the same" for loop detection: same subject,
/// same key, same serial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CertIdentity {
    pub subject: DistinguishedName,
    pub spki: Vec<u8>,
    pub serial: Vec<u8>,
}

impl Certificate {
    /// Start assembling a certificate with the given subject (one-line DN
    /// form, e.g. `"O=Example, CN=Leaf"`).
    pub fn builder(subject: &str) -> CertificateBuilder {
        CertificateBuilder::new(subject)
    }

    /// Self-issued: subject and issuer are the same name (RFC 5280 Section 3.2).
    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }

    pub fn identity(&self) -> CertIdentity {
        CertIdentity {
            subject: self.subject.clone(),
            spki: self.spki.clone(),
            serial: self.serial.clone(),
        }
    }

    fn find<T>(&self, f: impl Fn(&ExtensionValue) -> Option<T>) -> Option<T> {
        self.extensions.iter().find_map(|ext| f(&ext.value))
    }

    pub fn basic_constraints(&self) -> Option<BasicConstraints> {
        self.find(|v| match v {
            ExtensionValue::BasicConstraints(bc) => Some(*bc),
            _ => None,
        })
    }

    /// Whether the basic constraints extension asserts cA.
    pub fn is_ca(&self) -> bool {
        self.basic_constraints().is_some_and(|bc| bc.ca)
    }

    /// The pathLenConstraint of a CA certificate, if present.
    pub fn path_len_constraint(&self) -> Option<u32> {
        self.basic_constraints()
            .filter(|bc| bc.ca)
            .and_then(|bc| bc.path_len)
    }

    pub fn key_usage(&self) -> Option<KeyUsage> {
        self.find(|v| match v {
            ExtensionValue::KeyUsage(ku) => Some(*ku),
            _ => None,
        })
    }

    pub fn extended_key_usage(&self) -> Option<&[String]> {
        self.extensions.iter().find_map(|ext| match &ext.value {
            ExtensionValue::ExtendedKeyUsage(oids) => Some(oids.as_slice()),
            _ => None,
        })
    }

    pub fn name_constraints(&self) -> Option<&NameConstraints> {
        self.extensions.iter().find_map(|ext| match &ext.value {
            ExtensionValue::NameConstraints(nc) => Some(nc),
            _ => None,
        })
    }

    pub fn subject_alt_names(&self) -> &[GeneralName] {
        self.extensions
            .iter()
            .find_map(|ext| match &ext.value {
                ExtensionValue::SubjectAltName(names) => Some(names.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn subject_key_id(&self) -> Option<&[u8]> {
        self.extensions.iter().find_map(|ext| match &ext.value {
            ExtensionValue::SubjectKeyIdentifier(id) => Some(id.as_slice()),
            _ => None,
        })
    }

    pub fn authority_key_id(&self) -> Option<&[u8]> {
        self.extensions.iter().find_map(|ext| match &ext.value {
            ExtensionValue::AuthorityKeyIdentifier(Some(id)) => Some(id.as_slice()),
            _ => None,
        })
    }

    /// OIDs of critical extensions the builder does not process.
    pub fn unsupported_critical_extensions(&self) -> Vec<&str> {
        self.extensions
            .iter()
            .filter(|ext| ext.critical && matches!(ext.value, ExtensionValue::Other))
            .map(|ext| ext.oid.as_str())
            .collect()
    }

    /// Whether the certificate is usable for the given EKU purpose: either it
    /// has no EKU extension, or the extension lists the purpose or anyEKU.
    pub fn allows_purpose(&self, purpose_oid: &str) -> bool {
        match self.extended_key_usage() {
            None => true,
            Some(oids) => oids.iter().any(|o| o == purpose_oid || o == oid::EKU_ANY),
        }
    }

    pub fn matches(&self, selector: &Selector) -> bool {
        selector.matches(self)
    }

    /// Serial number as colon-separated uppercase hex.
    pub fn serial_hex(&self) -> String {
        if self.serial.is_empty() {
            return "00".into();
        }
        util::hex_colon_upper(&self.serial)
    }

    /// Short human-readable identifier (CN, O, or OU of the subject).
    pub fn short_name(&self) -> String {
        self.subject.short_name()
    }

    pub fn not_before_time(&self) -> DateTime {
        DateTime::from_timestamp(self.not_before)
    }

    pub fn not_after_time(&self) -> DateTime {
        DateTime::from_timestamp(self.not_after)
    }
}

/// Default validity used by the builder: 2000-01-01 to 2100-01-01.
const DEFAULT_NOT_BEFORE: i64 = 946_684_800;
const DEFAULT_NOT_AFTER: i64 = 4_102_444_800;

/// Assembles a [`Certificate`] field by field.
///
/// Defaults: version 3, issuer equal to the subject (self-issued), serial 1,
/// no extensions, a public key derived from the subject so that distinct
/// subjects get distinct keys.
#[derive(Debug, Clone)]
pub struct CertificateBuilder {
    cert: Certificate,
    spki_set: bool,
}

impl CertificateBuilder {
    fn new(subject: &str) -> Self {
        let subject = DistinguishedName::parse(subject);
        CertificateBuilder {
            cert: Certificate {
                version: 3,
                serial: vec![1],
                issuer: subject.clone(),
                subject,
                not_before: DEFAULT_NOT_BEFORE,
                not_after: DEFAULT_NOT_AFTER,
                spki: Vec::new(),
                extensions: Vec::new(),
                raw_der: Vec::new(),
            },
            spki_set: false,
        }
    }

    pub fn issuer(mut self, issuer: &str) -> Self {
        self.cert.issuer = DistinguishedName::parse(issuer);
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.cert.version = version;
        self
    }

    pub fn serial(mut self, serial: u64) -> Self {
        let bytes = serial.to_be_bytes();
        let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
        self.cert.serial = bytes.get(start..).unwrap_or(&bytes).to_vec();
        self
    }

    pub fn validity(mut self, not_before: i64, not_after: i64) -> Self {
        self.cert.not_before = not_before;
        self.cert.not_after = not_after;
        self
    }

    /// Set the SubjectPublicKeyInfo bytes (e.g. to model a key rollover).
    pub fn spki(mut self, spki: &[u8]) -> Self {
        self.cert.spki = spki.to_vec();
        self.spki_set = true;
        self
    }

    fn push(mut self, oid: &str, critical: bool, value: ExtensionValue) -> Self {
        self.cert.extensions.retain(|e| e.oid != oid);
        self.cert.extensions.push(Extension {
            oid: oid.to_string(),
            critical,
            value,
        });
        self
    }

    /// Mark as a CA with an optional pathLenConstraint.
    pub fn ca(self, path_len: Option<u32>) -> Self {
        self.push(
            oid::EXT_BASIC_CONSTRAINTS,
            true,
            ExtensionValue::BasicConstraints(BasicConstraints { ca: true, path_len }),
        )
    }

    /// Add a basic constraints extension with cA=false.
    pub fn end_entity(self) -> Self {
        self.push(
            oid::EXT_BASIC_CONSTRAINTS,
            true,
            ExtensionValue::BasicConstraints(BasicConstraints {
                ca: false,
                path_len: None,
            }),
        )
    }

    pub fn key_usage(self, ku: KeyUsage) -> Self {
        self.push(oid::EXT_KEY_USAGE, true, ExtensionValue::KeyUsage(ku))
    }

    pub fn extended_key_usage(self, oids: &[&str]) -> Self {
        self.push(
            oid::EXT_EXTENDED_KEY_USAGE,
            false,
            ExtensionValue::ExtendedKeyUsage(oids.iter().map(|s| s.to_string()).collect()),
        )
    }

    pub fn name_constraints(self, nc: NameConstraints) -> Self {
        self.push(oid::EXT_NAME_CONSTRAINTS, true, ExtensionValue::NameConstraints(nc))
    }

    /// Append a subject alternative name.
    pub fn subject_alt_name(mut self, name: GeneralName) -> Self {
        if let Some(ext) = self
            .cert
            .extensions
            .iter_mut()
            .find(|e| e.oid == oid::EXT_SUBJECT_ALT_NAME)
        {
            if let ExtensionValue::SubjectAltName(names) = &mut ext.value {
                names.push(name);
                return self;
            }
        }
        self.push(
            oid::EXT_SUBJECT_ALT_NAME,
            false,
            ExtensionValue::SubjectAltName(vec![name]),
        )
    }

    /// Add an extension the builder does not understand.
    pub fn other_extension(self, oid: &str, critical: bool) -> Self {
        self.push(oid, critical, ExtensionValue::Other)
    }

    pub fn build(mut self) -> Certificate {
        if !self.spki_set {
            self.cert.spki = format!("key:{}", self.cert.subject.to_oneline()).into_bytes();
        }
        self.cert
    }
}
