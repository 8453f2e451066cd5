//! Name Constraints (RFC 5280 Section 4.2.1.10).
//!
//! Holds the permitted and excluded subtrees of a CA certificate, merges
//! them along a path, and checks certificate names against the merged set.
//! DNS names, email addresses, URIs, IP addresses and directory names are
//! supported; other name forms are neither constrained nor constraining.

use crate::certificate::Certificate;
use crate::fields::{DistinguishedName, GeneralName};
use serde::Serialize;

/// Maximum work factor for Name Constraints checking (names × subtrees).
/// Protects against DoS from certificates with thousands of SANs or subtrees.
pub(crate) const MAX_NC_WORK_FACTOR: usize = 65_536;

/// One permitted or excluded subtree. RFC 5280 fixes minimum at 0 and
/// forbids maximum, so only the base name is kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GeneralSubtree {
    pub base: GeneralName,
}

impl From<GeneralName> for GeneralSubtree {
    fn from(base: GeneralName) -> Self {
        GeneralSubtree { base }
    }
}

/// Name constraints as carried by a CA certificate, or as accumulated along
/// a path.
///
/// `permitted: None` means no permitted subtrees were asserted. Within the
/// permitted list, a name kind with no entries is unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NameConstraints {
    pub permitted: Option<Vec<GeneralSubtree>>,
    pub excluded: Option<Vec<GeneralSubtree>>,
}

/// Name kinds that constraints are evaluated per. IPv4 and IPv6 are separate
/// kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameKind {
    Dns,
    Email,
    Uri,
    Ipv4,
    Ipv6,
    Directory,
}

impl NameKind {
    const ALL: [NameKind; 6] = [
        NameKind::Dns,
        NameKind::Email,
        NameKind::Uri,
        NameKind::Ipv4,
        NameKind::Ipv6,
        NameKind::Directory,
    ];

    fn of_subtree(gn: &GeneralName) -> Option<NameKind> {
        match gn {
            GeneralName::Dns(_) => Some(NameKind::Dns),
            GeneralName::Email(_) => Some(NameKind::Email),
            GeneralName::Uri(_) => Some(NameKind::Uri),
            GeneralName::Ip(b) if b.len() == 8 => Some(NameKind::Ipv4),
            GeneralName::Ip(b) if b.len() == 32 => Some(NameKind::Ipv6),
            GeneralName::DirName(_) => Some(NameKind::Directory),
            _ => None,
        }
    }

    fn of_name(gn: &GeneralName) -> Option<NameKind> {
        match gn {
            GeneralName::Ip(b) if b.len() == 4 => Some(NameKind::Ipv4),
            GeneralName::Ip(b) if b.len() == 16 => Some(NameKind::Ipv6),
            GeneralName::Ip(_) => None,
            other => Self::of_subtree(other),
        }
    }

    /// A subtree that contains every name of this kind.
    fn universe(self) -> GeneralName {
        match self {
            NameKind::Dns => GeneralName::Dns(String::new()),
            NameKind::Email => GeneralName::Email(String::new()),
            NameKind::Uri => GeneralName::Uri(String::new()),
            NameKind::Ipv4 => GeneralName::Ip(vec![0; 8]),
            NameKind::Ipv6 => GeneralName::Ip(vec![0; 32]),
            NameKind::Directory => GeneralName::DirName(DistinguishedName::default()),
        }
    }
}

impl NameConstraints {
    pub fn new(permitted: Vec<GeneralName>, excluded: Vec<GeneralName>) -> Self {
        let wrap = |names: Vec<GeneralName>| {
            if names.is_empty() {
                None
            } else {
                Some(names.into_iter().map(GeneralSubtree::from).collect())
            }
        };
        NameConstraints {
            permitted: wrap(permitted),
            excluded: wrap(excluded),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.permitted.as_ref().map_or(true, |p| p.is_empty())
            && self.excluded.as_ref().map_or(true, |e| e.is_empty())
    }

    fn permitted_slice(&self) -> &[GeneralSubtree] {
        self.permitted.as_deref().unwrap_or(&[])
    }

    fn excluded_slice(&self) -> &[GeneralSubtree] {
        self.excluded.as_deref().unwrap_or(&[])
    }

    /// Merge another certificate's constraints into this accumulated set.
    ///
    /// Excluded subtrees are united. Permitted subtrees are intersected per
    /// name kind: a kind constrained on only one side keeps that side's
    /// subtrees, and a kind whose intersection is empty is excluded wholesale
    /// so that no name of that kind is accepted afterwards, whatever later
    /// certificates permit.
    pub fn merge(&self, other: &NameConstraints) -> NameConstraints {
        let mut excluded: Vec<GeneralSubtree> = Vec::new();
        for subtree in self.excluded_slice().iter().chain(other.excluded_slice()) {
            if !excluded.contains(subtree) {
                excluded.push(subtree.clone());
            }
        }

        let permitted = match (&self.permitted, &other.permitted) {
            (None, None) => None,
            (Some(p), None) | (None, Some(p)) => Some(p.clone()),
            (Some(a), Some(b)) => {
                let mut merged: Vec<GeneralSubtree> = Vec::new();
                // Kinds only one side constrains are carried over as-is.
                for subtree in a.iter().chain(b.iter()) {
                    let kind = NameKind::of_subtree(&subtree.base);
                    let in_a = a.iter().any(|s| NameKind::of_subtree(&s.base) == kind);
                    let in_b = b.iter().any(|s| NameKind::of_subtree(&s.base) == kind);
                    if !(in_a && in_b) && !merged.contains(subtree) {
                        merged.push(subtree.clone());
                    }
                }
                for kind in NameKind::ALL {
                    let of_kind = |side: &[GeneralSubtree]| -> Vec<GeneralName> {
                        side.iter()
                            .filter(|s| NameKind::of_subtree(&s.base) == Some(kind))
                            .map(|s| s.base.clone())
                            .collect()
                    };
                    let (ka, kb) = (of_kind(a), of_kind(b));
                    if ka.is_empty() || kb.is_empty() {
                        continue;
                    }
                    let mut intersection: Vec<GeneralSubtree> = Vec::new();
                    for x in &ka {
                        for y in &kb {
                            let narrower = if subtree_contains(x, y) {
                                Some(y)
                            } else if subtree_contains(y, x) {
                                Some(x)
                            } else {
                                None
                            };
                            if let Some(n) = narrower {
                                let subtree = GeneralSubtree::from(n.clone());
                                if !intersection.contains(&subtree) {
                                    intersection.push(subtree);
                                }
                            }
                        }
                    }
                    if intersection.is_empty() {
                        let universe = GeneralSubtree::from(kind.universe());
                        if !excluded.contains(&universe) {
                            excluded.push(universe);
                        }
                    }
                    for subtree in intersection {
                        if !merged.contains(&subtree) {
                            merged.push(subtree);
                        }
                    }
                }
                Some(merged)
            }
        };
        // A kind excluded wholesale stays closed: subtrees of that kind
        // permitted by either side no longer admit anything.
        let permitted = permitted
            .map(|subtrees| {
                subtrees
                    .into_iter()
                    .filter(|s| match NameKind::of_subtree(&s.base) {
                        Some(kind) => !excluded.contains(&GeneralSubtree::from(kind.universe())),
                        None => true,
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|subtrees| !subtrees.is_empty());

        NameConstraints {
            permitted,
            excluded: if excluded.is_empty() {
                None
            } else {
                Some(excluded)
            },
        }
    }

    /// Whether every name of `cert` is permitted and none is excluded.
    pub fn permits(&self, cert: &Certificate) -> bool {
        self.check(cert).is_ok()
    }

    /// Check every name of `cert` (subject DN, SAN entries and subject
    /// `emailAddress` values), returning a description of the first
    /// violation.
    pub fn check(&self, cert: &Certificate) -> Result<(), String> {
        let names = constrained_names(cert);
        let subtrees = self.permitted_slice().len() + self.excluded_slice().len();
        if names.len().saturating_mul(subtrees) > MAX_NC_WORK_FACTOR {
            return Err(format!(
                "name constraints check exceeds resource limits ({} names × {} subtrees)",
                names.len(),
                subtrees
            ));
        }
        for name in &names {
            if !self.permits_name(name) {
                return Err(format!("name '{}' is not permitted", name));
            }
        }
        Ok(())
    }

    /// Whether a single name lies outside every excluded subtree and, when
    /// its kind is constrained, inside some permitted subtree.
    pub fn permits_name(&self, name: &GeneralName) -> bool {
        let Some(kind) = NameKind::of_name(name) else {
            return true;
        };
        if self
            .excluded_slice()
            .iter()
            .any(|s| NameKind::of_subtree(&s.base) == Some(kind) && name_matches(name, &s.base))
        {
            return false;
        }
        let mut constrained = false;
        for subtree in self.permitted_slice() {
            if NameKind::of_subtree(&subtree.base) != Some(kind) {
                continue;
            }
            constrained = true;
            if name_matches(name, &subtree.base) {
                return true;
            }
        }
        !constrained
    }
}

/// The names of a certificate that name constraints apply to.
fn constrained_names(cert: &Certificate) -> Vec<GeneralName> {
    let mut names = Vec::new();
    if !cert.subject.is_empty() {
        names.push(GeneralName::DirName(cert.subject.clone()));
    }
    names.extend(cert.subject_alt_names().iter().cloned());
    names.extend(
        cert.subject
            .email_addresses()
            .map(|e| GeneralName::Email(e.to_string())),
    );
    names
}

/// Whether `name` falls in the subtree rooted at `base` (same kind assumed).
fn name_matches(name: &GeneralName, base: &GeneralName) -> bool {
    match (name, base) {
        (GeneralName::Dns(n), GeneralName::Dns(c)) => {
            dns_name_matches_constraint(&n.to_ascii_lowercase(), &c.to_ascii_lowercase())
        }
        (GeneralName::Email(n), GeneralName::Email(c)) => {
            email_matches_constraint(&n.to_ascii_lowercase(), &c.to_ascii_lowercase())
        }
        (GeneralName::Uri(n), GeneralName::Uri(c)) => {
            uri_matches_constraint(n, &c.to_ascii_lowercase())
        }
        (GeneralName::Ip(n), GeneralName::Ip(c)) => ip_matches_constraint(n, c),
        (GeneralName::DirName(n), GeneralName::DirName(c)) => n.is_within(c),
        _ => false,
    }
}

/// Whether subtree `outer` contains every name in subtree `inner`.
fn subtree_contains(outer: &GeneralName, inner: &GeneralName) -> bool {
    match (outer, inner) {
        (GeneralName::Dns(o), GeneralName::Dns(i)) => {
            let (o, i) = (o.to_ascii_lowercase(), i.to_ascii_lowercase());
            if o.is_empty() {
                true
            } else if i.is_empty() {
                false
            } else if let Some(rest) = i.strip_prefix('.') {
                if o.starts_with('.') {
                    i.ends_with(&o)
                } else {
                    dns_name_matches_constraint(rest, &o)
                }
            } else {
                dns_name_matches_constraint(&i, &o)
            }
        }
        (GeneralName::Email(o), GeneralName::Email(i)) => {
            let (o, i) = (o.to_ascii_lowercase(), i.to_ascii_lowercase());
            if o.is_empty() {
                true
            } else if i.is_empty() {
                false
            } else if i.contains('@') {
                email_matches_constraint(&i, &o)
            } else {
                host_subtree_contains(&o, &i)
            }
        }
        (GeneralName::Uri(o), GeneralName::Uri(i)) => {
            let (o, i) = (o.to_ascii_lowercase(), i.to_ascii_lowercase());
            if o.is_empty() {
                true
            } else if i.is_empty() {
                false
            } else {
                host_subtree_contains(&o, &i)
            }
        }
        (GeneralName::Ip(o), GeneralName::Ip(i)) => {
            if o.len() != i.len() || (o.len() != 8 && o.len() != 32) {
                return false;
            }
            let half = o.len() / 2;
            let (oa, om) = o.split_at(half);
            let (ia, im) = i.split_at(half);
            om.iter().zip(im.iter()).all(|(o, i)| o & i == *o)
                && oa
                    .iter()
                    .zip(ia.iter())
                    .zip(om.iter())
                    .all(|((o, i), m)| o & m == i & m)
        }
        (GeneralName::DirName(o), GeneralName::DirName(i)) => i.is_within(o),
        _ => false,
    }
}

/// Containment between host-style subtrees ("host" or ".domain"), as used by
/// email domain and URI constraints. A mailbox constraint never contains a
/// host constraint.
fn host_subtree_contains(outer: &str, inner: &str) -> bool {
    if outer.contains('@') {
        return false;
    }
    match (outer.starts_with('.'), inner.starts_with('.')) {
        (false, false) => outer == inner,
        (true, _) => inner.ends_with(outer),
        (false, true) => false,
    }
}

/// Check if a DNS name matches a Name Constraint.
///
/// RFC 5280: A constraint of ".example.com" matches "host.example.com" but
/// not "example.com". A constraint of "example.com" matches both
/// "example.com" and "host.example.com".
pub(crate) fn dns_name_matches_constraint(name: &str, constraint: &str) -> bool {
    if constraint.is_empty() {
        // Empty constraint matches everything
        return true;
    }
    if constraint.starts_with('.') {
        name.ends_with(constraint)
    } else {
        name == constraint
            || (name.len() > constraint.len()
                && name.ends_with(constraint)
                && name.as_bytes().get(name.len() - constraint.len() - 1) == Some(&b'.'))
    }
}

/// Check if an email matches a Name Constraint.
///
/// RFC 5280: A constraint of "example.com" matches any email @example.com.
/// A constraint of ".example.com" matches email at any subdomain.
/// A specific email address is an exact match.
pub(crate) fn email_matches_constraint(email: &str, constraint: &str) -> bool {
    if constraint.is_empty() {
        return true;
    }
    if constraint.contains('@') {
        return email == constraint;
    }
    let Some(pos) = email.rfind('@') else {
        return false;
    };
    let domain = email.get(pos + 1..).unwrap_or("");
    if constraint.starts_with('.') {
        domain.ends_with(constraint)
    } else {
        domain == constraint
    }
}

/// Check if a URI's host matches a Name Constraint ("host" exact,
/// ".domain" any subdomain).
pub(crate) fn uri_matches_constraint(uri: &str, constraint: &str) -> bool {
    if constraint.is_empty() {
        return true;
    }
    let Some(host) = uri_host(uri) else {
        return false;
    };
    if constraint.starts_with('.') {
        host.ends_with(constraint)
    } else {
        host == constraint
    }
}

/// Extract the lowercased host of a URI (`scheme://[user@]host[:port]/...`).
fn uri_host(uri: &str) -> Option<String> {
    let (_, rest) = uri.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host_port = authority.rsplit('@').next().unwrap_or(authority);
    let host = if let Some(v6) = host_port.strip_prefix('[') {
        v6.split(']').next().unwrap_or("")
    } else {
        host_port.split(':').next().unwrap_or("")
    };
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

/// Check if an IP address (as bytes from SAN) matches a constraint (IP + netmask).
///
/// IPv4 constraints are 8 bytes (4 address + 4 mask).
/// IPv6 constraints are 32 bytes (16 address + 16 mask).
pub(crate) fn ip_matches_constraint(ip_bytes: &[u8], constraint: &[u8]) -> bool {
    let addr_len = ip_bytes.len();
    if constraint.len() != addr_len * 2 || (addr_len != 4 && addr_len != 16) {
        return false;
    }
    let (addr, mask) = constraint.split_at(addr_len);
    ip_bytes
        .iter()
        .zip(addr.iter())
        .zip(mask.iter())
        .all(|((ip, a), m)| (ip & m) == (a & m))
}
