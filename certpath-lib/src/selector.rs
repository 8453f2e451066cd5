//! Certificate selection criteria.

use crate::certificate::Certificate;
use crate::fields::DistinguishedName;
use std::sync::Arc;

type PredicateFn = dyn Fn(&Certificate) -> bool + Send + Sync;

/// A predicate over certificates, used both to query stores and to express
/// constraints on the target certificate.
#[derive(Clone)]
pub enum Selector {
    /// Certificates whose subject equals the given name.
    Subject(DistinguishedName),
    /// The certificate with this issuer and serial number.
    IssuerSerial {
        issuer: DistinguishedName,
        serial: Vec<u8>,
    },
    /// Exactly this certificate.
    Certificate(Arc<Certificate>),
    /// An arbitrary caller predicate. Not usable as a build target because
    /// it names no subject to start the search from.
    Predicate {
        description: String,
        test: Arc<PredicateFn>,
    },
}

impl Selector {
    pub fn subject(subject: impl Into<DistinguishedName>) -> Self {
        Selector::Subject(subject.into())
    }

    pub fn issuer_serial(issuer: impl Into<DistinguishedName>, serial: &[u8]) -> Self {
        Selector::IssuerSerial {
            issuer: issuer.into(),
            serial: serial.to_vec(),
        }
    }

    pub fn certificate(cert: Arc<Certificate>) -> Self {
        Selector::Certificate(cert)
    }

    pub fn predicate<F>(description: &str, test: F) -> Self
    where
        F: Fn(&Certificate) -> bool + Send + Sync + 'static,
    {
        Selector::Predicate {
            description: description.to_string(),
            test: Arc::new(test),
        }
    }

    /// Certificates usable for the given extended key usage purpose.
    pub fn purpose(purpose_oid: &str) -> Self {
        let wanted = purpose_oid.to_string();
        Selector::predicate(&format!("purpose {}", purpose_oid), move |c| {
            c.allows_purpose(&wanted)
        })
    }

    pub fn matches(&self, cert: &Certificate) -> bool {
        match self {
            Selector::Subject(subject) => cert.subject == *subject,
            Selector::IssuerSerial { issuer, serial } => {
                cert.issuer == *issuer && strip_zeros(&cert.serial) == strip_zeros(serial)
            }
            Selector::Certificate(wanted) => **wanted == *cert,
            Selector::Predicate { test, .. } => test(cert),
        }
    }

    /// The subject name this selector pins down, when it pins one down
    /// without consulting any store.
    pub fn subject_name(&self) -> Option<&DistinguishedName> {
        match self {
            Selector::Subject(subject) => Some(subject),
            Selector::Certificate(cert) => Some(&cert.subject),
            Selector::IssuerSerial { .. } | Selector::Predicate { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Selector::Subject(_) => "subject",
            Selector::IssuerSerial { .. } => "issuer+serial",
            Selector::Certificate(_) => "certificate",
            Selector::Predicate { .. } => "predicate",
        }
    }
}

fn strip_zeros(serial: &[u8]) -> &[u8] {
    match serial.iter().position(|&b| b != 0) {
        Some(pos) => serial.get(pos..).unwrap_or(serial),
        None => serial.get(serial.len().saturating_sub(1)..).unwrap_or(serial),
    }
}

impl std::fmt::Debug for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Selector({})", self)
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Subject(subject) => write!(f, "subject = {}", subject),
            Selector::IssuerSerial { issuer, serial } => {
                write!(f, "issuer = {}, serial = {}", issuer, hex::encode(serial))
            }
            Selector::Certificate(cert) => write!(
                f,
                "certificate subject = {}, serial = {}",
                cert.subject,
                cert.serial_hex()
            ),
            Selector::Predicate { description, .. } => write!(f, "predicate: {}", description),
        }
    }
}
