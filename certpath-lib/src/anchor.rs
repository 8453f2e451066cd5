//! Trust anchors: where a certification path may end.

use crate::certificate::Certificate;
use crate::fields::DistinguishedName;
use crate::name_constraints::NameConstraints;
use crate::parser;
use crate::verifier::SignatureVerifier;
use crate::CertPathError;
use std::sync::Arc;

/// A trusted certificate, or a trusted subject name and public key.
///
/// `name_constraints` models constraints attached to the anchor itself
/// (as opposed to a name constraints extension inside the anchor
/// certificate). The builder does not support them and refuses to start when
/// any anchor carries them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    pub subject: DistinguishedName,
    /// DER-encoded SubjectPublicKeyInfo of the anchor key.
    pub spki: Vec<u8>,
    pub certificate: Option<Arc<Certificate>>,
    pub name_constraints: Option<NameConstraints>,
}

impl TrustAnchor {
    pub fn from_certificate(cert: Arc<Certificate>) -> Self {
        TrustAnchor {
            subject: cert.subject.clone(),
            spki: cert.spki.clone(),
            certificate: Some(cert),
            name_constraints: None,
        }
    }

    pub fn from_name_and_key(subject: impl Into<DistinguishedName>, spki: &[u8]) -> Self {
        TrustAnchor {
            subject: subject.into(),
            spki: spki.to_vec(),
            certificate: None,
            name_constraints: None,
        }
    }

    pub fn with_name_constraints(mut self, nc: NameConstraints) -> Self {
        self.name_constraints = Some(nc);
        self
    }

    /// Whether `cert` is this anchor's own certificate.
    pub fn is_certificate(&self, cert: &Certificate) -> bool {
        self.certificate
            .as_ref()
            .is_some_and(|own| own.identity() == cert.identity())
    }

    /// Whether this anchor issued `cert`: the issuer name matches the anchor
    /// subject and, when a verifier is supplied, the signature verifies
    /// under the anchor key.
    pub fn issued(
        &self,
        cert: &Certificate,
        verifier: Option<&dyn SignatureVerifier>,
    ) -> Result<bool, String> {
        if cert.issuer != self.subject {
            return Ok(false);
        }
        match verifier {
            Some(v) => v.verify(cert, &self.spki).map(|()| true),
            None => Ok(true),
        }
    }

    pub fn short_name(&self) -> String {
        self.subject.short_name()
    }
}

impl std::fmt::Display for TrustAnchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.certificate {
            Some(cert) => write!(f, "{} (certificate, serial {})", self.subject, cert.serial_hex()),
            None => write!(f, "{} (name and key)", self.subject),
        }
    }
}

/// Load every certificate of a PEM bundle (or a single DER certificate) as a
/// trust anchor.
pub fn anchors_from_pem(input: &[u8]) -> Result<Vec<TrustAnchor>, CertPathError> {
    Ok(parser::parse_certificates(input)?
        .into_iter()
        .map(|c| TrustAnchor::from_certificate(Arc::new(c)))
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct RejectAll;

    impl SignatureVerifier for RejectAll {
        fn verify(&self, _cert: &Certificate, _issuer_spki: &[u8]) -> Result<(), String> {
            Err("bad signature".into())
        }
    }

    #[test]
    fn issued_by_name() {
        let root = Arc::new(Certificate::builder("CN=Root").ca(None).build());
        let anchor = TrustAnchor::from_certificate(root.clone());
        let child = Certificate::builder("CN=I").issuer("cn=root").build();
        assert!(anchor.issued(&child, None).unwrap());
        assert!(anchor.is_certificate(&root));
        assert!(!anchor.is_certificate(&child));
    }

    #[test]
    fn issued_checks_signature_when_asked() {
        let anchor = TrustAnchor::from_name_and_key("CN=Root", b"k");
        let child = Certificate::builder("CN=I").issuer("CN=Root").build();
        assert_eq!(anchor.issued(&child, Some(&RejectAll)), Err("bad signature".into()));
        let stranger = Certificate::builder("CN=I").issuer("CN=Other").build();
        assert_eq!(anchor.issued(&stranger, Some(&RejectAll)), Ok(false));
    }
}
