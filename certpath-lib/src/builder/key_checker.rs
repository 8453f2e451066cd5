//! Key usage of CA certificates and the caller's target constraints.

use super::RejectReason;
use crate::certificate::Certificate;
use crate::selector::Selector;
use log::debug;

/// Checks a path from the anchor-adjacent certificate to the target: every
/// non-terminal certificate must be allowed to sign certificates, and the
/// terminal one must satisfy the target constraints, if any.
#[derive(Debug, Clone)]
pub struct KeyChecker {
    cert_path_length: usize,
    remaining_certs: usize,
    target_constraints: Option<Selector>,
}

impl KeyChecker {
    pub fn new(cert_path_length: usize, target_constraints: Option<Selector>) -> Self {
        KeyChecker {
            cert_path_length,
            remaining_certs: cert_path_length,
            target_constraints,
        }
    }

    pub fn init(&mut self) {
        self.remaining_certs = self.cert_path_length;
    }

    /// Check the next certificate of the path. The last call of a path
    /// checks the terminal certificate.
    pub fn check(&mut self, cert: &Certificate) -> Result<(), RejectReason> {
        self.remaining_certs = self.remaining_certs.saturating_sub(1);
        self.check_certificate(cert, self.remaining_certs == 0)
    }

    pub fn check_certificate(
        &self,
        cert: &Certificate,
        is_terminal: bool,
    ) -> Result<(), RejectReason> {
        if is_terminal {
            if let Some(selector) = &self.target_constraints {
                if !selector.matches(cert) {
                    debug!("{} does not match target constraints {}", cert.subject, selector);
                    return Err(RejectReason::TargetConstraintsNotMet);
                }
            }
            return Ok(());
        }
        Self::verify_ca_key_usage(cert)
    }

    /// A key usage extension, when present, must assert keyCertSign.
    pub fn verify_ca_key_usage(cert: &Certificate) -> Result<(), RejectReason> {
        match cert.key_usage() {
            Some(ku) if !ku.key_cert_sign() => Err(RejectReason::InvalidKeyUsage),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fields::KeyUsage;

    #[test]
    fn ca_without_key_cert_sign_is_rejected() {
        let ca = Certificate::builder("CN=I")
            .issuer("CN=R")
            .ca(None)
            .key_usage(KeyUsage::empty().with(KeyUsage::DIGITAL_SIGNATURE))
            .build();
        let l = Certificate::builder("CN=L").issuer("CN=I").build();
        let mut checker = KeyChecker::new(2, None);
        checker.init();
        assert_eq!(checker.check(&ca).unwrap_err(), RejectReason::InvalidKeyUsage);
        assert!(checker.check_certificate(&l, true).is_ok());
    }

    #[test]
    fn absent_key_usage_is_accepted() {
        let ca = Certificate::builder("CN=I").issuer("CN=R").ca(None).build();
        assert!(KeyChecker::verify_ca_key_usage(&ca).is_ok());
        let signing = Certificate::builder("CN=I")
            .issuer("CN=R")
            .key_usage(KeyUsage::empty().with(KeyUsage::KEY_CERT_SIGN))
            .build();
        assert!(KeyChecker::verify_ca_key_usage(&signing).is_ok());
    }

    #[test]
    fn terminal_key_usage_is_not_checked() {
        let leaf = Certificate::builder("CN=L")
            .issuer("CN=I")
            .key_usage(KeyUsage::empty().with(KeyUsage::DIGITAL_SIGNATURE))
            .build();
        let mut checker = KeyChecker::new(1, None);
        checker.init();
        assert!(checker.check(&leaf).is_ok());
    }

    #[test]
    fn target_constraints_apply_to_terminal_only() {
        let ca = Certificate::builder("CN=I").issuer("CN=R").ca(None).build();
        let leaf = Certificate::builder("CN=L").issuer("CN=I").build();
        let mut checker = KeyChecker::new(2, Some(Selector::subject("CN=Other")));
        checker.init();
        checker.check(&ca).unwrap();
        assert_eq!(
            checker.check(&leaf).unwrap_err(),
            RejectReason::TargetConstraintsNotMet
        );

        let mut checker = KeyChecker::new(2, Some(Selector::subject("CN=L")));
        checker.init();
        checker.check(&ca).unwrap();
        checker.check(&leaf).unwrap();
    }
}
