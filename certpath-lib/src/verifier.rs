//! Signature verification seam.
//!
//! Path building only needs "does this certificate verify under that key".
//! The default build performs no signature checks; callers opt in with
//! [`X509SignatureVerifier`] or their own implementation.

use crate::certificate::Certificate;
use x509_parser::prelude::*;

pub trait SignatureVerifier: Send + Sync {
    /// Verify `cert`'s signature under the DER SubjectPublicKeyInfo
    /// `issuer_spki`.
    fn verify(&self, cert: &Certificate, issuer_spki: &[u8]) -> Result<(), String>;
}

/// Verifies signatures with `x509-parser` over the certificate's original
/// DER encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct X509SignatureVerifier;

impl SignatureVerifier for X509SignatureVerifier {
    fn verify(&self, cert: &Certificate, issuer_spki: &[u8]) -> Result<(), String> {
        if cert.raw_der.is_empty() {
            return Err("certificate has no DER encoding to verify".into());
        }
        let (_, x509) = X509Certificate::from_der(&cert.raw_der)
            .map_err(|e| format!("failed to re-parse certificate: {}", e))?;
        let (_, spki) = SubjectPublicKeyInfo::from_der(issuer_spki)
            .map_err(|e| format!("failed to parse issuer public key: {}", e))?;
        x509.verify_signature(Some(&spki))
            .map_err(|e| format!("signature verification failed: {}", e))
    }
}
