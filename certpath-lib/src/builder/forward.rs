//! Per-path state of the forward (target towards anchor) search.

use super::{BuildOptions, ConstraintsChecker, KeyChecker, RejectReason};
use crate::certificate::{CertIdentity, Certificate};
use std::collections::HashSet;
use std::sync::Arc;

/// What the search knows about the partial path it is extending.
///
/// A value snapshot: each recursion works on its own copy, so abandoning a
/// branch needs no undo.
#[derive(Debug, Clone, Default)]
pub(crate) struct ForwardState {
    /// Target first.
    path: Vec<Arc<Certificate>>,
    identities: HashSet<CertIdentity>,
    /// Certificates whose names later issuers' name constraints must allow:
    /// the target plus every non-self-issued intermediate.
    constrained: Vec<Arc<Certificate>>,
    /// Non-self-issued CA certificates on the path, excluding the target.
    traversed_ca: usize,
}

impl ForwardState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// No certificate has been placed yet, so the next one is the target.
    pub(crate) fn is_initial(&self) -> bool {
        self.path.is_empty()
    }

    pub(crate) fn path(&self) -> &[Arc<Certificate>] {
        &self.path
    }

    pub(crate) fn depth(&self) -> usize {
        self.path.len()
    }

    pub(crate) fn contains(&self, cert: &Certificate) -> bool {
        self.identities.contains(&cert.identity())
    }

    pub(crate) fn extend(&self, cert: &Arc<Certificate>) -> ForwardState {
        let mut next = self.clone();
        let initial = next.is_initial();
        if initial || !cert.is_self_issued() {
            next.constrained.push(cert.clone());
        }
        if !initial && !cert.is_self_issued() {
            next.traversed_ca += 1;
        }
        next.identities.insert(cert.identity());
        next.path.push(cert.clone());
        next
    }

    /// Checks that only depend on the candidate and the path below it. For
    /// anything but the target the candidate must be able to act as the
    /// issuer of the last certificate on the path.
    pub(crate) fn verify(
        &self,
        cert: &Certificate,
        options: &BuildOptions,
    ) -> Result<(), RejectReason> {
        if let Some(oid) = cert.unsupported_critical_extensions().first() {
            return Err(RejectReason::UnsupportedCriticalExtension(oid.to_string()));
        }
        if let Some(at) = options.validation_time {
            if at > cert.not_after {
                return Err(RejectReason::Expired(cert.not_after_time().to_openssl()));
            }
            if at < cert.not_before {
                return Err(RejectReason::NotYetValid(cert.not_before_time().to_openssl()));
            }
        }
        let Some(child) = self.path.last() else {
            return Ok(());
        };

        if !cert.is_ca() && !(cert.version < 3 && cert.is_self_issued()) {
            return Err(RejectReason::NotACa);
        }
        KeyChecker::verify_ca_key_usage(cert)?;
        if cert.is_ca() {
            let allowed = ConstraintsChecker::merge_basic_constraints(cert, i64::MAX);
            if allowed < i64::try_from(self.traversed_ca).unwrap_or(i64::MAX) {
                return Err(RejectReason::PathTooLong);
            }
        }
        if self.traversed_ca > options.max_path_length {
            return Err(RejectReason::PathTooLong);
        }
        if let Some(nc) = cert.name_constraints() {
            for below in &self.constrained {
                nc.check(below).map_err(RejectReason::InvalidName)?;
            }
        }
        if let Some(verifier) = &options.signature_verifier {
            verifier
                .verify(child, &cert.spki)
                .map_err(RejectReason::InvalidSignature)?;
        }
        Ok(())
    }
}
