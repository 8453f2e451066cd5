//! Basic constraints and name constraints over one path.

use super::RejectReason;
use crate::certificate::Certificate;
use crate::name_constraints::NameConstraints;
use log::debug;

/// Stand-in for "no pathLenConstraint".
const UNLIMITED: i64 = i64::MAX;

/// Walks a path from the anchor-adjacent certificate to the target,
/// enforcing the CA flag, the path length budget and the name constraints
/// accumulated so far.
///
/// Call [`ConstraintsChecker::init`] before each path, then
/// [`ConstraintsChecker::check`] once per certificate in order.
#[derive(Debug, Clone)]
pub struct ConstraintsChecker {
    max_path_length: i64,
    cert_path_length: usize,
    i: usize,
    remaining_path_length: i64,
    prev_nc: Option<NameConstraints>,
}

impl ConstraintsChecker {
    /// `cert_path_length` is the number of certificates that will be
    /// checked; the last one is the target.
    pub fn new(max_path_length: usize, cert_path_length: usize) -> Self {
        let max = i64::try_from(max_path_length).unwrap_or(UNLIMITED);
        ConstraintsChecker {
            max_path_length: max,
            cert_path_length,
            i: 0,
            remaining_path_length: max,
            prev_nc: None,
        }
    }

    pub fn init(&mut self) {
        self.i = 0;
        self.remaining_path_length = self.max_path_length;
        self.prev_nc = None;
    }

    pub fn check(&mut self, cert: &Certificate) -> Result<(), RejectReason> {
        self.i += 1;
        self.check_basic_constraints(cert)?;
        self.verify_name_constraints(cert)?;
        debug!(
            "constraints ok for {} ({} of {}), remaining path length {}",
            cert.subject, self.i, self.cert_path_length, self.remaining_path_length
        );
        Ok(())
    }

    fn check_basic_constraints(&mut self, cert: &Certificate) -> Result<(), RejectReason> {
        // The target is exempt.
        if self.i >= self.cert_path_length {
            return Ok(());
        }
        if cert.version < 3 {
            // No basic constraints to consult: only a self-issued certificate
            // directly below the anchor passes as a CA.
            if self.i == 1 && cert.is_self_issued() {
                return Ok(());
            }
            return Err(RejectReason::NotACa);
        }
        if !cert.is_ca() {
            return Err(RejectReason::NotACa);
        }
        if !cert.is_self_issued() && self.remaining_path_length <= 0 {
            return Err(RejectReason::PathTooLong);
        }
        self.remaining_path_length =
            Self::merge_basic_constraints(cert, self.remaining_path_length);
        Ok(())
    }

    fn verify_name_constraints(&mut self, cert: &Certificate) -> Result<(), RejectReason> {
        if let Some(prev) = &self.prev_nc {
            if self.i == self.cert_path_length || !cert.is_self_issued() {
                prev.check(cert).map_err(RejectReason::InvalidName)?;
            }
        }
        if let Some(nc) = cert.name_constraints() {
            self.prev_nc = Some(match self.prev_nc.take() {
                Some(prev) => prev.merge(nc),
                None => nc.clone(),
            });
        }
        Ok(())
    }

    /// Apply `cert`'s basic constraints to a running budget: a
    /// non-self-issued certificate consumes one, and the certificate's own
    /// pathLenConstraint caps the result. A non-CA certificate yields -1.
    pub fn merge_basic_constraints(cert: &Certificate, max_path_length: i64) -> i64 {
        let path_len = if cert.is_ca() {
            cert.path_len_constraint().map_or(UNLIMITED, i64::from)
        } else {
            -1
        };
        let mut max = max_path_length;
        if !cert.is_self_issued() {
            max -= 1;
        }
        max.min(path_len)
    }

    pub fn remaining_path_length(&self) -> i64 {
        self.remaining_path_length
    }

    pub fn merged_name_constraints(&self) -> Option<&NameConstraints> {
        self.prev_nc.as_ref()
    }
}
