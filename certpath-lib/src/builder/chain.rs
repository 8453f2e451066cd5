//! Depth-first path search with backtracking.

use super::forward::ForwardState;
use super::{
    AdjacencyList, BuildOptions, BuildResult, CertPath, ConstraintsChecker, KeyChecker,
    RejectReason, StepResult, VertexId,
};
use crate::anchor::TrustAnchor;
use crate::certificate::{CertIdentity, Certificate};
use crate::fields::DistinguishedName;
use crate::selector::Selector;
use crate::store::{CertificateStore, StoreError};
use crate::CertPathError;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;

/// Absolute cap on the number of certificates in a path.
pub(crate) const MAX_CHAIN_DEPTH: usize = 32;

/// Extra depth allowed on top of the path length limit for self-issued
/// certificates, which do not count against it.
pub(crate) const DEPTH_SLACK: usize = 8;

/// Counts candidate examinations so adversarial store graphs cannot keep a
/// build busy forever.
#[derive(Debug)]
struct Budget {
    used: usize,
    limit: usize,
}

impl Budget {
    fn new(limit: usize) -> Self {
        Budget { used: 0, limit }
    }

    fn consume(&mut self) -> Result<(), CertPathError> {
        if self.used >= self.limit {
            return Err(CertPathError::BudgetExhausted(self.limit));
        }
        self.used += 1;
        Ok(())
    }
}

pub(crate) struct Search<'a> {
    anchors: &'a [TrustAnchor],
    stores: &'a [Arc<dyn CertificateStore>],
    options: &'a BuildOptions,
    adjacency: AdjacencyList,
    store_failures: Vec<StoreError>,
    budget: Budget,
    depth_limit: usize,
}

impl<'a> Search<'a> {
    pub(crate) fn new(
        anchors: &'a [TrustAnchor],
        stores: &'a [Arc<dyn CertificateStore>],
        options: &'a BuildOptions,
    ) -> Self {
        Search {
            anchors,
            stores,
            options,
            adjacency: AdjacencyList::new(),
            store_failures: Vec::new(),
            budget: Budget::new(options.max_candidates),
            depth_limit: options
                .max_path_length
                .saturating_add(DEPTH_SLACK)
                .min(MAX_CHAIN_DEPTH),
        }
    }

    pub(crate) fn run(mut self, target: &Selector) -> Result<BuildResult, CertPathError> {
        let (subject, queried) = self.target_subject(target)?;
        info!(
            "building path for {} ({} anchors, {} stores)",
            subject,
            self.anchors.len(),
            self.stores.len()
        );

        let mut first_row = Vec::new();
        if let Selector::Certificate(cert) = target {
            first_row.push(cert.clone());
        }
        let candidates = match queried {
            Some(candidates) => candidates,
            None => self.query(target)?,
        };
        for cert in candidates {
            if !first_row.iter().any(|c| c.identity() == cert.identity()) {
                first_row.push(cert);
            }
        }
        let row = self.adjacency.push_row(first_row);

        let path = self.search_row(row, &ForwardState::new())?;
        match &path {
            Some(p) => info!(
                "path found for {}: {} certificates, anchor {}",
                subject,
                p.chain.len(),
                p.anchor.subject
            ),
            None => info!(
                "no path found for {} after {} candidates",
                subject, self.budget.used
            ),
        }
        Ok(BuildResult {
            path,
            adjacency: self.adjacency,
            store_failures: self.store_failures,
        })
    }

    /// The subject the search starts from. Selectors that do not name one
    /// are resolved through the stores, and the candidates found are handed
    /// back so row 0 does not query again.
    fn target_subject(
        &mut self,
        target: &Selector,
    ) -> Result<(DistinguishedName, Option<Vec<Arc<Certificate>>>), CertPathError> {
        if let Selector::Predicate { description, .. } = target {
            return Err(CertPathError::InvalidConfiguration(format!(
                "unsupported target selector: {}",
                description
            )));
        }
        if let Some(subject) = target.subject_name() {
            return Ok((subject.clone(), None));
        }
        let candidates = self.query(target)?;
        let subject = candidates
            .first()
            .map(|c| c.subject.clone())
            .ok_or_else(|| {
                CertPathError::InvalidConfiguration(
                    "Could not determine unique target subject".into(),
                )
            })?;
        Ok((subject, Some(candidates)))
    }

    fn check_cancelled(&self) -> Result<(), CertPathError> {
        match &self.options.cancellation {
            Some(token) if token.is_cancelled() => Err(CertPathError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Ask every store, in order. A failing store contributes nothing.
    fn query(&mut self, selector: &Selector) -> Result<Vec<Arc<Certificate>>, CertPathError> {
        let mut seen: HashSet<CertIdentity> = HashSet::new();
        let mut found = Vec::new();
        for store in self.stores {
            self.check_cancelled()?;
            match store.query(selector) {
                Ok(certs) => {
                    for cert in certs {
                        if seen.insert(cert.identity()) {
                            found.push(cert);
                        }
                    }
                }
                Err(e) => {
                    warn!("certificate store query failed: {}", e);
                    self.store_failures.push(e);
                }
            }
        }
        debug!("{} candidates for {}", found.len(), selector);
        Ok(found)
    }

    fn search_row(
        &mut self,
        row: usize,
        state: &ForwardState,
    ) -> Result<Option<CertPath>, CertPathError> {
        let ids = self.adjacency.row(row).to_vec();
        for &id in &ids {
            if let Some(path) = self.try_candidate(id, state)? {
                return Ok(Some(path));
            }
        }
        if let Some(&last) = ids.last() {
            self.adjacency.record(last, StepResult::Fail);
        }
        Ok(None)
    }

    fn reject(&mut self, id: VertexId, cause: RejectReason) {
        if let Some(vertex) = self.adjacency.vertex(id) {
            debug!("backing out {}: {}", vertex.certificate().subject, cause);
        }
        if let Some(vertex) = self.adjacency.vertex_mut(id) {
            vertex.set_cause(cause);
        }
        self.adjacency.record(id, StepResult::Back);
    }

    fn try_candidate(
        &mut self,
        id: VertexId,
        state: &ForwardState,
    ) -> Result<Option<CertPath>, CertPathError> {
        self.check_cancelled()?;
        self.budget.consume()?;
        let Some(cert) = self.adjacency.vertex(id).map(|v| v.certificate().clone()) else {
            return Ok(None);
        };
        self.adjacency.record(id, StepResult::Possible);
        debug!("trying {} issued by {}", cert.subject, cert.issuer);

        if state.contains(&cert) {
            self.reject(id, RejectReason::Cycle);
            return Ok(None);
        }
        if state.depth() + 1 > self.depth_limit {
            self.reject(id, RejectReason::DepthExceeded(self.depth_limit));
            return Ok(None);
        }
        if let Err(cause) = state.verify(&cert, self.options) {
            self.reject(id, cause);
            return Ok(None);
        }

        if let Some(outcome) = self.complete(&cert, state) {
            return match outcome {
                Ok(path) => {
                    debug!("{} reaches anchor {}", cert.subject, path.anchor.subject);
                    self.adjacency.record(id, StepResult::Succeed);
                    Ok(Some(path))
                }
                Err(cause) => {
                    self.reject(id, cause);
                    Ok(None)
                }
            };
        }

        self.adjacency.record(id, StepResult::Follow);
        let issuers = self.query(&Selector::Subject(cert.issuer.clone()))?;
        let next_row = self.adjacency.push_row(issuers);
        let empty = self.adjacency.row(next_row).is_empty();
        if let Some(vertex) = self.adjacency.vertex_mut(id) {
            vertex.set_index(next_row);
            if empty {
                vertex.set_cause(RejectReason::NoIssuer);
            }
        }

        match self.search_row(next_row, &state.extend(&cert))? {
            Some(path) => Ok(Some(path)),
            None => {
                self.adjacency.record(id, StepResult::Back);
                Ok(None)
            }
        }
    }

    /// If `cert` ends the path at an anchor, validate the whole path.
    /// `None` means no anchor terminates the path here.
    fn complete(
        &self,
        cert: &Arc<Certificate>,
        state: &ForwardState,
    ) -> Option<Result<CertPath, RejectReason>> {
        let verifier = self.options.signature_verifier.as_deref();
        for anchor in self.anchors {
            if anchor.is_certificate(cert) {
                let path: Vec<_> = state.path().iter().rev().cloned().collect();
                return Some(self.validate(anchor, path));
            }
            match anchor.issued(cert, verifier) {
                Ok(true) => {
                    let mut path: Vec<_> = state.path().iter().rev().cloned().collect();
                    path.insert(0, cert.clone());
                    return Some(self.validate(anchor, path));
                }
                Ok(false) => {}
                Err(e) => debug!("anchor {} did not issue {}: {}", anchor.subject, cert.subject, e),
            }
        }
        None
    }

    /// Run both checkers over `path` (anchor side first, target last).
    fn validate(
        &self,
        anchor: &TrustAnchor,
        path: Vec<Arc<Certificate>>,
    ) -> Result<CertPath, RejectReason> {
        let mut constraints = ConstraintsChecker::new(self.options.max_path_length, path.len());
        let mut keys = KeyChecker::new(path.len(), self.options.target_constraints.clone());
        constraints.init();
        keys.init();
        for cert in &path {
            constraints.check(cert)?;
            keys.check(cert)?;
        }
        let mut chain = Vec::with_capacity(path.len() + 1);
        if let Some(own) = &anchor.certificate {
            chain.push(own.clone());
        }
        chain.extend(path);
        Ok(CertPath {
            chain,
            anchor: anchor.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::builder::CancellationToken;
    use crate::store::CollectionStore;

    fn store(certs: Vec<Certificate>) -> Vec<Arc<dyn CertificateStore>> {
        vec![Arc::new(CollectionStore::from_certificates(
            "test",
            certs.into_iter().map(Arc::new),
        ))]
    }

    #[test]
    fn budget_is_enforced() {
        let mut budget = Budget::new(2);
        budget.consume().unwrap();
        budget.consume().unwrap();
        assert!(matches!(
            budget.consume(),
            Err(CertPathError::BudgetExhausted(2))
        ));
    }

    #[test]
    fn depth_limit_is_capped() {
        let anchors = vec![TrustAnchor::from_name_and_key("CN=R", b"k")];
        let stores = store(vec![]);
        let options = BuildOptions {
            max_path_length: 100,
            ..BuildOptions::default()
        };
        assert_eq!(Search::new(&anchors, &stores, &options).depth_limit, MAX_CHAIN_DEPTH);
        let options = BuildOptions::default();
        assert_eq!(Search::new(&anchors, &stores, &options).depth_limit, 5 + DEPTH_SLACK);
    }

    #[test]
    fn direct_issue_by_named_anchor() {
        let leaf = Certificate::builder("CN=L").issuer("CN=R").build();
        let anchors = vec![TrustAnchor::from_name_and_key("CN=R", b"k")];
        let stores = store(vec![leaf]);
        let options = BuildOptions::default();
        let result = Search::new(&anchors, &stores, &options)
            .run(&Selector::subject("CN=L"))
            .unwrap();
        let path = result.path.unwrap();
        assert_eq!(path.chain.len(), 1);
        let results: Vec<_> = result.adjacency.steps().iter().map(|s| s.result()).collect();
        assert_eq!(results, vec![StepResult::Possible, StepResult::Succeed]);
    }

    #[test]
    fn dead_end_records_no_issuer_and_fail() {
        let leaf = Certificate::builder("CN=L").issuer("CN=Missing").build();
        let anchors = vec![TrustAnchor::from_name_and_key("CN=R", b"k")];
        let stores = store(vec![leaf]);
        let options = BuildOptions::default();
        let result = Search::new(&anchors, &stores, &options)
            .run(&Selector::subject("CN=L"))
            .unwrap();
        assert!(result.path.is_none());
        let vertex = result.adjacency.vertex(result.adjacency.row(0)[0]).unwrap();
        assert_eq!(vertex.cause(), Some(&RejectReason::NoIssuer));
        assert_eq!(vertex.index(), Some(1));
        let results: Vec<_> = result.adjacency.steps().iter().map(|s| s.result()).collect();
        assert_eq!(
            results,
            vec![
                StepResult::Possible,
                StepResult::Follow,
                StepResult::Back,
                StepResult::Fail
            ]
        );
    }

    #[test]
    fn cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let anchors = vec![TrustAnchor::from_name_and_key("CN=R", b"k")];
        let stores = store(vec![]);
        let options = BuildOptions {
            cancellation: Some(token),
            ..BuildOptions::default()
        };
        let err = Search::new(&anchors, &stores, &options)
            .run(&Selector::subject("CN=L"))
            .unwrap_err();
        assert!(matches!(err, CertPathError::Cancelled));
    }

    #[test]
    fn unknown_issuer_serial_target() {
        let anchors = vec![TrustAnchor::from_name_and_key("CN=R", b"k")];
        let stores = store(vec![]);
        let options = BuildOptions::default();
        let err = Search::new(&anchors, &stores, &options)
            .run(&Selector::issuer_serial("CN=R", &[1]))
            .unwrap_err();
        assert!(matches!(err, CertPathError::InvalidConfiguration(_)));
    }
}
