//! Certification path building.
//!
//! [`PathBuilder`] searches the configured stores for a chain from a target
//! certificate up to one of the trust anchors. The search is depth-first with
//! backtracking: each candidate is pruned against the constraints
//! accumulated on its own path, and every path that reaches an anchor is
//! validated in full with [`ConstraintsChecker`] and [`KeyChecker`] before it
//! is accepted. Every decision is recorded in the returned
//! [`AdjacencyList`].

mod adjacency;
mod chain;
mod constraints;
mod forward;
mod key_checker;
mod step;
mod vertex;

pub use adjacency::AdjacencyList;
pub use constraints::ConstraintsChecker;
pub use key_checker::KeyChecker;
pub use step::{BuildStep, StepResult};
pub use vertex::{Vertex, VertexId};

use crate::anchor::TrustAnchor;
use crate::certificate::Certificate;
use crate::selector::Selector;
use crate::store::{CertificateStore, StoreError};
use crate::verifier::SignatureVerifier;
use crate::CertPathError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Default maximum number of non-self-issued intermediate certificates.
pub const DEFAULT_MAX_PATH_LENGTH: usize = 5;

/// Default bound on candidate examinations per build.
pub const DEFAULT_MAX_CANDIDATES: usize = 200_000;

/// Why a candidate certificate was rejected. Captured on its [`Vertex`] and
/// in the [`BuildStep`] that backed it out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("basic constraints check failed: this is not a CA certificate")]
    NotACa,

    #[error(
        "basic constraints check failed: pathLenConstraint violated - \
         this cert must be the last cert in the certification path"
    )]
    PathTooLong,

    #[error("name constraints check failed: {0}")]
    InvalidName(String),

    #[error("CA key usage check failed: keyCertSign bit is not set")]
    InvalidKeyUsage,

    #[error("target certificate constraints check failed")]
    TargetConstraintsNotMet,

    #[error("loop detected: certificate already appears in the path")]
    Cycle,

    #[error("search depth limit of {0} certificates exceeded")]
    DepthExceeded(usize),

    #[error("unrecognized critical extension: {0}")]
    UnsupportedCriticalExtension(String),

    #[error("certificate expired at {0}")]
    Expired(String),

    #[error("certificate not valid before {0}")]
    NotYetValid(String),

    #[error("{0}")]
    InvalidSignature(String),

    #[error("no issuer certificate found")]
    NoIssuer,
}

/// Cooperative cancellation flag shared between a caller and running builds.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options controlling path building.
pub struct BuildOptions {
    /// Maximum number of non-self-issued intermediate CA certificates.
    /// Defaults to 5.
    pub max_path_length: usize,
    /// Constraints the target (last) certificate must satisfy.
    pub target_constraints: Option<Selector>,
    /// Check certificate validity windows at this Unix timestamp. `None`
    /// skips the check.
    pub validation_time: Option<i64>,
    /// Verify each link's signature. `None` trusts name chaining alone.
    pub signature_verifier: Option<Arc<dyn SignatureVerifier>>,
    /// Abort the build when this token is cancelled.
    pub cancellation: Option<CancellationToken>,
    /// Upper bound on candidate examinations before the build gives up.
    pub max_candidates: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
            target_constraints: None,
            validation_time: None,
            signature_verifier: None,
            cancellation: None,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }
}

impl std::fmt::Debug for BuildOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildOptions")
            .field("max_path_length", &self.max_path_length)
            .field("target_constraints", &self.target_constraints)
            .field("validation_time", &self.validation_time)
            .field("signature_verifier", &self.signature_verifier.is_some())
            .field("cancellation", &self.cancellation)
            .field("max_candidates", &self.max_candidates)
            .finish()
    }
}

/// A successfully built path.
#[derive(Debug, Clone)]
pub struct CertPath {
    /// Certificates ordered anchor → … → target. Starts with the anchor
    /// certificate when the anchor is a certificate.
    pub chain: Vec<Arc<Certificate>>,
    pub anchor: TrustAnchor,
}

impl CertPath {
    pub fn target(&self) -> Option<&Arc<Certificate>> {
        self.chain.last()
    }
}

/// Outcome of a build: the path if one was found, plus the full search
/// trail either way.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub path: Option<CertPath>,
    pub adjacency: AdjacencyList,
    /// Store queries that failed during the search. Non-fatal.
    pub store_failures: Vec<StoreError>,
}

impl BuildResult {
    pub fn is_success(&self) -> bool {
        self.path.is_some()
    }

    /// The path, or [`CertPathError::NoPathFound`].
    pub fn into_path(self) -> Result<CertPath, CertPathError> {
        self.path.ok_or(CertPathError::NoPathFound)
    }
}

/// Builds certification paths over a fixed set of anchors and stores.
pub struct PathBuilder {
    anchors: Vec<TrustAnchor>,
    stores: Vec<Arc<dyn CertificateStore>>,
    options: BuildOptions,
}

impl std::fmt::Debug for PathBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathBuilder")
            .field("anchors", &self.anchors.len())
            .field(
                "stores",
                &self.stores.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
            )
            .field("options", &self.options)
            .finish()
    }
}

impl PathBuilder {
    /// Validate the configuration and order the stores (local before
    /// remote, otherwise as given).
    pub fn new(
        anchors: Vec<TrustAnchor>,
        mut stores: Vec<Arc<dyn CertificateStore>>,
        options: BuildOptions,
    ) -> Result<Self, CertPathError> {
        if anchors.is_empty() {
            return Err(CertPathError::InvalidConfiguration(
                "at least one trust anchor is required".into(),
            ));
        }
        if let Some(anchor) = anchors.iter().find(|a| a.name_constraints.is_some()) {
            return Err(CertPathError::InvalidConfiguration(format!(
                "name constraints in trust anchor not supported: {}",
                anchor.subject
            )));
        }
        if options.max_candidates == 0 {
            return Err(CertPathError::InvalidConfiguration(
                "max_candidates must be positive".into(),
            ));
        }
        stores.sort_by_key(|s| s.locality());
        Ok(PathBuilder {
            anchors,
            stores,
            options,
        })
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn anchors(&self) -> &[TrustAnchor] {
        &self.anchors
    }

    /// Search for a path from the certificate selected by `target` to one of
    /// the anchors.
    ///
    /// Returns `Ok` with `path: None` when no path exists. Errors are
    /// reserved for configuration problems, cancellation and running out of
    /// search budget.
    pub fn build(&self, target: &Selector) -> Result<BuildResult, CertPathError> {
        chain::Search::new(&self.anchors, &self.stores, &self.options).run(target)
    }
}

/// One-shot convenience: build a path with default options apart from the
/// path length limit.
pub fn build_path(
    target: &Selector,
    anchors: Vec<TrustAnchor>,
    stores: Vec<Arc<dyn CertificateStore>>,
    max_path_length: usize,
) -> Result<BuildResult, CertPathError> {
    let options = BuildOptions {
        max_path_length,
        ..BuildOptions::default()
    };
    PathBuilder::new(anchors, stores, options)?.build(target)
}
