//! certpath-lib: certification path building for X.509 certificates.
//!
//! Given a target certificate (or a selector for one), a set of trust
//! anchors and a set of certificate stores, [`PathBuilder`] searches for a
//! chain from the target up to an anchor, enforcing basic constraints, name
//! constraints and key usage as the chain grows, and records every decision
//! of the search for diagnostics.

mod anchor;
pub mod builder;
mod certificate;
mod display;
mod fields;
mod name_constraints;
pub mod oid;
mod parser;
mod selector;
mod store;
mod tls_store;
mod util;
mod verifier;

pub use anchor::{anchors_from_pem, TrustAnchor};
pub use builder::{
    build_path, AdjacencyList, BuildOptions, BuildResult, BuildStep, CancellationToken,
    CertPath, ConstraintsChecker, KeyChecker, PathBuilder, RejectReason, StepResult, Vertex,
    VertexId, DEFAULT_MAX_CANDIDATES, DEFAULT_MAX_PATH_LENGTH,
};
pub use certificate::{CertIdentity, Certificate, CertificateBuilder};
pub use display::{
    build_report, chain_to_pem, display_text, to_json, BuildReport, ChainCertInfo, StepInfo,
};
pub use fields::{
    BasicConstraints, DateTime, DistinguishedName, Extension, ExtensionValue, GeneralName,
    KeyUsage,
};
pub use name_constraints::{GeneralSubtree, NameConstraints};
pub use parser::{parse_cert, parse_certificates, parse_der, parse_pem, parse_pem_chain};
pub use selector::Selector;
pub use store::{CertificateStore, CollectionStore, StoreError, StoreLocality};
pub use tls_store::{TlsServerStore, DEFAULT_TLS_TIMEOUT};
pub use util::der_to_pem;
pub use verifier::{SignatureVerifier, X509SignatureVerifier};

/// Errors returned by certpath-lib.
#[derive(Debug, thiserror::Error)]
pub enum CertPathError {
    #[error("Failed to parse certificate: {0}")]
    ParseError(String),

    #[error("Invalid PEM format: {0}")]
    PemError(String),

    #[error("Invalid DER format: {0}")]
    DerError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Path building cancelled")]
    Cancelled,

    #[error("Search budget of {0} candidates exhausted")]
    BudgetExhausted(usize),

    #[error("No certification path found")]
    NoPathFound,
}
