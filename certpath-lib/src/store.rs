//! Certificate stores: where candidate certificates come from.
//!
//! The builder only sees the [`CertificateStore`] trait. [`CollectionStore`]
//! is the in-memory implementation, loadable from DER, PEM bundles and
//! OpenSSL-style certificate directories. [`crate::TlsServerStore`] is the
//! network-backed one.

use crate::certificate::Certificate;
use crate::fields::DistinguishedName;
use crate::parser;
use crate::selector::Selector;
use crate::CertPathError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Where a store's certificates live. Local stores are always queried
/// before remote ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreLocality {
    Local,
    Remote,
}

/// A failed store query. The builder treats it as "no candidates from this
/// store" and records it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{store}: {message}")]
pub struct StoreError {
    pub store: String,
    pub message: String,
}

impl StoreError {
    pub fn new(store: &str, message: impl Into<String>) -> Self {
        StoreError {
            store: store.to_string(),
            message: message.into(),
        }
    }
}

/// A source of candidate certificates.
///
/// Implementations may block; timeouts are theirs to enforce.
pub trait CertificateStore: Send + Sync {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    fn locality(&self) -> StoreLocality {
        StoreLocality::Local
    }

    /// All certificates matching `selector`, in a stable order.
    fn query(&self, selector: &Selector) -> Result<Vec<Arc<Certificate>>, StoreError>;
}

/// Check if a file looks like a PEM certificate file for store loading.
///
/// Matches `.pem`, `.crt`, `.cer` extensions and OpenSSL hash-linked files
/// (`XXXXXXXX.N` where the extension is a single digit).
fn is_pem_cert_file(path: &Path) -> bool {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e,
        None => return false,
    };
    matches!(ext, "pem" | "crt" | "cer")
        || (ext.len() == 1 && ext.bytes().next().is_some_and(|b| b.is_ascii_digit()))
}

/// An in-memory certificate collection indexed by subject.
///
/// Queries preserve insertion order, so builds over the same collection are
/// deterministic. Duplicate certificates are stored once.
pub struct CollectionStore {
    name: String,
    locality: StoreLocality,
    certs: Vec<Arc<Certificate>>,
    by_subject: HashMap<DistinguishedName, Vec<usize>>,
}

impl std::fmt::Debug for CollectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionStore")
            .field("name", &self.name)
            .field("locality", &self.locality)
            .field("count", &self.certs.len())
            .finish()
    }
}

impl CollectionStore {
    /// Create an empty local store.
    pub fn new(name: &str) -> Self {
        CollectionStore {
            name: name.to_string(),
            locality: StoreLocality::Local,
            certs: Vec::new(),
            by_subject: HashMap::new(),
        }
    }

    /// Mark the store as remote, so it is consulted after all local stores.
    pub fn with_locality(mut self, locality: StoreLocality) -> Self {
        self.locality = locality;
        self
    }

    /// Create a store from already-parsed certificates.
    pub fn from_certificates<I>(name: &str, certs: I) -> Self
    where
        I: IntoIterator<Item = Arc<Certificate>>,
    {
        let mut store = CollectionStore::new(name);
        for cert in certs {
            store.add(cert);
        }
        store
    }

    /// Create a store from a PEM bundle.
    pub fn from_pem(name: &str, pem_data: &[u8]) -> Result<Self, CertPathError> {
        let mut store = CollectionStore::new(name);
        store.add_pem_bundle(pem_data)?;
        Ok(store)
    }

    /// Create a store from a PEM or DER file.
    pub fn from_file(path: &Path) -> Result<Self, CertPathError> {
        let data = std::fs::read(path).map_err(|e| {
            CertPathError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        let mut store = CollectionStore::new(&path.display().to_string());
        for cert in parser::parse_certificates(&data)? {
            store.add(Arc::new(cert));
        }
        Ok(store)
    }

    /// Add a certificate. Returns `false` if an identical one was present.
    pub fn add(&mut self, cert: Arc<Certificate>) -> bool {
        let slots = self.by_subject.entry(cert.subject.clone()).or_default();
        if slots
            .iter()
            .filter_map(|&i| self.certs.get(i))
            .any(|existing| **existing == *cert)
        {
            return false;
        }
        slots.push(self.certs.len());
        self.certs.push(cert);
        true
    }

    /// Add a DER-encoded certificate.
    pub fn add_der(&mut self, der: &[u8]) -> Result<(), CertPathError> {
        let cert = parser::parse_der(der)?;
        self.add(Arc::new(cert));
        Ok(())
    }

    /// Add all certificates from a PEM bundle. Returns the number of
    /// certificates actually added (skipping those that fail to parse).
    pub fn add_pem_bundle(&mut self, pem_data: &[u8]) -> Result<usize, CertPathError> {
        let certs = parser::parse_pem_chain(pem_data)?;
        let mut added = 0;
        for cert_der in certs {
            match self.add_der(&cert_der) {
                Ok(()) => added += 1,
                Err(e) => log::debug!("{}: skipping unparsable certificate: {}", self.name, e),
            }
        }
        Ok(added)
    }

    /// Load certificates from a directory of PEM files (like OpenSSL's -CApath).
    ///
    /// Reads all `.pem`, `.crt`, `.cer`, and OpenSSL hash-linked files in the
    /// directory. Hash-linked files follow the pattern `XXXXXXXX.N` where N is
    /// a single digit (e.g., `a1b2c3d4.0`).
    pub fn add_pem_directory(&mut self, dir: &Path) -> Result<usize, CertPathError> {
        let mut total = 0;
        let entries = std::fs::read_dir(dir).map_err(|e| {
            CertPathError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", dir.display(), e),
            ))
        })?;
        let mut paths: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_pem_cert_file(p))
            .collect();
        paths.sort();
        for path in paths {
            if let Ok(data) = std::fs::read(&path) {
                if let Ok(added) = self.add_pem_bundle(&data) {
                    total += added;
                }
            }
        }
        Ok(total)
    }

    pub fn certificates(&self) -> &[Arc<Certificate>] {
        &self.certs
    }

    /// Number of certificates in the store.
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }
}

impl CertificateStore for CollectionStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn locality(&self) -> StoreLocality {
        self.locality
    }

    fn query(&self, selector: &Selector) -> Result<Vec<Arc<Certificate>>, StoreError> {
        // Subject-keyed selectors go through the index; the rest scan.
        let candidates: Box<dyn Iterator<Item = &Arc<Certificate>>> =
            match selector.subject_name() {
                Some(subject) => Box::new(
                    self.by_subject
                        .get(subject)
                        .into_iter()
                        .flatten()
                        .filter_map(|&i| self.certs.get(i)),
                ),
                None => Box::new(self.certs.iter()),
            };
        Ok(candidates
            .filter(|c| selector.matches(c))
            .cloned()
            .collect())
    }
}
