//! End-to-end path building over in-memory certificates.

#![allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]

use certpath_lib::{
    build_path, BuildOptions, BuildResult, CancellationToken, CertPathError, Certificate,
    CertificateStore, CollectionStore, ConstraintsChecker, GeneralName, KeyUsage,
    NameConstraints, PathBuilder, RejectReason, Selector, SignatureVerifier, StepResult,
    StoreError, StoreLocality, TrustAnchor,
};
use std::collections::HashSet;
use std::sync::Arc;

fn store(name: &str, certs: &[&Arc<Certificate>]) -> Arc<dyn CertificateStore> {
    Arc::new(CollectionStore::from_certificates(
        name,
        certs.iter().map(|c| Arc::clone(*c)),
    ))
}

fn root(name: &str) -> Arc<Certificate> {
    Arc::new(Certificate::builder(name).ca(None).build())
}

fn ca(subject: &str, issuer: &str, path_len: Option<u32>) -> Arc<Certificate> {
    Arc::new(
        Certificate::builder(subject)
            .issuer(issuer)
            .ca(path_len)
            .key_usage(KeyUsage::empty().with(KeyUsage::KEY_CERT_SIGN))
            .build(),
    )
}

fn leaf(subject: &str, issuer: &str) -> Arc<Certificate> {
    Arc::new(
        Certificate::builder(subject)
            .issuer(issuer)
            .end_entity()
            .build(),
    )
}

fn build(
    anchors: Vec<TrustAnchor>,
    stores: Vec<Arc<dyn CertificateStore>>,
    options: BuildOptions,
    target: &Selector,
) -> Result<BuildResult, CertPathError> {
    PathBuilder::new(anchors, stores, options)?.build(target)
}

fn with_max(max_path_length: usize) -> BuildOptions {
    BuildOptions {
        max_path_length,
        ..BuildOptions::default()
    }
}

fn subjects(result: &BuildResult) -> Vec<String> {
    result
        .path
        .as_ref()
        .unwrap()
        .chain
        .iter()
        .map(|c| c.subject.to_oneline())
        .collect()
}

fn causes(result: &BuildResult) -> Vec<RejectReason> {
    result
        .adjacency
        .steps()
        .iter()
        .filter(|s| s.result() == StepResult::Back)
        .filter_map(|s| s.cause().cloned())
        .collect()
}

/// Accepts exactly the listed (certificate serial, issuer key) pairs.
struct Signed(Vec<(u8, &'static [u8])>);

impl SignatureVerifier for Signed {
    fn verify(&self, cert: &Certificate, issuer_spki: &[u8]) -> Result<(), String> {
        let ok = self
            .0
            .iter()
            .any(|(serial, key)| cert.serial == [*serial] && *key == issuer_spki);
        if ok {
            Ok(())
        } else {
            Err(format!("{} not signed by that key", cert.subject))
        }
    }
}

#[test]
fn single_intermediate_with_path_len_zero() {
    let ta = root("CN=TA");
    let i = ca("CN=I", "CN=TA", Some(0));
    let l = leaf("CN=L", "CN=I");
    let result = build(
        vec![TrustAnchor::from_certificate(ta)],
        vec![store("s", &[&i, &l])],
        with_max(2),
        &Selector::subject("CN=L"),
    )
    .unwrap();

    assert!(result.is_success());
    assert_eq!(subjects(&result), vec!["CN = TA", "CN = I", "CN = L"]);
    let last = result.adjacency.steps().last().unwrap();
    assert_eq!(last.result(), StepResult::Succeed);
    assert_eq!(last.subject_name(), "CN = I");
}

#[test]
fn path_len_zero_blocks_second_intermediate() {
    let ta = root("CN=TA");
    let i = ca("CN=I", "CN=TA", Some(0));
    let i2 = ca("CN=I2", "CN=I", None);
    let l = leaf("CN=L", "CN=I2");
    let result = build(
        vec![TrustAnchor::from_certificate(ta)],
        vec![store("s", &[&i, &i2, &l])],
        with_max(2),
        &Selector::subject("CN=L"),
    )
    .unwrap();

    assert!(!result.is_success());
    assert!(causes(&result).contains(&RejectReason::PathTooLong));
    assert!(matches!(result.into_path(), Err(CertPathError::NoPathFound)));
}

#[test]
fn excluded_subject_subtree_blocks_path() {
    let ta = root("CN=TA");
    let nc = NameConstraints::new(vec![], vec![GeneralName::DirName("O=Excluded".into())]);
    let i = Arc::new(
        Certificate::builder("CN=I")
            .issuer("CN=TA")
            .ca(None)
            .name_constraints(nc)
            .build(),
    );
    let l = leaf("O=Excluded, CN=L", "CN=I");
    let result = build(
        vec![TrustAnchor::from_certificate(ta)],
        vec![store("s", &[&i, &l])],
        with_max(2),
        &Selector::subject("O=Excluded, CN=L"),
    )
    .unwrap();

    assert!(!result.is_success());
    assert!(causes(&result)
        .iter()
        .any(|c| matches!(c, RejectReason::InvalidName(_))));
}

#[test]
fn intermediate_without_key_cert_sign() {
    let ta = root("CN=TA");
    let i = Arc::new(
        Certificate::builder("CN=I")
            .issuer("CN=TA")
            .ca(None)
            .key_usage(KeyUsage::empty().with(KeyUsage::DIGITAL_SIGNATURE))
            .build(),
    );
    let l = leaf("CN=L", "CN=I");
    let result = build(
        vec![TrustAnchor::from_certificate(ta)],
        vec![store("s", &[&i, &l])],
        BuildOptions::default(),
        &Selector::subject("CN=L"),
    )
    .unwrap();

    assert!(!result.is_success());
    assert_eq!(causes(&result), vec![RejectReason::InvalidKeyUsage]);
    let vertex = result
        .adjacency
        .vertices()
        .iter()
        .find(|v| v.certificate().subject.to_oneline() == "CN = I")
        .unwrap();
    assert_eq!(vertex.cause(), Some(&RejectReason::InvalidKeyUsage));
}

#[test]
fn backtracks_to_second_issuer() {
    let ta = root("CN=TA");
    let bad = Arc::new(
        Certificate::builder("CN=I")
            .issuer("CN=TA")
            .spki(b"bad")
            .end_entity()
            .build(),
    );
    let good = ca("CN=I", "CN=TA", None);
    let l = leaf("CN=L", "CN=I");
    let result = build(
        vec![TrustAnchor::from_certificate(ta)],
        vec![store("s", &[&bad, &good, &l])],
        BuildOptions::default(),
        &Selector::subject("CN=L"),
    )
    .unwrap();

    let path = result.path.as_ref().unwrap();
    assert_eq!(path.chain[1].spki, good.spki);
    assert_eq!(causes(&result), vec![RejectReason::NotACa]);
}

#[test]
fn cycles_terminate() {
    let a = ca("CN=A", "CN=B", None);
    let b = ca("CN=B", "CN=A", None);
    let l = leaf("CN=L", "CN=A");
    let result = build(
        vec![TrustAnchor::from_name_and_key("CN=Root", b"k")],
        vec![store("s", &[&a, &b, &l])],
        BuildOptions::default(),
        &Selector::subject("CN=L"),
    )
    .unwrap();

    assert!(!result.is_success());
    assert!(causes(&result).contains(&RejectReason::Cycle));
}

#[test]
fn returned_chain_has_no_repeats() {
    let ta = root("CN=TA");
    let i1 = ca("CN=I1", "CN=TA", None);
    let i2 = ca("CN=I2", "CN=I1", None);
    let l = leaf("CN=L", "CN=I2");
    let result = build(
        vec![TrustAnchor::from_certificate(ta)],
        vec![store("s", &[&i1, &i2, &l])],
        BuildOptions::default(),
        &Selector::subject("CN=L"),
    )
    .unwrap();
    let chain = &result.path.as_ref().unwrap().chain;
    let unique: HashSet<_> = chain.iter().map(|c| c.identity()).collect();
    assert_eq!(unique.len(), chain.len());
}

struct FailingStore;

impl CertificateStore for FailingStore {
    fn name(&self) -> &str {
        "ldap"
    }

    fn query(&self, _selector: &Selector) -> Result<Vec<Arc<Certificate>>, StoreError> {
        Err(StoreError::new("ldap", "connection refused"))
    }
}

#[test]
fn store_failures_are_not_fatal() {
    let ta = root("CN=TA");
    let i = ca("CN=I", "CN=TA", None);
    let l = leaf("CN=L", "CN=I");
    let result = build(
        vec![TrustAnchor::from_certificate(ta)],
        vec![Arc::new(FailingStore), store("s", &[&i, &l])],
        BuildOptions::default(),
        &Selector::subject("CN=L"),
    )
    .unwrap();

    assert!(result.is_success());
    // Once for the target, once for the issuer lookup.
    assert_eq!(result.store_failures.len(), 2);
    assert_eq!(result.store_failures[0].to_string(), "ldap: connection refused");
}

#[test]
fn local_stores_are_consulted_first() {
    let ta = root("CN=TA");
    let remote_i = Arc::new(
        Certificate::builder("CN=I")
            .issuer("CN=TA")
            .spki(b"remote")
            .ca(None)
            .build(),
    );
    let local_i = Arc::new(
        Certificate::builder("CN=I")
            .issuer("CN=TA")
            .spki(b"local")
            .ca(None)
            .build(),
    );
    let l = leaf("CN=L", "CN=I");
    let remote: Arc<dyn CertificateStore> = Arc::new(
        CollectionStore::from_certificates("remote", [remote_i])
            .with_locality(StoreLocality::Remote),
    );
    let result = build(
        vec![TrustAnchor::from_certificate(ta)],
        vec![remote, store("local", &[&local_i, &l])],
        BuildOptions::default(),
        &Selector::subject("CN=L"),
    )
    .unwrap();

    assert_eq!(result.path.unwrap().chain[1].spki, b"local".to_vec());
}

/// Cancels the shared token when asked for anything issued by `CN=I`.
struct CancellingStore {
    inner: CollectionStore,
    token: CancellationToken,
}

impl CertificateStore for CancellingStore {
    fn name(&self) -> &str {
        "cancelling"
    }

    fn query(&self, selector: &Selector) -> Result<Vec<Arc<Certificate>>, StoreError> {
        if selector.subject_name().map(|n| n.to_oneline()) == Some("CN = I".into()) {
            self.token.cancel();
        }
        self.inner.query(selector)
    }
}

#[test]
fn cancellation_stops_the_search() {
    let token = CancellationToken::new();
    let ta = root("CN=TA");
    let i = ca("CN=I", "CN=TA", None);
    let l = leaf("CN=L", "CN=I");
    let store = CancellingStore {
        inner: CollectionStore::from_certificates("inner", [i, l]),
        token: token.clone(),
    };
    let options = BuildOptions {
        cancellation: Some(token),
        ..BuildOptions::default()
    };
    let err = build(
        vec![TrustAnchor::from_certificate(ta)],
        vec![Arc::new(store)],
        options,
        &Selector::subject("CN=L"),
    )
    .unwrap_err();
    assert!(matches!(err, CertPathError::Cancelled));
}

#[test]
fn anchor_name_constraints_rejected_before_search() {
    let anchor = TrustAnchor::from_name_and_key("CN=TA", b"k").with_name_constraints(
        NameConstraints::new(vec![GeneralName::Dns("example.com".into())], vec![]),
    );
    let err = build(
        vec![anchor],
        vec![Arc::new(FailingStore)],
        BuildOptions::default(),
        &Selector::subject("CN=L"),
    )
    .unwrap_err();
    assert!(matches!(err, CertPathError::InvalidConfiguration(_)));
}

#[test]
fn self_issued_rollover_does_not_consume_path_length() {
    let ta = root("CN=TA");
    let i = ca("CN=I", "CN=TA", None);
    let rollover = Arc::new(
        Certificate::builder("CN=I")
            .spki(b"rolled-over")
            .ca(None)
            .build(),
    );
    let l = leaf("CN=L", "CN=I");
    let result = build(
        vec![TrustAnchor::from_certificate(ta)],
        vec![store("s", &[&rollover, &i, &l])],
        with_max(1),
        &Selector::subject("CN=L"),
    )
    .unwrap();

    let chain = &result.path.as_ref().unwrap().chain;
    assert_eq!(chain.len(), 4);
    assert_eq!(chain[1].spki, i.spki);
    assert_eq!(chain[2].spki, b"rolled-over".to_vec());
}

#[test]
fn version_one_self_issued_below_anchor() {
    let v1 = Arc::new(
        Certificate::builder("CN=Old")
            .version(1)
            .serial(2)
            .spki(b"new-key")
            .build(),
    );
    let l = Arc::new(Certificate::builder("CN=L").issuer("CN=Old").serial(3).build());
    let options = BuildOptions {
        signature_verifier: Some(Arc::new(Signed(vec![
            (2, &b"anchor-key"[..]),
            (3, &b"new-key"[..]),
        ]))),
        ..BuildOptions::default()
    };
    let result = build(
        vec![TrustAnchor::from_name_and_key("CN=Old", b"anchor-key")],
        vec![store("s", &[&v1, &l])],
        options,
        &Selector::subject("CN=L"),
    )
    .unwrap();

    let path = result.path.unwrap();
    assert_eq!(path.chain.len(), 2);
    assert_eq!(path.chain[0].version, 1);
    assert!(path.anchor.certificate.is_none());
}

#[test]
fn version_one_intermediate_that_is_not_self_issued() {
    let v1 = Arc::new(
        Certificate::builder("CN=Mid")
            .issuer("CN=Root")
            .version(1)
            .build(),
    );
    let l = leaf("CN=L", "CN=Mid");
    let result = build(
        vec![TrustAnchor::from_name_and_key("CN=Root", b"k")],
        vec![store("s", &[&v1, &l])],
        BuildOptions::default(),
        &Selector::subject("CN=L"),
    )
    .unwrap();
    assert!(!result.is_success());
    assert_eq!(causes(&result), vec![RejectReason::NotACa]);
}

#[test]
fn max_path_length_bounds_intermediates() {
    let ta = root("CN=TA");
    let i1 = ca("CN=I1", "CN=TA", None);
    let i2 = ca("CN=I2", "CN=I1", None);
    let i3 = ca("CN=I3", "CN=I2", None);
    let l = leaf("CN=L", "CN=I3");
    let run = |max| {
        build(
            vec![TrustAnchor::from_certificate(ta.clone())],
            vec![store("s", &[&i1, &i2, &i3, &l])],
            with_max(max),
            &Selector::subject("CN=L"),
        )
        .unwrap()
    };

    let short = run(2);
    assert!(!short.is_success());
    assert!(causes(&short).contains(&RejectReason::PathTooLong));
    assert_eq!(subjects(&run(3)).len(), 5);
}

#[test]
fn search_depth_is_bounded() {
    // A long run of self-issued certificates, each signed by the next key,
    // that never reaches the anchor.
    const KEYS: [&[u8]; 13] = [
        b"k0", b"k1", b"k2", b"k3", b"k4", b"k5", b"k6", b"k7", b"k8", b"k9", b"k10", b"k11",
        b"k12",
    ];
    let mut certs = Vec::new();
    let mut pairs = Vec::new();
    for j in 0..12u8 {
        certs.push(Arc::new(
            Certificate::builder("CN=X")
                .serial(u64::from(j) + 1)
                .spki(KEYS[usize::from(j)])
                .ca(None)
                .build(),
        ));
        pairs.push((j + 1, KEYS[usize::from(j) + 1]));
    }
    let l = Arc::new(Certificate::builder("CN=L").issuer("CN=X").serial(100).build());
    pairs.push((100, KEYS[0]));
    let mut all: Vec<&Arc<Certificate>> = certs.iter().collect();
    all.push(&l);

    let options = BuildOptions {
        max_path_length: 0,
        signature_verifier: Some(Arc::new(Signed(pairs))),
        ..BuildOptions::default()
    };
    let result = build(
        vec![TrustAnchor::from_name_and_key("CN=Root", b"k")],
        vec![store("s", &all)],
        options,
        &Selector::subject("CN=L"),
    )
    .unwrap();
    assert!(!result.is_success());
    assert!(causes(&result).contains(&RejectReason::DepthExceeded(8)));
}

#[test]
fn budget_exhaustion_is_an_error() {
    let ta = root("CN=TA");
    let i = ca("CN=I", "CN=TA", None);
    let l = leaf("CN=L", "CN=I");
    let options = BuildOptions {
        max_candidates: 1,
        ..BuildOptions::default()
    };
    let err = build(
        vec![TrustAnchor::from_certificate(ta)],
        vec![store("s", &[&i, &l])],
        options,
        &Selector::subject("CN=L"),
    )
    .unwrap_err();
    assert!(matches!(err, CertPathError::BudgetExhausted(1)));
}

#[test]
fn trail_is_deterministic() {
    let ta = root("CN=TA");
    let bad = Arc::new(
        Certificate::builder("CN=I")
            .issuer("CN=TA")
            .spki(b"bad")
            .ca(None)
            .key_usage(KeyUsage::empty())
            .build(),
    );
    let i = ca("CN=I", "CN=TA", None);
    let l = leaf("CN=L", "CN=I");
    let run = || {
        let result = build(
            vec![TrustAnchor::from_certificate(ta.clone())],
            vec![store("s", &[&bad, &i, &l])],
            BuildOptions::default(),
            &Selector::subject("CN=L"),
        )
        .unwrap();
        result
            .adjacency
            .steps()
            .iter()
            .map(|s| (s.vertex(), s.result(), s.cause().cloned()))
            .collect::<Vec<_>>()
    };
    let first = run();
    assert_eq!(first, run());
    assert_eq!(first.len(), 6);
}

#[test]
fn target_constraints_checked_on_target() {
    let ta = root("CN=TA");
    let i = ca("CN=I", "CN=TA", None);
    let l = leaf("CN=L", "CN=I");
    let options = BuildOptions {
        target_constraints: Some(Selector::predicate("never", |_| false)),
        ..BuildOptions::default()
    };
    let result = build(
        vec![TrustAnchor::from_certificate(ta)],
        vec![store("s", &[&i, &l])],
        options,
        &Selector::subject("CN=L"),
    )
    .unwrap();
    assert!(!result.is_success());
    assert!(causes(&result).contains(&RejectReason::TargetConstraintsNotMet));
}

#[test]
fn predicate_target_is_a_configuration_error() {
    let err = build(
        vec![TrustAnchor::from_name_and_key("CN=TA", b"k")],
        vec![store("s", &[])],
        BuildOptions::default(),
        &Selector::predicate("anything", |_| true),
    )
    .unwrap_err();
    assert!(matches!(err, CertPathError::InvalidConfiguration(_)));
}

#[test]
fn issuer_serial_target() {
    let ta = root("CN=TA");
    let i = ca("CN=I", "CN=TA", None);
    let l = Arc::new(Certificate::builder("CN=L").issuer("CN=I").serial(7).build());
    let other = Arc::new(Certificate::builder("CN=L2").issuer("CN=I").serial(8).build());
    let result = build(
        vec![TrustAnchor::from_certificate(ta)],
        vec![store("s", &[&i, &l, &other])],
        BuildOptions::default(),
        &Selector::issuer_serial("CN=I", &[7]),
    )
    .unwrap();
    let path = result.path.unwrap();
    assert_eq!(path.target().unwrap().subject.to_oneline(), "CN = L");
}

#[test]
fn issuer_serial_target_queries_each_store_once() {
    let ta = root("CN=TA");
    let i = ca("CN=I", "CN=TA", None);
    let l = Arc::new(Certificate::builder("CN=L").issuer("CN=I").serial(7).build());
    let result = build(
        vec![TrustAnchor::from_certificate(ta)],
        vec![Arc::new(FailingStore), store("s", &[&i, &l])],
        BuildOptions::default(),
        &Selector::issuer_serial("CN=I", &[7]),
    )
    .unwrap();
    assert!(result.is_success());
    // Once resolving the target, once for its issuer.
    assert_eq!(result.store_failures.len(), 2);
    assert_eq!(result.adjacency.row(0).len(), 1);
}

#[test]
fn build_path_with_path_length_only() {
    let ta = root("CN=TA");
    let i1 = ca("CN=I1", "CN=TA", None);
    let i2 = ca("CN=I2", "CN=I1", None);
    let l = leaf("CN=L", "CN=I2");
    let stores = || vec![store("s", &[&i1, &i2, &l])];
    let anchors = || vec![TrustAnchor::from_certificate(ta.clone())];

    let short = build_path(&Selector::subject("CN=L"), anchors(), stores(), 1).unwrap();
    assert!(matches!(short.into_path(), Err(CertPathError::NoPathFound)));
    let path = build_path(&Selector::subject("CN=L"), anchors(), stores(), 2)
        .unwrap()
        .into_path()
        .unwrap();
    assert_eq!(path.chain.len(), 4);
}

#[test]
fn certificate_target_need_not_be_in_a_store() {
    let ta = root("CN=TA");
    let i = ca("CN=I", "CN=TA", None);
    let l = leaf("CN=L", "CN=I");
    let result = build(
        vec![TrustAnchor::from_certificate(ta)],
        vec![store("s", &[&i])],
        BuildOptions::default(),
        &Selector::certificate(l.clone()),
    )
    .unwrap();
    assert_eq!(result.path.unwrap().target(), Some(&l));
}

#[test]
fn path_length_is_monotonic() {
    let i1 = ca("CN=I1", "CN=TA", None);
    let rollover = Arc::new(Certificate::builder("CN=I1").spki(b"r").ca(None).build());
    let i2 = ca("CN=I2", "CN=I1", None);
    let l = leaf("CN=L", "CN=I2");
    let path = [&i1, &rollover, &i2, &l];

    let mut checker = ConstraintsChecker::new(5, path.len());
    checker.init();
    let mut previous = checker.remaining_path_length();
    for cert in &path[..3] {
        checker.check(cert).unwrap();
        let now = checker.remaining_path_length();
        if cert.is_self_issued() {
            assert_eq!(now, previous);
        } else {
            assert!(now < previous);
        }
        previous = now;
    }
    checker.check(&l).unwrap();
}
