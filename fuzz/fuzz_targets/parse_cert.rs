#![no_main]

use certpath_lib::{
    build_report, display_text, parse_certificates, BuildOptions, CertificateStore,
    CollectionStore, PathBuilder, Selector, TrustAnchor,
};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    // Loading must never panic, regardless of input.
    let Ok(certs) = parse_certificates(data) else {
        return;
    };
    let Some(first) = certs.first().cloned() else {
        return;
    };

    for cert in &certs {
        let _ = cert.name_constraints().map(|nc| nc.permits(cert));
        let _ = cert.unsupported_critical_extensions();
        let _ = cert.serial_hex();
        let _ = cert.not_after_time().to_openssl();
    }

    // Build over whatever came in, trusting the first certificate's issuer
    // by name.
    let anchor = TrustAnchor::from_name_and_key(first.issuer.clone(), b"fuzz");
    let store: Arc<dyn CertificateStore> = Arc::new(CollectionStore::from_certificates(
        "fuzz",
        certs.into_iter().map(Arc::new),
    ));
    let options = BuildOptions {
        max_candidates: 10_000,
        ..BuildOptions::default()
    };
    if let Ok(builder) = PathBuilder::new(vec![anchor], vec![store], options) {
        if let Ok(result) = builder.build(&Selector::certificate(Arc::new(first))) {
            let report = build_report(&result);
            let _ = display_text(&report, true);
            let _ = result.adjacency.to_string();
        }
    }
});
