#![no_main]

use certpath_lib::{Certificate, GeneralName, NameConstraints};
use libfuzzer_sys::fuzz_target;

/// Line-oriented input: `p:<kind>:<value>` adds a permitted subtree,
/// `x:<kind>:<value>` an excluded one, `n:<kind>:<value>` a name on the
/// certificate, `-` starts the next constraint set.
fn general_name(kind: &str, value: &str) -> Option<GeneralName> {
    match kind {
        "dns" => Some(GeneralName::Dns(value.to_string())),
        "email" => Some(GeneralName::Email(value.to_string())),
        "uri" => Some(GeneralName::Uri(value.to_string())),
        "ip" => Some(GeneralName::Ip(value.bytes().collect())),
        "dir" => Some(GeneralName::DirName(value.into())),
        _ => None,
    }
}

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let mut sets = Vec::new();
    let (mut permitted, mut excluded) = (Vec::new(), Vec::new());
    let mut builder = Certificate::builder("CN=fuzz");

    for line in text.lines() {
        if line == "-" {
            sets.push(NameConstraints::new(
                std::mem::take(&mut permitted),
                std::mem::take(&mut excluded),
            ));
            continue;
        }
        let mut parts = line.splitn(3, ':');
        let (Some(tag), Some(kind), Some(value)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let Some(name) = general_name(kind, value) else {
            continue;
        };
        match tag {
            "p" => permitted.push(name),
            "x" => excluded.push(name),
            "n" => builder = builder.subject_alt_name(name),
            _ => {}
        }
    }
    sets.push(NameConstraints::new(permitted, excluded));
    let cert = builder.build();

    // Merging and checking must never panic.
    let mut merged: Option<NameConstraints> = None;
    for nc in &sets {
        let _ = nc.check(&cert);
        merged = Some(match merged {
            Some(prev) => prev.merge(nc),
            None => nc.clone(),
        });
    }
    if let Some(nc) = merged {
        let _ = nc.permits(&cert);
        for name in cert.subject_alt_names() {
            let _ = nc.permits_name(name);
        }
    }
});
