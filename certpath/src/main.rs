//! certpath: Command-line tool for building X.509 certification paths.

use anyhow::{Context, Result};
use certpath_lib::{
    BuildOptions, BuildResult, CertificateStore, Certificate, CollectionStore, PathBuilder,
    Selector, StoreLocality, TlsServerStore, TrustAnchor,
};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "certpath",
    about = "Build and explain X.509 certification paths",
    long_about = "certpath searches certificate stores for a chain from a target\n\
                  certificate up to a trust anchor, enforcing basic constraints,\n\
                  name constraints and key usage along the way, and can print every\n\
                  decision the search made.",
    after_help = "EXAMPLES:\n\
                  \n  certpath build --CAfile roots.pem --untrusted ints.pem leaf.pem\
                  \n  certpath build --CAfile roots.pem --trace leaf.pem\
                  \n  certpath build --CApath /etc/ssl/certs --json leaf.pem\
                  \n  certpath build --CAfile roots.pem --untrusted ints.pem -r certs/\
                  \n  cat chain.pem | certpath build --CAfile roots.pem"
)]
struct Cli {
    /// Log search decisions to stderr (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a certification path (exit 0 = path found, 2 = no path)
    #[command(
        after_help = "FILE holds the target certificate first; any further certificates\n\
                      in it are used as untrusted candidates. Directories are processed\n\
                      file by file in parallel.\n\
                      \nTIME FORMAT:\n\
                      \n  --attime takes Unix seconds or an RFC 3339 timestamp\
                      \n  (e.g. 2024-05-01T00:00:00Z).\
                      \n\nEXAMPLES:\n\
                      \n  certpath build --CAfile roots.pem leaf.pem\
                      \n  certpath build --CAfile ca.pem --untrusted a.pem --untrusted b.pem x.pem\
                      \n  certpath build --CAfile roots.pem --remote aia.pem leaf.pem\
                      \n  certpath build --CAfile roots.pem --remote https://example.com leaf.pem\
                      \n  certpath build --CAfile roots.pem --purpose sslserver leaf.pem\
                      \n  certpath build --CAfile roots.pem --out-chain chain.pem leaf.pem"
    )]
    Build {
        /// Certificate file (PEM or DER) or directory. Reads from stdin if omitted.
        file: Option<PathBuf>,
        /// PEM file containing trust anchor certificates
        #[arg(long = "CAfile", visible_alias = "ca-file", value_name = "FILE")]
        ca_file: Option<PathBuf>,
        /// Directory of trust anchor certificates in PEM format
        #[arg(long = "CApath", visible_alias = "ca-path", value_name = "DIR")]
        ca_path: Option<PathBuf>,
        /// PEM file with untrusted candidate certificates (repeatable)
        #[arg(long, value_name = "FILE")]
        untrusted: Vec<PathBuf>,
        /// Remote store consulted after local ones: an https:// URL whose
        /// server chain is fetched, or a PEM file (repeatable)
        #[arg(long, value_name = "URL|FILE")]
        remote: Vec<String>,
        /// Connect and read timeout for https:// remote stores
        #[arg(long, value_name = "DURATION", default_value = "10s")]
        remote_timeout: humantime::Duration,
        /// Maximum number of non-self-issued intermediate certificates
        #[arg(long, value_name = "N", default_value_t = certpath_lib::DEFAULT_MAX_PATH_LENGTH)]
        max_path_length: usize,
        /// Maximum number of candidate certificates to examine
        #[arg(long, value_name = "N", default_value_t = certpath_lib::DEFAULT_MAX_CANDIDATES)]
        max_candidates: usize,
        /// Check validity at this time instead of now
        #[arg(long, value_name = "TIME")]
        attime: Option<String>,
        /// Skip validity date checks
        #[arg(long)]
        no_check_time: bool,
        /// Accept issuers by name alone, without verifying signatures
        #[arg(long)]
        no_check_signatures: bool,
        /// Required EKU purpose of the target: sslserver, sslclient, smimesign,
        /// codesign, any, or an OID
        #[arg(long, value_name = "PURPOSE")]
        purpose: Option<String>,
        /// Required subject of the target certificate (e.g. "CN=example.com")
        #[arg(long, value_name = "NAME")]
        expect_subject: Option<String>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
        /// Print every step of the search
        #[arg(long)]
        trace: bool,
        /// Display subject and issuer for each certificate in the built chain
        #[arg(long)]
        show_chain: bool,
        /// Write the built chain as PEM, target first
        #[arg(long, value_name = "FILE")]
        out_chain: Option<PathBuf>,
        /// Only print failures (directory mode)
        #[arg(long)]
        failures_only: bool,
        /// Recurse into subdirectories (directory mode)
        #[arg(short, long)]
        recurse: bool,
    },
}

/// Maximum input size (10 MiB) to prevent memory exhaustion from stdin or large files.
const MAX_INPUT_BYTES: u64 = 10 * 1024 * 1024;

fn read_input(file: Option<&PathBuf>) -> Result<Vec<u8>> {
    match file {
        Some(path) => read_file(path),
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .take(MAX_INPUT_BYTES)
                .read_to_end(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat file: {}", path.display()))?;
    if meta.len() > MAX_INPUT_BYTES {
        anyhow::bail!(
            "File too large ({} bytes, max {} bytes): {}",
            meta.len(),
            MAX_INPUT_BYTES,
            path.display()
        );
    }
    std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

/// Parse `--attime`: plain Unix seconds or an RFC 3339 timestamp.
fn parse_attime(s: &str) -> Result<i64> {
    if let Ok(secs) = s.parse::<i64>() {
        return Ok(secs);
    }
    let t = humantime::parse_rfc3339_weak(s)
        .map_err(|e| anyhow::anyhow!("Invalid time '{}': {}", s, e))?;
    let secs = t
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|_| anyhow::anyhow!("Time before 1970 not supported: '{}'", s))?
        .as_secs();
    i64::try_from(secs).context("Time out of range")
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Turn `--purpose` and `--expect-subject` into target constraints.
fn target_constraints(
    purpose: Option<&str>,
    expect_subject: Option<&str>,
) -> Result<Option<Selector>> {
    let purpose_oid = match purpose {
        None => None,
        Some(p) => match certpath_lib::oid::resolve_purpose(p) {
            Some(oid) => Some(oid.to_string()),
            None if p.split('.').all(|arc| arc.parse::<u64>().is_ok()) => Some(p.to_string()),
            None => anyhow::bail!("Unknown purpose: {}", p),
        },
    };
    let subject = expect_subject.map(certpath_lib::DistinguishedName::parse);

    Ok(match (purpose_oid, subject) {
        (None, None) => None,
        (Some(oid), None) => Some(Selector::purpose(&oid)),
        (None, Some(dn)) => Some(Selector::Subject(dn)),
        (Some(oid), Some(dn)) => {
            let description = format!("purpose {} and subject {}", oid, dn);
            Some(Selector::predicate(&description, move |c| {
                c.allows_purpose(&oid) && c.subject == dn
            }))
        }
    })
}

fn load_anchors(
    ca_file: Option<&PathBuf>,
    ca_path: Option<&PathBuf>,
) -> Result<Vec<TrustAnchor>> {
    let mut anchors = Vec::new();
    if let Some(path) = ca_file {
        let data = read_file(path)?;
        anchors.extend(
            certpath_lib::anchors_from_pem(&data)
                .with_context(|| format!("Failed to load CA file: {}", path.display()))?,
        );
    }
    if let Some(dir) = ca_path {
        let mut store = CollectionStore::new("CApath");
        store
            .add_pem_directory(dir)
            .with_context(|| format!("Failed to load CA directory: {}", dir.display()))?;
        anchors.extend(
            store
                .certificates()
                .iter()
                .cloned()
                .map(TrustAnchor::from_certificate),
        );
    }
    if anchors.is_empty() {
        anyhow::bail!("No trust anchors: use --CAfile or --CApath");
    }
    log::info!("loaded {} trust anchors", anchors.len());
    Ok(anchors)
}

fn load_store(path: &Path, locality: StoreLocality) -> Result<Arc<dyn CertificateStore>> {
    let store = CollectionStore::from_file(path)
        .with_context(|| format!("Failed to load certificates: {}", path.display()))?
        .with_locality(locality);
    Ok(Arc::new(store))
}

/// An `https://` location becomes a TLS server store; anything else is a
/// PEM file marked remote.
fn load_remote(
    location: &str,
    timeout: std::time::Duration,
) -> Result<Arc<dyn CertificateStore>> {
    if location.get(..8).is_some_and(|s| s.eq_ignore_ascii_case("https://")) {
        let store = TlsServerStore::from_url(location)
            .with_context(|| format!("Invalid remote store: {}", location))?
            .with_timeout(timeout);
        return Ok(Arc::new(store));
    }
    load_store(Path::new(location), StoreLocality::Remote)
}

/// Split an input file into the target and a store of the certificates
/// that came with it.
fn load_target(data: &[u8]) -> Result<(Arc<Certificate>, Arc<dyn CertificateStore>)> {
    let mut certs = certpath_lib::parse_certificates(data)?.into_iter().map(Arc::new);
    let target = certs
        .next()
        .ok_or_else(|| anyhow::anyhow!("No certificate found in input"))?;
    let store = CollectionStore::from_certificates("input", certs);
    Ok((target, Arc::new(store)))
}

/// Everything that stays the same across targets.
struct Session {
    anchors: Vec<TrustAnchor>,
    stores: Vec<Arc<dyn CertificateStore>>,
    max_path_length: usize,
    max_candidates: usize,
    validation_time: Option<i64>,
    check_signatures: bool,
    target_constraints: Option<Selector>,
}

impl Session {
    fn build(&self, data: &[u8]) -> Result<BuildResult> {
        let (target, input_store) = load_target(data)?;
        let mut stores = vec![input_store];
        stores.extend(self.stores.iter().cloned());
        let options = BuildOptions {
            max_path_length: self.max_path_length,
            target_constraints: self.target_constraints.clone(),
            validation_time: self.validation_time,
            signature_verifier: if self.check_signatures {
                Some(Arc::new(certpath_lib::X509SignatureVerifier))
            } else {
                None
            },
            cancellation: None,
            max_candidates: self.max_candidates,
        };
        let builder = PathBuilder::new(self.anchors.clone(), stores, options)?;
        Ok(builder.build(&Selector::certificate(target))?)
    }
}

fn is_cert_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("pem") || ext.eq_ignore_ascii_case("der")
            || ext.eq_ignore_ascii_case("crt") || ext.eq_ignore_ascii_case("cer")
    )
}

/// Find all certificate files (.pem, .der, .crt, .cer) in a directory.
fn find_cert_files(dir: &Path, recurse: bool) -> Vec<PathBuf> {
    let walker = if recurse {
        walkdir::WalkDir::new(dir)
    } else {
        walkdir::WalkDir::new(dir).max_depth(1)
    };
    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_cert_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// A single result from batch processing.
struct BatchResult {
    path: String,
    pass: bool,
    detail: String,
}

/// Process certificate files in parallel, printing `filename: result`.
///
/// Returns the number of failures.
fn run_batch<F>(files: &[PathBuf], failures_only: bool, op: F) -> usize
where
    F: Fn(&Path) -> BatchResult + Sync,
{
    let results: Vec<BatchResult> = files.par_iter().map(|f| op(f)).collect();

    let mut failures = 0;
    for r in &results {
        if !r.pass {
            failures += 1;
        }
        if failures_only && r.pass {
            continue;
        }
        if r.pass {
            println!("{}: {}", r.path, r.detail);
        } else {
            eprintln!("{}: {}", r.path, r.detail);
        }
    }
    failures
}

fn build_to_batch(label: String, result: Result<BuildResult>) -> BatchResult {
    match result {
        Ok(r) => BatchResult {
            path: label,
            pass: r.is_success(),
            detail: certpath_lib::build_report(&r).to_string(),
        },
        Err(e) => BatchResult {
            path: label,
            pass: false,
            detail: format!("FAIL ({:#})", e),
        },
    }
}

/// Print a single build result (JSON or text).
fn print_build_result(
    label: &str,
    result: &BuildResult,
    json: bool,
    trace: bool,
    show_chain: bool,
) -> Result<()> {
    let report = certpath_lib::build_report(result);
    if json {
        println!("{}", certpath_lib::to_json(&report)?);
    } else if trace {
        print!("{}", certpath_lib::display_text(&report, true));
    } else if report.found {
        println!("{}: {}", label, report);
        if show_chain {
            for info in &report.chain {
                println!(
                    "depth {}: subject = {}, issuer = {}",
                    info.depth, info.subject, info.issuer
                );
            }
        }
    } else {
        eprintln!("{}: {}", label, report);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Build {
            file,
            ca_file,
            ca_path,
            untrusted,
            remote,
            remote_timeout,
            max_path_length,
            max_candidates,
            attime,
            no_check_time,
            no_check_signatures,
            purpose,
            expect_subject,
            json,
            trace,
            show_chain,
            out_chain,
            failures_only,
            recurse,
        } => {
            let anchors = load_anchors(ca_file.as_ref(), ca_path.as_ref())?;
            let mut stores = Vec::new();
            for path in untrusted {
                stores.push(load_store(path, StoreLocality::Local)?);
            }
            for location in remote {
                stores.push(load_remote(location, (*remote_timeout).into())?);
            }
            let validation_time = if *no_check_time {
                None
            } else {
                match attime {
                    Some(t) => Some(parse_attime(t)?),
                    None => Some(now()),
                }
            };
            let session = Session {
                anchors,
                stores,
                max_path_length: *max_path_length,
                max_candidates: *max_candidates,
                validation_time,
                check_signatures: !no_check_signatures,
                target_constraints: target_constraints(
                    purpose.as_deref(),
                    expect_subject.as_deref(),
                )?,
            };

            // Directory mode: build for all cert files in parallel
            if let Some(path) = file {
                if path.is_dir() {
                    let files = find_cert_files(path, *recurse);
                    if files.is_empty() {
                        anyhow::bail!(
                            "No certificate files (.pem, .der, .crt, .cer) found in {}",
                            path.display()
                        );
                    }
                    let failures = run_batch(&files, *failures_only, |f| {
                        let label = f.display().to_string();
                        let result = read_file(f).and_then(|data| session.build(&data));
                        build_to_batch(label, result)
                    });
                    if failures > 0 {
                        std::process::exit(2);
                    }
                    return Ok(());
                }
            }

            let label = file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "stdin".to_string());
            let input = read_input(file.as_ref())?;
            let result = session.build(&input)?;
            print_build_result(&label, &result, *json, *trace, *show_chain)?;

            if let (Some(out), Some(path)) = (out_chain, &result.path) {
                let pem = certpath_lib::chain_to_pem(path)?;
                std::fs::write(out, pem)
                    .with_context(|| format!("Failed to write chain: {}", out.display()))?;
            }
            if !result.is_success() {
                std::process::exit(2);
            }
        }
    }

    Ok(())
}
