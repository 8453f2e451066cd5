//! Human-readable and JSON reports of a path build.

use crate::builder::{BuildResult, CertPath, StepResult};
use crate::certificate::Certificate;
use crate::util;
use crate::CertPathError;
use serde::Serialize;

/// Information about a certificate in the built chain.
#[derive(Debug, Clone, Serialize)]
pub struct ChainCertInfo {
    /// Position in chain (0 = target).
    pub depth: usize,
    /// Subject distinguished name.
    pub subject: String,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Short human-readable name derived from CN, O, or OU.
    pub short_name: String,
    /// Serial number as colon-separated hex (machine-readable).
    pub serial: String,
}

impl ChainCertInfo {
    fn from_cert(depth: usize, cert: &Certificate) -> Self {
        ChainCertInfo {
            depth,
            subject: cert.subject.to_oneline(),
            issuer: cert.issuer.to_oneline(),
            short_name: cert.short_name(),
            serial: cert.serial_hex(),
        }
    }
}

/// One entry of the search trail.
#[derive(Debug, Clone, Serialize)]
pub struct StepInfo {
    /// Position in the trail, from 0.
    pub index: usize,
    pub vertex: usize,
    pub row: usize,
    pub result: StepResult,
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    pub cause: Option<String>,
}

/// Serializable summary of a [`BuildResult`].
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Whether a path to a trust anchor was found.
    pub found: bool,
    /// The trust anchor the path ends at.
    pub anchor: Option<String>,
    /// The chain, target first.
    pub chain: Vec<ChainCertInfo>,
    /// Number of adjacency-list rows the search produced.
    pub rows: usize,
    pub steps: Vec<StepInfo>,
    /// Store queries that failed during the search.
    pub store_failures: Vec<String>,
    /// Certificates the search started from (row 0).
    #[serde(skip)]
    targets: Vec<ChainCertInfo>,
}

impl BuildReport {
    /// Why the build failed: the cause recorded by the last rejection.
    pub fn failure_reason(&self) -> Option<&str> {
        if self.found {
            return None;
        }
        self.steps
            .iter()
            .rev()
            .find_map(|s| s.cause.as_deref())
            .or(Some("no certification path found"))
    }

    fn target(&self) -> Option<&ChainCertInfo> {
        self.chain.first().or(self.targets.first())
    }
}

impl std::fmt::Display for BuildReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Format: [short_name], [serial], [OK/FAIL], [optional reason]
        if let Some(target) = self.target() {
            write!(f, "{}, {}, ", target.short_name, target.serial)?;
        }
        if self.found {
            write!(f, "OK")?;
        } else {
            write!(f, "FAIL")?;
            if let Some(reason) = self.failure_reason() {
                write!(f, ", {}", reason)?;
            }
        }
        Ok(())
    }
}

/// Summarize a build result for display or serialization.
pub fn build_report(result: &BuildResult) -> BuildReport {
    let adjacency = &result.adjacency;
    let chain = result
        .path
        .as_ref()
        .map(|p| {
            p.chain
                .iter()
                .rev()
                .enumerate()
                .map(|(depth, cert)| ChainCertInfo::from_cert(depth, cert))
                .collect()
        })
        .unwrap_or_default();
    let targets = adjacency
        .row(0)
        .iter()
        .filter_map(|id| adjacency.vertex(*id))
        .map(|v| ChainCertInfo::from_cert(0, v.certificate()))
        .collect();
    let steps = adjacency
        .steps()
        .iter()
        .enumerate()
        .map(|(index, step)| StepInfo {
            index,
            vertex: step.vertex().index(),
            row: adjacency.vertex(step.vertex()).map_or(0, |v| v.row()),
            result: step.result(),
            subject: step.subject_name(),
            issuer: step.issuer_name(),
            serial: step.certificate().serial_hex(),
            cause: step.cause().map(|c| c.to_string()),
        })
        .collect();

    BuildReport {
        found: result.path.is_some(),
        anchor: result.path.as_ref().map(|p| p.anchor.to_string()),
        chain,
        rows: adjacency.row_count(),
        steps,
        store_failures: result.store_failures.iter().map(|e| e.to_string()).collect(),
        targets,
    }
}

/// Format a build report as human-readable text.
///
/// If `show_trace` is true, includes every step of the search.
pub fn display_text(report: &BuildReport, show_trace: bool) -> String {
    let mut out = String::new();

    out.push_str("Path Build:\n");
    if let Some(target) = report.target() {
        out.push_str(&format!("  Target: {}\n", target.subject));
    }
    out.push_str(&format!(
        "  Result: {}\n",
        if report.found { "OK" } else { "FAIL" }
    ));
    if let Some(reason) = report.failure_reason() {
        out.push_str(&format!("  Reason: {}\n", reason));
    }
    if let Some(anchor) = &report.anchor {
        out.push_str(&format!("  Trust Anchor: {}\n", anchor));
    }

    if !report.chain.is_empty() {
        out.push_str("  Chain:\n");
        for info in &report.chain {
            out.push_str(&format!(
                "    {}: {} [{}]\n",
                info.depth, info.subject, info.serial
            ));
            out.push_str(&format!("       issuer: {}\n", info.issuer));
        }
    }

    if !report.store_failures.is_empty() {
        out.push_str("  Store Failures:\n");
        for failure in &report.store_failures {
            out.push_str(&format!("    {}\n", failure));
        }
    }

    out.push_str(&format!(
        "  Search: {} rows, {} steps\n",
        report.rows,
        report.steps.len()
    ));
    if show_trace {
        out.push_str("  Trace:\n");
        for step in &report.steps {
            out.push_str(&format!(
                "    [{}] {:<8} row {} #{} {} <- {}",
                step.index, step.result, step.row, step.vertex, step.subject, step.issuer
            ));
            if let Some(cause) = &step.cause {
                if matches!(step.result, StepResult::Back | StepResult::Fail) {
                    out.push_str(&format!(": {}", cause));
                }
            }
            out.push('\n');
        }
    }

    out
}

/// Serialize a build report as pretty-printed JSON.
pub fn to_json(report: &BuildReport) -> Result<String, CertPathError> {
    serde_json::to_string_pretty(report).map_err(CertPathError::Json)
}

/// PEM-encode a built chain, target first. Every certificate must carry its
/// DER encoding.
pub fn chain_to_pem(path: &CertPath) -> Result<String, CertPathError> {
    let mut out = String::new();
    for cert in path.chain.iter().rev() {
        if cert.raw_der.is_empty() {
            return Err(CertPathError::DerError(format!(
                "no DER encoding for {}",
                cert.subject
            )));
        }
        out.push_str(&util::der_to_pem(&cert.raw_der));
    }
    Ok(out)
}
