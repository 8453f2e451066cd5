//! Append-only record of search decisions.

use super::{RejectReason, Vertex, VertexId};
use crate::certificate::Certificate;
use serde::Serialize;
use std::sync::Arc;

/// Outcome recorded for a vertex at one point of the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepResult {
    /// About to be tried.
    Possible,
    /// Rejected; the vertex and its subtree are abandoned.
    Back,
    /// Accepted; the path continues through this vertex.
    Follow,
    /// Last candidate of a row; no path reaches the target through the row.
    Fail,
    /// The path through this vertex reaches a trust anchor.
    Succeed,
}

impl StepResult {
    pub fn describe(self) -> &'static str {
        match self {
            StepResult::Possible => "Certificate to be tried.",
            StepResult::Back => {
                "Certificate backed out since path does not satisfy build requirements."
            }
            StepResult::Follow | StepResult::Succeed => "Certificate satisfies conditions.",
            StepResult::Fail => {
                "Certificate backed out since path does not satisfy conditions."
            }
        }
    }
}

impl std::fmt::Display for StepResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StepResult::Possible => "POSSIBLE",
            StepResult::Back => "BACK",
            StepResult::Follow => "FOLLOW",
            StepResult::Fail => "FAIL",
            StepResult::Succeed => "SUCCEED",
        };
        f.pad(name)
    }
}

/// Immutable snapshot of one decision: which vertex, what happened, and the
/// vertex's rejection cause at that moment.
#[derive(Debug, Clone)]
pub struct BuildStep {
    vertex: VertexId,
    cert: Arc<Certificate>,
    result: StepResult,
    cause: Option<RejectReason>,
}

impl BuildStep {
    pub(crate) fn new(id: VertexId, vertex: &Vertex, result: StepResult) -> Self {
        BuildStep {
            vertex: id,
            cert: vertex.certificate().clone(),
            result,
            cause: vertex.cause().cloned(),
        }
    }

    pub fn vertex(&self) -> VertexId {
        self.vertex
    }

    pub fn certificate(&self) -> &Arc<Certificate> {
        &self.cert
    }

    pub fn result(&self) -> StepResult {
        self.result
    }

    pub fn cause(&self) -> Option<&RejectReason> {
        self.cause.as_ref()
    }

    pub fn subject_name(&self) -> String {
        self.cert.subject.to_oneline()
    }

    pub fn issuer_name(&self) -> String {
        self.cert.issuer.to_oneline()
    }

    fn cause_line(&self) -> String {
        match &self.cause {
            Some(cause) => format!("Reason:     {}\n", cause),
            None => "Reason:     none\n".to_string(),
        }
    }

    /// Result description plus, for rejections, the cause. `vertex` must be
    /// the vertex this step refers to.
    pub fn verbose_to_string(&self, vertex: &Vertex) -> String {
        let mut out = format!("{}\n", self.result.describe());
        match self.result {
            StepResult::Back | StepResult::Fail => out.push_str(&self.cause_line()),
            StepResult::Follow | StepResult::Succeed => out.push_str(&vertex.more_to_string()),
            StepResult::Possible => {}
        }
        out.push_str("Certificate contains:\n");
        out.push_str(&vertex.cert_to_string());
        out
    }

    pub fn full_to_string(&self, vertex: &Vertex) -> String {
        format!("{}\n{}", self.result.describe(), vertex)
    }
}

impl std::fmt::Display for BuildStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.result.describe())?;
        if matches!(self.result, StepResult::Back | StepResult::Fail) {
            f.write_str(&self.cause_line())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_keeps_cause_at_recording_time() {
        let cert = Arc::new(Certificate::builder("CN=I").issuer("CN=R").build());
        let mut vertex = Vertex::new(cert, 1);
        let before = BuildStep::new(VertexId(0), &vertex, StepResult::Possible);
        vertex.set_cause(RejectReason::InvalidKeyUsage);
        let after = BuildStep::new(VertexId(0), &vertex, StepResult::Back);

        assert!(before.cause().is_none());
        assert_eq!(after.cause(), Some(&RejectReason::InvalidKeyUsage));
        assert_eq!(before.to_string(), "Certificate to be tried.\n");
        assert!(after.to_string().contains("keyCertSign bit is not set"));
    }

    #[test]
    fn verbose_rendering() {
        let cert = Arc::new(Certificate::builder("CN=I").issuer("CN=R").build());
        let vertex = Vertex::new(cert, 0);
        let step = BuildStep::new(VertexId(0), &vertex, StepResult::Succeed);
        let text = step.verbose_to_string(&vertex);
        assert!(text.starts_with("Certificate satisfies conditions.\nLast cert?  Yes\n"));
        assert!(text.contains("Certificate contains:\nIssuer:     CN = R\n"));
        assert!(step.full_to_string(&vertex).contains("Index:      none"));
    }

    #[test]
    fn result_names() {
        assert_eq!(StepResult::Succeed.to_string(), "SUCCEED");
        assert_eq!(
            serde_json::to_string(&StepResult::Possible).ok().as_deref(),
            Some("\"POSSIBLE\"")
        );
    }
}
