//! A candidate certificate as seen by the search.

use super::RejectReason;
use crate::certificate::Certificate;
use std::sync::Arc;

/// Handle to a [`Vertex`] in an [`super::AdjacencyList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(pub(crate) usize);

impl VertexId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for VertexId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One certificate considered at one depth of the search.
#[derive(Debug, Clone)]
pub struct Vertex {
    cert: Arc<Certificate>,
    row: usize,
    index: Option<usize>,
    cause: Option<RejectReason>,
}

impl Vertex {
    pub(crate) fn new(cert: Arc<Certificate>, row: usize) -> Self {
        Vertex {
            cert,
            row,
            index: None,
            cause: None,
        }
    }

    pub fn certificate(&self) -> &Arc<Certificate> {
        &self.cert
    }

    /// The adjacency-list row this vertex was placed in.
    pub fn row(&self) -> usize {
        self.row
    }

    /// The row holding the candidates that may follow this vertex (its
    /// issuers), once they have been looked up.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub(crate) fn set_index(&mut self, row: usize) {
        self.index = Some(row);
    }

    /// Why this vertex was rejected, if it was.
    pub fn cause(&self) -> Option<&RejectReason> {
        self.cause.as_ref()
    }

    pub(crate) fn set_cause(&mut self, cause: RejectReason) {
        self.cause = Some(cause);
    }

    pub fn cert_to_string(&self) -> String {
        let cert = &self.cert;
        let mut out = String::new();
        out.push_str(&format!("Issuer:     {}\n", cert.issuer));
        out.push_str(&format!("Subject:    {}\n", cert.subject));
        out.push_str(&format!("SerialNum:  {}\n", hex::encode(&cert.serial)));
        out.push_str(&format!("Expires:    {}\n", cert.not_after_time()));
        if let Some(id) = cert.subject_key_id() {
            out.push_str(&format!("SubjKeyID:  {}\n", crate::util::hex_colon_upper(id)));
        }
        if let Some(id) = cert.authority_key_id() {
            out.push_str(&format!("AuthKeyID:  {}\n", crate::util::hex_colon_upper(id)));
        }
        out
    }

    pub fn cause_to_string(&self) -> String {
        match &self.cause {
            Some(cause) => format!("Reason:     {}\n", cause),
            None => "Reason:     none\n".to_string(),
        }
    }

    pub fn index_to_string(&self) -> String {
        match self.index {
            Some(row) => format!("Index:      {}\n", row),
            None => "Index:      none\n".to_string(),
        }
    }

    pub fn more_to_string(&self) -> String {
        format!(
            "Last cert?  {}\n",
            if self.index.is_none() { "Yes" } else { "No" }
        )
    }
}

impl std::fmt::Display for Vertex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.cert_to_string(),
            self.cause_to_string(),
            self.index_to_string()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendering() {
        let cert = Certificate::builder("CN=Leaf").issuer("CN=CA").serial(0xab).build();
        let mut v = Vertex::new(Arc::new(cert), 0);
        let text = v.to_string();
        assert!(text.contains("Issuer:     CN = CA\n"));
        assert!(text.contains("SerialNum:  ab\n"));
        assert!(text.contains("Reason:     none\n"));
        assert!(text.ends_with("Index:      none\n"));
        assert_eq!(v.more_to_string(), "Last cert?  Yes\n");

        v.set_index(3);
        v.set_cause(RejectReason::NotACa);
        assert!(v.to_string().ends_with("Index:      3\n"));
        assert!(v.cause_to_string().contains("not a CA"));
        assert_eq!(v.more_to_string(), "Last cert?  No\n");
    }
}
