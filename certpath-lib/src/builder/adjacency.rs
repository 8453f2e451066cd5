//! The search graph: rows of vertices plus the ordered decision trail.
//!
//! Row 0 holds the certificates matching the target selector. Every other
//! row holds the issuer candidates of exactly one vertex, whose `index`
//! points at it. Rows are only ever appended, so branches that were backed
//! out stay available for diagnostics.

use super::{BuildStep, StepResult, Vertex, VertexId};
use crate::certificate::Certificate;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct AdjacencyList {
    vertices: Vec<Vertex>,
    rows: Vec<Vec<VertexId>>,
    steps: Vec<BuildStep>,
}

impl AdjacencyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row holding one new vertex per certificate. Returns the new
    /// row number.
    pub(crate) fn push_row(&mut self, certs: Vec<Arc<Certificate>>) -> usize {
        let row = self.rows.len();
        let ids = certs
            .into_iter()
            .map(|cert| {
                let id = VertexId(self.vertices.len());
                self.vertices.push(Vertex::new(cert, row));
                id
            })
            .collect();
        self.rows.push(ids);
        row
    }

    pub fn row(&self, row: usize) -> &[VertexId] {
        self.rows.get(row).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[VertexId]> {
        self.rows.iter().map(Vec::as_slice)
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(id.0)
    }

    pub(crate) fn vertex_mut(&mut self, id: VertexId) -> Option<&mut Vertex> {
        self.vertices.get_mut(id.0)
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Record a step for `id`, snapshotting the vertex's current cause.
    pub(crate) fn record(&mut self, id: VertexId, result: StepResult) {
        if let Some(vertex) = self.vertices.get(id.0) {
            self.steps.push(BuildStep::new(id, vertex, result));
        }
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    /// The vertices from `terminal` back to row 0, following `index`
    /// back-pointers: the predecessor of a vertex in row r is the vertex
    /// whose `index` is r.
    pub fn path_to(&self, terminal: VertexId) -> Vec<VertexId> {
        let mut path = Vec::new();
        let mut current = match self.vertex(terminal) {
            Some(v) => {
                path.push(terminal);
                v.row()
            }
            None => return path,
        };
        while current > 0 {
            let parent = self
                .vertices
                .iter()
                .position(|v| v.index() == Some(current));
            match parent {
                Some(p) => {
                    path.push(VertexId(p));
                    current = self.vertices.get(p).map_or(0, Vertex::row);
                }
                None => break,
            }
        }
        path
    }

    /// Certificates of [`AdjacencyList::path_to`], in the same order
    /// (terminal first, target last).
    pub fn certificates_to(&self, terminal: VertexId) -> Vec<Arc<Certificate>> {
        self.path_to(terminal)
            .into_iter()
            .filter_map(|id| self.vertex(id).map(|v| v.certificate().clone()))
            .collect()
    }

    /// The vertex of the last `SUCCEED` step, if the search succeeded.
    pub fn succeeded(&self) -> Option<VertexId> {
        self.steps
            .iter()
            .rev()
            .find(|s| s.result() == StepResult::Succeed)
            .map(BuildStep::vertex)
    }
}

impl std::fmt::Display for AdjacencyList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "[")?;
        for (i, row) in self.rows.iter().enumerate() {
            writeln!(f, "Row {}:", i)?;
            for id in row {
                if let Some(v) = self.vertex(*id) {
                    writeln!(
                        f,
                        "  {} {} <- {}{}",
                        id,
                        v.certificate().subject,
                        v.certificate().issuer,
                        match v.index() {
                            Some(next) => format!(" (issuers in row {})", next),
                            None => String::new(),
                        }
                    )?;
                }
            }
        }
        writeln!(f, "]")
    }
}
