// src/error.rs

use thiserror::Error;

use crate::graph::NodeId;

/// Failures of the underlying blob store or of (de)serialising what lives in it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage quota exceeded writing `{key}` ({size} bytes, limit {limit})")]
    QuotaExceeded { key: String, size: usize, limit: usize },

    #[error("stored data could not be (de)serialised: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

/// A structural defect the graph model should never produce.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntegrityFault {
    #[error("node id `{0}` appears more than once")]
    DuplicateNodeId(NodeId),

    #[error("edge `{edge}` references missing node `{missing}`")]
    DanglingEdge { edge: String, missing: NodeId },

    #[error("edge id `{0}` appears more than once")]
    DuplicateEdgeId(String),

    #[error("node `{node}` has {count} outgoing edges")]
    OutDegreeExceeded { node: NodeId, count: usize },

    #[error("node `{0}` has a non-finite position")]
    NonFinitePosition(NodeId),
}

/// Why a graph may not be persisted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Cannot save flow. More than one node has empty target handles.")]
    MultipleEntryPoints { roots: Vec<NodeId> },

    #[error("internal consistency fault: {0}")]
    Integrity(#[from] IntegrityFault),
}

impl ValidationError {
    /// `true` for problems the user can fix on the canvas, `false` for model corruption.
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, ValidationError::MultipleEntryPoints { .. })
    }
}

/// Outcome of a rejected save; the session is left exactly as it was.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SaveError {
    #[error("Flow name is required")]
    EmptyName,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to save flow: {0}")]
    Storage(#[from] StorageError),
}
