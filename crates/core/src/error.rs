use thiserror::Error;

use crate::model::NodeId;

/// Errors raised while reading or editing a progress tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModelError {
    #[error("node `{0}` is flagged both completed and in progress")]
    IllegalNodeFlags(String),

    #[error("node identifier cannot be empty")]
    EmptyNodeId,

    #[error("section index {index} out of range ({len} sections)")]
    SectionOutOfRange { index: usize, len: usize },

    #[error("node `{node}` not found in section {section}")]
    UnknownNode { section: usize, node: NodeId },

    #[error("section `{section}` lists node `{node}` more than once")]
    DuplicateNode { section: String, node: NodeId },
}
