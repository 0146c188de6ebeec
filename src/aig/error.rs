use thiserror::Error;

use super::NodeId;

/// The result of an AIG operation.
pub type Result<T> = std::result::Result<T, AigError>;

/// Error returned when an AIG operation failed.
#[derive(Debug, Error)]
pub enum AigError {
    /// A node with the same (canonical) fanins already exists in the structural hash table.
    #[error("an and gate with the same fanins already exists (node {0})")]
    DuplicateAnd(NodeId),

    /// The node with given id does not exist (never allocated, or freed).
    #[error("node with id={0} does not exist")]
    NodeDoesNotExist(NodeId),

    /// The operation requires an and gate.
    #[error("node {0} is not an and gate")]
    NotAnAnd(NodeId),

    /// Invalid operation on a node which does not have such specified fanin.
    #[error("the node has no such fanin")]
    NoFanin,

    /// The stored phase of a node disagrees with the phase recomputed from its fanins.
    #[error("phase of node {0} is inconsistent with its fanins")]
    PhaseMismatch(NodeId),

    /// The AIG has reached an invalid state. This should never happen.
    /// For example, the structural hash table should point at a live node
    /// whose fanins are exactly the key. If this error is raised, the manager is broken.
    #[error("the AIG has reached an invalid state - this should not happen - error: {0}")]
    InvalidState(String),

    /// Just forwarding a [`ParserError`].
    #[error("{0}")]
    ParserError(#[from] ParserError),
}

/// Error returned when parsing from file failed.
///
/// It is defined here because the `parser` module is private.
#[derive(Debug, Error)]
pub enum ParserError {
    /// All features are not supported (only the basics in fact).
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Invalid token, something else was expected.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// An IO error occured (file doesn't exist, or doesn't have the right extension, ...).
    #[error("io error: {0}")]
    IoError(String),
}
