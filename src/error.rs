//! Error types for the altscan annotation engine.

use crate::document::NodeId;
use crate::engine::EngineState;
use thiserror::Error;

/// Structural errors raised by the in-process document model
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    #[error("Hierarchy request error: cannot insert {child:?} under {parent:?}")]
    HierarchyRequest { parent: NodeId, child: NodeId },

    #[error("Node {child:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeId, child: NodeId },
}

/// Errors from a single word-provider round trip.
///
/// These never leave the word source: they select the fallback branch of a
/// [`WordBatch`](crate::word_source::WordBatch).
#[derive(Debug, Error)]
pub enum WordSourceError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Error status code: {0}")]
    Status(u16),

    #[error("Invalid response body: {0}")]
    InvalidBody(String),

    #[error("Expected {requested} words, provider returned {received}")]
    LengthMismatch { requested: usize, received: usize },
}

/// Engine-level errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine cannot start from state {state:?}")]
    AlreadyStarted { state: EngineState },

    #[error("Engine is not running (state {state:?})")]
    NotRunning { state: EngineState },

    #[error("Async runtime unavailable: {0}")]
    Runtime(String),

    #[error("Word source returned {received} words for {requested} images")]
    WordCountMismatch { requested: usize, received: usize },

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid document snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}
