//! Error types for MathPrereq.
//!
//! Library crates use [`MathPrereqError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

use crate::types::PipelineStage;

/// Top-level error type for all MathPrereq operations.
#[derive(Debug, thiserror::Error)]
pub enum MathPrereqError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to a source or the generative service.
    #[error("network error: {0}")]
    Network(String),

    /// HTML, JSON, or model-output parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Generative text service error (API, empty reply, malformed choice).
    #[error("generation error: {0}")]
    Generation(String),

    /// Concept graph loading or traversal error.
    #[error("graph error: {0}")]
    Graph(String),

    /// An external call exceeded its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input, out-of-range value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A fatal pipeline stage failed. Names the stage and carries the cause.
    #[error("{stage} failed: {source}")]
    Stage {
        stage: PipelineStage,
        source: Box<MathPrereqError>,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MathPrereqError>;

impl MathPrereqError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a timeout error for a named operation.
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Wrap an error with the pipeline stage it aborted.
    pub fn stage(stage: PipelineStage, source: MathPrereqError) -> Self {
        Self::Stage {
            stage,
            source: Box::new(source),
        }
    }

    /// The failing pipeline stage, if this is a stage error.
    pub fn failed_stage(&self) -> Option<PipelineStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
