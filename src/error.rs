//! Error types for the composition library.
//!
//! This module defines all error types that can occur while resolving,
//! compiling, composing, and streaming a document. The taxonomy mirrors the
//! pipeline stages: validation failures are rejected before any resource
//! access, resolution and compilation failures name the offending template
//! key, and fill/export failures carry the stage they occurred in.

use crate::pipeline::Stage;

/// Result type alias for composition operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during document composition.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The composition request carried no datasets and no fields.
    ///
    /// Rejected before any resource resolution is attempted.
    #[error("composition request is empty: at least one dataset or field is required")]
    EmptyRequest,

    /// The composition request was present but malformed.
    #[error("invalid composition request: {0}")]
    InvalidRequest(String),

    /// A required template resource could not be located.
    ///
    /// This is a user/configuration fault, distinct from an I/O failure
    /// while reading a resource that does exist.
    #[error("template not found for key '{key}' (looked in {origin})")]
    TemplateNotFound {
        /// Normalized template key that failed to resolve.
        key: String,
        /// Resource locator that was probed.
        origin: String,
    },

    /// A template resource was found but the engine could not compile it.
    #[error("failed to compile template '{key}': {reason}")]
    Compile {
        /// Normalized template key of the offending resource.
        key: String,
        /// Engine diagnostic.
        reason: String,
    },

    /// The rendering engine failed during a fill/compose pass.
    #[error("render failed during {stage}: {reason}")]
    Render {
        /// Pipeline stage that was active when the engine failed.
        stage: Stage,
        /// Engine diagnostic.
        reason: String,
    },

    /// Writing the finished document to the sink failed.
    #[error("failed to stream document: {0}")]
    Streaming(String),

    /// The request was cancelled cooperatively between pipeline stages.
    #[error("composition cancelled during {0}")]
    Cancelled(Stage),

    /// Service configuration could not be loaded or is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is a client-side fault (bad request or unknown
    /// template key) as opposed to an infrastructure failure.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Error::EmptyRequest | Error::InvalidRequest(_) | Error::TemplateNotFound { .. }
        )
    }
}
