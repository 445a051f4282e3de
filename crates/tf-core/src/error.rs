//! Unified error type for the tempoforge service.
//!
//! All crates funnel their failures into [`Error`], which carries enough
//! context for the HTTP layer to derive a status code via
//! [`Error::http_status`] and a response-safe message via
//! [`Error::user_message`].

use std::fmt;
use std::time::Duration;

/// Unified error type covering all failure modes in tempoforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request is structurally invalid (missing file, empty filename,
    /// missing required field).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The uploaded file's extension/content is not in the accepted set.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A numeric parameter is outside its allowed range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The probed input duration exceeds the configured ceiling.
    #[error("Audio duration {actual:?} exceeds the limit of {limit:?}")]
    DurationExceeded {
        /// Duration reported by the probe.
        actual: Duration,
        /// Configured ceiling.
        limit: Duration,
    },

    /// The requested entity could not be found (unknown or expired job id,
    /// missing result artifact).
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// An external tool (ffmpeg, ffprobe) is missing, failed to spawn, or
    /// exited non-zero.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Diagnostic detail (stderr, spawn error). Never sent to clients.
        message: String,
    },

    /// Media probing failed in a way that is not merely "no duration".
    #[error("Probe error: {0}")]
    Probe(String),

    /// A job exceeded its execution budget and was forcibly failed.
    #[error("Processing timed out after {0:?}")]
    Timeout(Duration),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidRequest(_)
            | Error::UnsupportedFormat(_)
            | Error::InvalidParameter(_)
            | Error::DurationExceeded { .. } => 400,
            Error::NotFound { .. } => 404,
            Error::Tool { .. }
            | Error::Probe(_)
            | Error::Timeout(_)
            | Error::Io { .. }
            | Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable category for response payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidRequest(_) => "invalid_request",
            Error::UnsupportedFormat(_) => "unsupported_format",
            Error::InvalidParameter(_) => "invalid_parameter",
            Error::DurationExceeded { .. } => "duration_exceeded",
            Error::NotFound { .. } => "not_found",
            Error::Tool { .. } => "processing_failed",
            Error::Probe(_) => "probe_failed",
            Error::Timeout(_) => "timeout",
            Error::Io { .. } => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Message safe to include in a response body.
    ///
    /// Validation-class errors are self-describing and returned verbatim.
    /// Server-side failures collapse to a generic message so tool stderr,
    /// filesystem paths, and other internals stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidRequest(_)
            | Error::UnsupportedFormat(_)
            | Error::InvalidParameter(_)
            | Error::DurationExceeded { .. }
            | Error::NotFound { .. } => self.to_string(),
            Error::Timeout(_) => "audio processing timed out".into(),
            Error::Tool { .. } | Error::Probe(_) | Error::Io { .. } | Error::Internal(_) => {
                "audio processing failed".into()
            }
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
