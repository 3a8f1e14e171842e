//! Error types for the EduRun orchestrator.
//!
//! This module defines the error hierarchy for all orchestrator operations:
//! configuration loading, execution backend calls, generative backend calls,
//! and structured feedback decoding.
//!
//! None of these errors reach the learner as-is. Execution-lane errors are
//! folded into diagnostic lines of an [`ExecutionResult`](crate::ExecutionResult),
//! and feedback-lane errors select one of the fallback bundles.

use std::path::PathBuf;

/// A specialized `Result` type for EduRun orchestrator operations.
pub type Result<T> = std::result::Result<T, EduRunError>;

/// Errors that can occur while orchestrating execution and feedback requests.
///
/// Error variants are organized by subsystem and include actionable suggestions
/// where possible to help users resolve issues.
#[derive(Debug, thiserror::Error)]
pub enum EduRunError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your edurun.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Source File Errors
    // ========================================================================
    /// Source file was not found at the specified path.
    #[error("Source file not found: '{path}'\n\nSuggestion: Check the path passed to 'edurun run'")]
    SourceNotFound {
        /// Path where the source was expected.
        path: PathBuf,
    },

    /// Source file exceeds the size limit.
    #[error("Source file exceeds size limit (100KB): '{path}' is {size_kb}KB\n\nSuggestion: Submit a smaller program")]
    SourceTooLarge {
        /// Path to the oversized source.
        path: PathBuf,
        /// Actual size in kilobytes.
        size_kb: u64,
    },

    /// Source file contains non-UTF-8 content.
    #[error("Source file has invalid encoding: '{path}'\n\nSuggestion: Convert the file to UTF-8 encoding")]
    SourceEncodingError {
        /// Path to the source with encoding issues.
        path: PathBuf,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// The backend could not be reached.
    #[error("{backend} backend unreachable: {message}")]
    Network {
        /// Which backend was being called.
        backend: Backend,
        /// Description of the transport failure.
        message: String,
    },

    /// The backend answered with a non-success status or an undecodable body.
    #[error("{backend} backend protocol error: {message}")]
    Protocol {
        /// Which backend was being called.
        backend: Backend,
        /// HTTP status code, when one was received.
        status: Option<u16>,
        /// Description of the protocol violation.
        message: String,
    },

    /// The backend did not answer within the request bound.
    #[error("{backend} backend timed out after {timeout_secs}s")]
    Timeout {
        /// Which backend was being called.
        backend: Backend,
        /// The timeout duration in seconds.
        timeout_secs: u64,
    },

    // ========================================================================
    // Generative Output Errors
    // ========================================================================
    /// The generative output did not contain a decodable structured object.
    #[error("Generative output is not structurally valid: {0}")]
    ModelParse(String),

    /// The decoded structured object is missing required fields.
    #[error("Generative output is missing required field '{field}'")]
    Validation {
        /// Name of the missing field.
        field: &'static str,
    },

    // ========================================================================
    // Coordinator Errors
    // ========================================================================
    /// The coordinator task has shut down and no longer accepts commands.
    #[error("Request coordinator is no longer running")]
    CoordinatorClosed,

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The external service an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// The code execution backend.
    Execution,
    /// The generative feedback backend.
    Generative,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Execution => write!(f, "Execution"),
            Self::Generative => write!(f, "Generative"),
        }
    }
}

/// Failure classes surfaced in execution diagnostics and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Backend unreachable.
    Network,
    /// Non-success status or undecodable body.
    Protocol,
    /// No response within the bound.
    Timeout,
    /// Generative output not structurally valid.
    ModelParse,
    /// Decoded object missing required fields.
    Validation,
    /// Local failures (configuration, I/O, coordinator shutdown).
    Internal,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => write!(f, "network error"),
            Self::Protocol => write!(f, "protocol error"),
            Self::Timeout => write!(f, "timeout"),
            Self::ModelParse => write!(f, "model parse error"),
            Self::Validation => write!(f, "validation error"),
            Self::Internal => write!(f, "internal error"),
        }
    }
}

impl EduRunError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `SourceNotFound` error.
    #[must_use]
    pub fn source_not_found(path: impl Into<PathBuf>) -> Self {
        Self::SourceNotFound { path: path.into() }
    }

    /// Creates a new `SourceTooLarge` error.
    #[must_use]
    pub fn source_too_large(path: impl Into<PathBuf>, size_kb: u64) -> Self {
        Self::SourceTooLarge {
            path: path.into(),
            size_kb,
        }
    }

    /// Creates a new `SourceEncodingError`.
    #[must_use]
    pub fn source_encoding(path: impl Into<PathBuf>) -> Self {
        Self::SourceEncodingError { path: path.into() }
    }

    /// Creates a new `Network` error.
    #[must_use]
    pub fn network(backend: Backend, message: impl Into<String>) -> Self {
        Self::Network {
            backend,
            message: message.into(),
        }
    }

    /// Creates a new `Protocol` error.
    #[must_use]
    pub fn protocol(backend: Backend, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Protocol {
            backend,
            status,
            message: message.into(),
        }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub const fn timeout(backend: Backend, timeout_secs: u64) -> Self {
        Self::Timeout {
            backend,
            timeout_secs,
        }
    }

    /// Creates a new `ModelParse` error.
    #[must_use]
    pub fn model_parse(message: impl Into<String>) -> Self {
        Self::ModelParse(message.into())
    }

    /// Creates a new `Validation` error for a missing field.
    #[must_use]
    pub const fn missing_field(field: &'static str) -> Self {
        Self::Validation { field }
    }

    /// Classifies a `reqwest` failure for the given backend.
    ///
    /// Timeouts map to `Timeout`, body decode and status failures to
    /// `Protocol`, everything else to `Network`.
    #[must_use]
    pub fn from_reqwest(backend: Backend, timeout_secs: u64, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(backend, timeout_secs)
        } else if err.is_decode() || err.is_status() {
            Self::protocol(
                backend,
                err.status().map(|s| s.as_u16()),
                err.to_string(),
            )
        } else {
            Self::network(backend, err.to_string())
        }
    }

    /// Returns the failure class of this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Network { .. } => ErrorClass::Network,
            Self::Protocol { .. } | Self::Json(_) => ErrorClass::Protocol,
            Self::Timeout { .. } => ErrorClass::Timeout,
            Self::ModelParse(_) => ErrorClass::ModelParse,
            Self::Validation { .. } => ErrorClass::Validation,
            Self::ConfigParseError { .. }
            | Self::ConfigValidationError { .. }
            | Self::SourceNotFound { .. }
            | Self::SourceTooLarge { .. }
            | Self::SourceEncodingError { .. }
            | Self::CoordinatorClosed
            | Self::Io(_) => ErrorClass::Internal,
        }
    }

    /// Returns `true` if a response was received but its content was unusable.
    ///
    /// These are the failures that select the "keep exploring" feedback
    /// fallback rather than the no-response one.
    #[must_use]
    pub const fn is_malformed_output(&self) -> bool {
        matches!(self.class(), ErrorClass::ModelParse | ErrorClass::Validation)
    }

    /// Returns `true` if this error is transient and may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Protocol {
                status: Some(status),
                ..
            } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
