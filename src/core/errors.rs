//! Error types for the clonetrace library.
//!
//! A single structured error enum covers the whole engine. Variants carry
//! enough context (revision id, record locator, offending field) that a
//! failure can be reported without re-deriving where it happened.

use std::io;

use thiserror::Error;

/// Main result type for clonetrace operations.
pub type Result<T> = std::result::Result<T, CloneTraceError>;

/// Comprehensive error type for all clonetrace operations.
#[derive(Error, Debug)]
pub enum CloneTraceError {
    /// Configuration rejected before any work starts
    #[error("Configuration error: {message}")]
    Config {
        /// Error description
        message: String,
        /// Configuration field that caused the error
        field: Option<String>,
    },

    /// A code block or clone pair record is structurally invalid, or a
    /// token sequence cannot be parsed. Fatal for the revision pair.
    #[error("Input format error in revision '{revision_id}' at {locator}: {reason}")]
    InputFormat {
        /// Revision in which the record was loaded
        revision_id: String,
        /// Record locator (block id, pair index, ...)
        locator: String,
        /// What is wrong with the record
        reason: String,
    },

    /// A malformed token sequence, before revision context is attached
    #[error("Malformed token sequence: {reason}")]
    TokenSequence {
        /// What is wrong with the sequence text
        reason: String,
    },

    /// A referenced block_id is absent from its revision's code-block set
    #[error("Missing data in revision '{revision_id}': block '{block_id}' not found")]
    MissingData {
        /// Revision being processed
        revision_id: String,
        /// The dangling block reference
        block_id: String,
    },

    /// The revision source does not know the requested revision
    #[error("Revision not found: '{revision_id}'")]
    RevisionNotFound {
        /// The unknown revision id
        revision_id: String,
    },

    /// Transient failure inside the revision source; propagated, never retried
    #[error("Revision source error: {message}")]
    Source {
        /// Error description
        message: String,
        /// Underlying source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O failure while emitting traces or reading configuration
    #[error("I/O error: {message}")]
    Io {
        /// Error description
        message: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error description
        message: String,
        /// Underlying serialization error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invariant violations; aborts the whole run
    #[error("Internal error: {message}")]
    Internal {
        /// Error description
        message: String,
        /// Additional context
        context: Option<String>,
    },

    /// The run was cancelled via a [`CancelToken`](crate::CancelToken)
    #[error("Cancelled at {stage}")]
    Cancelled {
        /// Pipeline stage at which the cancellation was observed
        stage: String,
    },
}

impl CloneTraceError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new configuration error with field context
    pub fn config_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new input format error
    pub fn input_format(
        revision_id: impl Into<String>,
        locator: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InputFormat {
            revision_id: revision_id.into(),
            locator: locator.into(),
            reason: reason.into(),
        }
    }

    /// Create a new token sequence error
    pub fn token_sequence(reason: impl Into<String>) -> Self {
        Self::TokenSequence {
            reason: reason.into(),
        }
    }

    /// Create a new missing data error
    pub fn missing_data(revision_id: impl Into<String>, block_id: impl Into<String>) -> Self {
        Self::MissingData {
            revision_id: revision_id.into(),
            block_id: block_id.into(),
        }
    }

    /// Create a new revision-not-found error
    pub fn revision_not_found(revision_id: impl Into<String>) -> Self {
        Self::RevisionNotFound {
            revision_id: revision_id.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            context: None,
        }
    }

    /// Create a new internal error with context
    pub fn internal_with(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a new cancellation error
    pub fn cancelled(stage: impl Into<String>) -> Self {
        Self::Cancelled {
            stage: stage.into(),
        }
    }

    /// Attach revision context to a bare token sequence error, turning it
    /// into an input format error. Other variants pass through unchanged.
    pub fn in_revision(self, revision_id: impl Into<String>, locator: impl Into<String>) -> Self {
        match self {
            Self::TokenSequence { reason } => Self::InputFormat {
                revision_id: revision_id.into(),
                locator: locator.into(),
                reason,
            },
            other => other,
        }
    }
}

impl From<io::Error> for CloneTraceError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            message: "I/O operation failed".to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for CloneTraceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: format!("JSON serialization failed: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_yaml::Error> for CloneTraceError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: format!("YAML serialization failed: {err}"),
            source: Some(Box::new(err)),
        }
    }
}
