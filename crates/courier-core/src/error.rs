// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier messaging engine.

use std::fmt;

use thiserror::Error;

/// The primary error type used across all Courier adapter traits and engine components.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Messaging provider errors. `retryable` distinguishes throttling and
    /// server faults from requests the provider will never accept.
    #[error("provider error: {message}")]
    Provider {
        message: String,
        retryable: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Webhook HMAC signature did not verify.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// Webhook timestamp is outside the freshness window.
    #[error("stale webhook payload: timestamp skew {skew_secs}s exceeds {window_secs}s")]
    StalePayload { skew_secs: i64, window_secs: u64 },

    /// Webhook or feed payload could not be parsed.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A campaign state transition that the state machine does not allow.
    #[error("invalid transition for campaign {campaign_id}: {from} -> {to}")]
    InvalidTransition {
        campaign_id: String,
        from: String,
        to: String,
    },

    /// A request or command argument that can never be accepted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A recoverable failure that should be retried later.
    #[error("transient failure: {0}")]
    Transient(String),

    /// A per-item failure that will never succeed on retry.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// A pipeline-level failure (health check timeout, reconciliation page failure).
    #[error("pipeline failure in {component}: {message}")]
    Pipeline {
        component: &'static str,
        message: String,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure taxonomy used to decide between rejecting, retrying, failing an
/// item, or alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Rejected immediately, never retried.
    Validation,
    /// Retried through the error recovery queue with backoff.
    Transient,
    /// Marked failed on the owning entity, not retried.
    Permanent,
    /// Surfaced as an alert; does not block unrelated components.
    Pipeline,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Pipeline => "pipeline",
        };
        f.write_str(s)
    }
}

impl CourierError {
    /// Classify this error into the failure taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Config(_)
            | Self::InvalidSignature
            | Self::StalePayload { .. }
            | Self::MalformedPayload(_)
            | Self::InvalidTransition { .. }
            | Self::InvalidInput(_)
            | Self::NotFound { .. } => ErrorClass::Validation,
            Self::Storage { .. } | Self::Transient(_) | Self::Timeout { .. } => {
                ErrorClass::Transient
            }
            Self::Provider { retryable, .. } => {
                if *retryable {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Permanent
                }
            }
            Self::Permanent(_) => ErrorClass::Permanent,
            Self::Pipeline { .. } => ErrorClass::Pipeline,
            Self::Internal(_) => ErrorClass::Transient,
        }
    }

    /// Shorthand for `class() == ErrorClass::Transient`.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Build a storage error from any error source.
    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Storage {
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_classify_by_retryable_flag() {
        let throttled = CourierError::Provider {
            message: "429".into(),
            retryable: true,
            source: None,
        };
        let rejected = CourierError::Provider {
            message: "invalid destination".into(),
            retryable: false,
            source: None,
        };
        assert_eq!(throttled.class(), ErrorClass::Transient);
        assert_eq!(rejected.class(), ErrorClass::Permanent);
    }

    #[test]
    fn webhook_rejections_are_validation_errors() {
        assert_eq!(CourierError::InvalidSignature.class(), ErrorClass::Validation);
        let stale = CourierError::StalePayload {
            skew_secs: 900,
            window_secs: 300,
        };
        assert_eq!(stale.class(), ErrorClass::Validation);
        assert!(stale.to_string().contains("900"));
    }

    #[test]
    fn timeouts_and_storage_are_transient() {
        let timeout = CourierError::Timeout {
            duration: std::time::Duration::from_secs(10),
        };
        assert!(timeout.is_transient());
        assert!(CourierError::storage("database is locked").is_transient());
    }

    #[test]
    fn pipeline_errors_are_their_own_class() {
        let err = CourierError::Pipeline {
            component: "health",
            message: "no inbound webhook".into(),
        };
        assert_eq!(err.class(), ErrorClass::Pipeline);
        assert_eq!(err.class().to_string(), "pipeline");
    }
}
