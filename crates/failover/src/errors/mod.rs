//! Error types for the failover layer.
//!
//! This module provides:
//! - [`FetchError`]: what a single fetch capability reports back
//! - [`ErrorKind`]: the classification recorded in results and reports
//! - [`ConfigurationError`]: startup problems that disable a source
//! - [`ExhaustionError`]: every source of a domain unavailable or failed
//! - [`FailoverError`]: the umbrella error returned by the public surface

mod exhaustion;

pub use exhaustion::{ExhaustionError, SourceDiagnostic};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed attempt or a missing domain.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The source did not answer within its configured timeout.
    Timeout,
    /// Network or upstream failure reported by the adapter.
    Transport,
    /// The source answered with an empty or malformed payload.
    InvalidPayload,
    /// No source of the domain could serve the request.
    Exhausted,
    /// The aggregate deadline passed before the domain finished.
    DeadlineExceeded,
    /// The domain task ended without producing an outcome.
    Aborted,
}

impl ErrorKind {
    /// Transient kinds are local to one source and recovered by failover.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::InvalidPayload => "invalid_payload",
            Self::Exhausted => "exhausted",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by a fetch capability, or synthesized by the dispatcher.
///
/// Every variant counts toward the source's failure streak; none of them
/// is ever turned into a success.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The attempt exceeded the source's timeout.
    #[error("Timed out after {after:?}")]
    Timeout {
        /// The timeout that was enforced
        after: Duration,
    },

    /// Network, HTTP or upstream failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response was structurally empty or could not be used.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl FetchError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload(reason.into())
    }

    /// Returns the classification recorded for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Transport(_) => ErrorKind::Transport,
            Self::InvalidPayload(_) => ErrorKind::InvalidPayload,
        }
    }
}

/// Problems discovered while wiring sources at startup.
///
/// `MissingCredential` and `MissingAdapter` disable the affected source;
/// the other variants reject the configuration as a whole.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Missing credential for source '{source_name}': ${variable} is not set")]
    MissingCredential {
        source_name: String,
        variable: String,
    },

    #[error("No fetch adapter registered for source '{source_name}'")]
    MissingAdapter { source_name: String },

    #[error("Duplicate source name: {0}")]
    DuplicateSource(String),

    #[error("Duplicate domain name: {0}")]
    DuplicateDomain(String),

    #[error("Invalid setting for '{name}': {message}")]
    InvalidSetting { name: String, message: String },

    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl ConfigurationError {
    /// Whether the error disables a single source instead of the whole setup.
    pub fn disables_source(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential { .. } | Self::MissingAdapter { .. }
        )
    }
}

/// Errors surfaced to callers of the failover layer.
#[derive(Error, Debug)]
pub enum FailoverError {
    #[error(transparent)]
    Exhausted(#[from] ExhaustionError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),
}

pub type Result<T> = std::result::Result<T, FailoverError>;
