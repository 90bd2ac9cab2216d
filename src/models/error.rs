//! Error types for wikirag.
//!
//! Taxonomy:
//! - Setup failures: bad config, empty endpoint pool (fatal at startup)
//! - Caller failures: unsupported method, invalid parameters (fatal for the call)
//! - Remote failures: every endpoint exhausted, completion API errors

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for wikirag.
#[derive(Debug, Error)]
pub enum WikiragError {
    // ═══════════════════════════════════════════════════════════════════
    // SETUP — the run cannot start
    // ═══════════════════════════════════════════════════════════════════
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    // ═══════════════════════════════════════════════════════════════════
    // REMOTE — knowledge base or completion endpoint failed
    // ═══════════════════════════════════════════════════════════════════
    #[error("Lookup failed: {0}")]
    Query(#[from] QueryError),

    #[error("Completion failed: {0}")]
    Completion(#[from] CompletionError),

    // ═══════════════════════════════════════════════════════════════════
    // LOCAL — input files and the result log
    // ═══════════════════════════════════════════════════════════════════
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WikiragError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether re-running the whole record could plausibly succeed.
    ///
    /// Exhausted endpoint pools and transient completion failures are
    /// recoverable at the record level. Misconfiguration, caller errors and
    /// fatal completion errors are not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Query(e) => e.is_recoverable(),
            Self::Completion(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Whether the run must stop regardless of the per-record failure policy.
    ///
    /// A bad record or an unusable completion body is neither recoverable nor
    /// fatal: it can be skipped but never retried.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Config(_) | Self::Io { .. } | Self::Internal(_) => true,
            Self::Query(e) => !e.is_recoverable(),
            Self::Completion(e) => matches!(
                e,
                CompletionError::AuthenticationFailed | CompletionError::ModelNotFound(_)
            ),
            Self::InvalidInput(_) | Self::ParseError(_) => false,
        }
    }
}

/// Errors raised by the multi-endpoint query client.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{0}")]
    Configuration(#[from] super::ConfigError),

    #[error("Unsupported method: '{0}'")]
    UnsupportedMethod(String),

    #[error("Invalid parameters for '{method}': {reason}")]
    InvalidParameters { method: String, reason: String },

    #[error(
        "All {} endpoints failed: {}",
        .failures.len(),
        FailureList(.failures)
    )]
    AllEndpointsFailed { failures: Vec<EndpointFailure> },
}

impl QueryError {
    /// Only an exhausted pool is worth retrying; the rest are caller or setup bugs.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AllEndpointsFailed { .. })
    }

    /// Per-endpoint failures in pool order (empty for non-aggregate errors).
    pub fn failures(&self) -> &[EndpointFailure] {
        match self {
            Self::AllEndpointsFailed { failures } => failures,
            _ => &[],
        }
    }
}

struct FailureList<'a>(&'a [EndpointFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

/// Why one endpoint attempt did not produce a usable result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttemptFailure {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("entity not found")]
    NotFound,
}

/// An attempt failure tagged with the endpoint that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointFailure {
    pub endpoint: String,
    pub reason: AttemptFailure,
}

impl fmt::Display for EndpointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.endpoint, self.reason)
    }
}

/// Completion API errors.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl CompletionError {
    /// Transient failures (rate limits, timeouts, 5xx) versus fatal ones.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::Network(_)
            | Self::Timeout(_)
            | Self::MaxRetriesExceeded { .. } => true,
            Self::Api { status, .. } => *status >= 500 || *status == 408,
            Self::AuthenticationFailed | Self::ModelNotFound(_) | Self::InvalidResponse(_) => false,
        }
    }
}

/// Result type alias for wikirag.
pub type Result<T> = std::result::Result<T, WikiragError>;
