//! Unified application error types for Seatbroker.
//!
//! All crates map their internal errors into [`AppError`] for consistent
//! propagation through the ? operator. Outbound provider failures use the
//! narrower [`RemoteError`] until they cross the service boundary.
//!
//! Contention on a code or seat row is never reported through these types;
//! losing a compare-and-set is an ordinary business outcome.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Top-level error kind categorization used across the entire application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The requested resource was not found.
    NotFound,
    /// Input validation failed. Never retried.
    Validation,
    /// A conflict occurred (duplicate entry, concurrent modification, etc.).
    Conflict,
    /// A rate limit was exceeded.
    RateLimit,
    /// Not enough seats to honor a bulk request.
    CapacityExceeded,
    /// An outbound call to the team provider failed.
    Remote,
    /// An internal server error occurred.
    Internal,
    /// A database error occurred.
    Database,
    /// The shared coordination store (lock/limiter backend) failed.
    Coordination,
    /// A configuration error occurred.
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// The requested feature or operation is not implemented.
    NotImplemented,
    /// The service is temporarily unavailable.
    ServiceUnavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::Conflict => write!(f, "CONFLICT"),
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::CapacityExceeded => write!(f, "CAPACITY_EXCEEDED"),
            Self::Remote => write!(f, "REMOTE"),
            Self::Internal => write!(f, "INTERNAL"),
            Self::Database => write!(f, "DATABASE"),
            Self::Coordination => write!(f, "COORDINATION"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::NotImplemented => write!(f, "NOT_IMPLEMENTED"),
            Self::ServiceUnavailable => write!(f, "SERVICE_UNAVAILABLE"),
        }
    }
}

/// Structured details attached to specific error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorContext {
    /// Capacity check failed; `available` slots remained for `required`.
    Capacity {
        /// Slots available at check time.
        available: u64,
        /// Slots the caller asked for.
        required: u64,
    },
    /// The caller may retry after this many seconds.
    RetryAfter {
        /// Seconds to wait.
        seconds: u64,
    },
    /// HTTP-like status returned by the remote provider.
    RemoteStatus {
        /// Status code.
        status: u16,
    },
}

/// The unified application error used throughout Seatbroker.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Structured details for kinds that carry them.
    pub context: Option<ErrorContext>,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
            source: Some(Box::new(source)),
        }
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Create a rate-limit error telling the caller when to come back.
    pub fn rate_limited(message: impl Into<String>, retry_after: Duration) -> Self {
        let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        Self {
            kind: ErrorKind::RateLimit,
            message: message.into(),
            context: Some(ErrorContext::RetryAfter { seconds }),
            source: None,
        }
    }

    /// Create a capacity-exceeded error.
    pub fn capacity_exceeded(available: u64, required: u64) -> Self {
        Self {
            kind: ErrorKind::CapacityExceeded,
            message: format!("Insufficient capacity: {required} requested, {available} available"),
            context: Some(ErrorContext::Capacity {
                available,
                required,
            }),
            source: None,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    /// Create a coordination store error.
    pub fn coordination(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Coordination, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a not-implemented error.
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplemented, message)
    }

    /// Create a service-unavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    /// Slots that were available when a capacity check failed.
    pub fn available_slots(&self) -> Option<u64> {
        match self.context {
            Some(ErrorContext::Capacity { available, .. }) => Some(available),
            _ => None,
        }
    }

    /// Provider status code of a remote failure, if it answered.
    pub fn remote_status(&self) -> Option<u16> {
        match self.context {
            Some(ErrorContext::RemoteStatus { status }) => Some(status),
            _ => None,
        }
    }

    /// Seconds the caller should wait before retrying, if known.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self.context {
            Some(ErrorContext::RetryAfter { seconds }) => Some(seconds),
            _ => None,
        }
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            context: self.context,
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}

/// Failure of an outbound team-provider call.
///
/// `status` mirrors the HTTP status when the provider answered at all;
/// transport failures and an open circuit have no status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("remote {code} (status {status:?}): {message}")]
pub struct RemoteError {
    /// HTTP-like status code, if the provider responded.
    pub status: Option<u16>,
    /// Short machine-readable code (`"http"`, `"transport"`, `"circuit_open"`, ...).
    pub code: String,
    /// Human-readable detail.
    pub message: String,
}

impl RemoteError {
    /// Build an error from a provider status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code: "http".to_string(),
            message: message.into(),
        }
    }

    /// A transport-level failure (connect, timeout, decode).
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: "transport".to_string(),
            message: message.into(),
        }
    }

    /// The circuit for this endpoint/account pair is open.
    pub fn circuit_open(endpoint: &str) -> Self {
        Self {
            status: None,
            code: "circuit_open".to_string(),
            message: format!("circuit open for '{endpoint}'"),
        }
    }

    /// The provider does not implement an optional primitive.
    pub fn unsupported(operation: &str) -> Self {
        Self {
            status: None,
            code: "unsupported".to_string(),
            message: format!("provider does not support '{operation}'"),
        }
    }

    /// 401/403: the owning mother account is no longer valid.
    pub fn is_account_invalid(&self) -> bool {
        matches!(self.status, Some(401) | Some(403))
    }

    /// 429, 5xx, or a transport failure.
    pub fn is_retryable(&self) -> bool {
        match self.status {
            Some(429) => true,
            Some(s) => (500..600).contains(&s),
            None => self.code == "transport",
        }
    }

    /// Whether the call was short-circuited without reaching the provider.
    pub fn is_circuit_open(&self) -> bool {
        self.code == "circuit_open"
    }

    /// Whether the provider lacks the primitive altogether.
    pub fn is_unsupported(&self) -> bool {
        self.code == "unsupported"
    }
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        let context = err.status.map(|status| ErrorContext::RemoteStatus { status });
        Self {
            kind: ErrorKind::Remote,
            message: err.to_string(),
            context,
            source: Some(Box::new(err)),
        }
    }
}
