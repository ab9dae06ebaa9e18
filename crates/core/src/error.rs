//! Unified error types for the ingestion gateway.
//!
//! Every variant maps onto one of five client-facing kinds:
//! - `validation`: malformed or incomplete events (VALID_001)
//! - `auth`: missing, malformed, or mismatched API keys (AUTH_001-003)
//! - `quota`: the application has no credits left (QUOTA_001)
//! - `unavailable`: a dependency failed or timed out; safe to retry
//! - `internal`: everything else

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Client-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Auth,
    Quota,
    Unavailable,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Auth => "auth",
            Self::Quota => "quota",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }
}

/// Authentication error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
    /// AUTH_001: API key is required
    MissingKey,
    /// AUTH_002: API key is not a well-formed key
    InvalidFormat,
    /// AUTH_003: API key is not bound to the claimed application
    ApplicationMismatch,
}

impl AuthErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingKey => "AUTH_001",
            Self::InvalidFormat => "AUTH_002",
            Self::ApplicationMismatch => "AUTH_003",
        }
    }
}

/// Classification of a persistence failure. Only transient failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFailure {
    /// Network errors, timeouts, overloaded server.
    Transient,
    /// Schema mismatch, rejected rows, bad credentials.
    Permanent,
}

impl StoreFailure {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transient => "STORE_001",
            Self::Permanent => "STORE_002",
        }
    }
}

/// External dependency an operation was waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    Transport,
    Store,
    Cache,
    Ledger,
    Identity,
}

impl Dependency {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Store => "store",
            Self::Cache => "cache",
            Self::Ledger => "ledger",
            Self::Identity => "identity",
        }
    }
}

/// Unified error type for the ingestion gateway.
#[derive(Debug, Error)]
pub enum Error {
    #[error("[VALID_001] {0}")]
    Validation(String),

    /// Authentication error with code.
    #[error("[{code}] {message}")]
    Auth { code: &'static str, message: String },

    #[error("[QUOTA_001] application {app_id} has used {used} of {limit} credits")]
    QuotaExceeded { app_id: String, limit: i64, used: i64 },

    #[error("[TRANSPORT_001] {message}")]
    Transport { message: String, timed_out: bool },

    #[error("[{code}] {message}")]
    Store {
        code: &'static str,
        failure: StoreFailure,
        message: String,
        timed_out: bool,
    },

    #[error("[CACHE_001] {message}")]
    Cache { message: String, timed_out: bool },

    #[error("[LEDGER_001] {message}")]
    Ledger { message: String, timed_out: bool },

    #[error("[IDENTITY_001] {message}")]
    Identity { message: String, timed_out: bool },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an authentication error.
    pub fn auth(code: AuthErrorCode, msg: impl Into<String>) -> Self {
        Self::Auth {
            code: code.code(),
            message: msg.into(),
        }
    }

    pub fn quota_exceeded(app_id: impl ToString, limit: i64, used: i64) -> Self {
        Self::QuotaExceeded {
            app_id: app_id.to_string(),
            limit,
            used,
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            timed_out: false,
        }
    }

    pub fn store(failure: StoreFailure, msg: impl Into<String>) -> Self {
        Self::Store {
            code: failure.code(),
            failure,
            message: msg.into(),
            timed_out: false,
        }
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache {
            message: msg.into(),
            timed_out: false,
        }
    }

    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger {
            message: msg.into(),
            timed_out: false,
        }
    }

    pub fn identity(msg: impl Into<String>) -> Self {
        Self::Identity {
            message: msg.into(),
            timed_out: false,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create the error raised when `operation` on `dependency` exceeds its deadline.
    pub fn timeout(dependency: Dependency, operation: &str, deadline: Duration) -> Self {
        let message = format!(
            "{} {} timed out after {}ms",
            dependency.name(),
            operation,
            deadline.as_millis()
        );
        match dependency {
            Dependency::Transport => Self::Transport {
                message,
                timed_out: true,
            },
            Dependency::Store => Self::Store {
                code: StoreFailure::Transient.code(),
                failure: StoreFailure::Transient,
                message,
                timed_out: true,
            },
            Dependency::Cache => Self::Cache {
                message,
                timed_out: true,
            },
            Dependency::Ledger => Self::Ledger {
                message,
                timed_out: true,
            },
            Dependency::Identity => Self::Identity {
                message,
                timed_out: true,
            },
        }
    }

    /// Client-facing category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Serialization(_) => ErrorKind::Validation,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::QuotaExceeded { .. } => ErrorKind::Quota,
            Self::Transport { .. }
            | Self::Store { .. }
            | Self::Cache { .. }
            | Self::Ledger { .. }
            | Self::Identity { .. } => ErrorKind::Unavailable,
            Self::Config(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Auth => 401,
            ErrorKind::Quota => 429,
            ErrorKind::Unavailable => 503,
            ErrorKind::Internal => 500,
        }
    }

    /// Get the error code string.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::Serialization(_) => "VALID_001",
            Self::Auth { code, .. } => code,
            Self::QuotaExceeded { .. } => "QUOTA_001",
            Self::Transport { .. } => "TRANSPORT_001",
            Self::Store { code, .. } => code,
            Self::Cache { .. } => "CACHE_001",
            Self::Ledger { .. } => "LEDGER_001",
            Self::Identity { .. } => "IDENTITY_001",
            Self::Config(_) | Self::Internal(_) => "INTERNAL_001",
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }

    /// Whether a persistence attempt that produced this error may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store { failure, .. } => *failure == StoreFailure::Transient,
            Self::Transport { .. } => true,
            _ => false,
        }
    }

    /// Whether this error was produced by an expired deadline.
    pub fn timed_out(&self) -> bool {
        match self {
            Self::Transport { timed_out, .. }
            | Self::Store { timed_out, .. }
            | Self::Cache { timed_out, .. }
            | Self::Ledger { timed_out, .. }
            | Self::Identity { timed_out, .. } => *timed_out,
            _ => false,
        }
    }
}
