//! Operation error classification.
//!
//! # Responsibilities
//! - Decide whether an error thrown by a wrapped backend call is worth retrying
//! - Provide `BackendError`, a ready-made classified error for callers that
//!   don't bring their own type
//!
//! # Design Decisions
//! - Known non-retryable codes (permission, conflict, not-found, validation)
//!   short-circuit; everything unrecognised defaults to retryable
//! - Classification is a trait so callers can plug their own error types in

use serde::Serialize;
use thiserror::Error;

/// Classification of an operation error for retry purposes.
pub trait Classify {
    /// Returns true if retrying the operation may succeed.
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Coarse category of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    PermissionDenied,
    Conflict,
    NotFound,
    Validation,
    Network,
    Timeout,
    RateLimited,
    Unavailable,
    Unknown,
}

impl ErrorCategory {
    /// Returns true for categories that a retry can fix.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            ErrorCategory::PermissionDenied
                | ErrorCategory::Conflict
                | ErrorCategory::NotFound
                | ErrorCategory::Validation
        )
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::PermissionDenied => "permission_denied",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Network => "network",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::Unavailable => "unavailable",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Error codes that never succeed on retry.
const NON_RETRYABLE_CODES: &[(&str, ErrorCategory)] = &[
    ("42501", ErrorCategory::PermissionDenied), // insufficient_privilege
    ("23505", ErrorCategory::Conflict),         // unique_violation
    ("23503", ErrorCategory::Conflict),         // foreign_key_violation
    ("23502", ErrorCategory::Validation),       // not_null_violation
    ("22P02", ErrorCategory::Validation),       // invalid_text_representation
    ("PGRST116", ErrorCategory::NotFound),      // no rows for single()
    ("PGRST301", ErrorCategory::PermissionDenied),
];

/// Categorize a failure from its code, HTTP-like status and message.
pub fn categorize(code: Option<&str>, status: Option<u16>, message: &str) -> ErrorCategory {
    if let Some(code) = code {
        if let Some((_, category)) = NON_RETRYABLE_CODES
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(code))
        {
            return *category;
        }
    }

    if let Some(status) = status {
        match status {
            401 | 403 => return ErrorCategory::PermissionDenied,
            404 => return ErrorCategory::NotFound,
            409 => return ErrorCategory::Conflict,
            400 | 422 => return ErrorCategory::Validation,
            408 | 504 => return ErrorCategory::Timeout,
            429 => return ErrorCategory::RateLimited,
            500..=599 => return ErrorCategory::Unavailable,
            _ => {}
        }
    }

    let message = message.to_ascii_lowercase();
    if message.contains("timeout") || message.contains("timed out") {
        ErrorCategory::Timeout
    } else if message.contains("rate limit") || message.contains("too many requests") {
        ErrorCategory::RateLimited
    } else if message.contains("network")
        || message.contains("connection")
        || message.contains("econnreset")
        || message.contains("econnrefused")
        || message.contains("fetch failed")
    {
        ErrorCategory::Network
    } else if message.contains("permission denied") {
        ErrorCategory::PermissionDenied
    } else {
        ErrorCategory::Unknown
    }
}

/// An error returned by a backend call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    /// Backend-specific error code (e.g. SQLSTATE).
    pub code: Option<String>,
    /// HTTP-like status, if the backend reported one.
    pub status: Option<u16>,
    /// Human readable message.
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            status: None,
            message: message.into(),
        }
    }

    /// Attach a backend error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach an HTTP-like status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(format!("network error: {}", message.into()))
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(format!("request timed out: {}", message.into())).with_status(408)
    }

    pub fn rate_limited() -> Self {
        Self::new("rate limit exceeded").with_status(429)
    }

    /// Category derived from code, status and message.
    pub fn category(&self) -> ErrorCategory {
        categorize(self.code.as_deref(), self.status, &self.message)
    }
}

impl Classify for BackendError {
    fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl Classify for std::io::Error {
    fn is_retryable(&self) -> bool {
        use std::io::ErrorKind;
        !matches!(
            self.kind(),
            ErrorKind::PermissionDenied
                | ErrorKind::NotFound
                | ErrorKind::AlreadyExists
                | ErrorKind::InvalidInput
                | ErrorKind::InvalidData
                | ErrorKind::Unsupported
        )
    }
}
