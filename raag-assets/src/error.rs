//! Error types for raag-assets
//!
//! Per-asset failures are values, not run-aborting errors: the orchestrator
//! turns every `AcquireError` into an outcome for that one asset and moves on.

use std::path::PathBuf;
use thiserror::Error;

/// Maximum length of a failure reason in log lines and reports
pub const REASON_MAX_CHARS: usize = 200;

/// Failure of a single acquisition step for one asset
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AcquireError {
    /// Resource definitively absent (HTTP 404/410, no search result)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Timeout, connection failure, 5xx or other retriable condition
    #[error("Transient error: {0}")]
    Transient(String),

    /// Third-party quota or rate limit exhausted (retriable, but may never succeed today)
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Bytes were received but are not a valid image/audio file
    #[error("Invalid content: {0}")]
    InvalidContent(String),

    /// Local write, rename or remove failed
    #[error("Filesystem error at {path}: {message}")]
    Filesystem { path: PathBuf, message: String },

    /// The run was interrupted while this step was in flight
    #[error("Cancelled")]
    Cancelled,
}

impl AcquireError {
    /// Build a filesystem error from an io::Error and the path involved
    pub fn filesystem(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        AcquireError::Filesystem {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Whether another attempt may change the result
    pub fn is_retriable(&self) -> bool {
        matches!(self, AcquireError::Transient(_) | AcquireError::QuotaExceeded(_))
    }

    /// Short label used in structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            AcquireError::NotFound(_) => "not_found",
            AcquireError::Transient(_) => "transient",
            AcquireError::QuotaExceeded(_) => "quota_exceeded",
            AcquireError::InvalidContent(_) => "invalid_content",
            AcquireError::Filesystem { .. } => "filesystem",
            AcquireError::Cancelled => "cancelled",
        }
    }

    /// Human-readable reason truncated to [`REASON_MAX_CHARS`]
    pub fn truncated_reason(&self) -> String {
        truncate_reason(&self.to_string())
    }
}

/// Truncate a reason string on a char boundary
pub fn truncate_reason(reason: &str) -> String {
    if reason.chars().count() <= REASON_MAX_CHARS {
        return reason.to_string();
    }
    let mut truncated: String = reason.chars().take(REASON_MAX_CHARS).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(AcquireError::Transient("timeout".into()).is_retriable());
        assert!(AcquireError::QuotaExceeded("daily limit".into()).is_retriable());
        assert!(!AcquireError::NotFound("404".into()).is_retriable());
        assert!(!AcquireError::InvalidContent("html".into()).is_retriable());
        assert!(!AcquireError::Cancelled.is_retriable());
        assert!(!AcquireError::filesystem(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied")
        )
        .is_retriable());
    }

    #[test]
    fn test_truncate_reason() {
        let short = "connection reset";
        assert_eq!(truncate_reason(short), short);

        let long = "x".repeat(500);
        let truncated = truncate_reason(&long);
        assert_eq!(truncated.chars().count(), REASON_MAX_CHARS + 1);
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn test_truncate_multibyte_safe() {
        let long = "राग".repeat(200);
        let truncated = truncate_reason(&long);
        assert_eq!(truncated.chars().count(), REASON_MAX_CHARS + 1);
    }
}
