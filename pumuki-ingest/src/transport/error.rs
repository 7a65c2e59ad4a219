//! Transport failure classification.
//!
//! Failures are values carried by [`TransportResult`](super::TransportResult),
//! not Rust errors: the caller always gets the attempt count and code back.

use pumuki_common::auth::AuthPolicyViolation;
use pumuki_common::errors::ErrorCode;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transport::retry::RetryableError;
use crate::transport::TransportFailure;

/// HTTP statuses that are retried.
pub const RETRYABLE_HTTP_STATUSES: [u16; 7] = [408, 425, 429, 500, 502, 503, 504];

/// Whether a non-success status should be retried.
#[must_use]
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_HTTP_STATUSES.contains(&status)
}

/// Why a delivery failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportErrorCode {
    /// Credential policy rejected the submission. Never sent.
    AuthPolicyViolation,
    /// Header overrides disagree with the payload scope. Never sent.
    IsolationViolation,
    /// An attempt exceeded its own timeout.
    Timeout,
    /// The caller cancelled the delivery.
    Aborted,
    /// The request did not complete.
    Network,
    /// The endpoint answered with a non-2xx status.
    HttpStatus,
}

impl TransportErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthPolicyViolation => "AUTH_POLICY_VIOLATION",
            Self::IsolationViolation => "ISOLATION_VIOLATION",
            Self::Timeout => "TIMEOUT",
            Self::Aborted => "ABORTED",
            Self::Network => "NETWORK",
            Self::HttpStatus => "HTTP_STATUS",
        }
    }

    /// Class-level catalog entry. Auth failures resolve per violation through
    /// [`TransportFailure::catalog_code`].
    #[must_use]
    pub const fn catalog_code(self) -> ErrorCode {
        match self {
            Self::AuthPolicyViolation => ErrorCode::AuthMissing,
            Self::IsolationViolation => ErrorCode::TransportIsolationViolation,
            Self::Timeout => ErrorCode::TransportTimeout,
            Self::Aborted => ErrorCode::TransportAborted,
            Self::Network => ErrorCode::TransportNetwork,
            Self::HttpStatus => ErrorCode::TransportHttpStatus,
        }
    }
}

impl fmt::Display for TransportErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TransportFailure {
    /// Catalog entry for this failure. Auth rejections carry the violation
    /// code as their message and map to that violation's own entry.
    #[must_use]
    pub fn catalog_code(&self) -> ErrorCode {
        match self.code {
            TransportErrorCode::AuthPolicyViolation => {
                AuthPolicyViolation::catalog_code_for(&self.message)
                    .unwrap_or_else(|| self.code.catalog_code())
            }
            code => code.catalog_code(),
        }
    }
}

impl RetryableError for TransportFailure {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        for status in [408, 425, 429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status), "{status} should retry");
        }
        for status in [400, 401, 403, 404, 409, 422, 501] {
            assert!(!is_retryable_status(status), "{status} should not retry");
        }
    }

    #[test]
    fn test_code_serialization_matches_as_str() {
        for code in [
            TransportErrorCode::AuthPolicyViolation,
            TransportErrorCode::IsolationViolation,
            TransportErrorCode::Timeout,
            TransportErrorCode::Aborted,
            TransportErrorCode::Network,
            TransportErrorCode::HttpStatus,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn test_catalog_mapping() {
        assert_eq!(
            TransportErrorCode::Timeout.catalog_code().code_string(),
            "PMK-E301"
        );
        assert_eq!(
            TransportErrorCode::HttpStatus.catalog_code().code_string(),
            "PMK-E303"
        );
    }

    fn auth_failure(message: &str) -> TransportFailure {
        TransportFailure {
            code: TransportErrorCode::AuthPolicyViolation,
            attempts: 0,
            duration_ms: 0,
            idempotency_key: None,
            message: message.to_string(),
            retryable: false,
            status: None,
            response_body: None,
        }
    }

    #[test]
    fn test_auth_failure_maps_to_violation_entry() {
        assert_eq!(
            auth_failure("auth_scheme_mismatch").catalog_code(),
            ErrorCode::AuthSchemeMismatch
        );
        assert_eq!(auth_failure("token_expired").catalog_code(), ErrorCode::AuthTokenExpired);
        assert_eq!(
            auth_failure("scope_repository_mismatch").catalog_code(),
            ErrorCode::AuthScopeRepositoryMismatch
        );
        assert_eq!(auth_failure("auth_missing").catalog_code(), ErrorCode::AuthMissing);
    }

    #[test]
    fn test_non_auth_failure_uses_class_entry() {
        let failure = TransportFailure {
            code: TransportErrorCode::Timeout,
            message: "attempt_timeout".to_string(),
            ..auth_failure("")
        };
        assert_eq!(failure.catalog_code(), ErrorCode::TransportTimeout);
    }
}
