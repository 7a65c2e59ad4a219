//! Error Catalog for Pumuki hotspot ingestion
//!
//! Every user-facing failure of the ingestion pipeline maps to a stable code
//! with a message and remediation steps, so the CLI and the collection
//! backend can report the same thing the same way.
//!
//! # Error Code Ranges
//!
//! | Range      | Category    | Description                              |
//! |------------|-------------|------------------------------------------|
//! | E001-E099  | Config      | Configuration file and environment       |
//! | E100-E199  | Contract    | Payload build, parse and integrity       |
//! | E200-E299  | Auth        | Credential and scope policy              |
//! | E300-E399  | Transport   | Delivery to the ingestion endpoint       |
//! | E400-E499  | Governance  | Isolation, retention and privacy policy  |
//! | E500-E599  | Audit       | Audit trail and metrics artifacts        |
//! | E600-E699  | Internal    | Internal/unexpected errors               |
//!
//! # Example
//!
//! ```rust
//! use pumuki_common::errors::catalog::ErrorCode;
//!
//! let entry = ErrorCode::ContractIntegrityMismatch.entry();
//! println!("Error {}: {}", entry.code, entry.message);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code enumeration covering all ingestion failure scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // =========================================================================
    // Config Errors (E001-E099)
    // =========================================================================
    /// Configuration file not found
    ConfigNotFound,
    /// Configuration file could not be read
    ConfigReadError,
    /// Configuration file contains invalid TOML syntax
    ConfigParseError,
    /// Configuration contains invalid values
    ConfigValidationError,
    /// Environment variable has invalid value
    ConfigEnvError,
    /// No ingestion endpoint configured
    ConfigMissingEndpoint,

    // =========================================================================
    // Contract Errors (E100-E199)
    // =========================================================================
    /// Contract artifact does not exist
    ContractMissing,
    /// Contract artifact could not be read or is not JSON
    ContractUnreadable,
    /// Payload violates the contract schema
    ContractInvalidSchema,
    /// Recomputed payload hash disagrees with the declared one
    ContractIntegrityMismatch,
    /// Payload declares an unsupported contract version
    ContractUnsupportedVersion,
    /// Local hotspots report or compliance snapshot could not be loaded
    ContractReportUnreadable,

    // =========================================================================
    // Auth Errors (E200-E299)
    // =========================================================================
    /// No credential supplied while a policy is configured
    AuthMissing,
    /// Supplied credential kind not allowed by the policy scheme
    AuthSchemeMismatch,
    /// Rotation window is malformed or not yet valid
    AuthTokenRotationInvalid,
    /// Credential has expired
    AuthTokenExpired,
    /// Credential is scoped to a different tenant
    AuthScopeTenantMismatch,
    /// Credential is scoped to a different repository
    AuthScopeRepositoryMismatch,

    // =========================================================================
    // Transport Errors (E300-E399)
    // =========================================================================
    /// Header overrides disagree with the payload scope
    TransportIsolationViolation,
    /// Attempt exceeded the per-attempt timeout
    TransportTimeout,
    /// Network failure reaching the endpoint
    TransportNetwork,
    /// Endpoint answered with a non-success status
    TransportHttpStatus,
    /// Delivery cancelled by the caller
    TransportAborted,

    // =========================================================================
    // Governance Errors (E400-E499)
    // =========================================================================
    /// Policy tenant differs from the payload tenant
    GovernanceTenantMismatch,
    /// Policy repository differs from the payload repository
    GovernanceRepositoryMismatch,
    /// A retention TTL is not positive
    GovernanceRetentionInvalid,
    /// Privacy redaction flags are inconsistent
    GovernancePrivacyInvalid,
    /// Required isolation header missing from a request
    GovernanceIsolationHeaderMissing,
    /// Isolation header disagrees with the policy scope
    GovernanceIsolationHeaderMismatch,
    /// Governance policy file could not be loaded
    GovernancePolicyUnreadable,

    // =========================================================================
    // Audit Errors (E500-E599)
    // =========================================================================
    /// Audit event could not be appended
    AuditWriteFailed,
    /// Audit log could not be read
    AuditReadFailed,
    /// Metrics artifact could not be written
    AuditMetricsWriteFailed,

    // =========================================================================
    // Internal Errors (E600-E699)
    // =========================================================================
    /// Serialization/deserialization failed
    InternalSerdeError,
    /// Logging initialization failed
    InternalLoggingError,
    /// Async runtime or HTTP client setup failed
    InternalRuntimeError,
}

impl ErrorCode {
    /// Returns the numeric error code (without prefix).
    #[must_use]
    pub const fn code_number(&self) -> u16 {
        match self {
            // Config (001-099)
            Self::ConfigNotFound => 1,
            Self::ConfigReadError => 2,
            Self::ConfigParseError => 3,
            Self::ConfigValidationError => 4,
            Self::ConfigEnvError => 5,
            Self::ConfigMissingEndpoint => 6,

            // Contract (100-199)
            Self::ContractMissing => 100,
            Self::ContractUnreadable => 101,
            Self::ContractInvalidSchema => 102,
            Self::ContractIntegrityMismatch => 103,
            Self::ContractUnsupportedVersion => 104,
            Self::ContractReportUnreadable => 105,

            // Auth (200-299)
            Self::AuthMissing => 200,
            Self::AuthSchemeMismatch => 201,
            Self::AuthTokenRotationInvalid => 202,
            Self::AuthTokenExpired => 203,
            Self::AuthScopeTenantMismatch => 204,
            Self::AuthScopeRepositoryMismatch => 205,

            // Transport (300-399)
            Self::TransportIsolationViolation => 300,
            Self::TransportTimeout => 301,
            Self::TransportNetwork => 302,
            Self::TransportHttpStatus => 303,
            Self::TransportAborted => 304,

            // Governance (400-499)
            Self::GovernanceTenantMismatch => 400,
            Self::GovernanceRepositoryMismatch => 401,
            Self::GovernanceRetentionInvalid => 402,
            Self::GovernancePrivacyInvalid => 403,
            Self::GovernanceIsolationHeaderMissing => 404,
            Self::GovernanceIsolationHeaderMismatch => 405,
            Self::GovernancePolicyUnreadable => 406,

            // Audit (500-599)
            Self::AuditWriteFailed => 500,
            Self::AuditReadFailed => 501,
            Self::AuditMetricsWriteFailed => 502,

            // Internal (600-699)
            Self::InternalSerdeError => 600,
            Self::InternalLoggingError => 601,
            Self::InternalRuntimeError => 602,
        }
    }

    /// Returns the formatted error code string (e.g., "PMK-E103").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("PMK-E{:03}", self.code_number())
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self.code_number() {
            1..=99 => ErrorCategory::Config,
            100..=199 => ErrorCategory::Contract,
            200..=299 => ErrorCategory::Auth,
            300..=399 => ErrorCategory::Transport,
            400..=499 => ErrorCategory::Governance,
            500..=599 => ErrorCategory::Audit,
            _ => ErrorCategory::Internal,
        }
    }

    /// Returns the full error entry with all metadata.
    #[must_use]
    pub fn entry(&self) -> ErrorEntry {
        ErrorEntry {
            code: self.code_string(),
            category: self.category(),
            message: self.message().to_string(),
            remediation: self
                .remediation()
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    /// Returns the error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::ConfigNotFound => "Configuration file not found",
            Self::ConfigReadError => "Failed to read configuration file",
            Self::ConfigParseError => "Configuration file contains invalid TOML syntax",
            Self::ConfigValidationError => "Configuration contains invalid values",
            Self::ConfigEnvError => "Environment variable has an invalid value",
            Self::ConfigMissingEndpoint => "No ingestion endpoint configured",

            Self::ContractMissing => "Ingestion contract artifact not found",
            Self::ContractUnreadable => "Ingestion contract artifact could not be read",
            Self::ContractInvalidSchema => "Ingestion payload violates the contract schema",
            Self::ContractIntegrityMismatch => {
                "Ingestion payload hash does not match its contents"
            }
            Self::ContractUnsupportedVersion => "Ingestion payload version is not supported",
            Self::ContractReportUnreadable => "Local hotspots report could not be loaded",

            Self::AuthMissing => "No ingestion credential supplied",
            Self::AuthSchemeMismatch => "Credential kind is not allowed by the auth policy",
            Self::AuthTokenRotationInvalid => "Credential rotation window is invalid",
            Self::AuthTokenExpired => "Ingestion credential has expired",
            Self::AuthScopeTenantMismatch => "Credential is scoped to a different tenant",
            Self::AuthScopeRepositoryMismatch => "Credential is scoped to a different repository",

            Self::TransportIsolationViolation => "Request headers disagree with the payload scope",
            Self::TransportTimeout => "Ingestion request timed out",
            Self::TransportNetwork => "Ingestion endpoint unreachable",
            Self::TransportHttpStatus => "Ingestion endpoint rejected the payload",
            Self::TransportAborted => "Ingestion request was cancelled",

            Self::GovernanceTenantMismatch => "Governance policy tenant differs from payload",
            Self::GovernanceRepositoryMismatch => {
                "Governance policy repository differs from payload"
            }
            Self::GovernanceRetentionInvalid => "Governance retention TTLs must be positive",
            Self::GovernancePrivacyInvalid => "Governance privacy flags are inconsistent",
            Self::GovernanceIsolationHeaderMissing => "Required isolation header is missing",
            Self::GovernanceIsolationHeaderMismatch => {
                "Isolation header disagrees with the governance scope"
            }
            Self::GovernancePolicyUnreadable => "Governance policy could not be loaded",

            Self::AuditWriteFailed => "Failed to append to the audit log",
            Self::AuditReadFailed => "Failed to read the audit log",
            Self::AuditMetricsWriteFailed => "Failed to write the metrics artifact",

            Self::InternalSerdeError => "Serialization error",
            Self::InternalLoggingError => "Failed to initialize logging",
            Self::InternalRuntimeError => "Failed to start the async runtime or HTTP client",
        }
    }

    /// Returns remediation steps for the error.
    #[must_use]
    pub const fn remediation(&self) -> &'static [&'static str] {
        match self {
            Self::ConfigNotFound => &[
                "Create .pumuki/ingestion.toml in the repository root",
                "Or point PUMUKI_CONFIG_FILE at an existing file",
            ],
            Self::ConfigReadError => &[
                "Check the configuration file permissions",
                "Verify the path is a regular file",
            ],
            Self::ConfigParseError => &[
                "Validate the TOML syntax of the configuration file",
                "Check section names: [transport], [auth], [paths]",
            ],
            Self::ConfigValidationError => &[
                "Review the reported field and its allowed range",
                "Remove the field to fall back to its default",
            ],
            Self::ConfigEnvError => &[
                "Check the PUMUKI_* environment variable named in the error",
                "Unset it to fall back to the configured or default value",
            ],
            Self::ConfigMissingEndpoint => &[
                "Set PUMUKI_SAAS_INGESTION_ENDPOINT",
                "Or set transport.endpoint in .pumuki/ingestion.toml",
            ],

            Self::ContractMissing => &["Run `pumuki-ingest build` to generate the contract"],
            Self::ContractUnreadable => &[
                "Check the artifact path and permissions",
                "Rebuild the contract with `pumuki-ingest build`",
            ],
            Self::ContractInvalidSchema => &[
                "Rebuild the contract with `pumuki-ingest build`",
                "Inspect the schema with `pumuki-ingest schema`",
            ],
            Self::ContractIntegrityMismatch => &[
                "Do not edit the contract artifact by hand",
                "Rebuild the contract with `pumuki-ingest build`",
            ],
            Self::ContractUnsupportedVersion => &[
                "Upgrade the producer to emit contract version \"1\"",
                "Rebuild the contract with `pumuki-ingest build`",
            ],
            Self::ContractReportUnreadable => &[
                "Regenerate the local hotspots report",
                "Check the --report path",
            ],

            Self::AuthMissing => &[
                "Set PUMUKI_SAAS_INGESTION_TOKEN or PUMUKI_SAAS_INGESTION_API_KEY",
            ],
            Self::AuthSchemeMismatch => &[
                "Check auth.scheme in the configuration",
                "Supply the credential kind the scheme allows",
            ],
            Self::AuthTokenRotationInvalid => &[
                "Check auth.rotated_at and auth.expires_at are RFC 3339 timestamps",
                "rotated_at must be in the past and before expires_at",
            ],
            Self::AuthTokenExpired => &["Rotate the ingestion credential", "Update auth.expires_at"],
            Self::AuthScopeTenantMismatch => &[
                "Use a credential issued for the payload tenant",
                "Check auth.scope_tenant_id",
            ],
            Self::AuthScopeRepositoryMismatch => &[
                "Use a credential issued for the payload repository",
                "Check auth.scope_repository_id",
            ],

            Self::TransportIsolationViolation => &[
                "Remove x-tenant-id / x-repository-id header overrides",
                "Or make them match the payload scope",
            ],
            Self::TransportTimeout => &[
                "Increase PUMUKI_SAAS_INGESTION_TIMEOUT_MS",
                "Check endpoint latency",
            ],
            Self::TransportNetwork => &[
                "Check network connectivity to the ingestion endpoint",
                "Verify the endpoint URL",
            ],
            Self::TransportHttpStatus => &[
                "Inspect the response body in the publish result",
                "Retryable statuses are retried automatically; others need a fix",
            ],
            Self::TransportAborted => &["Re-run `pumuki-ingest publish`"],

            Self::GovernanceTenantMismatch | Self::GovernanceRepositoryMismatch => &[
                "Issue a governance policy for this tenant/repository pair",
                "Check the governance_policy path in the configuration",
            ],
            Self::GovernanceRetentionInvalid => &["Set every retention TTL to a positive number of days"],
            Self::GovernancePrivacyInvalid => &[
                "Enable redact_repository_id whenever redact_tenant_id is enabled",
            ],
            Self::GovernanceIsolationHeaderMissing => &[
                "Send X-Tenant-Id and X-Repository-Id with every ingestion request",
            ],
            Self::GovernanceIsolationHeaderMismatch => &[
                "Send isolation headers matching the governance policy scope",
            ],
            Self::GovernancePolicyUnreadable => &[
                "Check the governance policy path and JSON syntax",
            ],

            Self::AuditWriteFailed => &[
                "Check the audit log directory is writable",
                "Only one process should write the audit log",
            ],
            Self::AuditReadFailed => &["Check the audit log path and permissions"],
            Self::AuditMetricsWriteFailed => &["Check the metrics artifact directory is writable"],

            Self::InternalSerdeError => &["This is likely a bug; please report it"],
            Self::InternalLoggingError => &[
                "Check PUMUKI_LOG_LEVEL and PUMUKI_LOG_FILE",
                "Verify the log file directory is writable",
            ],
            Self::InternalRuntimeError => &["This is likely a bug; please report it"],
        }
    }

    /// Returns all error codes.
    #[must_use]
    pub const fn all() -> &'static [ErrorCode] {
        &[
            Self::ConfigNotFound,
            Self::ConfigReadError,
            Self::ConfigParseError,
            Self::ConfigValidationError,
            Self::ConfigEnvError,
            Self::ConfigMissingEndpoint,
            Self::ContractMissing,
            Self::ContractUnreadable,
            Self::ContractInvalidSchema,
            Self::ContractIntegrityMismatch,
            Self::ContractUnsupportedVersion,
            Self::ContractReportUnreadable,
            Self::AuthMissing,
            Self::AuthSchemeMismatch,
            Self::AuthTokenRotationInvalid,
            Self::AuthTokenExpired,
            Self::AuthScopeTenantMismatch,
            Self::AuthScopeRepositoryMismatch,
            Self::TransportIsolationViolation,
            Self::TransportTimeout,
            Self::TransportNetwork,
            Self::TransportHttpStatus,
            Self::TransportAborted,
            Self::GovernanceTenantMismatch,
            Self::GovernanceRepositoryMismatch,
            Self::GovernanceRetentionInvalid,
            Self::GovernancePrivacyInvalid,
            Self::GovernanceIsolationHeaderMissing,
            Self::GovernanceIsolationHeaderMismatch,
            Self::GovernancePolicyUnreadable,
            Self::AuditWriteFailed,
            Self::AuditReadFailed,
            Self::AuditMetricsWriteFailed,
            Self::InternalSerdeError,
            Self::InternalLoggingError,
            Self::InternalRuntimeError,
        ]
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code_string(), self.message())
    }
}

/// Error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Configuration file and environment errors (E001-E099)
    Config,
    /// Payload contract errors (E100-E199)
    Contract,
    /// Credential policy errors (E200-E299)
    Auth,
    /// Delivery errors (E300-E399)
    Transport,
    /// Governance policy errors (E400-E499)
    Governance,
    /// Audit trail and metrics errors (E500-E599)
    Audit,
    /// Internal/unexpected errors (E600-E699)
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable name for the category.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Config => "Configuration",
            Self::Contract => "Contract",
            Self::Auth => "Auth",
            Self::Transport => "Transport",
            Self::Governance => "Governance",
            Self::Audit => "Audit",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Complete error entry with all metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Error code string (e.g., "PMK-E103")
    pub code: String,
    /// Error category
    pub category: ErrorCategory,
    /// Human-readable error message
    pub message: String,
    /// Steps to remediate the error
    pub remediation: Vec<String>,
}

impl ErrorEntry {
    /// Formats the error for display with full remediation steps.
    #[must_use]
    pub fn format_full(&self) -> String {
        let mut output = format!("[{}] {}\n", self.code, self.message);

        if !self.remediation.is_empty() {
            output.push_str("\nRemediation steps:\n");
            for (i, step) in self.remediation.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, step));
            }
        }

        output
    }

    /// Formats the error as a single line.
    #[must_use]
    pub fn format_brief(&self) -> String {
        format!("[{}] {}", self.code, self.message)
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_brief())
    }
}
