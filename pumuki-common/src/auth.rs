//! Credential and scope policy checked before any network call.
//!
//! The policy is opt-in: without one every submission passes. With one, the
//! first violated rule is reported, in this order:
//! `auth_missing`, `auth_scheme_mismatch`, `token_rotation_invalid`,
//! `token_expired`, `scope_tenant_mismatch`, `scope_repository_mismatch`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::contract::IngestionPayload;
use crate::errors::ErrorCode;

/// Credentials supplied for one submission. Blank values count as absent.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    bearer_token: Option<String>,
    api_key: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Credentials {
    pub fn new(bearer_token: Option<String>, api_key: Option<String>) -> Self {
        Self {
            bearer_token: non_blank(bearer_token),
            api_key: non_blank(api_key),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::new(Some(token.into()), None)
    }

    pub fn api_key(key: impl Into<String>) -> Self {
        Self::new(None, Some(key.into()))
    }

    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    #[must_use]
    pub fn api_key_value(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bearer_token.is_none() && self.api_key.is_none()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("Credentials")
            .field("bearer_token", &mask(&self.bearer_token))
            .field("api_key", &mask(&self.api_key))
            .finish()
    }
}

/// Which credential kinds a policy accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    Bearer,
    ApiKey,
    #[default]
    Either,
}

impl AuthScheme {
    fn accepts(self, credentials: &Credentials) -> bool {
        match self {
            Self::Bearer => credentials.bearer_token.is_some(),
            Self::ApiKey => credentials.api_key.is_some(),
            Self::Either => !credentials.is_empty(),
        }
    }
}

/// Tenant/repository-bound credential policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthPolicy {
    pub scheme: AuthScheme,
    /// RFC 3339; must not be in the future.
    pub rotated_at: Option<String>,
    /// RFC 3339; the credential is rejected from this instant on.
    pub expires_at: Option<String>,
    pub scope_tenant_id: Option<String>,
    pub scope_repository_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthPolicyViolation {
    #[error("auth_missing: no credential supplied")]
    Missing,

    #[error("auth_scheme_mismatch: policy requires {expected:?} credentials")]
    SchemeMismatch { expected: AuthScheme },

    #[error("token_rotation_invalid: {reason}")]
    RotationInvalid { reason: String },

    #[error("token_expired: credential expired at {expires_at}")]
    Expired { expires_at: String },

    #[error("scope_tenant_mismatch: credential scoped to tenant '{expected}', payload tenant is '{actual}'")]
    ScopeTenantMismatch { expected: String, actual: String },

    #[error("scope_repository_mismatch: credential scoped to repository '{expected}', payload repository is '{actual}'")]
    ScopeRepositoryMismatch { expected: String, actual: String },
}

impl AuthPolicyViolation {
    /// Machine-readable violation code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Missing => "auth_missing",
            Self::SchemeMismatch { .. } => "auth_scheme_mismatch",
            Self::RotationInvalid { .. } => "token_rotation_invalid",
            Self::Expired { .. } => "token_expired",
            Self::ScopeTenantMismatch { .. } => "scope_tenant_mismatch",
            Self::ScopeRepositoryMismatch { .. } => "scope_repository_mismatch",
        }
    }

    #[must_use]
    pub const fn catalog_code(&self) -> ErrorCode {
        match self {
            Self::Missing => ErrorCode::AuthMissing,
            Self::SchemeMismatch { .. } => ErrorCode::AuthSchemeMismatch,
            Self::RotationInvalid { .. } => ErrorCode::AuthTokenRotationInvalid,
            Self::Expired { .. } => ErrorCode::AuthTokenExpired,
            Self::ScopeTenantMismatch { .. } => ErrorCode::AuthScopeTenantMismatch,
            Self::ScopeRepositoryMismatch { .. } => ErrorCode::AuthScopeRepositoryMismatch,
        }
    }

    /// Catalog code for a violation code as returned by [`code`](Self::code).
    #[must_use]
    pub fn catalog_code_for(code: &str) -> Option<ErrorCode> {
        let catalog = match code {
            "auth_missing" => ErrorCode::AuthMissing,
            "auth_scheme_mismatch" => ErrorCode::AuthSchemeMismatch,
            "token_rotation_invalid" => ErrorCode::AuthTokenRotationInvalid,
            "token_expired" => ErrorCode::AuthTokenExpired,
            "scope_tenant_mismatch" => ErrorCode::AuthScopeTenantMismatch,
            "scope_repository_mismatch" => ErrorCode::AuthScopeRepositoryMismatch,
            _ => return None,
        };
        Some(catalog)
    }
}

fn parse_instant(field: &str, raw: &str) -> Result<DateTime<Utc>, AuthPolicyViolation> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| AuthPolicyViolation::RotationInvalid {
            reason: format!("{field} '{raw}' is not an RFC 3339 timestamp"),
        })
}

/// Check the rotation window `rotated_at <= now < expires_at`.
fn check_rotation(policy: &AuthPolicy, now: DateTime<Utc>) -> Result<(), AuthPolicyViolation> {
    let rotated_at = policy
        .rotated_at
        .as_deref()
        .map(|raw| parse_instant("rotated_at", raw))
        .transpose()?;
    let expires_at = policy
        .expires_at
        .as_deref()
        .map(|raw| parse_instant("expires_at", raw))
        .transpose()?;

    if let Some(rotated) = rotated_at
        && rotated > now
    {
        return Err(AuthPolicyViolation::RotationInvalid {
            reason: "rotated_at is in the future".to_string(),
        });
    }
    if let (Some(rotated), Some(expires)) = (rotated_at, expires_at)
        && rotated >= expires
    {
        return Err(AuthPolicyViolation::RotationInvalid {
            reason: "rotated_at must be before expires_at".to_string(),
        });
    }
    if let Some(expires) = expires_at
        && now >= expires
    {
        return Err(AuthPolicyViolation::Expired {
            expires_at: policy.expires_at.clone().unwrap_or_default(),
        });
    }
    Ok(())
}

/// Validate `credentials` for `payload` against an optional policy.
pub fn validate(
    payload: &IngestionPayload,
    credentials: &Credentials,
    policy: Option<&AuthPolicy>,
    now: DateTime<Utc>,
) -> Result<(), AuthPolicyViolation> {
    let Some(policy) = policy else {
        return Ok(());
    };

    if credentials.is_empty() {
        return Err(AuthPolicyViolation::Missing);
    }
    if !policy.scheme.accepts(credentials) {
        return Err(AuthPolicyViolation::SchemeMismatch {
            expected: policy.scheme,
        });
    }
    check_rotation(policy, now)?;

    if let Some(tenant) = &policy.scope_tenant_id
        && tenant != &payload.tenant_id
    {
        return Err(AuthPolicyViolation::ScopeTenantMismatch {
            expected: tenant.clone(),
            actual: payload.tenant_id.clone(),
        });
    }
    if let Some(repository) = &policy.scope_repository_id
        && repository != &payload.repository.repository_id
    {
        return Err(AuthPolicyViolation::ScopeRepositoryMismatch {
            expected: repository.clone(),
            actual: payload.repository.repository_id.clone(),
        });
    }
    Ok(())
}
