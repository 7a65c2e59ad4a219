//! Deterministic idempotency keys for ingestion submissions.
//!
//! The key only depends on contract fields, so a retry from a fresh process
//! reproduces the same key for an unchanged payload and the backend can
//! collapse the duplicate.

use serde::Serialize;

use crate::canonical::canonical_digest;
use crate::contract::{ContractVersion, IngestionPayload, SourceMode};

/// Prefix identifying the key scheme.
pub const IDEMPOTENCY_KEY_PREFIX: &str = "pumuki-hotspots-v1:";

#[derive(Serialize)]
struct KeyMaterial<'a> {
    version: ContractVersion,
    tenant_id: &'a str,
    repository_id: &'a str,
    source_mode: SourceMode,
    generated_at: &'a str,
    payload_hash: &'a str,
}

/// Derive the idempotency key for `payload`.
pub fn idempotency_key(payload: &IngestionPayload) -> String {
    let material = KeyMaterial {
        version: payload.version,
        tenant_id: &payload.tenant_id,
        repository_id: &payload.repository.repository_id,
        source_mode: payload.source.mode,
        generated_at: &payload.generated_at,
        payload_hash: &payload.integrity.payload_hash,
    };
    // Only strings and unit enums: serialization cannot fail.
    let digest = canonical_digest(&material).unwrap_or_default();
    format!("{IDEMPOTENCY_KEY_PREFIX}{digest}")
}

/// Use `explicit` when it is non-blank, otherwise derive from the payload.
pub fn resolve_idempotency_key(explicit: Option<&str>, payload: &IngestionPayload) -> String {
    match explicit.map(str::trim) {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => idempotency_key(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::is_sha256_hex;
    use crate::testing::sample_payload;

    #[test]
    fn test_key_is_stable_for_equal_payloads() {
        let a = sample_payload();
        let b = sample_payload();
        assert_eq!(idempotency_key(&a), idempotency_key(&b));

        let key = idempotency_key(&a);
        let digest = key.strip_prefix(IDEMPOTENCY_KEY_PREFIX).unwrap();
        assert!(is_sha256_hex(digest));
    }

    #[test]
    fn test_generated_at_alone_changes_key() {
        let a = sample_payload();
        let mut b = a.clone();
        b.generated_at = "2026-02-27T11:30:00+00:00".to_string();
        assert_ne!(idempotency_key(&a), idempotency_key(&b));
    }

    #[test]
    fn test_fields_outside_key_material_are_ignored() {
        let a = sample_payload();
        let mut b = a.clone();
        b.repository.name = "renamed".to_string();
        assert_eq!(idempotency_key(&a), idempotency_key(&b));
    }

    #[test]
    fn test_resolve_prefers_trimmed_explicit_key() {
        let payload = sample_payload();
        assert_eq!(resolve_idempotency_key(Some("  key-1 "), &payload), "key-1");
        assert_eq!(
            resolve_idempotency_key(Some("   "), &payload),
            idempotency_key(&payload)
        );
        assert_eq!(
            resolve_idempotency_key(None, &payload),
            idempotency_key(&payload)
        );
    }
}
