//! Contract integrity tests.
//!
//! Covers:
//!   - build → parse round trips keep the declared hash
//!   - any single-field mutation breaks verification
//!   - idempotency keys track the payload, not its presentation
//!   - artifacts written to disk read back as valid

use proptest::prelude::*;
use pumuki_common::canonical::{canonical_digest, to_canonical_json};
use pumuki_common::contract::{self, ContractArtifact, ContractError};
use pumuki_common::idempotency::idempotency_key;
use pumuki_common::testing::{payload_from_report, report_hotspot, report_with, sample_payload};
use serde_json::{Value, json};

// ===========================================================================
// 1. Round trips
// ===========================================================================

#[test]
fn contract_parse_accepts_freshly_built_payload() {
    let payload = sample_payload();
    let value = serde_json::to_value(&payload).unwrap();
    let parsed = contract::parse(&value).unwrap();

    assert_eq!(parsed.contract.payload_hash(), payload.payload_hash());
    assert_eq!(parsed.contract.compute_hash().unwrap(), payload.payload_hash());
}

#[test]
fn contract_canonical_form_excludes_integrity() {
    let payload = sample_payload();
    let mut value = serde_json::to_value(&payload).unwrap();
    value.as_object_mut().unwrap().remove("integrity");
    value["repository"]["default_branch"] = Value::Null;
    value["compliance"] = Value::Null;

    assert_eq!(canonical_digest(&value).unwrap(), payload.payload_hash());
    assert!(!to_canonical_json(&value).unwrap().contains("payload_hash"));
}

#[test]
fn contract_integer_and_float_scores_hash_identically() {
    let payload = sample_payload();
    let mut value = serde_json::to_value(&payload).unwrap();
    value["hotspots"]["entries"][0]["raw_score"] = json!(10);

    assert!(contract::parse(&value).is_ok());
}

// ===========================================================================
// 2. Tamper detection
// ===========================================================================

#[test]
fn contract_tampered_tenant_is_rejected() {
    let mut value = serde_json::to_value(sample_payload()).unwrap();
    value["tenant_id"] = json!("tenant-b");

    let err = contract::parse(&value).unwrap_err();
    assert_eq!(ContractError::CODE, "CONTRACT_INVALID");
    assert_eq!(err.kind(), "integrity_hash_mismatch");
}

#[test]
fn contract_supplied_hash_is_never_trusted() {
    let mut value = serde_json::to_value(sample_payload()).unwrap();
    value["integrity"]["payload_hash"] = json!("0".repeat(64));

    assert_eq!(
        contract::parse(&value).unwrap_err().kind(),
        "integrity_hash_mismatch"
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn contract_any_raw_score_change_breaks_hash(original in 0u32..1000, delta in 1u32..1000) {
        let report = report_with(vec![report_hotspot(1, "src/a.ts", f64::from(original), "HIGH")]);
        let payload = payload_from_report("tenant-a", "repo-a", &report);

        let mut value = serde_json::to_value(&payload).unwrap();
        value["hotspots"]["entries"][0]["raw_score"] = json!(f64::from(original + delta));

        let err = contract::parse(&value).unwrap_err();
        prop_assert_eq!(err.kind(), "integrity_hash_mismatch");
    }

    #[test]
    fn contract_path_change_breaks_hash(suffix in "[a-z]{1,12}") {
        let payload = sample_payload();
        let mut value = serde_json::to_value(&payload).unwrap();
        let original = value["hotspots"]["entries"][0]["path"].as_str().unwrap().to_string();
        value["hotspots"]["entries"][0]["path"] = json!(format!("{original}{suffix}"));

        prop_assert!(contract::parse(&value).is_err());
    }

    #[test]
    fn contract_idempotency_key_follows_generated_at(day in 1u32..28) {
        let base = sample_payload();
        let mut shifted = base.clone();
        shifted.generated_at = format!("2026-01-{day:02}T00:00:00+00:00");

        prop_assert_ne!(idempotency_key(&base), idempotency_key(&shifted));
        prop_assert_eq!(idempotency_key(&shifted), idempotency_key(&shifted.clone()));
    }
}

// ===========================================================================
// 3. Artifacts
// ===========================================================================

#[test]
fn contract_artifact_tamper_on_disk_reads_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".pumuki/artifacts/contract.json");
    contract::write_artifact(&path, &sample_payload()).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, raw.replace("tenant-a", "tenant-z")).unwrap();

    match contract::read_artifact(&path) {
        ContractArtifact::Invalid { reason, version, .. } => {
            assert_eq!(reason, "integrity_hash_mismatch");
            assert_eq!(version.as_deref(), Some("1"));
        }
        other => panic!("expected invalid artifact, got {other:?}"),
    }
}
