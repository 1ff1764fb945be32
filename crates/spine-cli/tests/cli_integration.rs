//! Integration tests for the `spine-verify-cli` binary, driving it against
//! freshly built bundles on disk rather than calling library functions
//! directly.

use assert_cmd::Command;
use chrono::{DateTime, Utc};
use predicates::prelude::*;
use spine_bundle::{build_job_proof_bundle_v1, Artifact, BundleParams, Signer};
use spine_core::{Actor, ChainHashInput, Event, KeyTable, PublicKeyRecord, Snapshot};
use std::collections::BTreeMap;
use std::path::Path;

fn spine_verify() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("spine-verify-cli").expect("binary `spine-verify-cli` should be built")
}

fn signer_pair() -> (Signer, PublicKeyRecord) {
    let kp = spine_crypto::create_ed25519_keypair();
    let key_id = spine_crypto::key_id_from_public_key_pem(&kp.public_key_pem).unwrap();
    let record = PublicKeyRecord {
        tenant_id: "tenant-1".into(),
        key_id: key_id.clone(),
        public_key_pem: kp.public_key_pem.clone(),
        purpose: "server".into(),
        server_governed: Some(true),
        valid_from: None,
        revoked_at: None,
    };
    (Signer { key_id, private_key_pem: kp.private_key_pem }, record)
}

fn genesis_event(signer: &Signer, at: DateTime<Utc>) -> Event {
    let actor = Actor::new("server", "svc-1");
    let payload = serde_json::json!({"kind": "JOB_CREATED"});
    let payload_hash = spine_canon::canonical_hash(&payload).unwrap();
    let prev_chain_hash: Option<String> = None;
    let input = ChainHashInput {
        v: 1,
        id: "evt-1",
        at,
        stream_id: "job-1",
        event_type: "JOB_CREATED",
        actor: &actor,
        payload_hash: &payload_hash,
        prev_chain_hash: &prev_chain_hash,
    };
    let chain_hash = spine_canon::canonical_hash(&input).unwrap();
    let signature = spine_crypto::sign_digest_hex(&signer.private_key_pem, &chain_hash).unwrap();
    Event {
        v: 1,
        id: "evt-1".into(),
        at,
        stream_id: "job-1".into(),
        event_type: "JOB_CREATED".into(),
        actor,
        payload,
        payload_hash,
        prev_chain_hash: None,
        chain_hash,
        signer_key_id: signer.key_id.clone(),
        signature,
    }
}

/// Build a minimal, valid `JobProofBundle.v1` on disk under `dir`.
fn write_job_proof_bundle(dir: &Path) {
    let (signer, record) = signer_pair();
    let at: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
    let event = genesis_event(&signer, at);
    let mut keys = KeyTable::new();
    keys.insert(record.key_id.clone(), record);
    let mut scope = BTreeMap::new();
    scope.insert("jobId".to_string(), "job-1".to_string());

    let params = BundleParams {
        tenant_id: "tenant-1".into(),
        scope,
        snapshot: Snapshot {
            id: "job-1".into(),
            last_chain_hash: event.chain_hash.clone(),
            last_event_id: event.id.clone(),
        },
        events: vec![event],
        artifacts: vec![Artifact { artifact_id: "a1".into(), value: serde_json::json!({"amount": "1.00"}) }],
        contract_docs_by_hash: BTreeMap::new(),
        public_key_by_key_id: keys,
        manifest_signer: signer.clone(),
        verification_report_signer: Some(signer.clone()),
        governance_policy: None,
        revocation_list: None,
        timestamp_proof: None,
        tool_version: Some("0.1.0".into()),
        tool_commit: None,
        require_head_attestation: true,
        generated_at: at,
        attested_at: at,
    };
    let built = build_job_proof_bundle_v1(&params).unwrap();
    for (name, bytes) in &built.files {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }
}

// ── 1. Help / version ───────────────────────────────────────────────

#[test]
fn help_exits_zero_and_lists_verify() {
    spine_verify()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("verify"));
}

#[test]
fn version_shows_version_string() {
    spine_verify()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

// ── 2. Happy path ────────────────────────────────────────────────────

#[test]
fn verify_of_freshly_built_job_proof_bundle_succeeds() {
    let tmp = tempfile::tempdir().unwrap();
    write_job_proof_bundle(tmp.path());

    spine_verify()
        .arg("verify")
        .arg("--job-proof")
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("OK"));
}

#[test]
fn verify_json_format_emits_schema_version() {
    let tmp = tempfile::tempdir().unwrap();
    write_job_proof_bundle(tmp.path());

    spine_verify()
        .arg("verify")
        .arg("--job-proof")
        .arg(tmp.path())
        .arg("--format")
        .arg("json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"schemaVersion\""))
        .stdout(predicate::str::contains("\"ok\": true"));
}

#[test]
fn verify_writes_json_out_file() {
    let tmp = tempfile::tempdir().unwrap();
    write_job_proof_bundle(tmp.path());
    let out_path = tmp.path().join("report.json");

    spine_verify()
        .arg("verify")
        .arg("--job-proof")
        .arg(tmp.path())
        .arg("--json-out")
        .arg(&out_path)
        .assert()
        .success();

    let content = std::fs::read_to_string(&out_path).unwrap();
    assert!(content.contains("\"schemaVersion\""));
}

// ── 3. Failure path / exit codes ─────────────────────────────────────

#[test]
fn tampered_bundle_exits_one_and_reports_error() {
    let tmp = tempfile::tempdir().unwrap();
    write_job_proof_bundle(tmp.path());
    let events_path = tmp.path().join("events/events.jsonl");
    let mut text = std::fs::read_to_string(&events_path).unwrap();
    text = text.replacen("\"JOB_CREATED\"", "\"JOB_TAMPERED\"", 1);
    std::fs::write(&events_path, text).unwrap();

    spine_verify()
        .arg("verify")
        .arg("--job-proof")
        .arg(tmp.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("FAILED"));
}

#[test]
fn nonexistent_path_exits_one() {
    spine_verify()
        .arg("verify")
        .arg("--job-proof")
        .arg("/nonexistent/bundle/path")
        .assert()
        .code(1);
}

#[test]
fn missing_bundle_kind_flag_is_usage_error() {
    let tmp = tempfile::tempdir().unwrap();
    spine_verify()
        .arg("verify")
        .arg(tmp.path())
        .assert()
        .code(2);
}

#[test]
fn strict_mode_promotes_missing_report_to_error() {
    let tmp = tempfile::tempdir().unwrap();
    write_job_proof_bundle(tmp.path());
    std::fs::remove_file(tmp.path().join("verify/verification_report.json")).unwrap();

    spine_verify()
        .arg("verify")
        .arg("--job-proof")
        .arg(tmp.path())
        .arg("--strict")
        .assert()
        .code(1);

    spine_verify()
        .arg("verify")
        .arg("--job-proof")
        .arg(tmp.path())
        .assert()
        .success();
}
