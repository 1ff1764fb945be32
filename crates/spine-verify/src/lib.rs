//! The offline verifier: replays a bundle directory (or zip) through the
//! eight checks of the bundle lifecycle and renders a `VerifyCliOutput.v1`.
//!
//! Steps 1-3, 5, 7 run in every mode ("non-strict"). Steps 4, 6, 8 only run
//! in "strict" (and "fail-on-warnings", which is strict plus promoting
//! warnings into errors). The verifier never stops at the first problem —
//! it keeps going and collects every diagnostic it safely can, except where
//! doing so would itself be misleading (e.g. it does not check a
//! signature against an event whose chain hash failed to recompute, since
//! `spine_chain::verify_chain` already treats that event as unsound).

use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;

use spine_core::{
    BundleKind, Event, GovernancePolicyV2, HeadAttestation, IdentityLogProof, KeyTable, Manifest,
    PayloadMaterial, PublicKeyRecord, RevocationList, Snapshot, TimestampProof, VerificationReport,
};
use spine_error::{ErrorCode, SpineError};
use spine_policy::{PolicyEngine, Surface};
use spine_report::{stable_slice, StableSlice, Target, TargetKind, ToolInfo, VerifyCliOutput, VerifyMode};

/// Read-only trust inputs supplied by the caller for a single verify call.
/// The core never mutates or caches these across calls.
#[derive(Debug, Clone, Default)]
pub struct TrustInputs {
    pub governance_roots: KeyTable,
    pub time_authorities: KeyTable,
}

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub mode: VerifyMode,
    pub hash_concurrency: usize,
    pub trust: TrustInputs,
    pub tool: ToolInfo,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            mode: VerifyMode::NonStrict,
            hash_concurrency: 1,
            trust: TrustInputs::default(),
            tool: ToolInfo { name: "spine-verify".to_string(), version: None, commit: None },
        }
    }
}

/// A cooperative cancellation signal checked between file boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct Collected {
    errors: Vec<SpineError>,
    warnings: Vec<spine_report::WarningOut>,
}

impl Collected {
    fn new() -> Self {
        Self { errors: Vec::new(), warnings: Vec::new() }
    }

    fn err(&mut self, code: ErrorCode, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(SpineError::new(code, message).with_path(path.into()));
    }

    fn warn(&mut self, code: ErrorCode, path: Option<String>) {
        self.warnings.push(spine_report::WarningOut { code, path });
    }
}

#[derive(Debug, Deserialize)]
struct PublicKeysFile {
    keys: Vec<PublicKeyRecord>,
}

fn read_json<T: serde::de::DeserializeOwned>(dir: &Path, rel: &str) -> Result<T, SpineError> {
    let bytes = std::fs::read(dir.join(rel))
        .map_err(|e| SpineError::new(ErrorCode::MissingFile, format!("{e}")).with_path(rel))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| SpineError::new(ErrorCode::InputInvalid, format!("{rel} is not valid JSON: {e}")).with_path(rel))
}

fn read_jsonl<T: serde::de::DeserializeOwned>(dir: &Path, rel: &str) -> Result<Vec<T>, SpineError> {
    let bytes = std::fs::read(dir.join(rel))
        .map_err(|e| SpineError::new(ErrorCode::MissingFile, format!("{e}")).with_path(rel))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| SpineError::new(ErrorCode::InputInvalid, format!("{rel} is not UTF-8: {e}")).with_path(rel))?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| SpineError::new(ErrorCode::InputInvalid, format!("{rel}: {e}")).with_path(rel))
        })
        .collect()
}

fn stream_dir_for_kind(kind: BundleKind) -> &'static str {
    match kind {
        BundleKind::JobProofBundleV1 => "job",
        BundleKind::MonthProofBundleV1 => "month",
        BundleKind::InvoiceBundleV1 => "invoice",
        BundleKind::FinancePackBundleV1 => "finance",
        BundleKind::ClosePackBundleV1 => "close",
    }
}

fn embedded_kind_for_prefix(prefix: &str) -> Option<BundleKind> {
    match prefix {
        "payload/job_proof_bundle/" => Some(BundleKind::JobProofBundleV1),
        "payload/month_proof_bundle/" => Some(BundleKind::MonthProofBundleV1),
        "payload/invoice_bundle/" => Some(BundleKind::InvoiceBundleV1),
        _ => None,
    }
}

/// Step 1: per-file integrity against the manifest, run synchronously (the
/// default; see [`check_files_concurrent`] for the bounded-concurrency
/// variant used by `verify_bundle_dir_async`).
fn check_files_sync(dir: &Path, manifest: &Manifest, out: &mut Collected) {
    for entry in &manifest.files {
        check_one_file(dir, entry, out);
    }
}

fn check_one_file(dir: &Path, entry: &spine_core::FileEntry, out: &mut Collected) {
    let path = dir.join(&entry.name);
    let bytes = match std::fs::read(&path) {
        Ok(b) => b,
        Err(_) => {
            out.err(ErrorCode::MissingFile, entry.name.clone(), "file listed in manifest is missing");
            return;
        }
    };
    if bytes.len() as u64 != entry.bytes {
        out.err(
            ErrorCode::FileSizeMismatch,
            entry.name.clone(),
            format!("expected {} bytes, found {}", entry.bytes, bytes.len()),
        );
    }
    let actual_hash = spine_canon::sha256_hex(&bytes);
    if actual_hash != entry.sha256 {
        out.err(
            ErrorCode::FileHashMismatch,
            entry.name.clone(),
            format!("expected sha256 {}, computed {}", entry.sha256, actual_hash),
        );
    }
}

async fn check_files_concurrent(dir: &Path, manifest: &Manifest, hash_concurrency: usize, out: &mut Collected) {
    let mut results: Vec<(String, Vec<SpineError>)> = stream::iter(manifest.files.clone().into_iter().map(|entry| {
        let dir = dir.to_path_buf();
        async move {
            tokio::task::spawn_blocking(move || {
                let mut local = Collected::new();
                check_one_file(&dir, &entry, &mut local);
                (entry.name, local.errors)
            })
            .await
            .unwrap_or_else(|e| (String::new(), vec![SpineError::new(ErrorCode::InputInvalid, format!("{e}"))]))
        }
    }))
    .buffer_unordered(hash_concurrency.max(1))
    .collect::<Vec<_>>()
    .await;

    results.sort_by(|a, b| a.0.cmp(&b.0));
    for (_, errs) in results {
        out.errors.extend(errs);
    }
}

fn scan_undeclared_files(dir: &Path, known: &BTreeSet<String>, out: &mut Collected) {
    for walk_entry in walkdir::WalkDir::new(dir).into_iter().filter_map(Result::ok) {
        if !walk_entry.file_type().is_file() {
            continue;
        }
        let rel = match walk_entry.path().strip_prefix(dir) {
            Ok(r) => r.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        if !known.contains(&rel) {
            out.err(ErrorCode::UndeclaredFile, rel, "file present in bundle but not listed in manifest");
        }
    }
}

struct LoadedCore {
    manifest: Manifest,
    events: Vec<Event>,
    keys: KeyTable,
    snapshot: Snapshot,
    snapshot_path: String,
    policy: Option<GovernancePolicyV2>,
    revocations: Option<RevocationList>,
    time_proofs: Vec<TimestampProof>,
    attestation: Option<HeadAttestation>,
    report: Option<VerificationReport>,
    identity_log_proof: Option<IdentityLogProof>,
}

fn merge_governance_keys(events: &[Event], base: &mut KeyTable) {
    for event in events {
        if matches!(event.event_type.as_str(), "KEY_ADDED" | "KEY_ROTATED") {
            if let Ok(record) = serde_json::from_value::<PublicKeyRecord>(event.payload.clone()) {
                base.entry(record.key_id.clone()).or_insert(record);
            }
        }
    }
}

fn load_core(dir: &Path, kind: BundleKind, out: &mut Collected) -> Option<LoadedCore> {
    let manifest: Manifest = match read_json(dir, "manifest.json") {
        Ok(m) => m,
        Err(e) => {
            out.errors.push(e);
            return None;
        }
    };

    match spine_canon::canonical_hash(&manifest.hash_input()) {
        Ok(expected) => {
            if manifest.manifest_hash.as_deref() != Some(expected.as_str()) {
                out.err(ErrorCode::ManifestHashMismatch, "manifest.json", "manifestHash does not recompute");
            }
        }
        Err(e) => out.errors.push(e),
    }

    let mut known: BTreeSet<String> = manifest.files.iter().map(|f| f.name.clone()).collect();
    known.insert("manifest.json".to_string());
    known.insert("attestation/bundle_head_attestation.json".to_string());
    known.insert("verify/verification_report.json".to_string());
    known.insert("attestation/timestamp_proof.json".to_string());
    known.insert("governance/identity_log_proof.json".to_string());
    scan_undeclared_files(dir, &known, out);
    check_files_sync(dir, &manifest, out);

    let events: Vec<Event> = read_jsonl(dir, "events/events.jsonl").unwrap_or_else(|e| {
        out.errors.push(e);
        Vec::new()
    });
    if let Ok(projected) = read_jsonl::<PayloadMaterial>(dir, "events/payload_material.jsonl") {
        for (index, (event, material)) in events.iter().zip(projected.iter()).enumerate() {
            let expected = PayloadMaterial::from(event);
            if &expected != material {
                out.err(
                    ErrorCode::PayloadHashMismatch,
                    format!("events/payload_material.jsonl[{index}]"),
                    "payload projection does not match the corresponding event",
                );
            }
        }
    }

    let mut keys: KeyTable = read_json::<PublicKeysFile>(dir, "keys/public_keys.json")
        .map(|f| f.keys.into_iter().map(|k| (k.key_id.clone(), k)).collect())
        .unwrap_or_else(|e| {
            out.errors.push(e);
            KeyTable::new()
        });
    merge_governance_keys(&events, &mut keys);

    let policy: Option<GovernancePolicyV2> = if dir.join("governance/policy.json").exists() {
        read_json(dir, "governance/policy.json").ok()
    } else {
        None
    };
    let revocations: Option<RevocationList> = if dir.join("governance/revocations.json").exists() {
        read_json(dir, "governance/revocations.json").ok()
    } else {
        None
    };
    let time_proofs: Vec<TimestampProof> = if dir.join("attestation/timestamp_proof.json").exists() {
        read_json::<TimestampProof>(dir, "attestation/timestamp_proof.json")
            .map(|p| vec![p])
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let snapshot_path = format!("{}/snapshot.json", stream_dir_for_kind(kind));
    let snapshot: Snapshot = match read_json(dir, &snapshot_path) {
        Ok(s) => s,
        Err(e) => {
            out.errors.push(e);
            Snapshot { id: String::new(), last_chain_hash: String::new(), last_event_id: String::new() }
        }
    };

    let attestation: Option<HeadAttestation> =
        read_json(dir, "attestation/bundle_head_attestation.json").ok();
    let report: Option<VerificationReport> = read_json(dir, "verify/verification_report.json").ok();
    let identity_log_proof: Option<IdentityLogProof> = if dir.join("governance/identity_log_proof.json").exists() {
        read_json(dir, "governance/identity_log_proof.json").ok()
    } else {
        None
    };

    Some(LoadedCore {
        manifest,
        events,
        keys,
        snapshot,
        snapshot_path,
        policy,
        revocations,
        time_proofs,
        attestation,
        report,
        identity_log_proof,
    })
}

fn check_chain(core: &LoadedCore, out: &mut Collected) {
    let chain_errors =
        spine_chain::verify_chain(&core.events, &core.keys, core.revocations.as_ref(), &core.time_proofs);
    out.errors.extend(chain_errors);
}

fn check_snapshot(core: &LoadedCore, out: &mut Collected) {
    let Some(last) = core.events.last() else { return };
    if core.snapshot.last_chain_hash != last.chain_hash || core.snapshot.last_event_id != last.id {
        out.err(
            ErrorCode::ChainHashMismatch,
            core.snapshot_path.clone(),
            "snapshot does not match the stream's last event",
        );
    }
}

fn check_attestation(core: &LoadedCore, out: &mut Collected) -> Option<String> {
    let Some(attestation) = &core.attestation else {
        out.err(
            ErrorCode::MissingFile,
            "attestation/bundle_head_attestation.json",
            "head attestation is required",
        );
        return None;
    };
    let manifest_hash = core.manifest.manifest_hash.clone().unwrap_or_default();

    let input = spine_core::AttestationHashInput {
        manifest_hash: &attestation.manifest_hash,
        attested_at: attestation.attested_at,
        signer_key_id: &attestation.signer_key_id,
    };
    let expected = match spine_canon::canonical_hash(&input) {
        Ok(h) => h,
        Err(e) => {
            out.errors.push(e);
            return None;
        }
    };
    if attestation.attestation_hash.as_deref() != Some(expected.as_str()) {
        out.err(
            ErrorCode::AttestationHashMismatch,
            "attestation/bundle_head_attestation.json",
            "attestationHash does not recompute",
        );
    }

    match core.keys.get(&attestation.signer_key_id) {
        Some(key) => match spine_crypto::verify_digest_hex(&key.public_key_pem, &expected, &attestation.signature) {
            Ok(true) => {}
            _ => out.err(
                ErrorCode::AttestationSignatureInvalid,
                "attestation/bundle_head_attestation.json",
                "attestation signature does not verify",
            ),
        },
        None => out.err(
            ErrorCode::AttestationSignatureInvalid,
            "attestation/bundle_head_attestation.json",
            "attestation signer key is unknown",
        ),
    }

    if attestation.manifest_hash != manifest_hash {
        out.err(
            ErrorCode::AttestationManifestBindingMismatch,
            "attestation/bundle_head_attestation.json",
            "attestation.manifestHash does not match the bundle manifest",
        );
    }

    Some(expected)
}

fn check_report(core: &LoadedCore, attestation_hash: &str, strict: bool, out: &mut Collected) {
    let Some(report) = &core.report else {
        if strict {
            out.err(ErrorCode::ReportMissing, "verify/verification_report.json", "verification report is required in strict mode");
        } else {
            out.warn(ErrorCode::ReportMissing, Some("verify/verification_report.json".to_string()));
        }
        return;
    };

    let input = spine_core::ReportHashInput {
        manifest_hash: &report.manifest_hash,
        bundle_head_attestation: &report.bundle_head_attestation,
        tool: &report.tool,
        warnings: &report.warnings,
    };
    let expected = match spine_canon::canonical_hash(&input) {
        Ok(h) => h,
        Err(e) => {
            out.errors.push(e);
            return;
        }
    };
    if report.report_hash.as_deref() != Some(expected.as_str()) {
        out.err(ErrorCode::ReportSignatureInvalid, "verify/verification_report.json", "reportHash does not recompute");
    }

    match core.keys.get(&report.signer_key_id) {
        Some(key) => match spine_crypto::verify_digest_hex(&key.public_key_pem, &expected, &report.signature) {
            Ok(true) => {}
            _ => out.err(ErrorCode::ReportSignatureInvalid, "verify/verification_report.json", "report signature does not verify"),
        },
        None => out.err(ErrorCode::ReportSignatureInvalid, "verify/verification_report.json", "report signer key is unknown"),
    }

    let manifest_hash = core.manifest.manifest_hash.clone().unwrap_or_default();
    if report.manifest_hash != manifest_hash || report.bundle_head_attestation.attestation_hash != attestation_hash {
        out.err(ErrorCode::ReportBindingMismatch, "verify/verification_report.json", "report does not bind to this manifest/attestation");
    }
}

fn check_policy_admission(core: &LoadedCore, kind: BundleKind, trust: &TrustInputs, attestation_hash_ok: bool, out: &mut Collected) {
    let Some(policy) = &core.policy else { return };
    if let Err(e) = spine_policy::verify_policy_document(policy, &trust.governance_roots) {
        out.errors.push(e.with_path("governance/policy.json"));
        return;
    }
    let engine = PolicyEngine::new(policy.clone());

    if let Some(attestation) = &core.attestation {
        if let Some(key) = core.keys.get(&attestation.signer_key_id) {
            let decision = engine.authorize(kind, Surface::HeadAttestation, &core.manifest.tenant_id, key);
            if !decision.allowed {
                out.err(
                    ErrorCode::PolicySignerUnauthorized,
                    "attestation/bundle_head_attestation.json",
                    decision.reason.unwrap_or_default(),
                );
            }
            if attestation_hash_ok {
                check_revocation(key, attestation.attested_at, core, "attestation/bundle_head_attestation.json", out);
            }
        }
    }

    if let Some(report) = &core.report {
        if let Some(key) = core.keys.get(&report.signer_key_id) {
            let decision = engine.authorize(kind, Surface::VerificationReport, &core.manifest.tenant_id, key);
            if !decision.allowed {
                out.err(
                    ErrorCode::ReportSignerUnauthorized,
                    "verify/verification_report.json",
                    decision.reason.unwrap_or_default(),
                );
            }
            check_revocation(key, report.signed_at, core, "verify/verification_report.json", out);
        }
    }
}

/// A revoked signer is rescued only by a trusted time-authority proof
/// attesting its subject happened before the revocation.
/// `TimestampProof.subject` is matched against `key.key_id` here — a
/// pragmatic reading since that field is left free-form.
fn check_revocation(key: &PublicKeyRecord, at: DateTime<Utc>, core: &LoadedCore, path: &str, out: &mut Collected) {
    let Some(revocations) = &core.revocations else { return };
    let Some(entry) = revocations.is_revoked_at(&key.key_id, at) else { return };
    let rescued = core
        .time_proofs
        .iter()
        .any(|p| p.subject == key.key_id && p.attested_time < entry.revoked_at);
    if !rescued {
        out.err(ErrorCode::RevokedWithoutTimeproof, path, format!("key '{}' is revoked as of {}", key.key_id, entry.revoked_at));
    }
}

fn check_revocation_list_signature(core: &LoadedCore, trust: &TrustInputs, out: &mut Collected) {
    if let Some(revocations) = &core.revocations {
        if let Err(e) = spine_policy::verify_revocation_list(revocations, &trust.governance_roots) {
            out.errors.push(e.with_path("governance/revocations.json"));
        }
    }
}

/// C8: if the bundle carries a transparency-log proof, verify it. The
/// trusted log-operator key set is the same governance-root set used for
/// policy and revocation-list trust, matching how this codebase already
/// treats the governance root as the single trust anchor for all
/// server-signed governance documents.
fn check_identity_log_proof(core: &LoadedCore, trust: &TrustInputs, out: &mut Collected) {
    let Some(proof) = &core.identity_log_proof else { return };
    let entry_id = proof.entry_id.clone();
    if let Err(e) = spine_translog::verify_identity_log_proof(proof, &entry_id, &trust.governance_roots) {
        out.errors.push(e.with_path("governance/identity_log_proof.json"));
    }
}

fn check_artifacts(dir: &Path, manifest: &Manifest, out: &mut Collected) {
    for entry in manifest.files.iter().filter(|f| f.name.starts_with("artifacts/")) {
        let Ok(bytes) = std::fs::read(dir.join(&entry.name)) else { continue };
        let Ok(mut value) = serde_json::from_slice::<Value>(&bytes) else { continue };
        let Some(obj) = value.as_object_mut() else { continue };
        let stored_hash = obj.remove("artifactHash");
        let Ok(recomputed) = spine_canon::canonical_hash(&value) else { continue };
        if stored_hash != Some(Value::String(recomputed)) {
            out.err(ErrorCode::ArtifactHashMismatch, entry.name.clone(), "artifactHash does not recompute");
        }
    }
}

fn check_embedded_bindings(dir: &Path, manifest: &Manifest, trust: &TrustInputs, out: &mut Collected) {
    for binding in &manifest.embedded_bindings {
        let Some(sub_kind) = embedded_kind_for_prefix(&binding.prefix) else { continue };
        let sub_dir = dir.join(&binding.prefix);
        let sub_output = verify_bundle_dir(
            sub_kind,
            &sub_dir,
            &VerifyOptions { mode: VerifyMode::Strict, trust: trust.clone(), ..VerifyOptions::default() },
        );
        if !sub_output.verification_ok {
            for e in &sub_output.errors {
                out.errors.push(
                    SpineError::new(e.code, e.message.clone())
                        .with_path(format!("{}{}", binding.prefix, e.path.clone().unwrap_or_default())),
                );
            }
        }
        let sub_manifest: Result<Manifest, SpineError> = read_json(dir, &format!("{}manifest.json", binding.prefix));
        if let Ok(sub_manifest) = sub_manifest {
            if sub_manifest.manifest_hash.as_deref() != Some(binding.manifest_hash.as_str()) {
                out.err(
                    ErrorCode::EmbeddedBindingMismatch,
                    format!("{}manifest.json", binding.prefix),
                    "outer binding does not match the embedded bundle's manifestHash",
                );
            }
        }
    }
}

fn finalize(tool: &ToolInfo, mode: VerifyMode, target: Target, mut collected: Collected) -> VerifyCliOutput {
    if tool.version.is_none() {
        collected.warn(ErrorCode::ToolVersionUnknown, None);
    }
    if tool.commit.is_none() {
        collected.warn(ErrorCode::ToolCommitUnknown, None);
    }
    let verification_ok = collected.errors.is_empty();
    let errors = collected.errors.iter().map(spine_error::ErrorEntry::from).collect();
    VerifyCliOutput::new(tool.clone(), mode, target, verification_ok, errors, collected.warnings)
}

/// Verify a bundle directory of the given kind, synchronously.
pub fn verify_bundle_dir(kind: BundleKind, dir: &Path, opts: &VerifyOptions) -> VerifyCliOutput {
    let target = Target { kind: TargetKind::Dir, path: dir.display().to_string() };
    let mut collected = Collected::new();

    let Some(core) = load_core(dir, kind, &mut collected) else {
        return finalize(&opts.tool, opts.mode, target, collected);
    };

    check_chain(&core, &mut collected);
    check_snapshot(&core, &mut collected);

    let attestation_hash = check_attestation(&core, &mut collected);
    check_artifacts(dir, &core.manifest, &mut collected);
    check_identity_log_proof(&core, &opts.trust, &mut collected);

    if let Some(hash) = &attestation_hash {
        if opts.mode.is_strict() {
            check_revocation_list_signature(&core, &opts.trust, &mut collected);
            check_policy_admission(&core, kind, &opts.trust, true, &mut collected);
            check_report(&core, hash, true, &mut collected);
            check_embedded_bindings(dir, &core.manifest, &opts.trust, &mut collected);
        } else {
            check_report(&core, hash, false, &mut collected);
        }
    }

    finalize(&opts.tool, opts.mode, target, collected)
}

/// Verify a bundle directory with step 1's per-file hashing parallelized
/// across `opts.hash_concurrency` blocking tasks.
pub async fn verify_bundle_dir_async(kind: BundleKind, dir: &Path, opts: &VerifyOptions) -> VerifyCliOutput {
    let target = Target { kind: TargetKind::Dir, path: dir.display().to_string() };
    let manifest: Manifest = match read_json(dir, "manifest.json") {
        Ok(m) => m,
        Err(_) => return verify_bundle_dir(kind, dir, opts),
    };
    let mut collected = Collected::new();
    check_files_concurrent(dir, &manifest, opts.hash_concurrency, &mut collected).await;
    if !collected.errors.is_empty() {
        return finalize(&opts.tool, opts.mode, target, collected);
    }
    verify_bundle_dir(kind, dir, opts)
}

/// Extract a zip archive to a fresh temp directory and verify it.
pub fn verify_bundle_zip(kind: BundleKind, zip_path: &Path, opts: &VerifyOptions) -> Result<VerifyCliOutput, SpineError> {
    let file = std::fs::File::open(zip_path)
        .map_err(|e| SpineError::new(ErrorCode::InputInvalid, format!("cannot open zip: {e}")))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| SpineError::new(ErrorCode::InputInvalid, format!("not a valid zip: {e}")))?;
    let tmp = tempfile::tempdir()
        .map_err(|e| SpineError::new(ErrorCode::InputInvalid, format!("cannot create temp dir: {e}")))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| SpineError::new(ErrorCode::InputInvalid, format!("bad zip entry: {e}")))?;
        let out_path: PathBuf = tmp.path().join(entry.name());
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SpineError::new(ErrorCode::InputInvalid, format!("{e}")))?;
        }
        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .map_err(|e| SpineError::new(ErrorCode::InputInvalid, format!("{e}")))?;
        std::fs::write(&out_path, contents)
            .map_err(|e| SpineError::new(ErrorCode::InputInvalid, format!("{e}")))?;
    }

    let mut output = verify_bundle_dir(kind, tmp.path(), opts);
    output.target = Target { kind: TargetKind::Zip, path: zip_path.display().to_string() };
    Ok(output)
}

pub fn verify_job_proof_bundle_dir(dir: &Path, opts: &VerifyOptions) -> VerifyCliOutput {
    verify_bundle_dir(BundleKind::JobProofBundleV1, dir, opts)
}
pub fn verify_month_proof_bundle_dir(dir: &Path, opts: &VerifyOptions) -> VerifyCliOutput {
    verify_bundle_dir(BundleKind::MonthProofBundleV1, dir, opts)
}
pub fn verify_invoice_bundle_dir(dir: &Path, opts: &VerifyOptions) -> VerifyCliOutput {
    verify_bundle_dir(BundleKind::InvoiceBundleV1, dir, opts)
}
pub fn verify_finance_pack_bundle_dir(dir: &Path, opts: &VerifyOptions) -> VerifyCliOutput {
    verify_bundle_dir(BundleKind::FinancePackBundleV1, dir, opts)
}
pub fn verify_close_pack_bundle_dir(dir: &Path, opts: &VerifyOptions) -> VerifyCliOutput {
    verify_bundle_dir(BundleKind::ClosePackBundleV1, dir, opts)
}

/// Render `stableSlice(output)` for cross-implementation comparison.
pub fn stable_slice_of(output: &VerifyCliOutput) -> StableSlice {
    stable_slice(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spine_bundle::{build_job_proof_bundle_v1, Artifact, BundleParams, Signer};
    use spine_core::{Actor, BundleKindPolicy, ChainHashInput, RevocationEntry, SignerAllowlistEntry};
    use spine_policy::{PolicyBuilder, RevocationListBuilder};
    use std::collections::BTreeMap;

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

    /// Build and write a `JobProofBundle.v1` to `dir` using a caller-supplied
    /// signer, optionally carrying a governance policy and/or revocation
    /// list. Returns the genesis event's timestamp, so callers can build a
    /// revocation entry or rescue proof against the same signer and pass it
    /// in on a later call for the same `dir`.
    fn write_bundle_as(
        dir: &Path,
        signer: &Signer,
        record: &PublicKeyRecord,
        governance_policy: Option<GovernancePolicyV2>,
        revocation_list: Option<RevocationList>,
    ) -> DateTime<Utc> {
        let signer = signer.clone();
        let record = record.clone();
        let at: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let event = genesis_event(&signer, at);
        let mut keys = KeyTable::new();
        keys.insert(record.key_id.clone(), record.clone());
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
            governance_policy,
            revocation_list,
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
        at
    }

    fn write_bundle(dir: &Path) {
        let (signer, record) = signer_pair();
        write_bundle_as(dir, &signer, &record, None, None);
    }

    #[test]
    fn strict_verify_of_freshly_built_bundle_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        write_bundle(tmp.path());
        let output = verify_job_proof_bundle_dir(
            tmp.path(),
            &VerifyOptions {
                mode: VerifyMode::Strict,
                tool: ToolInfo { name: "t".into(), version: Some("1".into()), commit: Some("c".into()) },
                ..VerifyOptions::default()
            },
        );
        assert!(output.ok, "{:?}", output.errors);
    }

    #[test]
    fn tampering_with_an_event_flips_chain_hash_check() {
        let tmp = tempfile::tempdir().unwrap();
        write_bundle(tmp.path());
        let events_path = tmp.path().join("events/events.jsonl");
        let mut text = std::fs::read_to_string(&events_path).unwrap();
        text = text.replacen("\"JOB_CREATED\"", "\"JOB_TAMPERED\"", 1);
        std::fs::write(&events_path, text).unwrap();

        let output = verify_job_proof_bundle_dir(tmp.path(), &VerifyOptions::default());
        assert!(!output.ok);
        assert!(output.errors.iter().any(|e| e.code == ErrorCode::FileHashMismatch));
    }

    #[test]
    fn missing_verification_report_is_warning_in_non_strict_and_error_in_strict() {
        let tmp = tempfile::tempdir().unwrap();
        write_bundle(tmp.path());
        std::fs::remove_file(tmp.path().join("verify/verification_report.json")).unwrap();

        let non_strict = verify_job_proof_bundle_dir(tmp.path(), &VerifyOptions::default());
        assert!(non_strict.warnings.iter().any(|w| w.code == ErrorCode::ReportMissing));

        let strict = verify_job_proof_bundle_dir(
            tmp.path(),
            &VerifyOptions { mode: VerifyMode::Strict, ..VerifyOptions::default() },
        );
        assert!(strict.errors.iter().any(|e| e.code == ErrorCode::ReportMissing));
    }

    #[test]
    fn extra_undeclared_file_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write_bundle(tmp.path());
        std::fs::write(tmp.path().join("rogue.json"), b"{}").unwrap();
        let output = verify_job_proof_bundle_dir(tmp.path(), &VerifyOptions::default());
        assert!(output.errors.iter().any(|e| e.code == ErrorCode::UndeclaredFile));
    }

    /// S2: flipping one hex character of a stored `chainHash` is caught by
    /// the chain replay, independent of the raw-file hash check.
    #[test]
    fn flipped_chain_hash_hex_char_is_caught() {
        let tmp = tempfile::tempdir().unwrap();
        write_bundle(tmp.path());
        let events_path = tmp.path().join("events/events.jsonl");
        let text = std::fs::read_to_string(&events_path).unwrap();
        let mut value: Value = serde_json::from_str(text.trim()).unwrap();
        {
            let obj = value.as_object_mut().unwrap();
            let mut hash = obj["chainHash"].as_str().unwrap().to_string();
            let flipped = if hash.starts_with('0') { '1' } else { '0' };
            hash.replace_range(0..1, &flipped.to_string());
            obj.insert("chainHash".to_string(), Value::String(hash));
        }
        std::fs::write(&events_path, format!("{}\n", serde_json::to_string(&value).unwrap())).unwrap();

        let output = verify_job_proof_bundle_dir(tmp.path(), &VerifyOptions::default());
        assert!(!output.ok);
        assert!(output.errors.iter().any(|e| e.code == ErrorCode::ChainHashMismatch));
    }

    /// S3: an attestation whose `manifestHash` no longer matches the
    /// bundle's own manifest is rejected even though the attestation file
    /// itself is internally well-formed.
    #[test]
    fn attestation_manifest_binding_mismatch_is_caught() {
        let tmp = tempfile::tempdir().unwrap();
        write_bundle(tmp.path());
        let path = tmp.path().join("attestation/bundle_head_attestation.json");
        let mut value: Value = serde_json::from_str(std::fs::read_to_string(&path).unwrap().trim()).unwrap();
        value
            .as_object_mut()
            .unwrap()
            .insert("manifestHash".to_string(), Value::String("0".repeat(64)));
        std::fs::write(&path, format!("{}\n", serde_json::to_string(&value).unwrap())).unwrap();

        let output = verify_job_proof_bundle_dir(tmp.path(), &VerifyOptions::default());
        assert!(!output.ok);
        assert!(output.errors.iter().any(|e| e.code == ErrorCode::AttestationManifestBindingMismatch));
    }

    /// S4: a verification report whose `manifestHash` no longer binds to
    /// the bundle's manifest is rejected.
    #[test]
    fn report_binding_mismatch_is_caught() {
        let tmp = tempfile::tempdir().unwrap();
        write_bundle(tmp.path());
        let path = tmp.path().join("verify/verification_report.json");
        let mut value: Value = serde_json::from_str(std::fs::read_to_string(&path).unwrap().trim()).unwrap();
        value
            .as_object_mut()
            .unwrap()
            .insert("manifestHash".to_string(), Value::String("0".repeat(64)));
        std::fs::write(&path, format!("{}\n", serde_json::to_string(&value).unwrap())).unwrap();

        let output = verify_job_proof_bundle_dir(tmp.path(), &VerifyOptions::default());
        assert!(!output.ok);
        assert!(output.errors.iter().any(|e| e.code == ErrorCode::ReportBindingMismatch));
    }

    /// S5: a governance policy whose head-attestation allowlist does not
    /// name the bundle's actual signer denies that signer in strict mode.
    #[test]
    fn policy_denies_head_attestation_signer_not_on_allowlist() {
        let tmp = tempfile::tempdir().unwrap();
        let root_kp = spine_crypto::create_ed25519_keypair();
        let root_key_id = spine_crypto::key_id_from_public_key_pem(&root_kp.public_key_pem).unwrap();
        let denylisted_entry = SignerAllowlistEntry {
            subject_type: "server".into(),
            allowed_scopes: vec!["*".into()],
            allowed_key_ids: vec!["not-the-real-signer".into()],
            require_governed: true,
            required_purpose: None,
        };
        let policy = PolicyBuilder::new()
            .add_bundle_kind_policy(BundleKindPolicy {
                kind: BundleKind::JobProofBundleV1,
                bundle_head_attestation_signers: vec![denylisted_entry.clone()],
                verification_report_signers: vec![denylisted_entry],
            })
            .sign(root_key_id.clone(), &root_kp.private_key_pem)
            .unwrap();

        let (signer, record) = signer_pair();
        write_bundle_as(tmp.path(), &signer, &record, Some(policy), None);

        let mut roots = KeyTable::new();
        roots.insert(
            root_key_id.clone(),
            PublicKeyRecord {
                tenant_id: "governance".into(),
                key_id: root_key_id,
                public_key_pem: root_kp.public_key_pem,
                purpose: "governance_root".into(),
                server_governed: Some(true),
                valid_from: None,
                revoked_at: None,
            },
        );

        let output = verify_job_proof_bundle_dir(
            tmp.path(),
            &VerifyOptions {
                mode: VerifyMode::Strict,
                trust: TrustInputs { governance_roots: roots, time_authorities: KeyTable::new() },
                ..VerifyOptions::default()
            },
        );
        assert!(!output.ok);
        assert!(output.errors.iter().any(|e| e.code == ErrorCode::PolicySignerUnauthorized));
    }

    /// S6: a server-required actor's key revoked at-or-before the event it
    /// signed fails governance admission, since nothing rescues it with a
    /// time-authority proof. `check_revocation` only runs alongside policy
    /// admission in strict mode, so this needs an allow-listing policy too
    /// (otherwise only the chain-level `KeyRevoked` check would fire).
    #[test]
    fn revoked_signer_without_timeproof_fails_chain() {
        let tmp = tempfile::tempdir().unwrap();
        let root_kp = spine_crypto::create_ed25519_keypair();
        let root_key_id = spine_crypto::key_id_from_public_key_pem(&root_kp.public_key_pem).unwrap();
        let (signer, record) = signer_pair();
        let at: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();

        let allowed_entry = SignerAllowlistEntry {
            subject_type: "server".into(),
            allowed_scopes: vec!["*".into()],
            allowed_key_ids: vec![record.key_id.clone()],
            require_governed: true,
            required_purpose: None,
        };
        let policy = PolicyBuilder::new()
            .add_bundle_kind_policy(BundleKindPolicy {
                kind: BundleKind::JobProofBundleV1,
                bundle_head_attestation_signers: vec![allowed_entry.clone()],
                verification_report_signers: vec![allowed_entry],
            })
            .sign(root_key_id.clone(), &root_kp.private_key_pem)
            .unwrap();

        let revocation_list = RevocationListBuilder::new()
            .add_entry(RevocationEntry {
                key_id: record.key_id.clone(),
                revoked_at: at,
                reason: "rotation".into(),
                scope: "*".into(),
            })
            .sign(root_key_id.clone(), &root_kp.private_key_pem)
            .unwrap();

        write_bundle_as(tmp.path(), &signer, &record, Some(policy), Some(revocation_list));

        let mut roots = KeyTable::new();
        roots.insert(
            root_key_id.clone(),
            PublicKeyRecord {
                tenant_id: "governance".into(),
                key_id: root_key_id,
                public_key_pem: root_kp.public_key_pem,
                purpose: "governance_root".into(),
                server_governed: Some(true),
                valid_from: None,
                revoked_at: None,
            },
        );

        let output = verify_job_proof_bundle_dir(
            tmp.path(),
            &VerifyOptions {
                mode: VerifyMode::Strict,
                trust: TrustInputs { governance_roots: roots, time_authorities: KeyTable::new() },
                ..VerifyOptions::default()
            },
        );
        assert!(!output.ok);
        assert!(output.errors.iter().any(|e| e.code == ErrorCode::RevokedWithoutTimeproof), "{:?}", output.errors);
    }
}
