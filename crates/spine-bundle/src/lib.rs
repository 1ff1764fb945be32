//! Deterministic proof-bundle assembly: lays out the fixed file tree for a
//! bundle kind, computes the manifest hash, signs a head attestation and
//! (optionally) a verification report, and exports the result as a
//! byte-stable zip archive.
//!
//! **Manifest scope.** `Manifest.files` covers the bundle's *content*
//! files only — events, keys, snapshots, governance documents, artifacts,
//! contracts, and any embedded sub-bundle's files. `manifest.json` itself,
//! `attestation/bundle_head_attestation.json`, and
//! `verify/verification_report.json` are produced *after* the manifest
//! hash is fixed and reference it rather than being listed inside it; that
//! is the only way to avoid the attestation needing to hash a manifest
//! that would have to already describe the attestation's own bytes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use spine_canon::{canonical_hash, to_canonical_bytes};
use spine_core::{
    AttestationHashInput, AttestationRef, Event, GovernancePolicyV2, HeadAttestation, KeyTable,
    Manifest, PayloadMaterial, PublicKeyRecord, ReportHashInput, RevocationList, Snapshot,
    TimestampProof, TimestampProofHashInput, ToolIdentity, VerificationReport, WarningEntry,
};
use spine_error::{ErrorCode, SpineError};

pub use spine_core::BundleKind;

mod zipexport;
pub use zipexport::{write_zip, ZipCompression};

/// A single signer used to build one document kind (attestation, report,
/// policy, ...).
#[derive(Debug, Clone)]
pub struct Signer {
    pub key_id: String,
    pub private_key_pem: String,
}

/// An artifact payload to embed under `artifacts/<artifactId>.json`. `value`
/// must be a JSON object; any pre-existing `artifactHash` field is replaced.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub artifact_id: String,
    pub value: Value,
}

/// Inputs to a single bundle build. Shared across all five bundle kinds;
/// fields that don't apply to a kind (e.g. `governance_policy` for a bare
/// `JobProofBundle.v1`) are simply left `None`/empty.
#[derive(Debug, Clone)]
pub struct BundleParams {
    pub tenant_id: String,
    pub scope: BTreeMap<String, String>,
    pub events: Vec<Event>,
    pub snapshot: Snapshot,
    pub artifacts: Vec<Artifact>,
    pub contract_docs_by_hash: BTreeMap<String, Value>,
    pub public_key_by_key_id: KeyTable,
    pub manifest_signer: Signer,
    pub verification_report_signer: Option<Signer>,
    pub governance_policy: Option<GovernancePolicyV2>,
    pub revocation_list: Option<RevocationList>,
    pub timestamp_proof: Option<TimestampProof>,
    pub tool_version: Option<String>,
    pub tool_commit: Option<String>,
    pub require_head_attestation: bool,
    pub generated_at: DateTime<Utc>,
    pub attested_at: DateTime<Utc>,
}

/// Output of a single bundle build: every file's bytes, keyed by its
/// bundle-relative path, plus the manifest that was computed for it.
#[derive(Debug, Clone)]
pub struct BuiltBundle {
    pub files: BTreeMap<String, Vec<u8>>,
    pub manifest: Manifest,
}

impl BuiltBundle {
    /// The manifest hash this bundle was built and signed against.
    pub fn manifest_hash(&self) -> &str {
        self.manifest
            .manifest_hash
            .as_deref()
            .expect("build_bundle always fills manifest_hash before returning")
    }
}

#[derive(Serialize)]
struct PublicKeysFile {
    keys: Vec<PublicKeyRecord>,
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

fn encode_json_line(value: &impl Serialize) -> Result<Vec<u8>, SpineError> {
    let mut bytes = to_canonical_bytes(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn encode_jsonl<T: Serialize>(items: impl Iterator<Item = T>) -> Result<Vec<u8>, SpineError> {
    let mut out = Vec::new();
    for item in items {
        out.extend(to_canonical_bytes(&item)?);
        out.push(b'\n');
    }
    Ok(out)
}

fn finalize_artifact(mut value: Value) -> Result<Value, SpineError> {
    let obj = value.as_object_mut().ok_or_else(|| {
        SpineError::new(ErrorCode::InputInvalid, "artifact value must be a JSON object")
    })?;
    obj.remove("artifactHash");
    let hash = canonical_hash(&value)?;
    value
        .as_object_mut()
        .expect("checked above")
        .insert("artifactHash".to_string(), Value::String(hash));
    Ok(value)
}

/// A reference to an already-built sub-bundle, to be embedded under a fixed
/// path prefix inside a wrapping bundle (Finance wraps Month; Close wraps
/// Invoice which wraps Job).
pub struct EmbeddedSubBundle<'a> {
    pub prefix: &'static str,
    pub bundle: &'a BuiltBundle,
}

fn build_bundle(
    kind: BundleKind,
    params: &BundleParams,
    embedded: Option<EmbeddedSubBundle<'_>>,
) -> Result<BuiltBundle, SpineError> {
    let mut files: BTreeMap<String, Vec<u8>> = BTreeMap::new();

    files.insert(
        "events/events.jsonl".to_string(),
        encode_jsonl(params.events.iter().cloned())?,
    );
    let payload_material: Vec<PayloadMaterial> = params.events.iter().map(PayloadMaterial::from).collect();
    files.insert(
        "events/payload_material.jsonl".to_string(),
        encode_jsonl(payload_material.into_iter())?,
    );

    let mut keys: Vec<PublicKeyRecord> = params.public_key_by_key_id.values().cloned().collect();
    keys.sort_by(|a, b| a.key_id.cmp(&b.key_id));
    files.insert(
        "keys/public_keys.json".to_string(),
        encode_json_line(&PublicKeysFile { keys })?,
    );

    let stream_dir = stream_dir_for_kind(kind);
    files.insert(format!("{stream_dir}/snapshot.json"), encode_json_line(&params.snapshot)?);

    if let Some(policy) = &params.governance_policy {
        files.insert("governance/policy.json".to_string(), encode_json_line(policy)?);
    }
    if let Some(revocations) = &params.revocation_list {
        files.insert("governance/revocations.json".to_string(), encode_json_line(revocations)?);
    }
    if let Some(proof) = &params.timestamp_proof {
        files.insert("attestation/timestamp_proof.json".to_string(), encode_json_line(proof)?);
    }

    for artifact in &params.artifacts {
        let finalized = finalize_artifact(artifact.value.clone())?;
        files.insert(format!("artifacts/{}.json", artifact.artifact_id), encode_json_line(&finalized)?);
    }

    for (hash, doc) in &params.contract_docs_by_hash {
        files.insert(format!("contracts/{hash}.json"), encode_json_line(doc)?);
    }

    let mut embedded_bindings = Vec::new();
    if let Some(sub) = embedded {
        for (name, bytes) in &sub.bundle.files {
            files.insert(format!("{}{name}", sub.prefix), bytes.clone());
        }
        embedded_bindings.push(spine_core::EmbeddedBinding {
            prefix: sub.prefix.to_string(),
            manifest_hash: sub.bundle.manifest_hash().to_string(),
        });
    }

    let mut file_entries: Vec<spine_core::FileEntry> = files
        .iter()
        .map(|(name, bytes)| spine_core::FileEntry {
            name: name.clone(),
            sha256: spine_canon::sha256_hex(bytes),
            bytes: bytes.len() as u64,
        })
        .collect();
    file_entries.sort_by(|a, b| a.name.cmp(&b.name));

    let mut manifest = Manifest {
        schema_version: "Manifest.v1".to_string(),
        kind,
        tenant_id: params.tenant_id.clone(),
        scope: params.scope.clone(),
        generated_at: params.generated_at,
        files: file_entries,
        manifest_hash: None,
        embedded_bindings,
    };
    let manifest_hash = canonical_hash(&manifest.hash_input())?;
    manifest.manifest_hash = Some(manifest_hash.clone());
    files.insert("manifest.json".to_string(), encode_json_line(&manifest)?);

    if params.require_head_attestation {
        let attestation_input = AttestationHashInput {
            manifest_hash: &manifest_hash,
            attested_at: params.attested_at,
            signer_key_id: &params.manifest_signer.key_id,
        };
        let attestation_hash = canonical_hash(&attestation_input)?;
        let signature = spine_crypto::sign_digest_hex(
            &params.manifest_signer.private_key_pem,
            &attestation_hash,
        )?;
        let attestation = HeadAttestation {
            manifest_hash: manifest_hash.clone(),
            attested_at: params.attested_at,
            signer_key_id: params.manifest_signer.key_id.clone(),
            signature,
            attestation_hash: Some(attestation_hash.clone()),
        };
        files.insert(
            "attestation/bundle_head_attestation.json".to_string(),
            encode_json_line(&attestation)?,
        );

        if let Some(report_signer) = &params.verification_report_signer {
            let tool = ToolIdentity {
                name: "spine-bundle".to_string(),
                version: params.tool_version.clone(),
                commit: params.tool_commit.clone(),
            };
            let attestation_ref = AttestationRef { attestation_hash: attestation_hash.clone() };
            let report_input = ReportHashInput {
                manifest_hash: &manifest_hash,
                bundle_head_attestation: &attestation_ref,
                tool: &tool,
                warnings: &[],
            };
            let report_hash = canonical_hash(&report_input)?;
            let signature =
                spine_crypto::sign_digest_hex(&report_signer.private_key_pem, &report_hash)?;
            let report = VerificationReport {
                manifest_hash: manifest_hash.clone(),
                bundle_head_attestation: attestation_ref,
                tool,
                warnings: Vec::<WarningEntry>::new(),
                report_hash: Some(report_hash),
                signer_key_id: report_signer.key_id.clone(),
                signature,
                signed_at: params.attested_at,
            };
            files.insert(
                "verify/verification_report.json".to_string(),
                encode_json_line(&report)?,
            );
        }
    }

    Ok(BuiltBundle { files, manifest })
}

pub fn build_job_proof_bundle_v1(params: &BundleParams) -> Result<BuiltBundle, SpineError> {
    build_bundle(BundleKind::JobProofBundleV1, params, None)
}

pub fn build_month_proof_bundle_v1(params: &BundleParams) -> Result<BuiltBundle, SpineError> {
    build_bundle(BundleKind::MonthProofBundleV1, params, None)
}

pub fn build_invoice_bundle_v1(
    params: &BundleParams,
    job_bundle: &BuiltBundle,
) -> Result<BuiltBundle, SpineError> {
    build_bundle(
        BundleKind::InvoiceBundleV1,
        params,
        Some(EmbeddedSubBundle { prefix: "payload/job_proof_bundle/", bundle: job_bundle }),
    )
}

pub fn build_finance_pack_bundle_v1(
    params: &BundleParams,
    month_bundle: &BuiltBundle,
) -> Result<BuiltBundle, SpineError> {
    build_bundle(
        BundleKind::FinancePackBundleV1,
        params,
        Some(EmbeddedSubBundle { prefix: "payload/month_proof_bundle/", bundle: month_bundle }),
    )
}

pub fn build_close_pack_bundle_v1(
    params: &BundleParams,
    invoice_bundle: &BuiltBundle,
) -> Result<BuiltBundle, SpineError> {
    build_bundle(
        BundleKind::ClosePackBundleV1,
        params,
        Some(EmbeddedSubBundle { prefix: "payload/invoice_bundle/", bundle: invoice_bundle }),
    )
}

/// Sign a `TimestampProof` asserting `subject` was true no later than
/// `attested_time`, usable to rescue a server-required signer from an
/// otherwise-fatal revocation.
pub fn sign_timestamp_proof(
    subject: &str,
    attested_time: DateTime<Utc>,
    signer: &Signer,
) -> Result<TimestampProof, SpineError> {
    let input = TimestampProofHashInput { subject, attested_time };
    let hash = canonical_hash(&input)?;
    let signature = spine_crypto::sign_digest_hex(&signer.private_key_pem, &hash)?;
    Ok(TimestampProof {
        subject: subject.to_string(),
        attested_time,
        proof_hash: Some(hash),
        signer_key_id: signer.key_id.clone(),
        signature,
    })
}
