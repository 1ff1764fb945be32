// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Shared data model for the verifiable-settlement spine."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Types here carry no hashing or signing logic of their own — they are the
//! plain-data shapes that `spine-chain`, `spine-policy`, `spine-bundle`, and
//! `spine-verify` build, hash, sign, and check. Field names use `camelCase`
//! on the wire (via `serde(rename_all)`) so the JSON emitted here is
//! byte-identical in shape to what a second implementation would produce.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Envelope version for [`Event`].
pub const EVENT_ENVELOPE_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Actor / Event
// ---------------------------------------------------------------------------

/// Who produced an [`Event`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Actor {
    /// Actor kind, e.g. `"server"`, `"ops"`, `"robot"`, `"finance_agent"`.
    #[serde(rename = "type")]
    pub actor_type: String,
    /// Actor identifier within its kind.
    pub id: String,
}

impl Actor {
    /// Shorthand constructor.
    pub fn new(actor_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            actor_type: actor_type.into(),
            id: id.into(),
        }
    }

    /// Whether this actor's events require a server-governed signing key
    /// (events from `server`/`ops` actors are "server-required").
    #[must_use]
    pub fn is_server_required(&self) -> bool {
        matches!(self.actor_type.as_str(), "server" | "ops")
    }
}

/// A single hash-chained, signed event in a stream.
///
/// Produced only via [`spine_chain`](../spine_chain/index.html)'s
/// `create_event`/`finalize_event`/`append_event`; never constructed or
/// mutated by hand once appended.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Event {
    /// Envelope version.
    pub v: u32,
    /// Opaque string id, unique within the stream.
    pub id: String,
    /// RFC 3339 UTC timestamp.
    pub at: DateTime<Utc>,
    /// Stream identifier (job, month, governance, session, ...).
    #[serde(rename = "streamId")]
    pub stream_id: String,
    /// Event type tag.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Producer of the event.
    pub actor: Actor,
    /// Opaque payload; the spine never interprets its fields.
    pub payload: serde_json::Value,
    /// `SHA-256(canonical(payload))`.
    #[serde(rename = "payloadHash")]
    pub payload_hash: String,
    /// Chain hash of the previous event in the stream, or `None` for genesis.
    #[serde(rename = "prevChainHash")]
    pub prev_chain_hash: Option<String>,
    /// `SHA-256(canonical({v,id,at,streamId,type,actor,payloadHash,prevChainHash}))`.
    #[serde(rename = "chainHash")]
    pub chain_hash: String,
    /// Key id of the Ed25519 key that signed `chainHash`.
    #[serde(rename = "signerKeyId")]
    pub signer_key_id: String,
    /// Detached signature over the hex `chainHash` string.
    pub signature: String,
}

/// The subset of an [`Event`]'s fields that feed into its `chainHash`.
///
/// Exists as its own type so `spine-chain` can canonicalize exactly this
/// shape without accidentally including `chainHash`/`signerKeyId`/
/// `signature` in their own hash input.
#[derive(Debug, Clone, Serialize)]
pub struct ChainHashInput<'a> {
    /// Envelope version.
    pub v: u32,
    /// Event id.
    pub id: &'a str,
    /// Timestamp.
    pub at: DateTime<Utc>,
    /// Stream id.
    #[serde(rename = "streamId")]
    pub stream_id: &'a str,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: &'a str,
    /// Actor.
    pub actor: &'a Actor,
    /// Payload hash.
    #[serde(rename = "payloadHash")]
    pub payload_hash: &'a str,
    /// Previous chain hash.
    #[serde(rename = "prevChainHash")]
    pub prev_chain_hash: &'a Option<String>,
}

/// The projection of an [`Event`] stored in `events/payload_material.jsonl`:
/// everything except the chain/signature fields.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PayloadMaterial {
    /// Envelope version.
    pub v: u32,
    /// Event id.
    pub id: String,
    /// Timestamp.
    pub at: DateTime<Utc>,
    /// Stream id.
    #[serde(rename = "streamId")]
    pub stream_id: String,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Actor.
    pub actor: Actor,
    /// Opaque payload.
    pub payload: serde_json::Value,
}

impl From<&Event> for PayloadMaterial {
    fn from(e: &Event) -> Self {
        Self {
            v: e.v,
            id: e.id.clone(),
            at: e.at,
            stream_id: e.stream_id.clone(),
            event_type: e.event_type.clone(),
            actor: e.actor.clone(),
            payload: e.payload.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Public keys
// ---------------------------------------------------------------------------

/// A tenant's public key record.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
pub struct PublicKeyRecord {
    /// Owning tenant.
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    /// Deterministic key id (see `spine_crypto::key_id_from_public_key_pem`).
    #[serde(rename = "keyId")]
    pub key_id: String,
    /// PEM-encoded Ed25519 public key.
    #[serde(rename = "publicKeyPem")]
    pub public_key_pem: String,
    /// Key purpose, e.g. `"server"`, `"robot"`, `"finance_agent"`.
    pub purpose: String,
    /// Whether this key is governed by the originating server's key
    /// management (required for server-required event kinds).
    #[serde(rename = "serverGoverned", default, skip_serializing_if = "Option::is_none")]
    pub server_governed: Option<bool>,
    /// When the key became valid.
    #[serde(rename = "validFrom", default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    /// When the key was revoked, if it has been.
    #[serde(rename = "revokedAt", default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Read-only key resolver: `keyId -> PublicKeyRecord`.
pub type KeyTable = BTreeMap<String, PublicKeyRecord>;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Cached stream head, for fast consistency checks against a full replay.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Snapshot {
    /// Stream id this snapshot caches.
    pub id: String,
    /// Chain hash of the last event.
    #[serde(rename = "lastChainHash")]
    pub last_chain_hash: String,
    /// Id of the last event.
    #[serde(rename = "lastEventId")]
    pub last_event_id: String,
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// One file entry in a bundle [`Manifest`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileEntry {
    /// File path relative to the bundle root, using `/` separators.
    pub name: String,
    /// Lowercase hex SHA-256 of the file's bytes.
    pub sha256: String,
    /// File length in bytes.
    pub bytes: u64,
}

/// Which kind of bundle a manifest describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "PascalCase")]
pub enum BundleKind {
    /// `JobProofBundle.v1`
    #[serde(rename = "JobProofBundle.v1")]
    JobProofBundleV1,
    /// `MonthProofBundle.v1`
    #[serde(rename = "MonthProofBundle.v1")]
    MonthProofBundleV1,
    /// `FinancePackBundle.v1`
    #[serde(rename = "FinancePackBundle.v1")]
    FinancePackBundleV1,
    /// `InvoiceBundle.v1`
    #[serde(rename = "InvoiceBundle.v1")]
    InvoiceBundleV1,
    /// `ClosePackBundle.v1`
    #[serde(rename = "ClosePackBundle.v1")]
    ClosePackBundleV1,
}

impl BundleKind {
    /// Wire string form, e.g. `"JobProofBundle.v1"`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobProofBundleV1 => "JobProofBundle.v1",
            Self::MonthProofBundleV1 => "MonthProofBundle.v1",
            Self::FinancePackBundleV1 => "FinancePackBundle.v1",
            Self::InvoiceBundleV1 => "InvoiceBundle.v1",
            Self::ClosePackBundleV1 => "ClosePackBundle.v1",
        }
    }
}

impl std::fmt::Display for BundleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root index of a bundle's files.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Manifest {
    /// Schema version tag, e.g. `"Manifest.v1"`.
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    /// Bundle kind this manifest belongs to.
    pub kind: BundleKind,
    /// Owning tenant.
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    /// Scope identifiers (stream ids, period ids, ...) this bundle covers.
    pub scope: BTreeMap<String, String>,
    /// When the bundle was generated.
    #[serde(rename = "generatedAt")]
    pub generated_at: DateTime<Utc>,
    /// File index, sorted by `name` (locale-independent byte order).
    pub files: Vec<FileEntry>,
    /// `SHA-256(canonical(manifest without manifestHash))`. `None` until
    /// computed; always `Some` once embedded in a built bundle.
    #[serde(rename = "manifestHash", skip_serializing_if = "Option::is_none")]
    pub manifest_hash: Option<String>,
    /// Binding block for embedded sub-bundles (Finance wraps Month; Close
    /// wraps Invoice which wraps Job). Empty for bundle kinds that embed
    /// nothing.
    #[serde(
        rename = "embeddedBindings",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub embedded_bindings: Vec<EmbeddedBinding>,
}

/// Records that the sub-bundle placed under `prefix` has the given manifest
/// hash, so a verifier can recompute the inner manifest and compare.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct EmbeddedBinding {
    /// Fixed path prefix the sub-bundle's files are placed under, e.g.
    /// `"payload/job_proof_bundle/"`.
    pub prefix: String,
    /// The sub-bundle's own `manifestHash`.
    #[serde(rename = "manifestHash")]
    pub manifest_hash: String,
}

/// The unsigned fields of a [`Manifest`] that feed `manifestHash`.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestHashInput<'a> {
    /// Schema version tag.
    #[serde(rename = "schemaVersion")]
    pub schema_version: &'a str,
    /// Bundle kind.
    pub kind: BundleKind,
    /// Owning tenant.
    #[serde(rename = "tenantId")]
    pub tenant_id: &'a str,
    /// Scope identifiers.
    pub scope: &'a BTreeMap<String, String>,
    /// Generation time.
    #[serde(rename = "generatedAt")]
    pub generated_at: DateTime<Utc>,
    /// File index.
    pub files: &'a [FileEntry],
    /// Embedded sub-bundle bindings.
    #[serde(rename = "embeddedBindings", skip_serializing_if = "Vec::is_empty")]
    pub embedded_bindings: &'a [EmbeddedBinding],
}

impl Manifest {
    /// Build the hash input mirroring every field except `manifestHash`.
    pub fn hash_input(&self) -> ManifestHashInput<'_> {
        ManifestHashInput {
            schema_version: &self.schema_version,
            kind: self.kind,
            tenant_id: &self.tenant_id,
            scope: &self.scope,
            generated_at: self.generated_at,
            files: &self.files,
            embedded_bindings: &self.embedded_bindings,
        }
    }
}

// ---------------------------------------------------------------------------
// Head attestation
// ---------------------------------------------------------------------------

/// Short signed record binding a signer to a manifest hash at a time.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct HeadAttestation {
    /// Manifest hash this attestation binds to.
    #[serde(rename = "manifestHash")]
    pub manifest_hash: String,
    /// When the attestation was made.
    #[serde(rename = "attestedAt")]
    pub attested_at: DateTime<Utc>,
    /// Key id of the signer.
    #[serde(rename = "signerKeyId")]
    pub signer_key_id: String,
    /// Detached signature over `attestationHash`.
    pub signature: String,
    /// `SHA-256(canonical(attestation without {attestationHash, signature}))`.
    #[serde(rename = "attestationHash", skip_serializing_if = "Option::is_none")]
    pub attestation_hash: Option<String>,
}

/// The unsigned fields of a [`HeadAttestation`] that feed its hash.
#[derive(Debug, Clone, Serialize)]
pub struct AttestationHashInput<'a> {
    /// Manifest hash.
    #[serde(rename = "manifestHash")]
    pub manifest_hash: &'a str,
    /// Attestation time.
    #[serde(rename = "attestedAt")]
    pub attested_at: DateTime<Utc>,
    /// Signer key id.
    #[serde(rename = "signerKeyId")]
    pub signer_key_id: &'a str,
}

/// Minimal reference to a [`HeadAttestation`] embedded in a
/// [`VerificationReport`] binding.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AttestationRef {
    /// The bound attestation hash.
    #[serde(rename = "attestationHash")]
    pub attestation_hash: String,
}

// ---------------------------------------------------------------------------
// Verification report
// ---------------------------------------------------------------------------

/// Tool identity recorded in a [`VerificationReport`] or CLI output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ToolIdentity {
    /// Tool name, e.g. `"spine-verify"`.
    pub name: String,
    /// Tool version, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Source control commit, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

/// A single warning code (see the error taxonomy's warning/error split).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
pub struct WarningEntry {
    /// Stable warning code (reuses [`spine_error`]-style error codes).
    pub code: String,
    /// Bundle-relative path, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Producer-side replay summary, optionally embedded in a bundle.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct VerificationReport {
    /// Manifest hash this report was computed against.
    #[serde(rename = "manifestHash")]
    pub manifest_hash: String,
    /// Reference to the bundle's head attestation.
    #[serde(rename = "bundleHeadAttestation")]
    pub bundle_head_attestation: AttestationRef,
    /// Producer tool identity.
    pub tool: ToolIdentity,
    /// Warnings observed during the producer's own replay.
    pub warnings: Vec<WarningEntry>,
    /// `SHA-256(canonical(report without {reportHash, signature, signerKeyId, signedAt}))`.
    #[serde(rename = "reportHash", skip_serializing_if = "Option::is_none")]
    pub report_hash: Option<String>,
    /// Key id of the signer.
    #[serde(rename = "signerKeyId")]
    pub signer_key_id: String,
    /// Detached signature over `reportHash`.
    pub signature: String,
    /// When the report was signed.
    #[serde(rename = "signedAt")]
    pub signed_at: DateTime<Utc>,
}

/// The unsigned fields of a [`VerificationReport`] that feed `reportHash`.
#[derive(Debug, Clone, Serialize)]
pub struct ReportHashInput<'a> {
    /// Manifest hash.
    #[serde(rename = "manifestHash")]
    pub manifest_hash: &'a str,
    /// Attestation binding.
    #[serde(rename = "bundleHeadAttestation")]
    pub bundle_head_attestation: &'a AttestationRef,
    /// Tool identity.
    pub tool: &'a ToolIdentity,
    /// Warnings.
    pub warnings: &'a [WarningEntry],
}

// ---------------------------------------------------------------------------
// Governance policy v2
// ---------------------------------------------------------------------------

/// One allowlist entry for a signing surface (head attestation or
/// verification report) on a given [`BundleKind`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SignerAllowlistEntry {
    /// Free-form subject classification, e.g. `"server"`, `"finance_agent"`.
    #[serde(rename = "subjectType")]
    pub subject_type: String,
    /// Tenant ids (or `"*"` for global) this entry authorizes.
    #[serde(rename = "allowedScopes")]
    pub allowed_scopes: Vec<String>,
    /// Key ids authorized under this entry.
    #[serde(rename = "allowedKeyIds")]
    pub allowed_key_ids: Vec<String>,
    /// Whether the signing key must have `serverGoverned = true`.
    #[serde(rename = "requireGoverned", default)]
    pub require_governed: bool,
    /// Required key purpose, if any.
    #[serde(rename = "requiredPurpose", default, skip_serializing_if = "Option::is_none")]
    pub required_purpose: Option<String>,
}

/// Allowlists for a single [`BundleKind`]'s two signing surfaces.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct BundleKindPolicy {
    /// Which bundle kind this policy entry governs.
    pub kind: BundleKind,
    /// Signers authorized to sign `verify/verification_report.json`.
    #[serde(rename = "verificationReportSigners")]
    pub verification_report_signers: Vec<SignerAllowlistEntry>,
    /// Signers authorized to sign `attestation/bundle_head_attestation.json`.
    #[serde(rename = "bundleHeadAttestationSigners")]
    pub bundle_head_attestation_signers: Vec<SignerAllowlistEntry>,
}

/// Reference to an externally-stored revocation list, with its expected hash.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RevocationListRef {
    /// Path to the revocation list within the bundle.
    pub path: String,
    /// Expected SHA-256 of the revocation list file.
    pub sha256: String,
}

/// Governance policy document (v2): which keys may sign which bundle
/// surfaces, plus an optional revocation list reference.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct GovernancePolicyV2 {
    /// Schema version tag, e.g. `"GovernancePolicy.v2"`.
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    /// Per-bundle-kind signer allowlists.
    #[serde(rename = "bundleKindPolicies")]
    pub bundle_kind_policies: Vec<BundleKindPolicy>,
    /// Reference to the signed revocation list, if any.
    #[serde(rename = "revocationList", default, skip_serializing_if = "Option::is_none")]
    pub revocation_list: Option<RevocationListRef>,
    /// Accepted signature algorithms (informational, always includes `"ed25519"`).
    pub algorithms: Vec<String>,
    /// `SHA-256(canonical(policy without {policyHash, signature, signerKeyId, signedAt}))`.
    #[serde(rename = "policyHash", skip_serializing_if = "Option::is_none")]
    pub policy_hash: Option<String>,
    /// Key id of the governance root that signed this policy.
    #[serde(rename = "signerKeyId")]
    pub signer_key_id: String,
    /// Detached signature over `policyHash`.
    pub signature: String,
    /// When the policy was signed.
    #[serde(rename = "signedAt")]
    pub signed_at: DateTime<Utc>,
}

impl GovernancePolicyV2 {
    /// Look up the allowlist pair for a given bundle kind, if the policy
    /// names one.
    #[must_use]
    pub fn policy_for(&self, kind: BundleKind) -> Option<&BundleKindPolicy> {
        self.bundle_kind_policies.iter().find(|p| p.kind == kind)
    }
}

/// The unsigned fields of a [`GovernancePolicyV2`] that feed `policyHash`.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyHashInput<'a> {
    /// Schema version.
    #[serde(rename = "schemaVersion")]
    pub schema_version: &'a str,
    /// Per-kind policies.
    #[serde(rename = "bundleKindPolicies")]
    pub bundle_kind_policies: &'a [BundleKindPolicy],
    /// Revocation list reference.
    #[serde(rename = "revocationList", skip_serializing_if = "Option::is_none")]
    pub revocation_list: &'a Option<RevocationListRef>,
    /// Algorithms.
    pub algorithms: &'a [String],
}

// ---------------------------------------------------------------------------
// Revocation list
// ---------------------------------------------------------------------------

/// One key's revocation record.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RevocationEntry {
    /// Revoked key id.
    #[serde(rename = "keyId")]
    pub key_id: String,
    /// When the key was revoked.
    #[serde(rename = "revokedAt")]
    pub revoked_at: DateTime<Utc>,
    /// Human-readable reason.
    pub reason: String,
    /// Scope the revocation applies to (tenant id, or `"*"` for global).
    pub scope: String,
}

/// Signed list of revoked keys.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RevocationList {
    /// Revocation entries.
    pub entries: Vec<RevocationEntry>,
    /// `SHA-256(canonical(list without {revocationListHash, signature, signerKeyId, signedAt}))`.
    #[serde(rename = "revocationListHash", skip_serializing_if = "Option::is_none")]
    pub revocation_list_hash: Option<String>,
    /// Key id of the policy root that signed this list.
    #[serde(rename = "signerKeyId")]
    pub signer_key_id: String,
    /// Detached signature over `revocationListHash`.
    pub signature: String,
    /// When the list was signed.
    #[serde(rename = "signedAt")]
    pub signed_at: DateTime<Utc>,
}

impl RevocationList {
    /// Whether `key_id` is effectively revoked at time `t` (true once
    /// `revokedAt <= t`).
    #[must_use]
    pub fn is_revoked_at(&self, key_id: &str, t: DateTime<Utc>) -> Option<&RevocationEntry> {
        self.entries
            .iter()
            .find(|e| e.key_id == key_id && e.revoked_at <= t)
    }

    /// The revocation entry for `key_id`, if one exists, independent of any
    /// particular instant. Callers compare `revokedAt` against whatever
    /// reference time applies to them; this never reads the wall clock.
    #[must_use]
    pub fn entry_for(&self, key_id: &str) -> Option<&RevocationEntry> {
        self.entries.iter().find(|e| e.key_id == key_id)
    }
}

/// The unsigned fields of a [`RevocationList`] that feed `revocationListHash`.
#[derive(Debug, Clone, Serialize)]
pub struct RevocationListHashInput<'a> {
    /// Entries.
    pub entries: &'a [RevocationEntry],
}

// ---------------------------------------------------------------------------
// Timestamp authority proof
// ---------------------------------------------------------------------------

/// A trusted time-authority's attestation that some event genuinely
/// happened before a claimed boundary (used to rescue a revoked-key
/// check during verification).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TimestampProof {
    /// What this proof is attesting the time of (e.g. `"attestation"`,
    /// `"report"`, or an event id).
    pub subject: String,
    /// The time the time authority attests the subject occurred at.
    #[serde(rename = "attestedTime")]
    pub attested_time: DateTime<Utc>,
    /// `SHA-256(canonical(proof without {proofHash, signature, signerKeyId}))`.
    #[serde(rename = "proofHash", skip_serializing_if = "Option::is_none")]
    pub proof_hash: Option<String>,
    /// Key id of the time authority.
    #[serde(rename = "signerKeyId")]
    pub signer_key_id: String,
    /// Detached signature over `proofHash`.
    pub signature: String,
}

/// The unsigned fields of a [`TimestampProof`] that feed `proofHash`.
#[derive(Debug, Clone, Serialize)]
pub struct TimestampProofHashInput<'a> {
    /// Subject.
    pub subject: &'a str,
    /// Attested time.
    #[serde(rename = "attestedTime")]
    pub attested_time: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Identity transparency log (C8)
// ---------------------------------------------------------------------------

/// A leaf entry of the identity transparency log.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct IdentityLogEntry {
    /// Entry id.
    #[serde(rename = "entryId")]
    pub entry_id: String,
    /// Arbitrary entry payload (opaque, like [`Event::payload`]).
    pub payload: serde_json::Value,
}

/// Which side a sibling hash sits on when folding a Merkle path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Sibling is the left operand.
    Left,
    /// Sibling is the right operand.
    Right,
}

/// A single Merkle inclusion path element: sibling hash plus direction.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PathElement {
    /// Hex sibling hash.
    pub sibling: String,
    /// Which side `sibling` folds in from.
    pub direction: Direction,
}

/// Merkle inclusion proof for one [`IdentityLogEntry`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Inclusion {
    /// Hash of the leaf being proven.
    #[serde(rename = "leafHash")]
    pub leaf_hash: String,
    /// Sibling path from leaf to root.
    pub path: Vec<PathElement>,
    /// Total tree size at the time of proof generation.
    #[serde(rename = "treeSize")]
    pub tree_size: u64,
}

/// Signed log checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Checkpoint {
    /// Tree size at checkpoint time.
    #[serde(rename = "treeSize")]
    pub tree_size: u64,
    /// Merkle root at checkpoint time.
    #[serde(rename = "rootHash")]
    pub root_hash: String,
    /// `SHA-256(canonical(checkpoint without {checkpointHash, signature, signerKeyId}))`.
    #[serde(rename = "checkpointHash", skip_serializing_if = "Option::is_none")]
    pub checkpoint_hash: Option<String>,
    /// Key id of the log operator.
    #[serde(rename = "signerKeyId")]
    pub signer_key_id: String,
    /// Detached signature over `checkpointHash`.
    pub signature: String,
}

/// The unsigned fields of a [`Checkpoint`] that feed `checkpointHash`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointHashInput {
    /// Tree size.
    #[serde(rename = "treeSize")]
    pub tree_size: u64,
    /// Root hash.
    #[serde(rename = "rootHash")]
    pub root_hash: String,
}

/// A full identity-log inclusion proof: entry, path, and checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct IdentityLogProof {
    /// Entry id this proof covers.
    #[serde(rename = "entryId")]
    pub entry_id: String,
    /// Inclusion path.
    pub inclusion: Inclusion,
    /// Checkpoint the path was folded against.
    pub checkpoint: Checkpoint,
}
