// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Unified error taxonomy with stable error codes for the settlement spine."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Every spine error carries a stable [`ErrorCode`] (a machine-readable tag
//! that also appears verbatim in [`spine-report`](../spine_report/index.html)
//! output), a human-readable message, an optional cause chain, and an
//! optional `path` pinpointing the offending bundle entry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bundle file integrity (hash/size/presence) errors.
    File,
    /// Manifest hash errors.
    Manifest,
    /// Event chain integrity errors.
    Chain,
    /// Head attestation errors.
    Attestation,
    /// Verification report errors.
    Report,
    /// Governance policy errors.
    Policy,
    /// Revocation list errors.
    Revocation,
    /// Embedded artifact hash errors.
    Artifact,
    /// Embedded sub-bundle binding errors.
    Embedded,
    /// Identity transparency log proof errors.
    IdentityLog,
    /// Catch-all for input validation / cancellation / tooling metadata.
    Other,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::File => "file",
            Self::Manifest => "manifest",
            Self::Chain => "chain",
            Self::Attestation => "attestation",
            Self::Report => "report",
            Self::Policy => "policy",
            Self::Revocation => "revocation",
            Self::Artifact => "artifact",
            Self::Embedded => "embedded",
            Self::IdentityLog => "identity_log",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serializes to the exact `SCREAMING_SNAKE_CASE` wire string
/// named in the verification report schema; these strings are part of the
/// cross-implementation conformance surface and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- File --
    /// A file listed in the manifest is missing from the bundle.
    MissingFile,
    /// A file exists in the bundle but is not listed in the manifest.
    UndeclaredFile,
    /// A file's recomputed SHA-256 does not match the manifest entry.
    FileHashMismatch,
    /// A file's byte length does not match the manifest entry.
    FileSizeMismatch,

    // -- Manifest --
    /// The manifest's own hash does not recompute.
    ManifestHashMismatch,

    // -- Chain --
    /// An event's payload hash does not recompute.
    PayloadHashMismatch,
    /// An event's chain hash does not recompute.
    ChainHashMismatch,
    /// An event's `prevChainHash` does not match its predecessor.
    PrevChainHashMismatch,
    /// An event or attestation signature fails to verify.
    SignatureInvalid,
    /// A signer key id does not resolve in the key table.
    KeyUnknown,
    /// A signer key is revoked at the relevant time.
    KeyRevoked,
    /// A signer key's purpose does not match the required purpose.
    PurposeMismatch,

    // -- Attestation --
    /// The head attestation's own hash does not recompute.
    AttestationHashMismatch,
    /// The head attestation signature fails to verify.
    AttestationSignatureInvalid,
    /// The attestation's `manifestHash` does not equal the bundle manifest hash.
    AttestationManifestBindingMismatch,

    // -- Report --
    /// The verification report signature fails to verify.
    ReportSignatureInvalid,
    /// The report's bindings to manifest/attestation hash are inconsistent.
    ReportBindingMismatch,
    /// The report signer is not authorized under governance policy.
    ReportSignerUnauthorized,
    /// Strict mode requires a verification report and none is present.
    ReportMissing,

    // -- Policy --
    /// The governance policy signature fails to verify.
    PolicySignatureInvalid,
    /// The policy's signing root is not in the trusted governance-root set.
    PolicyRootUntrusted,
    /// A signer is not authorized for the surface it signed under policy.
    PolicySignerUnauthorized,

    // -- Revocation --
    /// The revocation list signature fails to verify.
    RevocationSignatureInvalid,
    /// A key is revoked and no valid time-authority proof rescues it.
    RevokedWithoutTimeproof,

    // -- Artifact --
    /// An embedded artifact's recomputed hash does not match its declared hash.
    ArtifactHashMismatch,

    // -- Embedded --
    /// An outer bundle's binding to an embedded sub-bundle's manifest hash mismatches.
    EmbeddedBindingMismatch,

    // -- Identity transparency log (C8) --
    /// The inclusion proof structure is malformed.
    ProofMalformed,
    /// The recomputed leaf hash does not match the entry.
    LeafHashMismatch,
    /// The recomputed Merkle root does not match the checkpoint.
    RootHashMismatch,
    /// The checkpoint signature fails to verify under the trusted log-operator set.
    CheckpointSignatureInvalid,
    /// The proof's entry id does not match the requested entry.
    EntryIdMismatch,

    // -- Other --
    /// Caller-supplied input is structurally invalid.
    InputInvalid,
    /// The operation was cancelled via its cancellation token.
    Cancelled,
    /// The verifier's own tool version is unknown (informational unless strict).
    ToolVersionUnknown,
    /// The verifier's own tool commit is unknown (informational unless strict).
    ToolCommitUnknown,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        use ErrorCode::*;
        match self {
            MissingFile | UndeclaredFile | FileHashMismatch | FileSizeMismatch => {
                ErrorCategory::File
            }
            ManifestHashMismatch => ErrorCategory::Manifest,
            PayloadHashMismatch
            | ChainHashMismatch
            | PrevChainHashMismatch
            | SignatureInvalid
            | KeyUnknown
            | KeyRevoked
            | PurposeMismatch => ErrorCategory::Chain,
            AttestationHashMismatch
            | AttestationSignatureInvalid
            | AttestationManifestBindingMismatch => ErrorCategory::Attestation,
            ReportSignatureInvalid
            | ReportBindingMismatch
            | ReportSignerUnauthorized
            | ReportMissing => ErrorCategory::Report,
            PolicySignatureInvalid | PolicyRootUntrusted | PolicySignerUnauthorized => {
                ErrorCategory::Policy
            }
            RevocationSignatureInvalid | RevokedWithoutTimeproof => ErrorCategory::Revocation,
            ArtifactHashMismatch => ErrorCategory::Artifact,
            EmbeddedBindingMismatch => ErrorCategory::Embedded,
            ProofMalformed | LeafHashMismatch | RootHashMismatch | CheckpointSignatureInvalid
            | EntryIdMismatch => ErrorCategory::IdentityLog,
            InputInvalid | Cancelled | ToolVersionUnknown | ToolCommitUnknown => {
                ErrorCategory::Other
            }
        }
    }

    /// Stable `&'static str` representation (e.g. `"FILE_HASH_MISMATCH"`).
    pub fn as_str(&self) -> &'static str {
        use ErrorCode::*;
        match self {
            MissingFile => "MISSING_FILE",
            UndeclaredFile => "UNDECLARED_FILE",
            FileHashMismatch => "FILE_HASH_MISMATCH",
            FileSizeMismatch => "FILE_SIZE_MISMATCH",
            ManifestHashMismatch => "MANIFEST_HASH_MISMATCH",
            PayloadHashMismatch => "PAYLOAD_HASH_MISMATCH",
            ChainHashMismatch => "CHAIN_HASH_MISMATCH",
            PrevChainHashMismatch => "PREV_CHAIN_HASH_MISMATCH",
            SignatureInvalid => "SIGNATURE_INVALID",
            KeyUnknown => "KEY_UNKNOWN",
            KeyRevoked => "KEY_REVOKED",
            PurposeMismatch => "PURPOSE_MISMATCH",
            AttestationHashMismatch => "ATTESTATION_HASH_MISMATCH",
            AttestationSignatureInvalid => "ATTESTATION_SIGNATURE_INVALID",
            AttestationManifestBindingMismatch => "ATTESTATION_MANIFEST_BINDING_MISMATCH",
            ReportSignatureInvalid => "REPORT_SIGNATURE_INVALID",
            ReportBindingMismatch => "REPORT_BINDING_MISMATCH",
            ReportSignerUnauthorized => "REPORT_SIGNER_UNAUTHORIZED",
            ReportMissing => "REPORT_MISSING",
            PolicySignatureInvalid => "POLICY_SIGNATURE_INVALID",
            PolicyRootUntrusted => "POLICY_ROOT_UNTRUSTED",
            PolicySignerUnauthorized => "POLICY_SIGNER_UNAUTHORIZED",
            RevocationSignatureInvalid => "REVOCATION_SIGNATURE_INVALID",
            RevokedWithoutTimeproof => "REVOKED_WITHOUT_TIMEPROOF",
            ArtifactHashMismatch => "ARTIFACT_HASH_MISMATCH",
            EmbeddedBindingMismatch => "EMBEDDED_BINDING_MISMATCH",
            ProofMalformed => "PROOF_MALFORMED",
            LeafHashMismatch => "LEAF_HASH_MISMATCH",
            RootHashMismatch => "ROOT_HASH_MISMATCH",
            CheckpointSignatureInvalid => "CHECKPOINT_SIGNATURE_INVALID",
            EntryIdMismatch => "ENTRY_ID_MISMATCH",
            InputInvalid => "INPUT_INVALID",
            Cancelled => "CANCELLED",
            ToolVersionUnknown => "TOOL_VERSION_UNKNOWN",
            ToolCommitUnknown => "TOOL_COMMIT_UNKNOWN",
        }
    }

    /// Whether this code is informational-only in non-strict mode.
    ///
    /// Strict mode promotes these to hard errors; fail-on-warnings promotes
    /// them regardless of mode.
    pub fn is_warning_in_non_strict(&self) -> bool {
        matches!(
            self,
            ErrorCode::ReportMissing | ErrorCode::ToolVersionUnknown | ErrorCode::ToolCommitUnknown
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SpineError
// ---------------------------------------------------------------------------

/// Unified spine error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// bundle-relative `path`, an optional underlying cause, and arbitrary
/// structured context.
///
/// # Examples
///
/// ```
/// use spine_error::{SpineError, ErrorCode};
///
/// let err = SpineError::new(ErrorCode::FileHashMismatch, "sha256 mismatch")
///     .with_path("events/events.jsonl")
///     .with_context("expected", "ab12..");
/// assert_eq!(err.code, ErrorCode::FileHashMismatch);
/// ```
pub struct SpineError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Bundle-relative path the error pertains to, if any.
    pub path: Option<String>,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl SpineError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach the bundle-relative path this error pertains to.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialization
    /// fails, the entry is silently skipped.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Debug for SpineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("SpineError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref p) = self.path {
            d.field("path", p);
        }
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for SpineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if let Some(ref p) = self.path {
            write!(f, " at {p}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SpineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Serializable snapshot of a [`SpineError`] for inclusion in reports
/// (see `spine-report`'s `VerifyCliOutput.v1.errors[]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct ErrorEntry {
    /// Error code.
    pub code: ErrorCode,
    /// Bundle-relative path, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Human-readable message.
    pub message: String,
}

impl From<&SpineError> for ErrorEntry {
    fn from(err: &SpineError) -> Self {
        Self {
            code: err.code,
            path: err.path.clone(),
            message: err.message.clone(),
        }
    }
}
