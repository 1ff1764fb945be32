// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Governance policy v2: signer authorization and document signing."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! A [`GovernancePolicyV2`] document names, per [`BundleKind`], which keys
//! may sign a bundle's head attestation and verification report. This
//! crate has two independent halves: [`PolicyBuilder`]/[`RevocationListBuilder`]
//! build and sign those documents; [`verify_policy_document`] and
//! [`PolicyEngine`] check a document's own integrity and then decide
//! whether a given signer is authorized under it.
//!
//! Authorization never trusts a policy document that hasn't already passed
//! [`verify_policy_document`] — the two halves are split so a caller can't
//! accidentally skip the integrity check and go straight to authorization.

use chrono::Utc;
use spine_core::{
    BundleKind, BundleKindPolicy, GovernancePolicyV2, KeyTable, PolicyHashInput, PublicKeyRecord,
    RevocationEntry, RevocationList, RevocationListHashInput, RevocationListRef,
};
use spine_error::{ErrorCode, SpineError};

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Outcome of an authorization check, with a human-readable reason on denial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the subject is authorized.
    pub allowed: bool,
    /// Why the decision came out this way, set only on denial.
    pub reason: Option<String>,
}

impl Decision {
    /// An authorized decision.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    /// A denied decision with a reason.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Which signing surface of a bundle an authorization check is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// `attestation/bundle_head_attestation.json`.
    HeadAttestation,
    /// `verify/verification_report.json`.
    VerificationReport,
}

// ---------------------------------------------------------------------------
// PolicyEngine — authorization against an already-verified policy document
// ---------------------------------------------------------------------------

/// Evaluates signer authorization against a [`GovernancePolicyV2`] document.
///
/// Construct only from a policy that has already passed
/// [`verify_policy_document`]; this type performs no integrity or trust
/// checking of its own.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    policy: GovernancePolicyV2,
}

impl PolicyEngine {
    /// Wrap an already-verified policy document.
    #[must_use]
    pub fn new(policy: GovernancePolicyV2) -> Self {
        Self { policy }
    }

    /// Decide whether `key`, signing for `tenant_id` on `kind`'s `surface`,
    /// is authorized under this policy.
    #[must_use]
    pub fn authorize(
        &self,
        kind: BundleKind,
        surface: Surface,
        tenant_id: &str,
        key: &PublicKeyRecord,
    ) -> Decision {
        let Some(kind_policy) = self.policy.policy_for(kind) else {
            return Decision::deny(format!("no policy entry for bundle kind {kind}"));
        };
        let entries = match surface {
            Surface::HeadAttestation => &kind_policy.bundle_head_attestation_signers,
            Surface::VerificationReport => &kind_policy.verification_report_signers,
        };

        // A signer is authorized iff *some* allowlist entry names this exact
        // keyId and all of that entry's other constraints hold. `subjectType`
        // is descriptive only; it does not itself select the entry.
        let matches = entries.iter().any(|entry| {
            entry.allowed_key_ids.iter().any(|k| k == &key.key_id)
                && (!entry.require_governed || key.server_governed == Some(true))
                && entry
                    .required_purpose
                    .as_ref()
                    .is_none_or(|p| p == &key.purpose)
                && entry.allowed_scopes.iter().any(|s| s == "*" || s == tenant_id)
        });

        if matches {
            Decision::allow()
        } else {
            Decision::deny(format!(
                "key '{}' is not authorized for {surface:?} on bundle kind {kind}",
                key.key_id
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Integrity / trust verification of the policy document itself
// ---------------------------------------------------------------------------

/// Verify a [`GovernancePolicyV2`] document's own hash, signer trust, and
/// signature, without evaluating any particular signer's authorization.
///
/// # Errors
///
/// - [`ErrorCode::PolicySignatureInvalid`] if `policyHash` does not
///   recompute, or the signature fails to verify.
/// - [`ErrorCode::PolicyRootUntrusted`] if `signerKeyId` is not in
///   `trusted_roots`.
pub fn verify_policy_document(
    policy: &GovernancePolicyV2,
    trusted_roots: &KeyTable,
) -> Result<(), SpineError> {
    let input = PolicyHashInput {
        schema_version: &policy.schema_version,
        bundle_kind_policies: &policy.bundle_kind_policies,
        revocation_list: &policy.revocation_list,
        algorithms: &policy.algorithms,
    };
    let expected_hash = spine_canon::canonical_hash(&input)?;
    if policy.policy_hash.as_deref() != Some(expected_hash.as_str()) {
        return Err(SpineError::new(
            ErrorCode::PolicySignatureInvalid,
            "policyHash does not recompute",
        ));
    }

    let Some(root) = trusted_roots.get(&policy.signer_key_id) else {
        return Err(SpineError::new(
            ErrorCode::PolicyRootUntrusted,
            "policy signer is not a trusted governance root",
        ));
    };

    match spine_crypto::verify_digest_hex(&root.public_key_pem, &expected_hash, &policy.signature) {
        Ok(true) => Ok(()),
        Ok(false) => Err(SpineError::new(
            ErrorCode::PolicySignatureInvalid,
            "policy signature does not verify",
        )),
        Err(e) => Err(e),
    }
}

/// Verify a [`RevocationList`] document's own hash, signer trust, and
/// signature.
///
/// # Errors
///
/// - [`ErrorCode::RevocationSignatureInvalid`] if `revocationListHash` does
///   not recompute or the signature fails to verify.
/// - [`ErrorCode::PolicyRootUntrusted`] if `signerKeyId` is not in
///   `trusted_roots` (revocation lists are signed by the same policy root
///   key set).
pub fn verify_revocation_list(
    list: &RevocationList,
    trusted_roots: &KeyTable,
) -> Result<(), SpineError> {
    let input = RevocationListHashInput {
        entries: &list.entries,
    };
    let expected_hash = spine_canon::canonical_hash(&input)?;
    if list.revocation_list_hash.as_deref() != Some(expected_hash.as_str()) {
        return Err(SpineError::new(
            ErrorCode::RevocationSignatureInvalid,
            "revocationListHash does not recompute",
        ));
    }

    let Some(root) = trusted_roots.get(&list.signer_key_id) else {
        return Err(SpineError::new(
            ErrorCode::PolicyRootUntrusted,
            "revocation list signer is not a trusted governance root",
        ));
    };

    match spine_crypto::verify_digest_hex(&root.public_key_pem, &expected_hash, &list.signature) {
        Ok(true) => Ok(()),
        Ok(false) => Err(SpineError::new(
            ErrorCode::RevocationSignatureInvalid,
            "revocation list signature does not verify",
        )),
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Fluent builder for constructing and signing a [`GovernancePolicyV2`].
#[derive(Debug, Default)]
pub struct PolicyBuilder {
    bundle_kind_policies: Vec<BundleKindPolicy>,
    revocation_list: Option<RevocationListRef>,
    algorithms: Vec<String>,
}

impl PolicyBuilder {
    /// Start a new policy document builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bundle_kind_policies: Vec::new(),
            revocation_list: None,
            algorithms: vec!["ed25519".to_string()],
        }
    }

    /// Add a per-bundle-kind signer allowlist pair.
    #[must_use]
    pub fn add_bundle_kind_policy(mut self, policy: BundleKindPolicy) -> Self {
        self.bundle_kind_policies.push(policy);
        self
    }

    /// Reference a signed revocation list.
    #[must_use]
    pub fn revocation_list(mut self, reference: RevocationListRef) -> Self {
        self.revocation_list = Some(reference);
        self
    }

    /// Sign and produce the final [`GovernancePolicyV2`] document.
    ///
    /// # Errors
    ///
    /// Returns [`SpineError`] if the unsigned fields cannot be canonicalized
    /// or `private_key_pem` does not parse.
    pub fn sign(
        self,
        signer_key_id: impl Into<String>,
        private_key_pem: &str,
    ) -> Result<GovernancePolicyV2, SpineError> {
        let schema_version = "GovernancePolicy.v2".to_string();
        let input = PolicyHashInput {
            schema_version: &schema_version,
            bundle_kind_policies: &self.bundle_kind_policies,
            revocation_list: &self.revocation_list,
            algorithms: &self.algorithms,
        };
        let policy_hash = spine_canon::canonical_hash(&input)?;
        let signature = spine_crypto::sign_digest_hex(private_key_pem, &policy_hash)?;
        Ok(GovernancePolicyV2 {
            schema_version,
            bundle_kind_policies: self.bundle_kind_policies,
            revocation_list: self.revocation_list,
            algorithms: self.algorithms,
            policy_hash: Some(policy_hash),
            signer_key_id: signer_key_id.into(),
            signature,
            signed_at: Utc::now(),
        })
    }
}

/// Fluent builder for constructing and signing a [`RevocationList`].
#[derive(Debug, Default)]
pub struct RevocationListBuilder {
    entries: Vec<RevocationEntry>,
}

impl RevocationListBuilder {
    /// Start a new, empty revocation list builder.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Add a revoked-key entry.
    #[must_use]
    pub fn add_entry(mut self, entry: RevocationEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Sign and produce the final [`RevocationList`] document.
    ///
    /// # Errors
    ///
    /// Returns [`SpineError`] if the unsigned fields cannot be canonicalized
    /// or `private_key_pem` does not parse.
    pub fn sign(
        self,
        signer_key_id: impl Into<String>,
        private_key_pem: &str,
    ) -> Result<RevocationList, SpineError> {
        let input = RevocationListHashInput {
            entries: &self.entries,
        };
        let revocation_list_hash = spine_canon::canonical_hash(&input)?;
        let signature = spine_crypto::sign_digest_hex(private_key_pem, &revocation_list_hash)?;
        Ok(RevocationList {
            entries: self.entries,
            revocation_list_hash: Some(revocation_list_hash),
            signer_key_id: signer_key_id.into(),
            signature,
            signed_at: Utc::now(),
        })
    }
}
