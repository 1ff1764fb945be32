// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Identity transparency log: append-only Merkle tree, inclusion proofs, signed checkpoints."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Leaf and interior hashing follows the domain-separated scheme used by
//! certificate-transparency-style logs: a leaf hash prefixes the entry's
//! canonical bytes with `0x00`, an interior node hash prefixes its two
//! children's hashes with `0x01`. This makes a leaf hash unable to collide
//! with an interior node hash. Trees are built with the same
//! largest-power-of-two split used by those logs rather than by duplicating
//! a dangling last leaf, which avoids a known proof-forgery pitfall in
//! naive pairwise Merkle trees.

use spine_core::{
    Checkpoint, CheckpointHashInput, Direction, IdentityLogEntry, IdentityLogProof, Inclusion,
    KeyTable, PathElement,
};
use spine_error::{ErrorCode, SpineError};

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

fn leaf_hash(entry: &IdentityLogEntry) -> Result<String, SpineError> {
    let canon = spine_canon::to_canonical_bytes(entry)?;
    let mut bytes = Vec::with_capacity(canon.len() + 1);
    bytes.push(LEAF_PREFIX);
    bytes.extend_from_slice(&canon);
    Ok(spine_canon::sha256_hex(&bytes))
}

fn node_hash(left_hex: &str, right_hex: &str) -> String {
    let left = hex_decode(left_hex);
    let right = hex_decode(right_hex);
    let mut bytes = Vec::with_capacity(1 + left.len() + right.len());
    bytes.push(NODE_PREFIX);
    bytes.extend_from_slice(&left);
    bytes.extend_from_slice(&right);
    spine_canon::sha256_hex(&bytes)
}

fn hex_decode(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap_or(0))
        .collect()
}

/// Largest power of two strictly less than `n` (RFC 6962's `k`).
fn split_point(n: usize) -> usize {
    let mut k = 1usize;
    while k * 2 < n {
        k *= 2;
    }
    k
}

fn subtree_hash(leaves: &[String]) -> String {
    match leaves.len() {
        0 => spine_canon::sha256_hex(&[]),
        1 => leaves[0].clone(),
        n => {
            let k = split_point(n);
            let left = subtree_hash(&leaves[..k]);
            let right = subtree_hash(&leaves[k..]);
            node_hash(&left, &right)
        }
    }
}

/// Build the audit path for leaf `index` within `leaves[..size]`.
fn audit_path(leaves: &[String], start: usize, size: usize, index: usize) -> Vec<PathElement> {
    if size <= 1 {
        return Vec::new();
    }
    let k = split_point(size);
    if index < k {
        let mut path = audit_path(leaves, start, k, index);
        path.push(PathElement {
            sibling: subtree_hash(&leaves[start + k..start + size]),
            direction: Direction::Right,
        });
        path
    } else {
        let mut path = audit_path(leaves, start + k, size - k, index - k);
        path.push(PathElement {
            sibling: subtree_hash(&leaves[start..start + k]),
            direction: Direction::Left,
        });
        path
    }
}

/// Append-only transparency log backed by an in-memory Merkle tree.
#[derive(Debug, Clone, Default)]
pub struct TransparencyLog {
    entries: Vec<IdentityLogEntry>,
    leaf_hashes: Vec<String>,
}

impl TransparencyLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, returning its index within the log.
    ///
    /// # Errors
    ///
    /// Returns [`SpineError`] if the entry cannot be canonicalized.
    pub fn append(&mut self, entry: IdentityLogEntry) -> Result<usize, SpineError> {
        let hash = leaf_hash(&entry)?;
        let index = self.entries.len();
        self.entries.push(entry);
        self.leaf_hashes.push(hash);
        Ok(index)
    }

    /// Current tree size (number of appended entries).
    #[must_use]
    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Whether the log has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current Merkle root hash, or the empty-tree hash if no entries.
    #[must_use]
    pub fn root_hash(&self) -> String {
        subtree_hash(&self.leaf_hashes)
    }

    /// Build an [`Inclusion`] proof for the entry at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`SpineError`] with [`ErrorCode::InputInvalid`] if `index`
    /// is out of range.
    pub fn prove_inclusion(&self, index: usize) -> Result<Inclusion, SpineError> {
        if index >= self.entries.len() {
            return Err(SpineError::new(
                ErrorCode::InputInvalid,
                format!("index {index} out of range for log of size {}", self.entries.len()),
            ));
        }
        Ok(Inclusion {
            leaf_hash: self.leaf_hashes[index].clone(),
            path: audit_path(&self.leaf_hashes, 0, self.leaf_hashes.len(), index),
            tree_size: self.len(),
        })
    }

    /// Sign a checkpoint over the current tree size and root hash.
    ///
    /// # Errors
    ///
    /// Returns [`SpineError`] if the checkpoint cannot be canonicalized or
    /// `private_key_pem` does not parse.
    pub fn sign_checkpoint(
        &self,
        signer_key_id: impl Into<String>,
        private_key_pem: &str,
    ) -> Result<Checkpoint, SpineError> {
        let tree_size = self.len();
        let root_hash = self.root_hash();
        let input = CheckpointHashInput {
            tree_size,
            root_hash: root_hash.clone(),
        };
        let checkpoint_hash = spine_canon::canonical_hash(&input)?;
        let signature = spine_crypto::sign_digest_hex(private_key_pem, &checkpoint_hash)?;
        Ok(Checkpoint {
            tree_size,
            root_hash,
            checkpoint_hash: Some(checkpoint_hash),
            signer_key_id: signer_key_id.into(),
            signature,
        })
    }
}

/// Fold an [`Inclusion`] path against its leaf hash to recompute a root.
fn fold_path(inclusion: &Inclusion) -> String {
    inclusion.path.iter().fold(inclusion.leaf_hash.clone(), |acc, step| match step.direction {
        Direction::Left => node_hash(&step.sibling, &acc),
        Direction::Right => node_hash(&acc, &step.sibling),
    })
}

/// Verify that `entry` is included in the tree described by `checkpoint`,
/// given its claimed `inclusion` proof.
///
/// # Errors
///
/// - [`ErrorCode::LeafHashMismatch`] if the entry's recomputed leaf hash
///   does not match the proof.
/// - [`ErrorCode::RootHashMismatch`] if the folded path does not match
///   `checkpoint.rootHash`, or `inclusion.treeSize` disagrees with
///   `checkpoint.treeSize`.
pub fn verify_inclusion(
    entry: &IdentityLogEntry,
    inclusion: &Inclusion,
    checkpoint: &Checkpoint,
) -> Result<(), SpineError> {
    let recomputed_leaf = leaf_hash(entry)?;
    if recomputed_leaf != inclusion.leaf_hash {
        return Err(SpineError::new(
            ErrorCode::LeafHashMismatch,
            "entry's recomputed leaf hash does not match the inclusion proof",
        ));
    }
    if inclusion.tree_size != checkpoint.tree_size {
        return Err(SpineError::new(
            ErrorCode::RootHashMismatch,
            "inclusion proof tree size does not match checkpoint tree size",
        ));
    }
    let folded_root = fold_path(inclusion);
    if folded_root != checkpoint.root_hash {
        return Err(SpineError::new(
            ErrorCode::RootHashMismatch,
            "folded inclusion path does not match checkpoint root hash",
        ));
    }
    Ok(())
}

/// Verify a [`Checkpoint`]'s own hash and signature against a trusted
/// log-operator key set.
///
/// # Errors
///
/// - [`ErrorCode::CheckpointSignatureInvalid`] if `checkpointHash` does not
///   recompute, the signer is untrusted, or the signature fails to verify.
pub fn verify_checkpoint_signature(
    checkpoint: &Checkpoint,
    trusted_log_operators: &KeyTable,
) -> Result<(), SpineError> {
    let input = CheckpointHashInput {
        tree_size: checkpoint.tree_size,
        root_hash: checkpoint.root_hash.clone(),
    };
    let expected_hash = spine_canon::canonical_hash(&input)?;
    if checkpoint.checkpoint_hash.as_deref() != Some(expected_hash.as_str()) {
        return Err(SpineError::new(
            ErrorCode::CheckpointSignatureInvalid,
            "checkpointHash does not recompute",
        ));
    }
    let Some(key) = trusted_log_operators.get(&checkpoint.signer_key_id) else {
        return Err(SpineError::new(
            ErrorCode::CheckpointSignatureInvalid,
            "checkpoint signer is not a trusted log operator",
        ));
    };
    match spine_crypto::verify_digest_hex(&key.public_key_pem, &expected_hash, &checkpoint.signature) {
        Ok(true) => Ok(()),
        Ok(false) => Err(SpineError::new(
            ErrorCode::CheckpointSignatureInvalid,
            "checkpoint signature does not verify",
        )),
        Err(e) => Err(e),
    }
}

fn is_valid_hex_hash(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Top-level transparency-log check: recompute `rootHash` by folding
/// `proof.inclusion` from its leaf hash, compare it against
/// `proof.checkpoint.rootHash`, then verify the checkpoint's own signature
/// under `trusted_log_operators`. Unlike [`verify_inclusion`], this takes
/// no entry content — it trusts `proof.inclusion.leafHash` and instead
/// binds the proof to the caller's expected `entryId`.
///
/// # Errors
///
/// - [`ErrorCode::EntryIdMismatch`] if `proof.entryId` does not match
///   `entry_id`.
/// - [`ErrorCode::ProofMalformed`] if a leaf or sibling hash is not a
///   64-character hex string.
/// - [`ErrorCode::RootHashMismatch`] if the folded path does not match
///   `proof.checkpoint.rootHash`, or tree sizes disagree.
/// - [`ErrorCode::CheckpointSignatureInvalid`] if the checkpoint itself
///   does not verify against `trusted_log_operators`.
pub fn verify_identity_log_proof(
    proof: &IdentityLogProof,
    entry_id: &str,
    trusted_log_operators: &KeyTable,
) -> Result<(), SpineError> {
    if proof.entry_id != entry_id {
        return Err(SpineError::new(
            ErrorCode::EntryIdMismatch,
            format!("proof is for entryId '{}', expected '{entry_id}'", proof.entry_id),
        ));
    }

    if !is_valid_hex_hash(&proof.inclusion.leaf_hash)
        || !proof.inclusion.path.iter().all(|step| is_valid_hex_hash(&step.sibling))
    {
        return Err(SpineError::new(
            ErrorCode::ProofMalformed,
            "inclusion proof contains a malformed hash",
        ));
    }

    if proof.inclusion.tree_size != proof.checkpoint.tree_size {
        return Err(SpineError::new(
            ErrorCode::RootHashMismatch,
            "inclusion proof tree size does not match checkpoint tree size",
        ));
    }
    let folded_root = fold_path(&proof.inclusion);
    if folded_root != proof.checkpoint.root_hash {
        return Err(SpineError::new(
            ErrorCode::RootHashMismatch,
            "folded inclusion path does not match checkpoint root hash",
        ));
    }

    verify_checkpoint_signature(&proof.checkpoint, trusted_log_operators)
}
