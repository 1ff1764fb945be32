// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Ed25519 key generation, PEM key identity, and detached signing."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Key material is always carried as PEM text across crate boundaries so it
//! can be embedded directly in bundle files (`keys/public_keys.json`,
//! governance policy documents, ...). PEM framing uses the `pem` crate
//! around the raw 32-byte Ed25519 key; this is this workspace's own DER
//! equivalent, not an attempt at X.509/SPKI/PKCS8 interop with other
//! tooling (see `DESIGN.md`).
//!
//! Signing is always performed over the UTF-8 bytes of a hex digest
//! string, never over raw binary — this is the fixed producer convention
//! and must not be changed independently on the verifier side.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use spine_error::{ErrorCode, SpineError};

const PUBLIC_LABEL: &str = "ED25519 PUBLIC KEY";
const PRIVATE_LABEL: &str = "ED25519 PRIVATE KEY";

/// A freshly generated Ed25519 key pair, PEM-encoded.
#[derive(Debug, Clone)]
pub struct Ed25519Keypair {
    /// PEM-encoded public key.
    pub public_key_pem: String,
    /// PEM-encoded private key.
    pub private_key_pem: String,
}

/// Generate a new random Ed25519 key pair.
#[must_use]
pub fn create_ed25519_keypair() -> Ed25519Keypair {
    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();
    Ed25519Keypair {
        public_key_pem: encode_pem(PUBLIC_LABEL, verifying_key.as_bytes()),
        private_key_pem: encode_pem(PRIVATE_LABEL, signing_key.as_bytes()),
    }
}

/// Compute the deterministic key id for a PEM-encoded public key.
///
/// `keyId = sha256(DER(publicKey))`, truncated to the first 32 hex chars
/// (the first 16 bytes of the digest), so key ids are stable for a given
/// key regardless of how many times it is re-exported.
///
/// # Errors
///
/// Returns [`SpineError`] if `pem` is not a well-formed PEM block or does
/// not decode to a 32-byte Ed25519 public key.
pub fn key_id_from_public_key_pem(pem: &str) -> Result<String, SpineError> {
    let bytes = decode_pem(pem, PUBLIC_LABEL)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hasher.finalize();
    Ok(hex_lower(&digest[..16]))
}

/// Parse a PEM-encoded public key into a usable [`VerifyingKey`].
///
/// # Errors
///
/// Returns [`SpineError`] with [`ErrorCode::InputInvalid`] on malformed PEM
/// or wrong key length.
pub fn parse_public_key(pem: &str) -> Result<VerifyingKey, SpineError> {
    let bytes = decode_pem(pem, PUBLIC_LABEL)?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SpineError::new(ErrorCode::InputInvalid, "public key must be 32 bytes"))?;
    VerifyingKey::from_bytes(&arr)
        .map_err(|e| SpineError::new(ErrorCode::InputInvalid, format!("invalid public key: {e}")))
}

/// Parse a PEM-encoded private key into a usable [`SigningKey`].
///
/// # Errors
///
/// Returns [`SpineError`] with [`ErrorCode::InputInvalid`] on malformed PEM
/// or wrong key length.
pub fn parse_private_key(pem: &str) -> Result<SigningKey, SpineError> {
    let bytes = decode_pem(pem, PRIVATE_LABEL)?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SpineError::new(ErrorCode::InputInvalid, "private key must be 32 bytes"))?;
    Ok(SigningKey::from_bytes(&arr))
}

/// Sign a hex digest string with a PEM-encoded private key.
///
/// The signed message is the UTF-8 bytes of `digest_hex` itself, not the
/// raw digest bytes — this is the fixed wire convention shared by every
/// signer and verifier in the spine.
///
/// # Errors
///
/// Returns [`SpineError`] if `private_key_pem` does not parse.
pub fn sign_digest_hex(private_key_pem: &str, digest_hex: &str) -> Result<String, SpineError> {
    let key = parse_private_key(private_key_pem)?;
    let sig: Signature = key.sign(digest_hex.as_bytes());
    Ok(hex_lower(&sig.to_bytes()))
}

/// Verify a detached signature over a hex digest string.
///
/// Never panics and never throws on a bad signature — malformed PEM, the
/// wrong key length, and signature failure are all folded into `Ok(false)`
/// or a typed error depending on whether the *shape* of the input was
/// valid; callers needing to distinguish "wrong signature" from "broken
/// input" should call [`parse_public_key`] themselves first.
///
/// # Errors
///
/// Returns [`SpineError`] if `public_key_pem` or `signature_hex` is
/// malformed. Returns `Ok(false)` (not an error) for a syntactically valid
/// but cryptographically invalid signature.
pub fn verify_digest_hex(
    public_key_pem: &str,
    digest_hex: &str,
    signature_hex: &str,
) -> Result<bool, SpineError> {
    let key = parse_public_key(public_key_pem)?;
    let sig_bytes = hex::decode(signature_hex)
        .map_err(|e| SpineError::new(ErrorCode::InputInvalid, format!("bad signature hex: {e}")))?;
    let sig_arr: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| SpineError::new(ErrorCode::InputInvalid, "signature must be 64 bytes"))?;
    let sig = Signature::from_bytes(&sig_arr);
    Ok(key.verify(digest_hex.as_bytes(), &sig).is_ok())
}

fn encode_pem(label: &str, bytes: &[u8]) -> String {
    let p = pem::Pem::new(label, bytes.to_vec());
    pem::encode(&p)
}

fn decode_pem(text: &str, expected_label: &str) -> Result<Vec<u8>, SpineError> {
    let parsed = pem::parse(text.trim())
        .map_err(|e| SpineError::new(ErrorCode::InputInvalid, format!("malformed PEM: {e}")))?;
    if parsed.tag() != expected_label {
        return Err(SpineError::new(
            ErrorCode::InputInvalid,
            format!("expected PEM label '{expected_label}', got '{}'", parsed.tag()),
        ));
    }
    Ok(parsed.contents().to_vec())
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypair_round_trips_through_pem() {
        let kp = create_ed25519_keypair();
        assert!(kp.public_key_pem.contains("BEGIN ED25519 PUBLIC KEY"));
        assert!(kp.private_key_pem.contains("BEGIN ED25519 PRIVATE KEY"));
        parse_public_key(&kp.public_key_pem).unwrap();
        parse_private_key(&kp.private_key_pem).unwrap();
    }

    #[test]
    fn key_id_is_stable_and_32_hex_chars() {
        let kp = create_ed25519_keypair();
        let id1 = key_id_from_public_key_pem(&kp.public_key_pem).unwrap();
        let id2 = key_id_from_public_key_pem(&kp.public_key_pem).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 32);
        assert!(id1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn sign_then_verify_succeeds() {
        let kp = create_ed25519_keypair();
        let digest = "a".repeat(64);
        let sig = sign_digest_hex(&kp.private_key_pem, &digest).unwrap();
        assert!(verify_digest_hex(&kp.public_key_pem, &digest, &sig).unwrap());
    }

    #[test]
    fn tampered_digest_fails_verification() {
        let kp = create_ed25519_keypair();
        let digest = "a".repeat(64);
        let sig = sign_digest_hex(&kp.private_key_pem, &digest).unwrap();
        let other_digest = "b".repeat(64);
        assert!(!verify_digest_hex(&kp.public_key_pem, &other_digest, &sig).unwrap());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let kp1 = create_ed25519_keypair();
        let kp2 = create_ed25519_keypair();
        let digest = "c".repeat(64);
        let sig = sign_digest_hex(&kp1.private_key_pem, &digest).unwrap();
        assert!(!verify_digest_hex(&kp2.public_key_pem, &digest, &sig).unwrap());
    }

    #[test]
    fn malformed_pem_is_rejected() {
        assert!(parse_public_key("not a pem").is_err());
    }

    #[test]
    fn wrong_label_is_rejected() {
        let kp = create_ed25519_keypair();
        // A private key PEM presented where a public key is expected.
        assert!(parse_public_key(&kp.private_key_pem).is_err());
    }
}
