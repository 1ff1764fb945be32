// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Hash-chained, signed event log construction and verification."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! An [`EventChain`] is an in-order, per-stream sequence of [`Event`]s. Each
//! event's `chainHash` binds its own fields plus the previous event's
//! `chainHash`, so tampering with or reordering any event breaks every
//! `chainHash` after it. [`EventBuilder`] produces an unsigned event;
//! [`sign_event`] turns it into a fully signed [`Event`] ready to append.
//!
//! [`verify_chain`] is the pure, side-effect-free replay check shared by a
//! producer appending new events and by the offline verifier replaying a
//! whole bundle: it never stops at the first problem, it collects every
//! [`SpineError`] it finds so a caller can report all of them at once.
//!
//! Signer purpose policy is intentionally asymmetric for "server-required"
//! actors: events from `server`/`ops` actors must carry a
//! `purpose == "server"`, `serverGoverned == true` key, and a
//! revoked key for one of these actors is always a hard error. Events from
//! any other actor type are not required to carry a governed key, and a
//! revoked key for them is informational only — it does not fail the chain.

use chrono::{DateTime, Utc};
use spine_core::{
    Actor, ChainHashInput, Event, KeyTable, PublicKeyRecord, RevocationList, Snapshot,
    TimestampProof, EVENT_ENVELOPE_VERSION,
};
use spine_error::{ErrorCode, SpineError};
use std::collections::HashSet;

/// An [`Event`] with everything computed except the signer fields.
#[derive(Debug, Clone)]
pub struct UnsignedEvent {
    /// Envelope version.
    pub v: u32,
    /// Event id.
    pub id: String,
    /// Timestamp.
    pub at: DateTime<Utc>,
    /// Stream id.
    pub stream_id: String,
    /// Event type.
    pub event_type: String,
    /// Actor.
    pub actor: Actor,
    /// Payload.
    pub payload: serde_json::Value,
    /// Computed payload hash.
    pub payload_hash: String,
    /// Previous event's chain hash, or `None` for a genesis event.
    pub prev_chain_hash: Option<String>,
    /// Computed chain hash.
    pub chain_hash: String,
}

/// Fluent builder for constructing an [`UnsignedEvent`].
#[derive(Debug)]
pub struct EventBuilder {
    stream_id: String,
    event_type: String,
    actor: Actor,
    payload: serde_json::Value,
    at: DateTime<Utc>,
    id: Option<String>,
}

impl EventBuilder {
    /// Start building an event for `stream_id` of kind `event_type` from `actor`.
    #[must_use]
    pub fn new(
        stream_id: impl Into<String>,
        event_type: impl Into<String>,
        actor: Actor,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            event_type: event_type.into(),
            actor,
            payload: serde_json::json!({}),
            at: Utc::now(),
            id: None,
        }
    }

    /// Set the event payload.
    #[must_use]
    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set the event timestamp (defaults to now).
    #[must_use]
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }

    /// Set an explicit event id instead of letting the chain assign one.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Compute payload/chain hashes and produce an [`UnsignedEvent`].
    ///
    /// `prev_chain_hash` must be the previous event's `chainHash` in this
    /// stream, or `None` for the first event.
    ///
    /// # Errors
    ///
    /// Returns [`SpineError`] if the payload or chain-hash input cannot be
    /// canonicalized (see `spine-canon`).
    pub fn build_unsigned(
        self,
        prev_chain_hash: Option<String>,
    ) -> Result<UnsignedEvent, SpineError> {
        let id = self.id.unwrap_or_else(|| uuid_v4_like(&self.stream_id, self.at));
        let payload_hash = spine_canon::canonical_hash(&self.payload)?;
        let chain_input = ChainHashInput {
            v: EVENT_ENVELOPE_VERSION,
            id: &id,
            at: self.at,
            stream_id: &self.stream_id,
            event_type: &self.event_type,
            actor: &self.actor,
            payload_hash: &payload_hash,
            prev_chain_hash: &prev_chain_hash,
        };
        let chain_hash = spine_canon::canonical_hash(&chain_input)?;
        Ok(UnsignedEvent {
            v: EVENT_ENVELOPE_VERSION,
            id,
            at: self.at,
            stream_id: self.stream_id,
            event_type: self.event_type,
            actor: self.actor,
            payload: self.payload,
            payload_hash,
            prev_chain_hash,
            chain_hash,
        })
    }
}

/// Deterministic id generator used when callers don't supply one; this is a
/// plain hash, not a cryptographic id — callers needing collision-resistant
/// ids across concurrent producers should pass `id` explicitly.
fn uuid_v4_like(stream_id: &str, at: DateTime<Utc>) -> String {
    let tag = format!("{stream_id}:{}", at.timestamp_nanos_opt().unwrap_or_default());
    spine_canon::sha256_hex(tag.as_bytes())[..32].to_string()
}

/// Sign an [`UnsignedEvent`] with a PEM-encoded private key, producing a
/// fully signed [`Event`].
///
/// # Errors
///
/// Returns [`SpineError`] if `private_key_pem` does not parse.
pub fn sign_event(
    unsigned: UnsignedEvent,
    signer_key_id: impl Into<String>,
    private_key_pem: &str,
) -> Result<Event, SpineError> {
    let signature = spine_crypto::sign_digest_hex(private_key_pem, &unsigned.chain_hash)?;
    Ok(Event {
        v: unsigned.v,
        id: unsigned.id,
        at: unsigned.at,
        stream_id: unsigned.stream_id,
        event_type: unsigned.event_type,
        actor: unsigned.actor,
        payload: unsigned.payload,
        payload_hash: unsigned.payload_hash,
        prev_chain_hash: unsigned.prev_chain_hash,
        chain_hash: unsigned.chain_hash,
        signer_key_id: signer_key_id.into(),
        signature,
    })
}

/// An ordered, append-only chain of [`Event`]s for a single stream.
///
/// Appending performs only the *structural* checks that are always true of
/// a well-formed chain (stream match, unique ids, correct linking and
/// hashes). Signature and governance checks belong to [`verify_chain`],
/// which callers should run against the key table and policy they have in
/// hand before trusting a signed event.
#[derive(Debug, Clone)]
pub struct EventChain {
    stream_id: String,
    events: Vec<Event>,
    seen_ids: HashSet<String>,
}

impl EventChain {
    /// Create an empty chain for `stream_id`.
    #[must_use]
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            events: Vec::new(),
            seen_ids: HashSet::new(),
        }
    }

    /// The stream id this chain is for.
    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// The chain hash of the most recently appended event, if any.
    #[must_use]
    pub fn last_chain_hash(&self) -> Option<&str> {
        self.events.last().map(|e| e.chain_hash.as_str())
    }

    /// Append a signed event, checking stream membership, id uniqueness,
    /// linkage, and hash recomputation.
    ///
    /// # Errors
    ///
    /// Returns [`SpineError`] with:
    /// - [`ErrorCode::InputInvalid`] if `event.stream_id` doesn't match this chain
    ///   or its id was already seen.
    /// - [`ErrorCode::PayloadHashMismatch`] / [`ErrorCode::ChainHashMismatch`] /
    ///   [`ErrorCode::PrevChainHashMismatch`] on recomputation failure.
    pub fn push(&mut self, event: Event) -> Result<(), SpineError> {
        if event.stream_id != self.stream_id {
            return Err(SpineError::new(
                ErrorCode::InputInvalid,
                format!(
                    "event stream '{}' does not match chain stream '{}'",
                    event.stream_id, self.stream_id
                ),
            ));
        }
        if self.seen_ids.contains(&event.id) {
            return Err(SpineError::new(
                ErrorCode::InputInvalid,
                format!("duplicate event id: {}", event.id),
            )
            .with_path(event.id.clone()));
        }
        let index = self.events.len();
        check_event_hashes(&event, index)?;
        let expected_prev = self.last_chain_hash().map(str::to_owned);
        if event.prev_chain_hash != expected_prev {
            return Err(SpineError::new(
                ErrorCode::PrevChainHashMismatch,
                "prevChainHash does not match predecessor's chainHash",
            )
            .with_path(format!("events[{index}]")));
        }
        self.seen_ids.insert(event.id.clone());
        self.events.push(event);
        Ok(())
    }

    /// Number of events in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the chain has no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over events in append order.
    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    /// All events as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Event] {
        &self.events
    }

    /// Produce a [`Snapshot`] of the current chain head, if non-empty.
    #[must_use]
    pub fn snapshot(&self) -> Option<Snapshot> {
        let last = self.events.last()?;
        Some(Snapshot {
            id: self.stream_id.clone(),
            last_chain_hash: last.chain_hash.clone(),
            last_event_id: last.id.clone(),
        })
    }
}

impl<'a> IntoIterator for &'a EventChain {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

fn check_event_hashes(event: &Event, index: usize) -> Result<(), SpineError> {
    let expected_payload_hash = spine_canon::canonical_hash(&event.payload)?;
    if expected_payload_hash != event.payload_hash {
        return Err(SpineError::new(
            ErrorCode::PayloadHashMismatch,
            "payloadHash does not recompute",
        )
        .with_path(format!("events[{index}]")));
    }
    let chain_input = ChainHashInput {
        v: event.v,
        id: &event.id,
        at: event.at,
        stream_id: &event.stream_id,
        event_type: &event.event_type,
        actor: &event.actor,
        payload_hash: &event.payload_hash,
        prev_chain_hash: &event.prev_chain_hash,
    };
    let expected_chain_hash = spine_canon::canonical_hash(&chain_input)?;
    if expected_chain_hash != event.chain_hash {
        return Err(SpineError::new(
            ErrorCode::ChainHashMismatch,
            "chainHash does not recompute",
        )
        .with_path(format!("events[{index}]")));
    }
    Ok(())
}

/// Replay and fully verify a sequence of events against a key table,
/// optional revocation list, and any available time-authority proofs.
///
/// Collects every problem found rather than stopping at the first one, so
/// a caller (typically `spine-verify`) can report all of them together.
/// Returns an empty `Vec` if the chain is entirely sound.
#[must_use]
pub fn verify_chain(
    events: &[Event],
    keys: &KeyTable,
    revocations: Option<&RevocationList>,
    time_proofs: &[TimestampProof],
) -> Vec<SpineError> {
    let mut errors = Vec::new();
    let mut expected_prev: Option<String> = None;

    for (index, event) in events.iter().enumerate() {
        if let Err(e) = check_event_hashes(event, index) {
            errors.push(e);
        }
        if event.prev_chain_hash != expected_prev {
            errors.push(
                SpineError::new(
                    ErrorCode::PrevChainHashMismatch,
                    "prevChainHash does not match predecessor's chainHash",
                )
                .with_path(format!("events[{index}]")),
            );
        }
        expected_prev = Some(event.chain_hash.clone());

        verify_event_signer(event, index, keys, revocations, time_proofs, &mut errors);
    }

    errors
}

fn verify_event_signer(
    event: &Event,
    index: usize,
    keys: &KeyTable,
    revocations: Option<&RevocationList>,
    time_proofs: &[TimestampProof],
    errors: &mut Vec<SpineError>,
) {
    let path = format!("events[{index}]");
    let Some(key) = keys.get(&event.signer_key_id) else {
        errors.push(
            SpineError::new(ErrorCode::KeyUnknown, "signer key id not found in key table")
                .with_path(path.clone()),
        );
        return;
    };

    match spine_crypto::verify_digest_hex(&key.public_key_pem, &event.chain_hash, &event.signature)
    {
        Ok(true) => {}
        Ok(false) => {
            errors.push(
                SpineError::new(ErrorCode::SignatureInvalid, "event signature does not verify")
                    .with_path(path.clone()),
            );
        }
        Err(e) => errors.push(e.with_path(path.clone())),
    }

    if !event.actor.is_server_required() {
        // Revocation of a non-server-required actor's key is informational
        // only; it never fails the chain.
        return;
    }

    if key.purpose != "server" || key.server_governed != Some(true) {
        errors.push(
            SpineError::new(
                ErrorCode::PurposeMismatch,
                "server-required actor must sign with a server-purpose, server-governed key",
            )
            .with_path(path.clone()),
        );
    }

    if let Some(revoked_at) = effective_revoked_at(key, revocations) {
        if event.at >= revoked_at && !rescued_by_timeproof(&event.id, revoked_at, time_proofs) {
            errors.push(
                SpineError::new(
                    ErrorCode::KeyRevoked,
                    "server-required event signed by a key revoked at event time",
                )
                .with_path(path),
            );
        }
    }
}

/// The key's revocation time, if any, from either the revocation list or
/// its own `revokedAt` field. Never reads the wall clock: the caller
/// compares the result against the event's own timestamp.
fn effective_revoked_at(
    key: &PublicKeyRecord,
    revocations: Option<&RevocationList>,
) -> Option<DateTime<Utc>> {
    if let Some(list) = revocations {
        if let Some(entry) = list.entry_for(&key.key_id) {
            return Some(entry.revoked_at);
        }
    }
    key.revoked_at
}

fn rescued_by_timeproof(
    event_id: &str,
    revoked_at: DateTime<Utc>,
    time_proofs: &[TimestampProof],
) -> bool {
    time_proofs
        .iter()
        .any(|p| p.subject == event_id && p.attested_time < revoked_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spine_core::PublicKeyRecord;

    fn keypair_record(tenant: &str, purpose: &str, governed: bool) -> (String, spine_crypto::Ed25519Keypair) {
        let kp = spine_crypto::create_ed25519_keypair();
        let key_id = spine_crypto::key_id_from_public_key_pem(&kp.public_key_pem).unwrap();
        let _ = (tenant, purpose, governed);
        (key_id, kp)
    }

    fn make_record(
        key_id: &str,
        pem: &str,
        purpose: &str,
        governed: Option<bool>,
        revoked_at: Option<DateTime<Utc>>,
    ) -> PublicKeyRecord {
        PublicKeyRecord {
            tenant_id: "tenant-1".into(),
            key_id: key_id.into(),
            public_key_pem: pem.into(),
            purpose: purpose.into(),
            server_governed: governed,
            valid_from: None,
            revoked_at,
        }
    }

    #[test]
    fn build_sign_and_push_genesis_event() {
        let (key_id, kp) = keypair_record("t1", "server", true);
        let unsigned = EventBuilder::new("job-1", "JOB_CREATED", Actor::new("server", "svc"))
            .payload(serde_json::json!({"jobId": "job-1"}))
            .build_unsigned(None)
            .unwrap();
        let event = sign_event(unsigned, key_id.clone(), &kp.private_key_pem).unwrap();
        let mut chain = EventChain::new("job-1");
        chain.push(event).unwrap();
        assert_eq!(chain.len(), 1);
        assert!(chain.last_chain_hash().is_some());
    }

    #[test]
    fn chain_links_two_events() {
        let (key_id, kp) = keypair_record("t1", "server", true);
        let e1 = sign_event(
            EventBuilder::new("job-1", "JOB_CREATED", Actor::new("server", "svc"))
                .build_unsigned(None)
                .unwrap(),
            key_id.clone(),
            &kp.private_key_pem,
        )
        .unwrap();
        let mut chain = EventChain::new("job-1");
        let prev = e1.chain_hash.clone();
        chain.push(e1).unwrap();

        let e2 = sign_event(
            EventBuilder::new("job-1", "JOB_COMPLETED", Actor::new("server", "svc"))
                .build_unsigned(Some(prev))
                .unwrap(),
            key_id,
            &kp.private_key_pem,
        )
        .unwrap();
        chain.push(e2).unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn push_rejects_wrong_stream() {
        let (key_id, kp) = keypair_record("t1", "server", true);
        let event = sign_event(
            EventBuilder::new("job-2", "JOB_CREATED", Actor::new("server", "svc"))
                .build_unsigned(None)
                .unwrap(),
            key_id,
            &kp.private_key_pem,
        )
        .unwrap();
        let mut chain = EventChain::new("job-1");
        let err = chain.push(event).unwrap_err();
        assert_eq!(err.code, ErrorCode::InputInvalid);
    }

    #[test]
    fn push_rejects_duplicate_id() {
        let (key_id, kp) = keypair_record("t1", "server", true);
        let unsigned = EventBuilder::new("job-1", "JOB_CREATED", Actor::new("server", "svc"))
            .id("evt-fixed")
            .build_unsigned(None)
            .unwrap();
        let event = sign_event(unsigned.clone(), key_id.clone(), &kp.private_key_pem).unwrap();
        let mut chain = EventChain::new("job-1");
        chain.push(event.clone()).unwrap();

        let unsigned2 = EventBuilder::new("job-1", "JOB_CREATED", Actor::new("server", "svc"))
            .id("evt-fixed")
            .build_unsigned(Some(event.chain_hash.clone()))
            .unwrap();
        let event2 = sign_event(unsigned2, key_id, &kp.private_key_pem).unwrap();
        let err = chain.push(event2).unwrap_err();
        assert_eq!(err.code, ErrorCode::InputInvalid);
    }

    #[test]
    fn verify_chain_reports_tampered_payload() {
        let (key_id, kp) = keypair_record("t1", "server", true);
        let mut event = sign_event(
            EventBuilder::new("job-1", "JOB_CREATED", Actor::new("server", "svc"))
                .payload(serde_json::json!({"amount": 100}))
                .build_unsigned(None)
                .unwrap(),
            key_id.clone(),
            &kp.private_key_pem,
        )
        .unwrap();
        event.payload = serde_json::json!({"amount": 999});

        let mut keys = KeyTable::new();
        keys.insert(key_id.clone(), make_record(&key_id, &kp.public_key_pem, "server", Some(true), None));

        let errors = verify_chain(std::slice::from_ref(&event), &keys, None, &[]);
        assert!(errors.iter().any(|e| e.code == ErrorCode::PayloadHashMismatch));
    }

    #[test]
    fn verify_chain_enforces_revocation_for_server_required_actor() {
        let (key_id, kp) = keypair_record("t1", "server", true);
        let revoked_at: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let event_at: DateTime<Utc> = "2026-02-01T00:00:00Z".parse().unwrap();
        let event = sign_event(
            EventBuilder::new("job-1", "JOB_CREATED", Actor::new("server", "svc"))
                .at(event_at)
                .build_unsigned(None)
                .unwrap(),
            key_id.clone(),
            &kp.private_key_pem,
        )
        .unwrap();
        let mut keys = KeyTable::new();
        keys.insert(
            key_id.clone(),
            make_record(&key_id, &kp.public_key_pem, "server", Some(true), Some(revoked_at)),
        );
        let errors = verify_chain(std::slice::from_ref(&event), &keys, None, &[]);
        assert!(errors.iter().any(|e| e.code == ErrorCode::KeyRevoked));
    }

    #[test]
    fn verify_chain_treats_non_server_revocation_as_informational() {
        let (key_id, kp) = keypair_record("t1", "robot", false);
        let revoked_at: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let event_at: DateTime<Utc> = "2026-02-01T00:00:00Z".parse().unwrap();
        let event = sign_event(
            EventBuilder::new("job-1", "ROBOT_TICK", Actor::new("robot", "bot-1"))
                .at(event_at)
                .build_unsigned(None)
                .unwrap(),
            key_id.clone(),
            &kp.private_key_pem,
        )
        .unwrap();
        let mut keys = KeyTable::new();
        keys.insert(
            key_id.clone(),
            make_record(&key_id, &kp.public_key_pem, "robot", None, Some(revoked_at)),
        );
        let errors = verify_chain(std::slice::from_ref(&event), &keys, None, &[]);
        assert!(!errors.iter().any(|e| e.code == ErrorCode::KeyRevoked));
    }

    #[test]
    fn verify_chain_rescued_by_timeproof() {
        let (key_id, kp) = keypair_record("t1", "server", true);
        let revoked_at: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let attested_time: DateTime<Utc> = "2025-12-01T00:00:00Z".parse().unwrap();
        let event_at: DateTime<Utc> = "2026-02-01T00:00:00Z".parse().unwrap();
        let unsigned = EventBuilder::new("job-1", "JOB_CREATED", Actor::new("server", "svc"))
            .id("evt-rescued")
            .at(event_at)
            .build_unsigned(None)
            .unwrap();
        let event = sign_event(unsigned, key_id.clone(), &kp.private_key_pem).unwrap();
        let mut keys = KeyTable::new();
        keys.insert(
            key_id.clone(),
            make_record(&key_id, &kp.public_key_pem, "server", Some(true), Some(revoked_at)),
        );
        let proof = TimestampProof {
            subject: "evt-rescued".into(),
            attested_time,
            proof_hash: None,
            signer_key_id: "time-authority-1".into(),
            signature: "sig".into(),
        };
        let errors = verify_chain(std::slice::from_ref(&event), &keys, None, &[proof]);
        assert!(!errors.iter().any(|e| e.code == ErrorCode::KeyRevoked));
    }

    proptest::proptest! {
        /// A freshly built chain of any length verifies clean, and flipping
        /// a single hex character of any one event's `chainHash` always
        /// breaks verification.
        #[test]
        fn chain_round_trip_and_single_byte_tamper(
            n in 1usize..6,
            tamper_idx in 0usize..5,
            flip_pos in 0usize..64,
        ) {
            let (key_id, kp) = keypair_record("t1", "server", true);
            let mut chain = EventChain::new("job-1");
            let mut prev: Option<String> = None;
            for i in 0..n {
                let unsigned = EventBuilder::new("job-1", "JOB_CREATED", Actor::new("server", "svc"))
                    .id(format!("evt-{i}"))
                    .payload(serde_json::json!({"i": i}))
                    .build_unsigned(prev.clone())
                    .unwrap();
                let event = sign_event(unsigned, key_id.clone(), &kp.private_key_pem).unwrap();
                prev = Some(event.chain_hash.clone());
                chain.push(event).unwrap();
            }
            let mut keys = KeyTable::new();
            keys.insert(key_id.clone(), make_record(&key_id, &kp.public_key_pem, "server", Some(true), None));

            let errors = verify_chain(chain.as_slice(), &keys, None, &[]);
            proptest::prop_assert!(errors.is_empty(), "{:?}", errors);

            let idx = tamper_idx % n;
            let mut tampered: Vec<Event> = chain.as_slice().to_vec();
            let mut chars: Vec<char> = tampered[idx].chain_hash.chars().collect();
            let pos = flip_pos % chars.len();
            chars[pos] = if chars[pos] == '0' { '1' } else { '0' };
            tampered[idx].chain_hash = chars.into_iter().collect();

            let errors = verify_chain(&tampered, &keys, None, &[]);
            proptest::prop_assert!(!errors.is_empty());
        }
    }
}
