//! Signing engine.
//!
//! Every envelope is covered by a detached Ed25519 signature over a canonical
//! signing document:
//!
//! ```text
//! version::timestamp::sequence::instanceKey::serverKey::type::sha256b64(payload)
//! ```
//!
//! The key slots are bound to roles, not to "self" and "peer": the instance
//! key always comes first and the server key second, whichever side signs.
//! The digest covers the base64 text of the compressed payload.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use skill_bridge_core::SessionKeys;

use crate::{Envelope, MessageType, VerificationFailure};

/// Signing document layout version.
pub const SIGNATURE_VERSION: u32 = 0;

/// Public keys filling the two key slots of a signing document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentKeys {
    /// Base64 text of the instance public key.
    pub instance: String,
    /// Base64 text of the server public key.
    pub server: String,
}

impl DocumentKeys {
    #[must_use]
    pub fn new(instance: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            server: server.into(),
        }
    }
}

impl From<&SessionKeys> for DocumentKeys {
    fn from(keys: &SessionKeys) -> Self {
        Self::new(keys.instance_public_key(), keys.server_public_key())
    }
}

/// Base64 SHA-256 of the payload text.
#[must_use]
pub fn payload_digest(payload_base64: &str) -> String {
    BASE64.encode(Sha256::digest(payload_base64.as_bytes()))
}

/// Canonical signing document.
#[must_use]
pub fn signing_document(
    version: u32,
    timestamp: &str,
    sequence: u64,
    instance_key: &str,
    server_key: &str,
    kind: MessageType,
    payload_base64: &str,
) -> String {
    format!(
        "{version}::{timestamp}::{sequence}::{instance_key}::{server_key}::{}::{}",
        i64::from(kind),
        payload_digest(payload_base64)
    )
}

fn document_for(envelope: &Envelope, keys: &DocumentKeys) -> String {
    signing_document(
        SIGNATURE_VERSION,
        &envelope.timestamp,
        envelope.sequence,
        &keys.instance,
        &keys.server,
        envelope.kind,
        &envelope.payload,
    )
}

/// Sign an envelope, setting `signature` and `signatureVersion`.
#[must_use]
pub fn sign(mut envelope: Envelope, signing_key: &SigningKey, keys: &DocumentKeys) -> Envelope {
    let document = document_for(&envelope, keys);
    let signature = signing_key.sign(document.as_bytes());

    envelope.signature = Some(BASE64.encode(signature.to_bytes()));
    envelope.signature_version = Some(SIGNATURE_VERSION);
    envelope
}

/// Check the envelope's signature against the signer's key.
///
/// Returns `false` for a missing, malformed or non-matching signature.
#[must_use]
pub fn verify(envelope: &Envelope, signer: &VerifyingKey, keys: &DocumentKeys) -> bool {
    let Some(encoded) = envelope.signature() else {
        return false;
    };
    let Ok(bytes) = BASE64.decode(encoded) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&bytes) else {
        return false;
    };

    let document = document_for(envelope, keys);
    signer.verify(document.as_bytes(), &signature).is_ok()
}

/// Whether a message type must arrive signed.
#[must_use]
pub const fn requires_signature(kind: MessageType) -> bool {
    matches!(kind, MessageType::SkillRequest)
}

/// Apply the signature policy to an inbound envelope.
///
/// Skill requests must be signed. Anything else may be unsigned, but a
/// signature that is present is always checked.
///
/// # Errors
/// Returns the reason the envelope is rejected.
pub fn check_signature(
    envelope: &Envelope,
    signer: &VerifyingKey,
    keys: &DocumentKeys,
) -> Result<(), VerificationFailure> {
    if envelope.signature().is_none() {
        if requires_signature(envelope.kind) {
            return Err(VerificationFailure::MissingSignature(envelope.kind));
        }
        return Ok(());
    }

    if verify(envelope, signer, keys) {
        Ok(())
    } else {
        Err(VerificationFailure::BadSignature)
    }
}
