//! Instance and server key material.
//!
//! Credentials arrive as base64 text from the host's credential store. The
//! text form of both public keys is kept verbatim because it is part of every
//! signing document.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::{
    KEYPAIR_LENGTH, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH, SigningKey, VerifyingKey,
};
use serde::Deserialize;
use thiserror::Error;

/// Credential errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("{field} is not valid base64")]
    InvalidBase64 { field: &'static str },
    #[error("{field} has invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: &'static str,
        actual: usize,
    },
    #[error("{field} is not a valid ed25519 key")]
    InvalidKey { field: &'static str },
    #[error("instance public key does not match instance private key")]
    Mismatch,
}

/// Raw credentials as supplied by the host.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub instance_public_key: String,
    pub instance_private_key: String,
    pub server_public_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("instance_public_key", &self.instance_public_key)
            .field("instance_private_key", &"<redacted>")
            .field("server_public_key", &self.server_public_key)
            .finish()
    }
}

impl Credentials {
    /// Parse and validate the key material.
    ///
    /// # Errors
    /// Returns error if any key is malformed or the instance pair does not match.
    pub fn load(&self) -> Result<SessionKeys, KeyError> {
        SessionKeys::from_credentials(self)
    }
}

/// Parsed key material for one session.
#[derive(Clone)]
pub struct SessionKeys {
    instance_public_key: String,
    server_public_key: String,
    signing_key: SigningKey,
    server_key: VerifyingKey,
}

impl SessionKeys {
    /// Build from credentials.
    ///
    /// The private key may be a 64-byte expanded key (seed followed by the
    /// public key) or a bare 32-byte seed.
    ///
    /// # Errors
    /// Returns error if any key is malformed or the instance pair does not match.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self, KeyError> {
        let private = decode("instance_private_key", &credentials.instance_private_key)?;
        let signing_key = match private.len() {
            KEYPAIR_LENGTH => {
                let bytes: [u8; KEYPAIR_LENGTH] =
                    private.as_slice().try_into().map_err(|_| KeyError::InvalidKey {
                        field: "instance_private_key",
                    })?;
                SigningKey::from_keypair_bytes(&bytes).map_err(|_| KeyError::Mismatch)?
            }
            SECRET_KEY_LENGTH => {
                let bytes: [u8; SECRET_KEY_LENGTH] =
                    private.as_slice().try_into().map_err(|_| KeyError::InvalidKey {
                        field: "instance_private_key",
                    })?;
                tracing::debug!("instance private key given as a bare seed");
                SigningKey::from_bytes(&bytes)
            }
            actual => {
                return Err(KeyError::InvalidLength {
                    field: "instance_private_key",
                    expected: "32 or 64",
                    actual,
                });
            }
        };

        let instance_key =
            public_key("instance_public_key", &credentials.instance_public_key)?;
        if instance_key != signing_key.verifying_key() {
            return Err(KeyError::Mismatch);
        }

        let server_key = public_key("server_public_key", &credentials.server_public_key)?;

        Ok(Self {
            instance_public_key: credentials.instance_public_key.clone(),
            server_public_key: credentials.server_public_key.clone(),
            signing_key,
            server_key,
        })
    }

    /// Build directly from an instance signing key and the server's key.
    #[must_use]
    pub fn new(signing_key: SigningKey, server_key: VerifyingKey) -> Self {
        Self {
            instance_public_key: BASE64.encode(signing_key.verifying_key().as_bytes()),
            server_public_key: BASE64.encode(server_key.as_bytes()),
            signing_key,
            server_key,
        }
    }

    /// Instance public key as base64 text.
    #[must_use]
    pub fn instance_public_key(&self) -> &str {
        &self.instance_public_key
    }

    /// Server public key as base64 text.
    #[must_use]
    pub fn server_public_key(&self) -> &str {
        &self.server_public_key
    }

    /// Instance signing key.
    #[must_use]
    pub const fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Server verifying key.
    #[must_use]
    pub const fn server_key(&self) -> &VerifyingKey {
        &self.server_key
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys")
            .field("instance_public_key", &self.instance_public_key)
            .field("server_public_key", &self.server_public_key)
            .finish_non_exhaustive()
    }
}

fn decode(field: &'static str, text: &str) -> Result<Vec<u8>, KeyError> {
    BASE64
        .decode(text.trim())
        .map_err(|_| KeyError::InvalidBase64 { field })
}

fn public_key(field: &'static str, text: &str) -> Result<VerifyingKey, KeyError> {
    let bytes = decode(field, text)?;
    let bytes: [u8; PUBLIC_KEY_LENGTH] =
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidLength {
                field,
                expected: "32",
                actual: bytes.len(),
            })?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidKey { field })
}
