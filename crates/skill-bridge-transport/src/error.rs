//! Codec and verification errors.

use thiserror::Error;

use crate::MessageType;

/// Malformed frame or payload.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("gzip error: {0}")]
    Gzip(#[from] std::io::Error),
    #[error("decompressed data exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("invalid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reason an inbound envelope was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    #[error("message sequence '{actual}' does not match expected server sequence '{expected}'")]
    SequenceMismatch { expected: u64, actual: u64 },
    #[error("message timestamp '{timestamp}' could not be parsed")]
    UnparseableTimestamp { timestamp: String },
    #[error(
        "message timestamp '{timestamp}' is not within expected bounds of current client utc '{now}'. \
         ensure your instance's clock drift is within +/- {tolerance_minutes} minutes of Coordinated Universal Time."
    )]
    ClockSkew {
        timestamp: String,
        now: String,
        tolerance_minutes: u64,
    },
    #[error("message type '{0:?}' requires signature but is not signed")]
    MissingSignature(MessageType),
    #[error("signature verification failed")]
    BadSignature,
}
