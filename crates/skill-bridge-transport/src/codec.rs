//! Envelope codec.
//!
//! Two layers of gzip: the payload body inside the envelope, and the whole
//! envelope as one binary frame.

use std::io::{Read, Write};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, SecondsFormat, Utc};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use serde::Serialize;
use serde_json::Value;

use crate::{CodecError, Envelope, MessageType};

/// Gzip-compress bytes.
///
/// # Errors
/// Returns error if the encoder fails.
pub fn gzip(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Largest decompressed frame or payload accepted from the wire.
pub const MAX_DECODED_BYTES: usize = 16 * 1024 * 1024;

/// Decompress gzip bytes.
///
/// # Errors
/// Returns error if the input is not a valid gzip stream or inflates past
/// [`MAX_DECODED_BYTES`].
pub fn gunzip(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .take(MAX_DECODED_BYTES as u64 + 1)
        .read_to_end(&mut out)?;
    if out.len() > MAX_DECODED_BYTES {
        return Err(CodecError::TooLarge {
            limit: MAX_DECODED_BYTES,
        });
    }
    Ok(out)
}

/// Format a timestamp the way the server expects (`2024-05-01T12:00:00.000Z`).
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Build an unsigned envelope around a payload.
///
/// # Errors
/// Returns error if the payload cannot be serialized or compressed.
pub fn encode<T: Serialize + ?Sized>(
    payload: &T,
    kind: MessageType,
    sequence: u64,
    timestamp: DateTime<Utc>,
) -> Result<Envelope, CodecError> {
    let json = serde_json::to_vec(payload)?;
    let compressed = gzip(&json)?;

    Ok(Envelope {
        sequence,
        signature: None,
        signature_version: None,
        timestamp: format_timestamp(timestamp),
        payload: BASE64.encode(compressed),
        kind,
    })
}

/// Decode the body of an envelope.
///
/// # Errors
/// Returns error on malformed base64, gzip, UTF-8 or JSON.
pub fn decode(envelope: &Envelope) -> Result<(MessageType, Value), CodecError> {
    let compressed = BASE64.decode(&envelope.payload)?;
    let text = String::from_utf8(gunzip(&compressed)?)?;
    let body = serde_json::from_str(&text)?;
    Ok((envelope.kind, body))
}

/// Serialize and compress an envelope into one binary frame.
///
/// # Errors
/// Returns error if serialization or compression fails.
pub fn encode_frame(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    gzip(&serde_json::to_vec(envelope)?)
}

/// Decompress and parse one binary frame.
///
/// # Errors
/// Returns error on malformed gzip, UTF-8 or JSON.
pub fn decode_frame(frame: &[u8]) -> Result<Envelope, CodecError> {
    let text = String::from_utf8(gunzip(frame)?)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_payload_roundtrip() {
        let body = json!({
            "request": {"intent": "TurnOn", "slots": [{"name": "room", "value": "kitchen"}]},
            "unicode": "grüße ✓",
            "n": 1.5,
        });
        let envelope = encode(&body, MessageType::SkillRequest, 7, at()).unwrap();

        assert_eq!(envelope.sequence, 7);
        assert_eq!(envelope.kind, MessageType::SkillRequest);
        assert_eq!(envelope.timestamp, "2024-05-01T12:00:00.000Z");
        assert!(envelope.signature.is_none());

        let (kind, decoded) = decode(&envelope).unwrap();
        assert_eq!(kind, MessageType::SkillRequest);
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_payload_is_base64_gzip() {
        let envelope = encode(&json!({"a": 1}), MessageType::Error, 1, at()).unwrap();
        let compressed = BASE64.decode(&envelope.payload).unwrap();
        // gzip magic
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
        assert_eq!(gunzip(&compressed).unwrap(), br#"{"a":1}"#);
    }

    #[test]
    fn test_frame_roundtrip() {
        let envelope = encode(&json!({"success": true, "message": ""}), MessageType::AuthResponse, 1, at())
            .unwrap();
        let frame = encode_frame(&envelope).unwrap();
        assert_eq!(&frame[..2], &[0x1f, 0x8b]);
        assert_eq!(decode_frame(&frame).unwrap(), envelope);
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        let mut envelope = encode(&json!({}), MessageType::Error, 1, at()).unwrap();

        envelope.payload = "%%%".to_string();
        assert!(matches!(decode(&envelope), Err(CodecError::Base64(_))));

        envelope.payload = BASE64.encode(b"plain text, not gzip");
        assert!(matches!(decode(&envelope), Err(CodecError::Gzip(_))));

        envelope.payload = BASE64.encode(gzip(b"{not json").unwrap());
        assert!(matches!(decode(&envelope), Err(CodecError::Json(_))));

        envelope.payload = BASE64.encode(gzip(&[0xff, 0xfe]).unwrap());
        assert!(matches!(decode(&envelope), Err(CodecError::Utf8(_))));
    }

    #[test]
    fn test_decode_frame_rejects_garbage() {
        assert!(decode_frame(b"nope").is_err());
        assert!(matches!(
            decode_frame(&gzip(b"[]").unwrap()),
            Err(CodecError::Json(_))
        ));
    }

    #[test]
    fn test_inflation_past_limit_is_rejected() {
        let bomb = gzip(&vec![b' '; MAX_DECODED_BYTES + 1]).unwrap();
        // A few kilobytes on the wire.
        assert!(bomb.len() < 64 * 1024);
        assert!(matches!(
            gunzip(&bomb),
            Err(CodecError::TooLarge { limit: MAX_DECODED_BYTES })
        ));
        assert!(matches!(decode_frame(&bomb), Err(CodecError::TooLarge { .. })));

        let at_limit = gzip(&vec![b' '; MAX_DECODED_BYTES]).unwrap();
        assert_eq!(gunzip(&at_limit).unwrap().len(), MAX_DECODED_BYTES);
    }
}
