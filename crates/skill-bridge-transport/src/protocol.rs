//! Wire protocol for client-server communication.
//!
//! Field names and the integer values of [`MessageType`] are shared with the
//! coordination server and must not change.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of payload carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum MessageType {
    Unknown = 0,
    SkillRequest = 1,
    SkillResponse = 2,
    AuthRequest = 3,
    AuthResponse = 4,
    Error = 5,
}

impl From<i64> for MessageType {
    fn from(value: i64) -> Self {
        match value {
            1 => Self::SkillRequest,
            2 => Self::SkillResponse,
            3 => Self::AuthRequest,
            4 => Self::AuthResponse,
            5 => Self::Error,
            _ => Self::Unknown,
        }
    }
}

impl From<MessageType> for i64 {
    fn from(value: MessageType) -> Self {
        value as Self
    }
}

/// Signed, sequenced wire message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_version: Option<u32>,
    /// UTC ISO-8601 timestamp.
    pub timestamp: String,
    /// Base64 of the gzip-compressed JSON body.
    #[serde(default)]
    pub payload: String,
    #[serde(rename = "type", default = "unknown_type")]
    pub kind: MessageType,
}

const fn unknown_type() -> MessageType {
    MessageType::Unknown
}

impl Envelope {
    /// Signature text, if present and non-empty.
    #[must_use]
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref().filter(|s| !s.is_empty())
    }
}

/// Authentication request, sent once per handshake attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub instance_public_key: String,
    pub server_public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,
}

/// Server's answer to an [`AuthRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// Unsolicited error from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    #[serde(default)]
    pub message: String,
}

/// Decoded envelope body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    SkillRequest(Value),
    SkillResponse(Value),
    AuthRequest(AuthRequest),
    AuthResponse(AuthResponse),
    Error(ErrorNotice),
}

impl Payload {
    /// Message type this payload travels as.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::SkillRequest(_) => MessageType::SkillRequest,
            Self::SkillResponse(_) => MessageType::SkillResponse,
            Self::AuthRequest(_) => MessageType::AuthRequest,
            Self::AuthResponse(_) => MessageType::AuthResponse,
            Self::Error(_) => MessageType::Error,
        }
    }

    /// JSON body of this payload.
    ///
    /// # Errors
    /// Returns error if the body cannot be represented as JSON.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::SkillRequest(v) | Self::SkillResponse(v) => Ok(v.clone()),
            Self::AuthRequest(r) => serde_json::to_value(r),
            Self::AuthResponse(r) => serde_json::to_value(r),
            Self::Error(e) => serde_json::to_value(e),
        }
    }

    /// Interpret a decoded JSON body.
    ///
    /// Returns `None` for [`MessageType::Unknown`].
    ///
    /// # Errors
    /// Returns error if the body does not match the type's shape.
    pub fn from_parts(kind: MessageType, body: Value) -> Result<Option<Self>, serde_json::Error> {
        let payload = match kind {
            MessageType::Unknown => return Ok(None),
            MessageType::SkillRequest => Self::SkillRequest(body),
            MessageType::SkillResponse => Self::SkillResponse(body),
            MessageType::AuthRequest => Self::AuthRequest(serde_json::from_value(body)?),
            MessageType::AuthResponse => Self::AuthResponse(serde_json::from_value(body)?),
            MessageType::Error => Self::Error(serde_json::from_value(body)?),
        };
        Ok(Some(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_field_names() {
        let envelope = Envelope {
            sequence: 3,
            signature: Some("c2ln".to_string()),
            signature_version: Some(0),
            timestamp: "2024-05-01T12:00:00.000Z".to_string(),
            payload: "H4sI".to_string(),
            kind: MessageType::AuthRequest,
        };
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["sequence"], 3);
        assert_eq!(json["signature"], "c2ln");
        assert_eq!(json["signatureVersion"], 0);
        assert_eq!(json["timestamp"], "2024-05-01T12:00:00.000Z");
        assert_eq!(json["payload"], "H4sI");
        assert_eq!(json["type"], 3);
    }

    #[test]
    fn test_unsigned_envelope_omits_signature_fields() {
        let raw = r#"{"sequence":1,"timestamp":"2024-05-01T12:00:00.000Z","payload":"","type":4}"#;
        let envelope: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.kind, MessageType::AuthResponse);
        assert_eq!(envelope.signature(), None);

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(!json.contains("signature"));
    }

    #[test]
    fn test_empty_signature_counts_as_unsigned() {
        let raw = r#"{"sequence":1,"signature":"","timestamp":"t","payload":"","type":1}"#;
        let envelope: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.signature(), None);
    }

    #[test]
    fn test_message_type_values() {
        let values: Vec<i64> = [
            MessageType::Unknown,
            MessageType::SkillRequest,
            MessageType::SkillResponse,
            MessageType::AuthRequest,
            MessageType::AuthResponse,
            MessageType::Error,
        ]
        .into_iter()
        .map(i64::from)
        .collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(MessageType::from(42), MessageType::Unknown);
    }

    #[test]
    fn test_auth_request_shape() {
        let request = AuthRequest {
            instance_public_key: "aW5zdA==".to_string(),
            server_public_key: "c3J2".to_string(),
            node_version: None,
            package_version: Some("0.1.0".to_string()),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["instancePublicKey"], "aW5zdA==");
        assert_eq!(json["serverPublicKey"], "c3J2");
        assert_eq!(json["packageVersion"], "0.1.0");
        assert!(json.get("nodeVersion").is_none());
    }

    #[test]
    fn test_payload_from_parts() {
        let body = serde_json::json!({"success": false, "message": "unknown instance"});
        let payload = Payload::from_parts(MessageType::AuthResponse, body).unwrap();
        assert_eq!(
            payload,
            Some(Payload::AuthResponse(AuthResponse {
                success: false,
                message: "unknown instance".to_string(),
            }))
        );

        assert_eq!(
            Payload::from_parts(MessageType::Unknown, serde_json::json!({})).unwrap(),
            None
        );
        assert!(Payload::from_parts(MessageType::AuthResponse, serde_json::json!([1])).is_err());
    }
}
