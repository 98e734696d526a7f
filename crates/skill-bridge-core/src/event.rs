//! Events a session reports to its host.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Operator-facing connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Authenticated,
    AuthError,
    WebsocketError,
}

/// Colour of the host's status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFill {
    Red,
    Yellow,
    Green,
}

impl Status {
    /// Status text shown to operators.
    #[must_use]
    pub const fn text(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticating => "connected, authenticating...",
            Self::Authenticated => "connected, authenticated",
            Self::AuthError => "connected, auth-error",
            Self::WebsocketError => "websocket error",
        }
    }

    /// Indicator colour for this status.
    #[must_use]
    pub const fn fill(self) -> StatusFill {
        match self {
            Self::Disconnected | Self::WebsocketError => StatusFill::Red,
            Self::Connecting | Self::Authenticating | Self::AuthError => StatusFill::Yellow,
            Self::Connected | Self::Authenticated => StatusFill::Green,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Placeholder reply the business layer fills in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillResponseTemplate {
    pub version: String,
    pub response: Value,
}

impl Default for SkillResponseTemplate {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            response: Value::Object(serde_json::Map::new()),
        }
    }
}

/// A verified skill request handed to the business layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillRequestNotice {
    /// Opaque request body, exactly as the server sent it.
    pub skill_request: Value,
    /// Correlation id of the session that received the request.
    pub skill_request_node_id: Uuid,
    pub skill_response: SkillResponseTemplate,
}

impl SkillRequestNotice {
    /// Wrap a request body received by the given session.
    #[must_use]
    pub fn new(skill_request: Value, session_id: Uuid) -> Self {
        Self {
            skill_request,
            skill_request_node_id: session_id,
            skill_response: SkillResponseTemplate::default(),
        }
    }

    /// Build the reply message carrying the given response body.
    #[must_use]
    pub fn reply(&self, skill_response: Value) -> SkillReply {
        SkillReply {
            skill_request_node_id: self.skill_request_node_id,
            skill_response,
        }
    }
}

/// A reply from the business layer, addressed by correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillReply {
    pub skill_request_node_id: Uuid,
    pub skill_response: Value,
}

/// Session event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Connection status changed.
    Status(Status),
    /// Something went wrong and was recovered locally.
    Diagnostic(String),
    /// A verified skill request arrived.
    SkillRequest(SkillRequestNotice),
    /// The session was torn down for good.
    Closed,
}

impl SessionEvent {
    /// Rough in-memory size, used to bound history.
    #[must_use]
    pub fn approx_bytes(&self) -> usize {
        const OVERHEAD: usize = 16;
        match self {
            Self::Status(_) | Self::Closed => OVERHEAD,
            Self::Diagnostic(s) => OVERHEAD + s.len(),
            Self::SkillRequest(notice) => {
                OVERHEAD + notice.skill_request.to_string().len()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text() {
        assert_eq!(Status::Disconnected.to_string(), "disconnected");
        assert_eq!(Status::Authenticating.to_string(), "connected, authenticating...");
        assert_eq!(Status::Authenticated.to_string(), "connected, authenticated");
        assert_eq!(Status::AuthError.to_string(), "connected, auth-error");
        assert_eq!(Status::WebsocketError.to_string(), "websocket error");
        assert_eq!(Status::AuthError.fill(), StatusFill::Yellow);
        assert_eq!(Status::WebsocketError.fill(), StatusFill::Red);
    }

    #[test]
    fn test_notice_shape() {
        let id = Uuid::new_v4();
        let notice = SkillRequestNotice::new(serde_json::json!({"intent": "lights"}), id);
        let json = serde_json::to_value(&notice).unwrap();

        assert_eq!(json["skillRequest"]["intent"], "lights");
        assert_eq!(json["skillRequestNodeId"], id.to_string());
        assert_eq!(json["skillResponse"]["version"], "1.0");
        assert_eq!(json["skillResponse"]["response"], serde_json::json!({}));
    }

    #[test]
    fn test_reply_parses_host_message() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"skillRequestNodeId":"{id}","skillResponse":{{"ok":true}}}}"#);
        let reply: SkillReply = serde_json::from_str(&raw).unwrap();
        assert_eq!(reply.skill_request_node_id, id);
        assert_eq!(reply.skill_response["ok"], true);
    }
}
