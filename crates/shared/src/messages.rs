//! Duplex wire protocol between the client and the session engine.
//!
//! ## Versioning Policy
//!
//! - New variants can be added at the end (forward compatible).
//! - Removing or renaming a variant is a breaking change.
//! - Unknown variants deserialize to `Unknown` rather than failing, so an
//!   older client tolerates a newer server.

use serde::{Deserialize, Serialize};

use taleforge_domain::{Genre, Mood, NarrativeEntry, Panel, Region, Summary};

use crate::errors::ErrorCode;

/// Messages sent from the client to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    PlayerInput {
        text: String,
    },
    /// Post-open authentication path; the primary path authenticates via
    /// the `adventureId`/`token` query parameters on the upgrade request.
    Authenticate {
        token: String,
    },
    /// Legacy no-op, kept for older clients that still send it.
    StartAdventure,

    /// Unknown message type for forward compatibility.
    #[serde(other)]
    Unknown,
}

/// Messages sent from the server to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum ServerMessage {
    Pong,
    AdventureLoaded {
        adventure_id: String,
        history: Vec<NarrativeEntry>,
    },
    ThemeChange {
        mood: Mood,
        genre: Genre,
        region: Region,
        background_url: Option<String>,
    },
    GmResponseStart {
        message_id: String,
    },
    GmResponseChunk {
        message_id: String,
        text: String,
    },
    GmResponseEnd {
        message_id: String,
    },
    ToolStatus {
        state: ToolStatusState,
        description: String,
    },
    PanelCreate {
        #[serde(flatten)]
        panel: Panel,
    },
    PanelUpdate {
        id: String,
        content: String,
    },
    PanelDismiss {
        id: String,
    },
    RecapStarted,
    RecapComplete {
        history: Vec<NarrativeEntry>,
        summary: Option<Summary>,
    },
    RecapError {
        reason: String,
    },
    Error {
        code: ErrorCode,
        message: String,
        retryable: bool,
        technical_details: Option<String>,
    },

    /// Unknown message type for forward compatibility.
    #[serde(other)]
    Unknown,
}

/// Liveness of the session's agent-call pipeline, surfaced to the client so
/// it can show a status indicator during long-running turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatusState {
    Active,
    Idle,
}

impl ServerMessage {
    /// Build an `error` message from a code and a human-readable message,
    /// defaulting retryability from the code's class.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        let retryable = code.default_retryable();
        ServerMessage::Error {
            code,
            message: message.into(),
            retryable,
            technical_details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_input_round_trips() {
        let msg = ClientMessage::PlayerInput {
            text: "look around".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let decoded: ClientMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(decoded, ClientMessage::PlayerInput { text } if text == "look around"));
    }

    #[test]
    fn unknown_client_message_deserializes_to_unknown() {
        let decoded: ClientMessage =
            serde_json::from_str(r#"{"type":"brand_new_thing","payload":{"foo":1}}"#).unwrap();
        assert!(matches!(decoded, ClientMessage::Unknown));
    }

    #[test]
    fn unknown_server_message_deserializes_to_unknown() {
        let decoded: ServerMessage =
            serde_json::from_str(r#"{"type":"brand_new_thing","payload":{"foo":1}}"#).unwrap();
        assert!(matches!(decoded, ServerMessage::Unknown));
    }

    #[test]
    fn theme_change_carries_nullable_background() {
        let msg = ServerMessage::ThemeChange {
            mood: Mood::Ominous,
            genre: Genre::HighFantasy,
            region: Region::Forest,
            background_url: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["payload"]["background_url"], serde_json::Value::Null);
    }

    #[test]
    fn error_helper_fills_default_retryable() {
        let msg = ServerMessage::error(ErrorCode::RateLimit, "slow down");
        assert!(matches!(msg, ServerMessage::Error { retryable: true, .. }));
    }
}
