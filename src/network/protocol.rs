//! Protocol Messages
//!
//! Wire format for client-server communication over the push channel.
//! Every frame is a single JSON object whose `t` field names the variant.
//! Unknown `t` values and schema-invalid payloads are rejected here, before
//! anything reaches the state machine.

use serde::{Serialize, Deserialize};
use serde_json::Value;
use thiserror::Error;

use crate::game::events::MatchEvent;
use crate::game::machine::EngineError;
use crate::game::state::Role;

/// Longest accepted match or module identifier, in bytes.
pub const MAX_ID_LEN: usize = 128;

// =============================================================================
// CLIENT -> SERVER FRAMES
// =============================================================================

/// Frames sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Bind this connection to a match.
    Join(JoinRequest),

    /// Submit a module action.
    Action(ActionRequest),

    /// Keepalive.
    Ping,
}

/// Join request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// Match to join.
    pub match_id: String,
    /// Participant role.
    pub role: Role,
}

/// Module action request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    /// Target match.
    pub match_id: String,
    /// Target module key.
    pub module_id: String,
    /// Module-defined payload, opaque to the engine.
    #[serde(default)]
    pub a: Value,
}

// =============================================================================
// SERVER -> CLIENT FRAMES
// =============================================================================

/// Frames sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Full snapshot (on join) or diff (after an action).
    State(StateUpdate),

    /// Low-volume match event.
    Event(EventNotice),

    /// Error scoped to the requesting connection.
    Error(ErrorReply),

    /// Keepalive reply.
    Pong,
}

/// State frame body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    /// Match identifier.
    pub match_id: String,
    /// Match version this state corresponds to.
    pub v: u64,
    /// Changed fields, or the whole match for snapshots.
    pub diff: Value,
}

/// Event frame body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventNotice {
    /// Match identifier.
    pub match_id: String,
    /// Event payload, always carrying a `type` field.
    pub e: Value,
}

/// Error frame body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Machine-readable code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub msg: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed frame or payload.
    ValidationError,
    /// Match not found.
    MatchNotFound,
    /// Module not found.
    ModuleNotFound,
    /// Match is completed or failed.
    MatchNotActive,
    /// Module already solved.
    ModuleSolved,
    /// Lost a concurrent write; safe to retry.
    VersionConflict,
    /// Internal error.
    InternalError,
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Frame decoding and validation errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Not JSON, unknown `t`, or missing/mistyped fields.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Frame exceeds the configured size limit.
    #[error("frame too large: {size} bytes (limit {limit})")]
    TooLarge {
        /// Received size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Field present but unacceptable.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Binary frames are not part of the protocol.
    #[error("binary frames are not supported")]
    Binary,
}

fn validate_id(field: &'static str, value: &str) -> Result<(), FrameError> {
    if value.is_empty() {
        return Err(FrameError::InvalidField { field, reason: "must not be empty" });
    }
    if value.len() > MAX_ID_LEN {
        return Err(FrameError::InvalidField { field, reason: "too long" });
    }
    if value.chars().any(char::is_control) {
        return Err(FrameError::InvalidField { field, reason: "contains control characters" });
    }
    if value.chars().any(is_invisible_format) {
        return Err(FrameError::InvalidField { field, reason: "contains invisible characters" });
    }
    Ok(())
}

/// Unicode format characters that render as nothing (zero-width, bidi
/// overrides, BOM, soft hyphen).
fn is_invisible_format(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{061C}'
            | '\u{180E}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{206F}'
            | '\u{FEFF}'
            | '\u{FFF9}'..='\u{FFFB}'
    )
}

impl ClientFrame {
    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode and validate an inbound text frame.
    pub fn decode(text: &str, max_bytes: usize) -> Result<Self, FrameError> {
        if text.len() > max_bytes {
            return Err(FrameError::TooLarge { size: text.len(), limit: max_bytes });
        }
        let frame = Self::from_json(text)?;
        frame.validate()?;
        Ok(frame)
    }

    /// Field-level checks serde cannot express.
    pub fn validate(&self) -> Result<(), FrameError> {
        match self {
            ClientFrame::Join(join) => validate_id("matchId", &join.match_id),
            ClientFrame::Action(action) => {
                validate_id("matchId", &action.match_id)?;
                validate_id("moduleId", &action.module_id)
            }
            ClientFrame::Ping => Ok(()),
        }
    }

    /// Frame name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::Join(_) => "join",
            ClientFrame::Action(_) => "action",
            ClientFrame::Ping => "ping",
        }
    }
}

impl ServerFrame {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// State frame.
    pub fn state(match_id: &str, v: u64, diff: Value) -> Self {
        ServerFrame::State(StateUpdate { match_id: match_id.to_string(), v, diff })
    }

    /// Error frame.
    pub fn error(code: ErrorCode, msg: impl Into<String>) -> Self {
        ServerFrame::Error(ErrorReply { code, msg: msg.into() })
    }

    /// Wire frame for a state machine event.
    pub fn from_event(match_id: &str, event: &MatchEvent) -> Self {
        match event {
            MatchEvent::StateDiff { version, diff } => Self::state(match_id, *version, diff.clone()),
            other => ServerFrame::Event(EventNotice {
                match_id: match_id.to_string(),
                // Every non-diff event has a payload
                e: other.wire_payload().unwrap_or(Value::Null),
            }),
        }
    }
}

impl From<&FrameError> for ServerFrame {
    fn from(err: &FrameError) -> Self {
        ServerFrame::error(ErrorCode::ValidationError, err.to_string())
    }
}

impl From<&EngineError> for ServerFrame {
    fn from(err: &EngineError) -> Self {
        let code = match err {
            EngineError::Validation(_) => ErrorCode::ValidationError,
            EngineError::MatchNotFound(_) => ErrorCode::MatchNotFound,
            EngineError::ModuleNotFound(_) => ErrorCode::ModuleNotFound,
            EngineError::MatchNotActive { .. } => ErrorCode::MatchNotActive,
            EngineError::ModuleSolved(_) => ErrorCode::ModuleSolved,
            EngineError::VersionConflict { .. } => ErrorCode::VersionConflict,
            EngineError::Internal(_) => ErrorCode::InternalError,
        };
        // Internal details stay in the server log
        let msg = match err {
            EngineError::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        };
        ServerFrame::error(code, msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_join() {
        let frame = ClientFrame::decode(r#"{"t":"join","matchId":"m1","role":"spectator"}"#, 1024)
            .unwrap();
        assert_eq!(
            frame,
            ClientFrame::Join(JoinRequest { match_id: "m1".to_string(), role: Role::Spectator })
        );
    }

    #[test]
    fn test_decode_action_with_payload() {
        let frame = ClientFrame::decode(
            r#"{"t":"action","matchId":"m1","moduleId":"glyphOrder","a":{"press":"sun"}}"#,
            1024,
        )
        .unwrap();

        match frame {
            ClientFrame::Action(action) => {
                assert_eq!(action.module_id, "glyphOrder");
                assert_eq!(action.a, json!({ "press": "sun" }));
            }
            other => panic!("wrong frame: {other:?}"),
        }
    }

    #[test]
    fn test_action_without_payload_defaults_to_null() {
        let frame = ClientFrame::decode(r#"{"t":"action","matchId":"m1","moduleId":"x"}"#, 1024)
            .unwrap();
        assert!(matches!(frame, ClientFrame::Action(ActionRequest { a: Value::Null, .. })));
    }

    #[test]
    fn test_decode_ping() {
        assert_eq!(ClientFrame::decode(r#"{"t":"ping"}"#, 64).unwrap(), ClientFrame::Ping);
    }

    #[test]
    fn test_rejects_unknown_type() {
        let err = ClientFrame::decode(r#"{"t":"launch","matchId":"m1"}"#, 1024).unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn test_rejects_bad_role() {
        let err = ClientFrame::decode(r#"{"t":"join","matchId":"m1","role":"admin"}"#, 1024)
            .unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn test_rejects_empty_ids() {
        let err = ClientFrame::decode(r#"{"t":"join","matchId":"","role":"player"}"#, 1024)
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidField { field: "matchId", .. }));

        let err = ClientFrame::decode(r#"{"t":"action","matchId":"m1","moduleId":""}"#, 1024)
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidField { field: "moduleId", .. }));
    }

    #[test]
    fn test_rejects_invisible_ids() {
        for id in ["m\u{200B}1", "\u{FEFF}m1", "m1\u{202E}"] {
            let text = serde_json::json!({ "t": "join", "matchId": id, "role": "player" }).to_string();
            let err = ClientFrame::decode(&text, 1024).unwrap_err();
            assert!(matches!(err, FrameError::InvalidField { field: "matchId", .. }));
        }

        // Visible non-ASCII is fine
        assert!(ClientFrame::decode(r#"{"t":"join","matchId":"partie-é","role":"player"}"#, 1024).is_ok());
    }

    #[test]
    fn test_rejects_oversized() {
        let err = ClientFrame::decode(r#"{"t":"ping"}"#, 4).unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { limit: 4, .. }));
    }

    #[test]
    fn test_server_frame_shapes() {
        let state = ServerFrame::state("m1", 3, json!({ "strikes": 1 }));
        let value: Value = serde_json::from_str(&state.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({ "t": "state", "matchId": "m1", "v": 3, "diff": { "strikes": 1 } }));

        let pong: Value = serde_json::from_str(&ServerFrame::Pong.to_json().unwrap()).unwrap();
        assert_eq!(pong, json!({ "t": "pong" }));
    }

    #[test]
    fn test_error_codes() {
        let frame = ServerFrame::from(&EngineError::MatchNotFound("m9".to_string()));
        let json = frame.to_json().unwrap();
        assert!(json.contains(r#""t":"error""#));
        assert!(json.contains("MATCH_NOT_FOUND"));
    }

    #[test]
    fn test_internal_error_hides_detail() {
        let frame = ServerFrame::from(&EngineError::Internal("disk on fire".to_string()));
        match frame {
            ServerFrame::Error(reply) => {
                assert_eq!(reply.code, ErrorCode::InternalError);
                assert!(!reply.msg.contains("disk"));
            }
            other => panic!("wrong frame: {other:?}"),
        }
    }

    #[test]
    fn test_event_frame_from_strike() {
        let event = MatchEvent::Strike { module_id: "glyphOrder".to_string(), strikes: 1 };
        let frame = ServerFrame::from_event("m1", &event);
        let value: Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(value["t"], "event");
        assert_eq!(value["matchId"], "m1");
        assert_eq!(value["e"]["type"], "strike");
    }
}
