//! Match Events
//!
//! Everything the state machine emits for one accepted action, in
//! emission order. The network layer turns these into server frames.

use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::game::state::MatchStatus;

/// An event emitted by the state machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MatchEvent {
    /// State diff: only the fields this action changed.
    StateDiff {
        /// New match version.
        version: u64,
        /// Changed match fields.
        diff: Value,
    },

    /// A module reported an incorrect attempt.
    Strike {
        /// Module that struck.
        module_id: String,
        /// Match-wide strike count after this strike.
        strikes: u32,
    },

    /// A module reported solved.
    Solved {
        /// Solved module.
        module_id: String,
    },

    /// A module-defined event, passed through untouched.
    Module {
        /// Emitting module.
        module_id: String,
        /// Module payload.
        payload: Value,
    },

    /// Match reached a terminal status.
    MatchEnded {
        /// `completed` or `failed`.
        status: MatchStatus,
    },
}

impl MatchEvent {
    /// Payload for the wire `e` field. `None` for state diffs, which travel
    /// as `state` frames instead.
    pub fn wire_payload(&self) -> Option<Value> {
        match self {
            MatchEvent::StateDiff { .. } => None,
            MatchEvent::Strike { module_id, strikes } => Some(serde_json::json!({
                "type": "strike",
                "moduleId": module_id,
                "strikes": strikes,
            })),
            MatchEvent::Solved { module_id } => Some(serde_json::json!({
                "type": "solved",
                "moduleId": module_id,
            })),
            MatchEvent::Module { module_id, payload } => Some(serde_json::json!({
                "type": "module",
                "moduleId": module_id,
                "data": payload,
            })),
            MatchEvent::MatchEnded { status } => Some(serde_json::json!({
                "type": "matchEnded",
                "status": status,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strike_payload() {
        let event = MatchEvent::Strike { module_id: "glyphOrder".to_string(), strikes: 2 };
        let payload = event.wire_payload().unwrap();
        assert_eq!(payload["type"], "strike");
        assert_eq!(payload["moduleId"], "glyphOrder");
        assert_eq!(payload["strikes"], 2);
    }

    #[test]
    fn test_state_diff_has_no_event_payload() {
        let event = MatchEvent::StateDiff { version: 1, diff: Value::Null };
        assert!(event.wire_payload().is_none());
    }

    #[test]
    fn test_match_ended_payload() {
        let payload = MatchEvent::MatchEnded { status: MatchStatus::Failed }
            .wire_payload()
            .unwrap();
        assert_eq!(payload["status"], "failed");
    }
}
