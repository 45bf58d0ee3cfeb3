//! Match State Machine
//!
//! Pure transition function: given the stored match and one action, produce
//! the next match record and the events to broadcast. No I/O happens here;
//! persisting the result (with a compare-and-swap on `version`) is the
//! caller's job.

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::game::events::MatchEvent;
use crate::game::module::ModuleError;
use crate::game::registry::ModuleRegistry;
use crate::game::state::{MatchRecord, MatchStatus};

/// Engine errors. Every variant is scoped to the requesting connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Malformed frame or action payload.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No match with this id.
    #[error("match not found: {0}")]
    MatchNotFound(String),

    /// Module key unknown, or not part of the match.
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    /// Action against a completed or failed match.
    #[error("match {match_id} is {status}")]
    MatchNotActive {
        /// Match identifier.
        match_id: String,
        /// Current terminal status.
        status: MatchStatus,
    },

    /// Action against a module that already reported solved.
    #[error("module already solved: {0}")]
    ModuleSolved(String),

    /// Concurrent writer won the compare-and-swap too many times.
    #[error("version conflict on match {match_id} (expected {expected})")]
    VersionConflict {
        /// Match identifier.
        match_id: String,
        /// Version this writer read.
        expected: u64,
    },

    /// Anything else. Reported generically to the client.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result of applying one action.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Record to persist, with `version` already bumped.
    pub next: MatchRecord,
    /// Version the caller must still see in the store for the write to land.
    pub expected_version: u64,
    /// Events to broadcast, in emission order.
    pub events: Vec<MatchEvent>,
}

impl Transition {
    /// Whether this transition moved the match to a terminal status.
    pub fn ended(&self) -> bool {
        self.next.status.is_terminal()
    }
}

/// Apply one action to a match.
///
/// Checks run in a fixed order: match active, module registered and part of
/// the match, module not yet solved, module accepts the action.
pub fn apply_action(
    current: &MatchRecord,
    module_id: &str,
    action: &Value,
    registry: &ModuleRegistry,
    now: i64,
) -> Result<Transition, EngineError> {
    if !current.is_active() {
        return Err(EngineError::MatchNotActive {
            match_id: current.id.clone(),
            status: current.status,
        });
    }

    let module = registry.get(module_id)?;
    if !current.has_module(module_id) {
        return Err(EngineError::ModuleNotFound(module_id.to_string()));
    }
    if current.solved_modules.contains(module_id) {
        return Err(EngineError::ModuleSolved(module_id.to_string()));
    }

    let (state, params) = match (
        current.module_states.get(module_id),
        current.module_params.get(module_id),
    ) {
        (Some(state), Some(params)) => (state, params),
        _ => {
            return Err(EngineError::Internal(format!(
                "match {} has no stored data for {module_id}",
                current.id
            )))
        }
    };

    let applied = module
        .apply_action(state, action, params)
        .map_err(|e| match e {
            ModuleError::InvalidAction(msg) => EngineError::Validation(msg),
            ModuleError::AlreadySolved => EngineError::ModuleSolved(module_id.to_string()),
            ModuleError::CorruptState(msg) => EngineError::Internal(msg),
        })?;

    let mut next = current.clone();
    next.version = current.version + 1;
    next.module_states.insert(module_id.to_string(), applied.state.clone());

    let mut touched = Map::new();
    touched.insert(module_id.to_string(), applied.state.clone());
    let mut diff = Map::new();
    diff.insert("moduleStates".to_string(), Value::Object(touched));

    if applied.strike {
        next.strikes += 1;
        diff.insert("strikes".to_string(), json!(next.strikes));
        if next.strikes >= next.max_strikes {
            next.status = MatchStatus::Failed;
        }
    }

    if applied.solved {
        next.solved_modules.insert(module_id.to_string());
        diff.insert("solvedModules".to_string(), json!(next.solved_modules));
        if next.status == MatchStatus::Active && next.all_modules_solved() {
            next.status = MatchStatus::Completed;
        }
    }

    if next.status.is_terminal() {
        next.completed_at = Some(now);
        diff.insert("status".to_string(), json!(next.status));
        diff.insert("completedAt".to_string(), json!(now));
    }

    let mut events = Vec::with_capacity(3 + applied.events.len());
    events.push(MatchEvent::StateDiff {
        version: next.version,
        diff: Value::Object(diff),
    });
    events.extend(applied.events.into_iter().map(|payload| MatchEvent::Module {
        module_id: module_id.to_string(),
        payload,
    }));
    if applied.strike {
        events.push(MatchEvent::Strike {
            module_id: module_id.to_string(),
            strikes: next.strikes,
        });
    }
    if applied.solved {
        events.push(MatchEvent::Solved { module_id: module_id.to_string() });
    }
    if next.status.is_terminal() {
        events.push(MatchEvent::MatchEnded { status: next.status });
    }

    Ok(Transition {
        next,
        expected_version: current.version,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::glyph_order::{GlyphOrderParams, MANUAL, SHOWN_COUNT};
    use crate::game::state::NewMatch;
    use proptest::prelude::*;

    fn new_match(seed: &str) -> (MatchRecord, ModuleRegistry) {
        let registry = ModuleRegistry::builtin();
        let record = MatchRecord::create(NewMatch::single("m1", seed, "glyphOrder"), &registry, 0)
            .unwrap();
        (record, registry)
    }

    fn solution(record: &MatchRecord) -> Vec<String> {
        let params: GlyphOrderParams =
            serde_json::from_value(record.module_params["glyphOrder"].clone()).unwrap();
        MANUAL[params.column_index][..SHOWN_COUNT]
            .iter()
            .map(|g| g.to_string())
            .collect()
    }

    fn press(glyph: &str) -> Value {
        json!({ "press": glyph })
    }

    #[test]
    fn test_abc_scenario_solves_in_six() {
        let (mut record, registry) = new_match("abc");
        let start_version = record.version;

        let presses = solution(&record);
        for (i, glyph) in presses.iter().enumerate() {
            let t = apply_action(&record, "glyphOrder", &press(glyph), &registry, 42).unwrap();
            let solved = t.events.iter().any(|e| matches!(e, MatchEvent::Solved { .. }));
            assert_eq!(solved, i == SHOWN_COUNT - 1);
            assert_eq!(t.expected_version, record.version);
            record = t.next;
        }

        assert_eq!(record.version, start_version + 6);
        assert_eq!(record.module_states["glyphOrder"]["pressed"].as_array().unwrap().len(), 6);
        assert_eq!(record.status, MatchStatus::Completed);
        assert_eq!(record.completed_at, Some(42));
    }

    #[test]
    fn test_wrong_press_scenario() {
        let (record, registry) = new_match("abc");
        let t = apply_action(&record, "glyphOrder", &press("not-a-glyph"), &registry, 0).unwrap();

        assert_eq!(t.next.version, 1);
        assert_eq!(t.next.strikes, 1);
        assert_eq!(t.next.module_states["glyphOrder"]["strikes"], 1);
        assert_eq!(t.next.module_states["glyphOrder"]["pressed"], json!([]));
        assert!(matches!(t.events[1], MatchEvent::Strike { strikes: 1, .. }));
    }

    #[test]
    fn test_event_order_and_diff() {
        let (record, registry) = new_match("abc");
        let t = apply_action(&record, "glyphOrder", &press("nope"), &registry, 0).unwrap();

        match &t.events[0] {
            MatchEvent::StateDiff { version, diff } => {
                assert_eq!(*version, 1);
                assert_eq!(diff["moduleStates"]["glyphOrder"]["strikes"], 1);
                assert_eq!(diff["strikes"], 1);
                assert!(diff.get("status").is_none());
                assert!(diff.get("modules").is_none());
            }
            other => panic!("expected state diff first, got {other:?}"),
        }
        assert_eq!(t.events.len(), 2);
    }

    #[test]
    fn test_fails_on_exactly_third_strike() {
        let (mut record, registry) = new_match("abc");

        for n in 1..=3u32 {
            let t = apply_action(&record, "glyphOrder", &press("nope"), &registry, 7).unwrap();
            record = t.next;
            assert_eq!(record.strikes, n);
            if n < 3 {
                assert_eq!(record.status, MatchStatus::Active);
                assert!(record.completed_at.is_none());
            } else {
                assert_eq!(record.status, MatchStatus::Failed);
                assert_eq!(record.completed_at, Some(7));
                assert!(matches!(
                    t.events.last(),
                    Some(MatchEvent::MatchEnded { status: MatchStatus::Failed })
                ));
            }
        }
    }

    #[test]
    fn test_terminal_match_rejects_actions() {
        let (mut record, registry) = new_match("abc");
        record.status = MatchStatus::Failed;

        let err = apply_action(&record, "glyphOrder", &press("alpha"), &registry, 0).unwrap_err();
        assert!(matches!(err, EngineError::MatchNotActive { status: MatchStatus::Failed, .. }));
    }

    #[test]
    fn test_unknown_module() {
        let (record, registry) = new_match("abc");
        let err = apply_action(&record, "wireCutting", &press("alpha"), &registry, 0).unwrap_err();
        assert_eq!(err, EngineError::ModuleNotFound("wireCutting".to_string()));
    }

    #[test]
    fn test_invalid_payload_is_validation_error() {
        let (record, registry) = new_match("abc");
        let err = apply_action(&record, "glyphOrder", &json!({ "cut": 3 }), &registry, 0).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = apply_action(&record, "glyphOrder", &Value::Null, &registry, 0).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_input_record_is_untouched() {
        let (record, registry) = new_match("abc");
        let before = record.clone();
        let _ = apply_action(&record, "glyphOrder", &press("nope"), &registry, 0).unwrap();
        assert_eq!(record, before);
    }

    #[test]
    fn test_solved_module_rejects_further_actions() {
        let (mut record, registry) = new_match("abc");
        record.solved_modules.insert("glyphOrder".to_string());
        record.modules.push("other".to_string());

        let err = apply_action(&record, "glyphOrder", &press("alpha"), &registry, 0).unwrap_err();
        assert_eq!(err, EngineError::ModuleSolved("glyphOrder".to_string()));
    }

    proptest! {
        #[test]
        fn prop_version_counts_accepted_actions(
            seed in "[a-z]{1,12}",
            picks in proptest::collection::vec(0usize..9, 1..24),
        ) {
            let (mut record, registry) = new_match(&seed);
            let column = solution(&record);
            let mut accepted = 0u64;

            for pick in picks {
                if !record.is_active() {
                    break;
                }
                let glyph = column.get(pick).cloned().unwrap_or_else(|| "junk".to_string());
                let before = record.version;
                let t = apply_action(&record, "glyphOrder", &press(&glyph), &registry, 0).unwrap();
                prop_assert_eq!(t.next.version, before + 1);
                prop_assert!(t.next.strikes <= t.next.max_strikes);
                record = t.next;
                accepted += 1;
            }

            prop_assert_eq!(record.version, accepted);
        }
    }
}
