//! Match State Definitions
//!
//! The durable records the engine reads and writes. Uses BTreeMap/BTreeSet
//! so serialized snapshots have a stable field order.

use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::core::rng::derive_module_seed;
use crate::game::machine::EngineError;
use crate::game::registry::ModuleRegistry;

/// Default strike ceiling for a new match.
pub const DEFAULT_MAX_STRIKES: u32 = 3;

/// Match identifier.
pub type MatchId = String;

/// Push-channel connection identifier, assigned by the push provider.
pub type ConnectionId = String;

// =============================================================================
// MATCH STATUS
// =============================================================================

/// Match lifecycle status. Transitions are forward-only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    /// Accepting actions.
    Active,
    /// Every module solved.
    Completed,
    /// Strike ceiling reached.
    Failed,
}

impl MatchStatus {
    /// Terminal statuses never change again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, MatchStatus::Active)
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Active => "active",
            MatchStatus::Completed => "completed",
            MatchStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Participant role of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May submit actions.
    Player,
    /// Watches only.
    Spectator,
}

// =============================================================================
// MATCH RECORD
// =============================================================================

/// One cooperative puzzle session. The aggregate root.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    /// Unique identifier, immutable.
    pub id: MatchId,
    /// Source of determinism for all module generation.
    pub seed: String,
    /// Module keys active in this match, fixed at creation.
    pub modules: Vec<String>,
    /// Per-module state blobs.
    pub module_states: BTreeMap<String, Value>,
    /// Per-module parameter blobs.
    pub module_params: BTreeMap<String, Value>,
    /// Modules that have reported solved.
    #[serde(default)]
    pub solved_modules: BTreeSet<String>,
    /// Incremented exactly once per accepted action.
    pub version: u64,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Global strike counter.
    pub strikes: u32,
    /// Strike ceiling.
    pub max_strikes: u32,
    /// Player identifiers.
    pub players: Vec<String>,
    /// Spectator identifiers.
    pub spectators: Vec<String>,
    /// Creation time (Unix ms).
    pub started_at: i64,
    /// Terminal transition time (Unix ms), set exactly once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

/// Input for match creation.
#[derive(Clone, Debug)]
pub struct NewMatch {
    /// Match identifier.
    pub id: MatchId,
    /// Generation seed.
    pub seed: String,
    /// Module keys, in display order.
    pub modules: Vec<String>,
    /// Initial players.
    pub players: Vec<String>,
    /// Initial spectators.
    pub spectators: Vec<String>,
    /// Strike ceiling.
    pub max_strikes: u32,
}

impl NewMatch {
    /// Match with a single module and default strike ceiling.
    pub fn single(id: impl Into<String>, seed: impl Into<String>, module: &str) -> Self {
        Self {
            id: id.into(),
            seed: seed.into(),
            modules: vec![module.to_string()],
            players: Vec::new(),
            spectators: Vec::new(),
            max_strikes: DEFAULT_MAX_STRIKES,
        }
    }
}

impl MatchRecord {
    /// Create a fresh match at version 0, generating every module.
    ///
    /// Each module is seeded with `seed + moduleKey`.
    pub fn create(
        request: NewMatch,
        registry: &ModuleRegistry,
        now: i64,
    ) -> Result<Self, EngineError> {
        if request.modules.is_empty() {
            return Err(EngineError::Validation("match needs at least one module".to_string()));
        }
        if request.max_strikes == 0 {
            return Err(EngineError::Validation("maxStrikes must be positive".to_string()));
        }

        let mut module_states = BTreeMap::new();
        let mut module_params = BTreeMap::new();
        let mut modules = Vec::with_capacity(request.modules.len());

        for key in request.modules {
            if module_states.contains_key(&key) {
                return Err(EngineError::Validation(format!("module {key} listed twice")));
            }
            let module = registry.get(&key)?;
            let generated = module
                .generate(&derive_module_seed(&request.seed, &key))
                .map_err(|e| EngineError::Internal(format!("generating {key}: {e}")))?;

            module_params.insert(key.clone(), generated.params);
            module_states.insert(key.clone(), generated.init);
            modules.push(key);
        }

        Ok(Self {
            id: request.id,
            seed: request.seed,
            modules,
            module_states,
            module_params,
            solved_modules: BTreeSet::new(),
            version: 0,
            status: MatchStatus::Active,
            strikes: 0,
            max_strikes: request.max_strikes,
            players: request.players,
            spectators: request.spectators,
            started_at: now,
            completed_at: None,
        })
    }

    /// Whether actions are accepted.
    pub fn is_active(&self) -> bool {
        self.status == MatchStatus::Active
    }

    /// Whether a module key belongs to this match.
    pub fn has_module(&self, module_id: &str) -> bool {
        self.modules.iter().any(|m| m == module_id)
    }

    /// Whether every module has reported solved.
    pub fn all_modules_solved(&self) -> bool {
        self.modules.iter().all(|m| self.solved_modules.contains(m))
    }

    /// Full snapshot as JSON, used for the join frame.
    pub fn snapshot(&self) -> Value {
        // Serializing plain maps and strings cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// =============================================================================
// CONNECTION RECORD
// =============================================================================

/// Ephemeral record of one live push-channel connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    /// Provider-assigned identifier.
    pub connection_id: ConnectionId,
    /// Bound match, if joined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<MatchId>,
    /// Role within the bound match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Open time (Unix ms).
    pub connected_at: i64,
    /// Expiry (Unix seconds), enforced by the store.
    pub expires_at: i64,
}

impl ConnectionRecord {
    /// New unbound connection expiring `ttl_secs` after `now` (Unix ms).
    pub fn open(connection_id: impl Into<String>, now: i64, ttl_secs: i64) -> Self {
        Self {
            connection_id: connection_id.into(),
            match_id: None,
            role: None,
            connected_at: now,
            expires_at: (now / 1000).saturating_add(ttl_secs),
        }
    }

    /// Whether the record is past its expiry at `now` (Unix ms).
    pub fn is_expired(&self, now: i64) -> bool {
        now / 1000 >= self.expires_at
    }
}
