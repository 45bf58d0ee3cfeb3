//! Puzzle Module Contract
//!
//! Every puzzle type implements [`TypedModule`] with its own concrete
//! parameter, state and action types. The engine only ever talks to the
//! object-safe [`PuzzleModule`] trait, which works on opaque JSON blobs and
//! is blanket-implemented for all typed modules. Only the owning module
//! knows what its blobs look like.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Output of module generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated<P, S> {
    /// Parameters shown to (or hidden from) players. Immutable for the match.
    pub params: P,
    /// Initial module state.
    pub init: S,
}

/// Output of applying one action.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied<S> {
    /// New module state (inputs are never mutated).
    pub state: S,
    /// Module-defined events, passed through untouched.
    pub events: Vec<Value>,
    /// Exactly one incorrect-but-legal attempt.
    pub strike: bool,
    /// Module-local completion. Once reported, the module stays solved.
    pub solved: bool,
}

impl<S> Applied<S> {
    /// Accepted action that neither struck nor solved.
    pub fn progress(state: S) -> Self {
        Self { state, events: Vec::new(), strike: false, solved: false }
    }

    /// Incorrect attempt.
    pub fn strike(state: S) -> Self {
        Self { state, events: Vec::new(), strike: true, solved: false }
    }

    /// Final correct action.
    pub fn solved(state: S) -> Self {
        Self { state, events: Vec::new(), strike: false, solved: true }
    }
}

/// Errors raised by a module while applying an action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    /// Action payload does not match the module's action shape.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// Stored params or state do not decode. Indicates a corrupt record.
    #[error("corrupt module data: {0}")]
    CorruptState(String),

    /// Module is already solved and accepts no further actions.
    #[error("module already solved")]
    AlreadySolved,
}

/// Strongly typed module implementation.
pub trait TypedModule: Send + Sync + 'static {
    /// Generated parameters.
    type Params: Serialize + DeserializeOwned;
    /// Mutable module state.
    type State: Serialize + DeserializeOwned;
    /// Player action payload.
    type Action: DeserializeOwned;

    /// Registry key.
    const KEY: &'static str;

    /// Deterministic generation. Must be a pure function of `seed`.
    fn generate(&self, seed: &str) -> Generated<Self::Params, Self::State>;

    /// Pure action application.
    fn apply(
        &self,
        state: &Self::State,
        action: &Self::Action,
        params: &Self::Params,
    ) -> Result<Applied<Self::State>, ModuleError>;
}

/// Type-erased module as seen by the engine.
pub trait PuzzleModule: Send + Sync {
    /// Registry key.
    fn key(&self) -> &'static str;

    /// Generate params and initial state as JSON blobs.
    fn generate(&self, seed: &str) -> Result<Generated<Value, Value>, ModuleError>;

    /// Apply an opaque action to opaque state.
    fn apply_action(
        &self,
        state: &Value,
        action: &Value,
        params: &Value,
    ) -> Result<Applied<Value>, ModuleError>;
}

impl<M: TypedModule> PuzzleModule for M {
    fn key(&self) -> &'static str {
        M::KEY
    }

    fn generate(&self, seed: &str) -> Result<Generated<Value, Value>, ModuleError> {
        let generated = TypedModule::generate(self, seed);
        Ok(Generated {
            params: to_blob(&generated.params)?,
            init: to_blob(&generated.init)?,
        })
    }

    fn apply_action(
        &self,
        state: &Value,
        action: &Value,
        params: &Value,
    ) -> Result<Applied<Value>, ModuleError> {
        let state: M::State = from_blob(state)?;
        let params: M::Params = from_blob(params)?;
        let action: M::Action = serde_json::from_value(action.clone())
            .map_err(|e| ModuleError::InvalidAction(e.to_string()))?;

        let applied = self.apply(&state, &action, &params)?;
        Ok(Applied {
            state: to_blob(&applied.state)?,
            events: applied.events,
            strike: applied.strike,
            solved: applied.solved,
        })
    }
}

fn to_blob<T: Serialize>(value: &T) -> Result<Value, ModuleError> {
    serde_json::to_value(value).map_err(|e| ModuleError::CorruptState(e.to_string()))
}

fn from_blob<T: DeserializeOwned>(value: &Value) -> Result<T, ModuleError> {
    serde_json::from_value(value.clone()).map_err(|e| ModuleError::CorruptState(e.to_string()))
}
