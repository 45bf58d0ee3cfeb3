//! Game Logic Module
//!
//! Puzzle modules and the match state machine. 100% deterministic, no I/O.
//!
//! ## Module Structure
//!
//! - `module`: Puzzle module contract (typed and type-erased)
//! - `glyph_order`: Reference puzzle module
//! - `registry`: Immutable module lookup
//! - `state`: Match and connection records
//! - `machine`: Action application and status transitions
//! - `events`: Events emitted per accepted action

pub mod module;
pub mod glyph_order;
pub mod registry;
pub mod state;
pub mod machine;
pub mod events;

// Re-export key types
pub use module::{Applied, Generated, ModuleError, PuzzleModule, TypedModule};
pub use glyph_order::GlyphOrder;
pub use registry::ModuleRegistry;
pub use state::{ConnectionId, ConnectionRecord, MatchId, MatchRecord, MatchStatus, NewMatch, Role};
pub use machine::{apply_action, EngineError, Transition};
pub use events::MatchEvent;
