//! # Last Words Match Server
//!
//! Authoritative session engine for cooperative puzzle matches: players and
//! spectators share one versioned match record, actions are applied by
//! pluggable puzzle modules, and every accepted change is pushed to all
//! subscribers as a diff.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    LAST WORDS SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  └── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │                                                              │
//! │  game/           - Match logic (deterministic)               │
//! │  ├── module.rs   - Puzzle module contract                    │
//! │  ├── glyph_order.rs - Built-in glyph ordering puzzle         │
//! │  ├── registry.rs - Module key lookup                         │
//! │  ├── state.rs    - Match and connection records              │
//! │  ├── machine.rs  - Versioned state machine                   │
//! │  └── events.rs   - Transition events                         │
//! │                                                              │
//! │  store/          - Keyed persistence with conditional writes │
//! │                                                              │
//! │  network/        - Delivery (non-deterministic)              │
//! │  ├── protocol.rs - Wire frames                               │
//! │  ├── push.rs     - Send-to-connection seam                   │
//! │  ├── broadcast.rs- Fan-out with stale pruning                │
//! │  ├── connections.rs - Join/leave bookkeeping                 │
//! │  ├── session.rs  - Request handling and commit               │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules never read the clock, the network or
//! global state. Timestamps are passed in, and all randomness comes from a
//! Xorshift128+ generator seeded from the match seed and module key, so a
//! match generated twice from the same seed is identical.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;
pub mod store;

// Re-export commonly used types
pub use config::ServerConfig;
pub use core::rng::DeterministicRng;
pub use game::{EngineError, MatchRecord, MatchStatus, ModuleRegistry, PuzzleModule, TypedModule};
pub use network::{GameServer, SessionService};
pub use store::MemoryStore;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
