//! Network Layer
//!
//! Wire protocol, push delivery and the session service that drives the
//! state machine. This layer is **non-deterministic** - all match logic runs
//! through `game/`.

pub mod protocol;
pub mod push;
pub mod broadcast;
pub mod connections;
pub mod session;
pub mod server;

pub use protocol::{ClientFrame, ServerFrame, ErrorCode, FrameError};
pub use push::{PushChannel, PushError, LocalPushChannel};
pub use broadcast::{Broadcaster, BroadcastReport};
pub use connections::{ConnectionRegistry, ConnectionError};
pub use session::{SessionService, SessionConfig};
pub use server::{GameServer, GameServerError};
