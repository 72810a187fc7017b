//! Session state machine
//!
//! - [`state`]: the connection/stream registry and notification handlers
//! - [`reconnect`]: what connectivity changes mean for the session
//! - [`handle`]: the public [`Session`] commands
//! - `actor`: the task that owns the registry

mod actor;
pub mod handle;
pub mod model;
pub mod reconnect;
pub mod state;

pub use handle::{Session, SessionParams};
pub use model::{
    Connection, ConnectionSnapshot, ConnectionState, SessionSnapshot, Stream, StreamSnapshot,
};
pub use reconnect::{decide, ReconnectAction, ReconnectionManager};
pub use state::{Followup, SessionState, StatsContext};
