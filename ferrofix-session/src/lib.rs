//! # FerroFix Session
//!
//! Session-level protocol logic: configuration, sequence classification,
//! heartbeat timers, the state vocabulary, and administrative message
//! construction. The [`ferrofix-engine`](../ferrofix_engine/index.html)
//! crate wires these pieces to a transport and a store.

pub mod admin;
pub mod config;
pub mod heartbeat;
pub mod sequence;
pub mod state;

pub use admin::{AdminMessages, RejectReason, retransmission};
pub use config::{GapPolicy, SessionConfig, SessionConfigBuilder};
pub use heartbeat::{HeartbeatAction, HeartbeatMonitor};
pub use sequence::{SequenceCheck, SequenceManager};
pub use state::SessionState;
