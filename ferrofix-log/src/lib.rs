//! # FerroFix Log
//!
//! Append-only audit log of raw message traffic.
//!
//! Distinct from the message store: the store exists to answer resend
//! requests and is keyed by sequence number, while the log is a flat
//! chronological record of every message in both directions, kept for
//! compliance and post-mortem analysis. Sessions write to both.

pub mod file;
pub mod null;
pub mod traits;

pub use file::FileLog;
pub use null::NullLog;
pub use traits::{Direction, MessageLog};
