//! # FerroFix
//!
//! A FIX protocol session engine: logon, heartbeat, gap recovery, and
//! orderly teardown over any duplex byte transport, backed by a durable,
//! sequence-indexed message store that makes resend requests answerable
//! across crashes and reconnects.
//!
//! ## Crates
//!
//! - [`core`]: shared types, tags, messages, and the error taxonomy
//! - [`tagvalue`]: tag=value encoding and zero-copy decoding
//! - [`transport`]: the [`Channel`](transport::Channel) abstraction,
//!   framing codec, and pooled read buffers
//! - [`store`]: the [`MessageStore`](store::MessageStore) trait with file,
//!   memory, and discarding implementations
//! - [`log`]: the append-only audit trail
//! - [`session`]: protocol logic — configuration, sequencing, heartbeats,
//!   admin message construction
//! - [`engine`]: the state machine and its transport runner
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ferrofix::prelude::*;
//!
//! # async fn run() -> Result<(), ferrofix::core::error::FixError> {
//! let session_id = SessionId::new(
//!     CompId::new("BUYSIDE").expect("comp id"),
//!     CompId::new("SELLSIDE").expect("comp id"),
//! );
//! let config = SessionConfig::builder(session_id)
//!     .heartbeat_interval_secs(30)
//!     .build();
//!
//! let channel = TcpChannel::connect("127.0.0.1:9880").await?;
//! let (runner, handle) = EngineBuilder::new(config)
//!     .store(Arc::new(FileStore::new("/var/lib/ferrofix/buyside")))
//!     .connect(channel, SessionRole::Initiator)
//!     .await?;
//!
//! tokio::spawn(async move {
//!     let _ = handle
//!         .send(MsgType::NewOrderSingle, vec![(11, b"ORDER-1".to_vec())])
//!         .await;
//! });
//! let reason = runner.run().await?;
//! println!("session ended: {reason}");
//! # Ok(())
//! # }
//! ```

pub use ferrofix_core as core;
pub use ferrofix_engine as engine;
pub use ferrofix_log as log;
pub use ferrofix_session as session;
pub use ferrofix_store as store;
pub use ferrofix_tagvalue as tagvalue;
pub use ferrofix_transport as transport;

/// The names most programs need.
pub mod prelude {
    pub use ferrofix_core::error::{DisconnectReason, FixError};
    pub use ferrofix_core::message::{MsgType, OwnedMessage};
    pub use ferrofix_core::types::{CompId, SessionId, Timestamp};
    pub use ferrofix_engine::{
        Application, EngineBuilder, NoOpApplication, Session, SessionHandle, SessionRole,
        SessionRunner,
    };
    pub use ferrofix_log::{FileLog, MessageLog, NullLog};
    pub use ferrofix_session::{GapPolicy, SessionConfig, SessionState};
    pub use ferrofix_store::{FileStore, MemoryStore, MessageStore, NullStore};
    pub use ferrofix_transport::{Channel, MemoryChannel, TcpChannel};
}
