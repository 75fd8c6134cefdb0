//! # FerroFix Engine
//!
//! The session engine: couples the protocol state machine to a transport,
//! a message store, and an application.
//!
//! - [`Session`]: transport-free state machine (frames in, frames out)
//! - [`SessionRunner`]: drives a `Session` over a [`Channel`] on one task
//! - [`EngineBuilder`]: wires config, store, log, and application together
//! - [`Application`]: callback surface for everything above the session
//!
//! [`Channel`]: ferrofix_transport::Channel

pub mod application;
pub mod builder;
pub mod runner;
pub mod session;

pub use application::{Application, NoOpApplication};
pub use builder::EngineBuilder;
pub use runner::{Command, SessionHandle, SessionRole, SessionRunner};
pub use session::Session;
