//! # FerroFix Core
//!
//! Core types, traits, and error definitions for the FerroFix FIX session engine.
//!
//! This crate provides the fundamental building blocks used across all
//! FerroFix crates:
//! - **Error types**: Unified error handling with `thiserror`
//! - **Message types**: `RawMessage`, `OwnedMessage`, `MsgType`
//! - **Core types**: `Timestamp`, `CompId`, `SessionId`
//! - **Tag constants**: the standard header/admin tags the session layer uses
//!
//! ## Zero-Copy Design
//!
//! Message views support both zero-copy borrowed access (for hot-path
//! processing) and owned representations (for buffering during gap recovery).

pub mod error;
pub mod field;
pub mod message;
pub mod tags;
pub mod types;

pub use error::{
    ConnectionError, DecodeError, DisconnectReason, EncodeError, FixError, LogError, Result,
    SessionError, StoreError,
};
pub use field::FieldRef;
pub use message::{MsgType, OwnedMessage, RawMessage};
pub use types::{CompId, SessionId, Timestamp};
