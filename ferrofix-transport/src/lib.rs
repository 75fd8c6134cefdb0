//! # FerroFix Transport
//!
//! Byte transport layer for the FerroFix session engine.
//!
//! This crate provides:
//! - **Channel**: duplex byte transport trait with TCP and in-process
//!   implementations; peer close is a distinguished error
//! - **FrameCodec**: FIX message framing over a byte stream
//! - **BufferPool**: fixed-capacity pooled read buffers

pub mod buffer;
pub mod channel;
pub mod codec;

pub use buffer::BufferPool;
pub use channel::{Channel, MemoryChannel, TcpChannel};
pub use codec::{FrameCodec, FrameError};
