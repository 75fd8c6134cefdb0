//! # FerroFix Tag-Value
//!
//! Zero-copy FIX tag=value encoding and decoding for the FerroFix engine.
//!
//! This crate provides high-performance parsing and serialization of FIX
//! messages using the standard tag=value format with SOH (0x01) delimiters.
//!
//! ## Features
//!
//! - **Zero-copy parsing**: Field values reference the original buffer
//! - **SIMD-accelerated**: Uses `memchr` for fast delimiter search
//! - **Automatic framing fields**: BeginString, BodyLength, and Checksum are
//!   stamped by the encoder

pub mod checksum;
pub mod decoder;
pub mod encoder;

pub use checksum::{calculate_checksum, format_checksum, parse_checksum};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use ferrofix_core::message::RawMessage;
