//! # FerroFix Store
//!
//! Sequence-indexed message persistence for the FerroFix session engine.
//!
//! The engine stores every sequenced outbound message before it reaches the
//! wire, then replays stored records to answer resend requests. Three
//! implementations cover the durability spectrum:
//!
//! - [`FileStore`]: append-only data file plus counter side file; survives
//!   process restarts
//! - [`MemoryStore`]: `BTreeMap`-backed, for tests and low-durability use
//! - [`NullStore`]: retains nothing; resends become full gap-fills
//!
//! Reads go through a [`StoreVisitor`], which surfaces missing sub-ranges
//! explicitly via `on_gap` instead of skipping them.

pub mod file;
pub mod memory;
pub mod null;
pub mod traits;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use null::NullStore;
pub use traits::{CollectingVisitor, MessageStore, StoreVisitor, StoredRecord};
