//! Discarding message store.
//!
//! Accepts every write and retains nothing. Counters still work (in memory
//! only), so a session can run without persistence when resend capability is
//! not required. Any resend request served from this store gap-fills the
//! whole range.

use crate::traits::{MessageStore, StoreVisitor};
use async_trait::async_trait;
use ferrofix_core::error::StoreError;
use ferrofix_core::message::MsgType;
use ferrofix_core::types::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

/// Store that discards all records.
#[derive(Debug)]
pub struct NullStore {
    next_sender_seq: AtomicU64,
    next_target_seq: AtomicU64,
}

impl NullStore {
    /// Creates a new discarding store with both counters at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_sender_seq: AtomicU64::new(1),
            next_target_seq: AtomicU64::new(1),
        }
    }
}

impl Default for NullStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for NullStore {
    async fn open(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn write(
        &self,
        _seq_num: u64,
        _sending_time: Timestamp,
        _msg_type: &MsgType,
        _payload: &[u8],
    ) -> Result<(), StoreError> {
        Ok(())
    }

    async fn read(
        &self,
        _seq_num: u64,
        _visitor: &mut dyn StoreVisitor,
    ) -> Result<usize, StoreError> {
        Ok(0)
    }

    async fn read_range(
        &self,
        from_seq: u64,
        to_seq: u64,
        visitor: &mut dyn StoreVisitor,
    ) -> Result<usize, StoreError> {
        // Nothing is retained. A bounded request is answered with one gap
        // covering the whole range; an unbounded one has no known upper
        // bound, so there is nothing to report.
        if to_seq != 0 && to_seq >= from_seq {
            visitor.on_gap(from_seq, to_seq);
        }
        Ok(0)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.next_sender_seq.store(1, Ordering::SeqCst);
        self.next_target_seq.store(1, Ordering::SeqCst);
        Ok(())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn next_sender_seq(&self) -> u64 {
        self.next_sender_seq.load(Ordering::SeqCst)
    }

    fn next_target_seq(&self) -> u64 {
        self.next_target_seq.load(Ordering::SeqCst)
    }

    async fn set_next_sender_seq(&self, seq: u64) -> Result<(), StoreError> {
        self.next_sender_seq.store(seq, Ordering::SeqCst);
        Ok(())
    }

    async fn set_next_target_seq(&self, seq: u64) -> Result<(), StoreError> {
        self.next_target_seq.store(seq, Ordering::SeqCst);
        Ok(())
    }
}
