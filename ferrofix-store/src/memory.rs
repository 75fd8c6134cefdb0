//! In-memory message store implementation.
//!
//! Backs a session with a `BTreeMap` keyed by sequence number, giving the
//! ascending range scans the resend path needs. Not persistent: all data is
//! lost when the process exits, so this variant suits tests and
//! low-durability deployments.

use crate::traits::{MessageStore, StoreVisitor, StoredRecord};
use async_trait::async_trait;
use bytes::Bytes;
use ferrofix_core::error::StoreError;
use ferrofix_core::message::MsgType;
use ferrofix_core::types::Timestamp;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory message store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Stored records indexed by sequence number.
    records: RwLock<BTreeMap<u64, StoredRecord>>,
    /// Next outbound sequence number.
    next_sender_seq: AtomicU64,
    /// Next expected inbound sequence number.
    next_target_seq: AtomicU64,
}

impl MemoryStore {
    /// Creates a new empty memory store with both counters at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            next_sender_seq: AtomicU64::new(1),
            next_target_seq: AtomicU64::new(1),
        }
    }

    /// Creates a memory store with specific initial counters.
    #[must_use]
    pub fn with_initial_seqs(sender_seq: u64, target_seq: u64) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            next_sender_seq: AtomicU64::new(sender_seq),
            next_target_seq: AtomicU64::new(target_seq),
        }
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }

    /// Checks if a record with the given sequence number exists.
    #[must_use]
    pub fn contains(&self, seq_num: u64) -> bool {
        self.records.read().contains_key(&seq_num)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn open(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn write(
        &self,
        seq_num: u64,
        sending_time: Timestamp,
        msg_type: &MsgType,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        let record = StoredRecord::new(
            seq_num,
            sending_time,
            msg_type.clone(),
            Bytes::copy_from_slice(payload),
        );
        self.records.write().insert(seq_num, record);
        Ok(())
    }

    async fn read(
        &self,
        seq_num: u64,
        visitor: &mut dyn StoreVisitor,
    ) -> Result<usize, StoreError> {
        match self.records.read().get(&seq_num) {
            Some(record) => {
                visitor.on_record(record);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn read_range(
        &self,
        from_seq: u64,
        to_seq: u64,
        visitor: &mut dyn StoreVisitor,
    ) -> Result<usize, StoreError> {
        let records = self.records.read();

        // to_seq of 0 means "through the highest stored sequence number".
        let upper = if to_seq == 0 {
            match records.keys().next_back() {
                Some(&hi) if hi >= from_seq => hi,
                _ => return Ok(0),
            }
        } else {
            to_seq
        };

        let mut expected = from_seq;
        let mut visited = 0;
        for (&seq, record) in records.range(from_seq..=upper) {
            if seq > expected {
                visitor.on_gap(expected, seq - 1);
            }
            visitor.on_record(record);
            visited += 1;
            expected = seq + 1;
        }
        if expected <= upper {
            visitor.on_gap(expected, upper);
        }

        Ok(visited)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.records.write().clear();
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
