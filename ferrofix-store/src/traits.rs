//! Message store trait definition.
//!
//! A message store is a durable mapping from sequence number to raw message
//! bytes, scoped to one session identity. The session engine replays stored
//! records to answer resend requests and consults the counters to resume
//! sequence numbering across reconnects.

use async_trait::async_trait;
use bytes::Bytes;
use ferrofix_core::error::StoreError;
use ferrofix_core::message::MsgType;
use ferrofix_core::types::Timestamp;

/// One stored message record.
///
/// Immutable once written: resend transmits the payload byte-for-byte with
/// only the retransmission markers re-stamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Sequence number the message was sent under.
    pub seq_num: u64,
    /// Original sending time.
    pub sending_time: Timestamp,
    /// Message type.
    pub msg_type: MsgType,
    /// Complete raw message bytes as they went on the wire.
    pub payload: Bytes,
}

impl StoredRecord {
    /// Creates a new record.
    #[must_use]
    pub fn new(seq_num: u64, sending_time: Timestamp, msg_type: MsgType, payload: Bytes) -> Self {
        Self {
            seq_num,
            sending_time,
            msg_type,
            payload,
        }
    }
}

/// Receives records during store reads.
///
/// Range scans visit records in strict ascending sequence order. A missing
/// sub-range is reported through [`StoreVisitor::on_gap`] rather than being
/// skipped silently, so the caller can gap-fill what it cannot replay.
pub trait StoreVisitor: Send {
    /// Called once per stored record, in ascending sequence order.
    fn on_record(&mut self, record: &StoredRecord);

    /// Called for each maximal run `[from_seq, to_seq]` of requested
    /// sequence numbers with no stored record.
    fn on_gap(&mut self, from_seq: u64, to_seq: u64);
}

/// Abstract interface for per-session message storage.
///
/// A `write` that returns `Ok` must survive a subsequent crash of everything
/// below the process (durability ordering); `flush` is the explicit barrier
/// for anything buffered. Writing the same sequence number twice with
/// different payloads is a caller bug; stores are not required to
/// deduplicate.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Opens the store, recovering any persisted state.
    ///
    /// After `open` the counters report the next sequence numbers to use.
    ///
    /// # Errors
    /// Returns `StoreError` if persisted state cannot be recovered.
    async fn open(&self) -> Result<(), StoreError>;

    /// Appends one record.
    ///
    /// # Errors
    /// Returns `StoreError` on durability failure; the caller must treat
    /// this as fatal for the session.
    async fn write(
        &self,
        seq_num: u64,
        sending_time: Timestamp,
        msg_type: &MsgType,
        payload: &[u8],
    ) -> Result<(), StoreError>;

    /// Delivers the single record at `seq_num` to `visitor`.
    ///
    /// # Returns
    /// The number of records visited (0 or 1).
    ///
    /// # Errors
    /// Returns `StoreError` if the store cannot be read.
    async fn read(&self, seq_num: u64, visitor: &mut dyn StoreVisitor)
    -> Result<usize, StoreError>;

    /// Streams records in `[from_seq, to_seq]` in ascending order.
    ///
    /// A `to_seq` of 0 means "through the highest stored sequence number".
    /// Missing sub-ranges are surfaced via `visitor.on_gap`.
    ///
    /// # Returns
    /// The number of records visited.
    ///
    /// # Errors
    /// Returns `StoreError` if the store cannot be read.
    async fn read_range(
        &self,
        from_seq: u64,
        to_seq: u64,
        visitor: &mut dyn StoreVisitor,
    ) -> Result<usize, StoreError>;

    /// Destroys all records and resets both counters to 1.
    ///
    /// Used only on an authenticated full sequence reset.
    ///
    /// # Errors
    /// Returns `StoreError` if persisted state cannot be destroyed.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Forces durability of any buffered writes.
    ///
    /// # Errors
    /// Returns `StoreError` on durability failure.
    async fn flush(&self) -> Result<(), StoreError>;

    /// Releases resources.
    ///
    /// # Errors
    /// Returns `StoreError` if the store cannot be closed cleanly.
    async fn close(&self) -> Result<(), StoreError>;

    /// Returns the next outbound sequence number.
    fn next_sender_seq(&self) -> u64;

    /// Returns the next expected inbound sequence number.
    fn next_target_seq(&self) -> u64;

    /// Persists the next outbound sequence number.
    ///
    /// # Errors
    /// Returns `StoreError` on durability failure.
    async fn set_next_sender_seq(&self, seq: u64) -> Result<(), StoreError>;

    /// Persists the next expected inbound sequence number.
    ///
    /// # Errors
    /// Returns `StoreError` on durability failure.
    async fn set_next_target_seq(&self, seq: u64) -> Result<(), StoreError>;
}

/// Visitor that collects records and gaps into vectors. Test helper and
/// building block for replay logic.
#[derive(Debug, Default)]
pub struct CollectingVisitor {
    /// Records visited, in order.
    pub records: Vec<StoredRecord>,
    /// Gaps reported, in order.
    pub gaps: Vec<(u64, u64)>,
}

impl StoreVisitor for CollectingVisitor {
    fn on_record(&mut self, record: &StoredRecord) {
        self.records.push(record.clone());
    }

    fn on_gap(&mut self, from_seq: u64, to_seq: u64) {
        self.gaps.push((from_seq, to_seq));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_visitor() {
        let mut visitor = CollectingVisitor::default();
        let record = StoredRecord::new(
            3,
            Timestamp::from_millis(1000),
            MsgType::Heartbeat,
            Bytes::from_static(b"payload"),
        );

        visitor.on_record(&record);
        visitor.on_gap(4, 6);

        assert_eq!(visitor.records.len(), 1);
        assert_eq!(visitor.records[0].seq_num, 3);
        assert_eq!(visitor.gaps, vec![(4, 6)]);
    }
}
