//! Sequence number bookkeeping and inbound classification.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Classification of an inbound message by its sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Exactly the expected number; process and advance.
    InOrder,
    /// Above the expected number; a gap of `[expected, received - 1]`
    /// must be recovered before this message can be applied.
    Gap {
        /// First missing sequence number.
        expected: u64,
        /// The sequence number actually received.
        received: u64,
    },
    /// Below the expected number with PossDupFlag set; a retransmission
    /// already processed. Validate, do not reapply, do not advance.
    Duplicate,
    /// Below the expected number without PossDupFlag; protocol violation.
    TooLow {
        /// Expected sequence number.
        expected: u64,
        /// The sequence number actually received.
        received: u64,
    },
}

/// Per-session sequence counters.
///
/// Mirrors the store's persisted counters; the session engine keeps this
/// copy hot and pushes updates back to the store as part of each message's
/// commit.
#[derive(Debug)]
pub struct SequenceManager {
    next_outbound: AtomicU64,
    expected_inbound: AtomicU64,
}

impl SequenceManager {
    /// Creates a manager with the given starting counters.
    #[must_use]
    pub fn new(next_outbound: u64, expected_inbound: u64) -> Self {
        Self {
            next_outbound: AtomicU64::new(next_outbound.max(1)),
            expected_inbound: AtomicU64::new(expected_inbound.max(1)),
        }
    }

    /// Returns the sequence number the next outbound message will carry.
    #[must_use]
    pub fn next_outbound(&self) -> u64 {
        self.next_outbound.load(Ordering::SeqCst)
    }

    /// Returns the sequence number expected on the next inbound message.
    #[must_use]
    pub fn expected_inbound(&self) -> u64 {
        self.expected_inbound.load(Ordering::SeqCst)
    }

    /// Advances the outbound counter past a sent message and returns the
    /// new value.
    pub fn advance_outbound(&self) -> u64 {
        self.next_outbound.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Advances the inbound counter past an accepted message and returns
    /// the new value.
    pub fn advance_inbound(&self) -> u64 {
        self.expected_inbound.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Overwrites the expected inbound counter (SequenceReset handling).
    pub fn set_expected_inbound(&self, seq: u64) {
        let previous = self.expected_inbound.swap(seq, Ordering::SeqCst);
        debug!(from = previous, to = seq, "expected inbound overwritten");
    }

    /// Resets both counters to 1 (authenticated full sequence reset).
    pub fn reset(&self) {
        self.next_outbound.store(1, Ordering::SeqCst);
        self.expected_inbound.store(1, Ordering::SeqCst);
        debug!("sequence counters reset to 1");
    }

    /// Classifies an inbound message by comparing its sequence number to
    /// the expected one.
    #[must_use]
    pub fn check_inbound(&self, received: u64, poss_dup: bool) -> SequenceCheck {
        let expected = self.expected_inbound();
        if received == expected {
            SequenceCheck::InOrder
        } else if received > expected {
            SequenceCheck::Gap { expected, received }
        } else if poss_dup {
            SequenceCheck::Duplicate
        } else {
            SequenceCheck::TooLow { expected, received }
        }
    }
}
