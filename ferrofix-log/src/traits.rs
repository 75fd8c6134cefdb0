//! Message log trait definition.

use async_trait::async_trait;
use ferrofix_core::error::LogError;
use std::fmt;

/// Direction of a logged message relative to this side of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Received from the counterparty.
    Inbound,
    /// Sent to the counterparty.
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => write!(f, "IN "),
            Self::Outbound => write!(f, "OUT"),
        }
    }
}

/// Chronological audit log of raw message bytes.
///
/// Log failures are reported but are not fatal to the session; the store,
/// not the log, is what resend correctness depends on.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Opens the log for appending.
    ///
    /// # Errors
    /// Returns `LogError` if the log cannot be opened.
    async fn open(&self) -> Result<(), LogError>;

    /// Appends one message.
    ///
    /// # Errors
    /// Returns `LogError` if the entry cannot be appended.
    async fn log(&self, direction: Direction, data: &[u8]) -> Result<(), LogError>;

    /// Flushes buffered entries.
    ///
    /// # Errors
    /// Returns `LogError` on flush failure.
    async fn flush(&self) -> Result<(), LogError>;

    /// Releases resources.
    ///
    /// # Errors
    /// Returns `LogError` if the log cannot be closed cleanly.
    async fn close(&self) -> Result<(), LogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::Inbound.to_string(), "IN ");
        assert_eq!(Direction::Outbound.to_string(), "OUT");
    }
}
