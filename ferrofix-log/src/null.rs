//! Discarding message log.

use crate::traits::{Direction, MessageLog};
use async_trait::async_trait;
use ferrofix_core::error::LogError;

/// Log that discards everything. For sessions with no audit requirement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLog;

impl NullLog {
    /// Creates a new discarding log.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageLog for NullLog {
    async fn open(&self) -> Result<(), LogError> {
        Ok(())
    }

    async fn log(&self, _direction: Direction, _data: &[u8]) -> Result<(), LogError> {
        Ok(())
    }

    async fn flush(&self) -> Result<(), LogError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), LogError> {
        Ok(())
    }
}
