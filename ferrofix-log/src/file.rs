//! File-backed message log.

use crate::traits::{Direction, MessageLog};
use async_trait::async_trait;
use ferrofix_core::error::LogError;
use ferrofix_core::types::Timestamp;
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Appends each message as one line: a millisecond timestamp, a direction
/// marker, then the raw message bytes with SOH delimiters rewritten to `|`
/// so the file reads cleanly in a pager.
pub struct FileLog {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<std::fs::File>>>,
}

impl FileLog {
    /// Creates a log that appends to `path`. No I/O happens until
    /// [`MessageLog::open`].
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: Mutex::new(None),
        }
    }

    /// Returns the log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MessageLog for FileLog {
    async fn open(&self) -> Result<(), LogError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        debug!(path = %self.path.display(), "opened message log");
        *self.writer.lock() = Some(BufWriter::new(file));
        Ok(())
    }

    async fn log(&self, direction: Direction, data: &[u8]) -> Result<(), LogError> {
        let mut guard = self.writer.lock();
        let writer = guard
            .as_mut()
            .ok_or_else(|| LogError::Io("log is not open".to_string()))?;

        write!(writer, "{} {} ", Timestamp::now().format_millis(), direction)?;
        for &byte in data {
            if byte == 0x01 {
                writer.write_all(b"|")?;
            } else {
                writer.write_all(&[byte])?;
            }
        }
        writer.write_all(b"\n")?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), LogError> {
        let mut guard = self.writer.lock();
        if let Some(writer) = guard.as_mut() {
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), LogError> {
        let writer = self.writer.lock().take();
        if let Some(mut writer) = writer {
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_appends_readable_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");

        let log = FileLog::new(&path);
        log.open().await.unwrap();
        log.log(Direction::Outbound, b"8=FIX.4.4\x0135=A\x0110=123\x01")
            .await
            .unwrap();
        log.log(Direction::Inbound, b"8=FIX.4.4\x0135=0\x0110=456\x01")
            .await
            .unwrap();
        log.close().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("OUT 8=FIX.4.4|35=A|10=123|"));
        assert!(lines[1].contains("IN  8=FIX.4.4|35=0|10=456|"));
    }

    #[tokio::test]
    async fn test_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");

        let log = FileLog::new(&path);
        log.open().await.unwrap();
        log.log(Direction::Outbound, b"first").await.unwrap();
        log.close().await.unwrap();

        let log = FileLog::new(&path);
        log.open().await.unwrap();
        log.log(Direction::Outbound, b"second").await.unwrap();
        log.close().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_unopened_log_errors() {
        let log = FileLog::new("/nonexistent/session.log");
        let err = log.log(Direction::Inbound, b"x").await.unwrap_err();
        assert!(matches!(err, LogError::Io(_)));
    }
}
