//! Duplex byte transport abstraction.
//!
//! The [`Channel`] trait is the engine's only view of the network. A graceful
//! peer close is surfaced as [`ConnectionError::PeerClosed`], never as a
//! silent zero-length read, so the session layer can always distinguish
//! teardown from an empty poll.

use async_trait::async_trait;
use ferrofix_core::error::ConnectionError;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpStream;
use tracing::debug;

/// Duplex byte transport used by the session engine.
///
/// Writes may be partial; callers that need the full buffer on the wire use
/// [`Channel::write_all`].
#[async_trait]
pub trait Channel: Send {
    /// Reads bytes into `buf`.
    ///
    /// # Errors
    /// Returns `ConnectionError::PeerClosed` if the peer closed the
    /// connection, or `ConnectionError::Io` on transport failure.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ConnectionError>;

    /// Writes bytes from `buf`, returning how many were accepted.
    ///
    /// # Errors
    /// Returns `ConnectionError` on transport failure.
    async fn write(&mut self, buf: &[u8]) -> Result<usize, ConnectionError>;

    /// Shuts down the write side and releases the transport.
    ///
    /// # Errors
    /// Returns `ConnectionError` on transport failure.
    async fn shutdown(&mut self) -> Result<(), ConnectionError>;

    /// Writes the entire buffer, retrying partial writes.
    ///
    /// # Errors
    /// Returns `ConnectionError` on transport failure.
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), ConnectionError> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..]).await?;
            if n == 0 {
                return Err(ConnectionError::PeerClosed);
            }
            written += n;
        }
        Ok(())
    }
}

/// TCP-backed channel.
#[derive(Debug)]
pub struct TcpChannel {
    stream: TcpStream,
}

impl TcpChannel {
    /// Wraps an established TCP stream.
    #[must_use]
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Connects to the given address.
    ///
    /// # Errors
    /// Returns `ConnectionError::Io` if the connection cannot be established.
    pub async fn connect(addr: &str) -> Result<Self, ConnectionError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true).map_err(ConnectionError::from)?;
        debug!(addr, "tcp channel connected");
        Ok(Self { stream })
    }
}

#[async_trait]
impl Channel for TcpChannel {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        let n = self.stream.read(buf).await?;
        if n == 0 {
            return Err(ConnectionError::PeerClosed);
        }
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize, ConnectionError> {
        Ok(self.stream.write(buf).await?)
    }

    async fn shutdown(&mut self) -> Result<(), ConnectionError> {
        Ok(self.stream.shutdown().await?)
    }
}

/// In-process channel over a paired duplex pipe.
///
/// The no-network counterpart to [`TcpChannel`]: used by tests and
/// single-process deployments that splice two engines together.
#[derive(Debug)]
pub struct MemoryChannel {
    stream: DuplexStream,
}

impl MemoryChannel {
    /// Creates a connected pair of in-process channels.
    #[must_use]
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (a, b) = tokio::io::duplex(capacity);
        (Self { stream: a }, Self { stream: b })
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        let n = self.stream.read(buf).await.map_err(ConnectionError::from)?;
        if n == 0 {
            return Err(ConnectionError::PeerClosed);
        }
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize, ConnectionError> {
        Ok(self.stream.write(buf).await?)
    }

    async fn shutdown(&mut self) -> Result<(), ConnectionError> {
        Ok(self.stream.shutdown().await?)
    }
}
