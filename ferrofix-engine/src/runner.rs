//! Couples a [`Session`] to a [`Channel`].
//!
//! One task per session: the runner owns the transport, the framing codec,
//! and the session state machine, and serializes everything through a
//! single select loop. Callers interact through a [`SessionHandle`].

use crate::session::Session;
use bytes::BytesMut;
use ferrofix_core::error::{ConnectionError, DisconnectReason, FixError};
use ferrofix_core::message::MsgType;
use ferrofix_transport::{BufferPool, Channel, FrameCodec};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::codec::Decoder as _;
use tracing::{debug, warn};

/// Which side of the handshake this runner plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Sends the first Logon.
    Initiator,
    /// Waits for the peer's Logon.
    Acceptor,
}

/// Request sent to a running session.
#[derive(Debug)]
pub enum Command {
    /// Send an application message; `fields` are appended after the
    /// standard header in order.
    Send {
        /// Message type (tag 35).
        msg_type: MsgType,
        /// Body fields as (tag, raw value) pairs.
        fields: Vec<(u32, Vec<u8>)>,
    },
    /// Begin a graceful logout.
    Logout {
        /// Optional reason carried in tag 58.
        text: Option<String>,
    },
}

/// Cloneable handle for talking to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    /// Queues an application message for sending.
    ///
    /// # Errors
    /// Returns `ConnectionError::PeerClosed` if the session task has ended.
    pub async fn send(
        &self,
        msg_type: MsgType,
        fields: Vec<(u32, Vec<u8>)>,
    ) -> Result<(), ConnectionError> {
        self.tx
            .send(Command::Send { msg_type, fields })
            .await
            .map_err(|_| ConnectionError::PeerClosed)
    }

    /// Requests a graceful logout.
    ///
    /// # Errors
    /// Returns `ConnectionError::PeerClosed` if the session task has ended.
    pub async fn logout(&self, text: Option<String>) -> Result<(), ConnectionError> {
        self.tx
            .send(Command::Logout { text })
            .await
            .map_err(|_| ConnectionError::PeerClosed)
    }
}

/// Drives one session over one connection until it disconnects.
pub struct SessionRunner<C: Channel> {
    session: Session,
    channel: C,
    role: SessionRole,
    codec: FrameCodec,
    pool: BufferPool,
    rx_buf: BytesMut,
    commands: mpsc::Receiver<Command>,
    tick_interval: Duration,
}

/// Capacity of the command queue feeding a running session.
const COMMAND_QUEUE_DEPTH: usize = 64;

/// Read buffer slots kept warm per connection.
const READ_POOL_SLOTS: usize = 4;
const READ_SLOT_CAPACITY: usize = 64 * 1024;

impl<C: Channel> SessionRunner<C> {
    /// Creates a runner and its command handle.
    #[must_use]
    pub fn new(session: Session, channel: C, role: SessionRole) -> (Self, SessionHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let codec = FrameCodec::new().with_max_message_size(session.config().max_message_size);
        let runner = Self {
            session,
            channel,
            role,
            codec,
            pool: BufferPool::new(READ_POOL_SLOTS, READ_SLOT_CAPACITY),
            rx_buf: BytesMut::with_capacity(READ_SLOT_CAPACITY),
            commands,
            tick_interval: Duration::from_millis(250),
        };
        (runner, SessionHandle { tx })
    }

    /// Overrides the timer granularity. Tests use a short tick.
    #[must_use]
    pub const fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Runs the session to completion and returns why it ended.
    ///
    /// # Errors
    /// Returns `FixError` on store failure; transport failures end the
    /// session with a [`DisconnectReason`] instead of an error.
    pub async fn run(mut self) -> Result<DisconnectReason, FixError> {
        match self.role {
            SessionRole::Initiator => {
                let frames = self.session.initiate().await?;
                self.write_frames(frames).await;
            }
            SessionRole::Acceptor => self.session.accept()?,
        }

        let mut scratch = self.pool.acquire();
        scratch.resize(self.pool.slot_capacity(), 0);
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        enum Event {
            Read(Result<usize, ConnectionError>),
            Tick,
            Command(Option<Command>),
        }

        let mut commands_closed = false;
        while self.session.state().is_connected() {
            let event = tokio::select! {
                res = self.channel.read(&mut scratch[..]) => Event::Read(res),
                _ = ticker.tick() => Event::Tick,
                cmd = self.commands.recv(), if !commands_closed => Event::Command(cmd),
            };

            match event {
                Event::Read(Ok(n)) => {
                    self.rx_buf.extend_from_slice(&scratch[..n]);
                    self.drain_frames().await?;
                }
                Event::Read(Err(ConnectionError::PeerClosed)) => {
                    self.session.on_connection_lost("peer closed").await;
                }
                Event::Read(Err(e)) => {
                    self.session.on_connection_lost(&e.to_string()).await;
                }
                Event::Tick => {
                    let frames = self.session.on_tick(Instant::now()).await?;
                    self.write_frames(frames).await;
                }
                Event::Command(Some(Command::Send { msg_type, fields })) => {
                    let sent = self
                        .session
                        .send_app(&msg_type, |enc| {
                            for (tag, value) in &fields {
                                enc.put_raw(*tag, value);
                            }
                        })
                        .await;
                    match sent {
                        Ok(frame) => self.write_frames(vec![frame]).await,
                        Err(FixError::Session(e)) => {
                            warn!(error = %e, "dropping send request");
                        }
                        Err(e) => return self.teardown(Err(e)).await,
                    }
                }
                Event::Command(Some(Command::Logout { text })) => {
                    match self.session.request_logout(text.as_deref()).await {
                        Ok(frames) => self.write_frames(frames).await,
                        Err(FixError::Session(e)) => {
                            warn!(error = %e, "dropping logout request");
                        }
                        Err(e) => return self.teardown(Err(e)).await,
                    }
                }
                Event::Command(None) => {
                    // Handle dropped: drain out gracefully.
                    commands_closed = true;
                    debug!("command handle closed, logging out");
                    if let Ok(frames) = self.session.request_logout(None).await {
                        self.write_frames(frames).await;
                    }
                }
            }
        }

        self.pool.release(scratch);
        self.teardown(Ok(())).await
    }

    /// Slices complete frames out of the receive buffer and feeds them to
    /// the session.
    async fn drain_frames(&mut self) -> Result<(), FixError> {
        loop {
            match self.codec.decode(&mut self.rx_buf) {
                Ok(Some(frame)) => {
                    let responses = self.session.on_message(&frame).await?;
                    self.write_frames(responses).await;
                }
                Ok(None) => return Ok(()),
                Err(e) => {
                    // Framing is unrecoverable: the stream cannot be
                    // resynchronized once tag 9 is untrustworthy.
                    warn!(error = %e, "unrecoverable framing error");
                    self.session
                        .on_connection_lost(&format!("framing error: {e}"))
                        .await;
                    return Ok(());
                }
            }
        }
    }

    async fn write_frames(&mut self, frames: Vec<BytesMut>) {
        for frame in frames {
            if let Err(e) = self.channel.write_all(&frame).await {
                warn!(error = %e, "transport write failed");
                self.session.on_connection_lost(&e.to_string()).await;
                return;
            }
        }
    }

    async fn teardown(
        mut self,
        result: Result<(), FixError>,
    ) -> Result<DisconnectReason, FixError> {
        if let Err(e) = self.channel.shutdown().await {
            debug!(error = %e, "channel shutdown failed");
        }
        self.session.close().await?;
        result?;
        Ok(self
            .session
            .disconnect_reason()
            .cloned()
            .unwrap_or(DisconnectReason::ConnectionLost("unknown".to_string())))
    }
}
