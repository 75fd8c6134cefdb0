//! The session state machine.
//!
//! [`Session`] is transport-free: it consumes framed inbound bytes and timer
//! ticks, and produces outbound frames for the caller to write. The
//! [`runner`](crate::runner) module couples it to a [`Channel`].
//!
//! Outbound commit order is fixed: assign the sequence number, encode,
//! write to the store, append to the audit log, hand the frame to the
//! caller, advance the counter. A crash before the store write leaves no
//! un-replayable sent message; a crash after it is recovered by the peer's
//! resend request.
//!
//! [`Channel`]: ferrofix_transport::Channel

use crate::application::Application;
use bytes::BytesMut;
use ferrofix_core::error::{DisconnectReason, FixError, SessionError};
use ferrofix_core::message::{MsgType, OwnedMessage, RawMessage};
use ferrofix_core::tags;
use ferrofix_core::types::Timestamp;
use ferrofix_log::{Direction, MessageLog};
use ferrofix_session::{
    AdminMessages, GapPolicy, HeartbeatAction, HeartbeatMonitor, RejectReason, SequenceCheck,
    SequenceManager, SessionConfig, SessionState, retransmission,
};
use ferrofix_store::{CollectingVisitor, MessageStore};
use ferrofix_tagvalue::{Decoder, Encoder};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// One FIX session: handshake, keep-alive, gap recovery, teardown.
///
/// Exactly one task may drive a `Session` at a time; all methods take
/// `&mut self` and must be serialized by the owner.
pub struct Session {
    config: SessionConfig,
    admin: AdminMessages,
    store: Arc<dyn MessageStore>,
    log: Arc<dyn MessageLog>,
    app: Arc<dyn Application>,
    seq: SequenceManager,
    state: SessionState,
    state_since: Instant,
    heartbeat: HeartbeatMonitor,
    initiator: bool,
    parked: Option<OwnedMessage>,
    disconnect_reason: Option<DisconnectReason>,
    test_req_counter: u64,
}

impl Session {
    /// Opens the store and log and recovers the persisted counters.
    ///
    /// # Errors
    /// Returns `FixError` if the store or log cannot be opened.
    pub async fn new(
        config: SessionConfig,
        store: Arc<dyn MessageStore>,
        log: Arc<dyn MessageLog>,
        app: Arc<dyn Application>,
    ) -> Result<Self, FixError> {
        store.open().await?;
        log.open().await?;

        if config.reset_on_logon {
            store.clear().await?;
        }
        let seq = SequenceManager::new(store.next_sender_seq(), store.next_target_seq());

        let now = Instant::now();
        let admin = AdminMessages::new(config.begin_string.as_str(), &config.session_id);
        let heartbeat =
            HeartbeatMonitor::new(config.heartbeat_interval(), config.heartbeat_grace(), now);

        info!(
            session = %config.session_id,
            next_outbound = seq.next_outbound(),
            expected_inbound = seq.expected_inbound(),
            "session created"
        );

        Ok(Self {
            config,
            admin,
            store,
            log,
            app,
            seq,
            state: SessionState::Disconnected,
            state_since: now,
            heartbeat,
            initiator: false,
            parked: None,
            disconnect_reason: None,
            test_req_counter: 0,
        })
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Why the session ended, once it has.
    #[must_use]
    pub fn disconnect_reason(&self) -> Option<&DisconnectReason> {
        self.disconnect_reason.as_ref()
    }

    /// Sequence number the next outbound message will carry.
    #[must_use]
    pub fn next_outbound_seq(&self) -> u64 {
        self.seq.next_outbound()
    }

    /// Sequence number expected on the next inbound message.
    #[must_use]
    pub fn expected_inbound_seq(&self) -> u64 {
        self.seq.expected_inbound()
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Starts the handshake as the initiating side.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` unless disconnected, or a store
    /// error if the Logon cannot be persisted.
    pub async fn initiate(&mut self) -> Result<Vec<BytesMut>, FixError> {
        if self.state.is_connected() {
            return Err(self.invalid_state("disconnected"));
        }
        self.initiator = true;
        self.disconnect_reason = None;
        self.transition(SessionState::LogonPending);

        let interval = self.config.heartbeat_interval_secs;
        let reset = self.config.reset_on_logon;
        let frame = self
            .send_admin(MsgType::Logon, |admin, seq, now| {
                admin.logon(seq, now, interval, reset)
            })
            .await?;
        Ok(vec![frame])
    }

    /// Starts the handshake as the accepting side: waits for the peer's
    /// Logon.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` unless disconnected.
    pub fn accept(&mut self) -> Result<(), FixError> {
        if self.state.is_connected() {
            return Err(self.invalid_state("disconnected"));
        }
        self.initiator = false;
        self.disconnect_reason = None;
        self.transition(SessionState::LogonPending);
        Ok(())
    }

    /// Processes one complete inbound frame and returns the outbound frames
    /// it produced.
    ///
    /// # Errors
    /// Returns `FixError` on store failure; the session is already marked
    /// disconnected when that happens.
    pub async fn on_message(&mut self, data: &[u8]) -> Result<Vec<BytesMut>, FixError> {
        let mut out = Vec::new();
        self.handle_frame(data, false, &mut out).await?;

        // A parked out-of-order message becomes processable the moment the
        // gap in front of it has been replayed.
        loop {
            let expected = self.seq.expected_inbound();
            let ready = self.parked.as_ref().and_then(OwnedMessage::msg_seq_num) == Some(expected);
            if !ready {
                break;
            }
            let Some(parked) = self.parked.take() else {
                break;
            };
            debug!(seq = expected, "reprocessing parked message");
            let bytes = parked.into_bytes();
            self.handle_frame(&bytes, true, &mut out).await?;
        }
        Ok(out)
    }

    /// Evaluates heartbeat and handshake timers.
    ///
    /// # Errors
    /// Returns `FixError` on store failure while persisting a keep-alive.
    pub async fn on_tick(&mut self, now: Instant) -> Result<Vec<BytesMut>, FixError> {
        let mut out = Vec::new();
        match self.state {
            SessionState::Disconnected => return Ok(out),
            SessionState::LogonPending => {
                if now.duration_since(self.state_since) >= self.config.logon_timeout() {
                    warn!(session = %self.config.session_id, "logon timed out");
                    self.finish(DisconnectReason::ProtocolViolation(
                        "logon timed out".to_string(),
                    ))
                    .await;
                }
                return Ok(out);
            }
            SessionState::LogoutPending => {
                if now.duration_since(self.state_since) >= self.config.logout_timeout() {
                    self.finish(DisconnectReason::LocalLogout).await;
                }
                return Ok(out);
            }
            SessionState::Active | SessionState::ResendPending { .. } => {}
        }

        match self.heartbeat.check(now) {
            HeartbeatAction::None => {}
            HeartbeatAction::SendHeartbeat => {
                let frame = self
                    .send_admin(MsgType::Heartbeat, |admin, seq, ts| {
                        admin.heartbeat(seq, ts, None)
                    })
                    .await?;
                out.push(frame);
            }
            HeartbeatAction::SendTestRequest => {
                self.test_req_counter += 1;
                let id = format!("TEST-{}", self.test_req_counter);
                let frame = self
                    .send_admin(MsgType::TestRequest, |admin, seq, ts| {
                        admin.test_request(seq, ts, &id)
                    })
                    .await?;
                out.push(frame);
            }
            HeartbeatAction::Disconnect => {
                let elapsed_ms = self.heartbeat.silence_ms(now);
                warn!(
                    session = %self.config.session_id,
                    elapsed_ms,
                    "no traffic after test request, declaring connection dead"
                );
                self.finish(DisconnectReason::HeartbeatTimeout).await;
            }
        }
        Ok(out)
    }

    /// Sends an application message. `body` appends the body fields after
    /// the standard header.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` unless logged on, or a store
    /// error if the message cannot be persisted.
    pub async fn send_app<F>(&mut self, msg_type: &MsgType, body: F) -> Result<BytesMut, FixError>
    where
        F: FnOnce(&mut Encoder),
    {
        if !matches!(
            self.state,
            SessionState::Active | SessionState::ResendPending { .. }
        ) {
            return Err(self.invalid_state("active"));
        }

        let seq_num = self.seq.next_outbound();
        let sending_time = Timestamp::now();
        let mut enc = Encoder::new(self.config.begin_string.as_str());
        enc.put_str(tags::MSG_TYPE, msg_type.as_str());
        enc.put_str(
            tags::SENDER_COMP_ID,
            self.config.session_id.sender_comp_id.as_str(),
        );
        enc.put_str(
            tags::TARGET_COMP_ID,
            self.config.session_id.target_comp_id.as_str(),
        );
        enc.put_uint(tags::MSG_SEQ_NUM, seq_num);
        enc.put_str(tags::SENDING_TIME, &sending_time.format_millis());
        body(&mut enc);
        let frame = enc.finish();

        self.commit_outbound(msg_type, seq_num, sending_time, frame)
            .await
    }

    /// Initiates a graceful logout.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` unless logged on.
    pub async fn request_logout(&mut self, text: Option<&str>) -> Result<Vec<BytesMut>, FixError> {
        if !self.state.is_logged_on() {
            return Err(self.invalid_state("active"));
        }
        let frame = self
            .send_admin(MsgType::Logout, |admin, seq, ts| admin.logout(seq, ts, text))
            .await?;
        self.transition(SessionState::LogoutPending);
        Ok(vec![frame])
    }

    /// Records a transport failure. Persisted counters are untouched; only
    /// the in-memory connection state is torn down.
    pub async fn on_connection_lost(&mut self, reason: &str) {
        if self.state.is_connected() {
            self.finish(DisconnectReason::ConnectionLost(reason.to_string()))
                .await;
        }
    }

    /// Flushes and closes the store and log.
    ///
    /// # Errors
    /// Returns `FixError` if the store cannot be flushed or closed.
    pub async fn close(&mut self) -> Result<(), FixError> {
        self.store.flush().await?;
        self.store.close().await?;
        if let Err(e) = self.log.flush().await {
            warn!(error = %e, "audit log flush failed");
        }
        if let Err(e) = self.log.close().await {
            warn!(error = %e, "audit log close failed");
        }
        Ok(())
    }

    async fn handle_frame(
        &mut self,
        data: &[u8],
        replayed_from_park: bool,
        out: &mut Vec<BytesMut>,
    ) -> Result<(), FixError> {
        if matches!(self.state, SessionState::Disconnected) {
            warn!(session = %self.config.session_id, "inbound frame while disconnected, dropped");
            return Ok(());
        }

        if !replayed_from_park {
            if let Err(e) = self.log.log(Direction::Inbound, data).await {
                warn!(error = %e, "audit log append failed");
            }
            self.heartbeat.on_received(Instant::now());
        }

        let msg = match Decoder::new(data).decode() {
            Ok(msg) => msg,
            Err(e) => {
                warn!(session = %self.config.session_id, error = %e, "malformed inbound message");
                if self.state.is_logged_on() {
                    let ref_seq = self.seq.expected_inbound();
                    let text = e.to_string();
                    let frame = self
                        .send_admin(MsgType::Reject, |admin, seq, ts| {
                            admin.reject(seq, ts, ref_seq, RejectReason::Other, &text)
                        })
                        .await?;
                    out.push(frame);
                }
                return Ok(());
            }
        };

        if !self.comp_ids_match(&msg) {
            let text = "comp id mismatch".to_string();
            warn!(
                session = %self.config.session_id,
                sender = msg.get_field_str(tags::SENDER_COMP_ID).unwrap_or("?"),
                target = msg.get_field_str(tags::TARGET_COMP_ID).unwrap_or("?"),
                "rejecting message with wrong comp ids"
            );
            let frame = self
                .send_admin(MsgType::Logout, |admin, seq, ts| {
                    admin.logout(seq, ts, Some(&text))
                })
                .await?;
            out.push(frame);
            self.finish(DisconnectReason::ProtocolViolation(text)).await;
            return Ok(());
        }

        // A Logon carrying ResetSeqNumFlag restarts both sides' numbering
        // before any sequence comparison happens.
        let reset_logon = *msg.msg_type() == MsgType::Logon
            && msg
                .get_field(tags::RESET_SEQ_NUM_FLAG)
                .is_some_and(|f| f.value == b"Y");
        if reset_logon && !self.config.reset_on_logon {
            info!(session = %self.config.session_id, "peer requested full sequence reset");
            self.store.clear().await?;
            self.seq.reset();
        }

        if *msg.msg_type() == MsgType::SequenceReset {
            return self.on_sequence_reset(&msg, out).await;
        }

        let seq_num = match msg.msg_seq_num() {
            Ok(seq) => seq,
            Err(_) => {
                let ref_seq = self.seq.expected_inbound();
                let frame = self
                    .send_admin(MsgType::Reject, |admin, seq, ts| {
                        admin.reject(
                            seq,
                            ts,
                            ref_seq,
                            RejectReason::RequiredTagMissing,
                            "missing MsgSeqNum",
                        )
                    })
                    .await?;
                out.push(frame);
                return Ok(());
            }
        };

        match self.seq.check_inbound(seq_num, msg.poss_dup()) {
            SequenceCheck::InOrder => self.dispatch_in_order(&msg, reset_logon, out).await,
            SequenceCheck::Duplicate => {
                debug!(
                    session = %self.config.session_id,
                    seq = seq_num,
                    "duplicate retransmission ignored"
                );
                Ok(())
            }
            SequenceCheck::TooLow { expected, received } => {
                let text = format!("sequence too low: expected {expected}, received {received}");
                warn!(session = %self.config.session_id, %text, "protocol violation");
                let frame = self
                    .send_admin(MsgType::Logout, |admin, seq, ts| {
                        admin.logout(seq, ts, Some(&text))
                    })
                    .await?;
                out.push(frame);
                self.finish(DisconnectReason::ProtocolViolation(text)).await;
                Ok(())
            }
            SequenceCheck::Gap { expected, received } => {
                self.on_gap(&msg, reset_logon, expected, received, out).await
            }
        }
    }

    async fn on_gap(
        &mut self,
        msg: &RawMessage<'_>,
        reset_logon: bool,
        expected: u64,
        received: u64,
        out: &mut Vec<BytesMut>,
    ) -> Result<(), FixError> {
        // A gapped Logon still completes the handshake so that recovery
        // traffic is accepted; its own sequence number is consumed later,
        // when the parked copy comes up in order.
        if *msg.msg_type() == MsgType::Logon && matches!(self.state, SessionState::LogonPending) {
            self.apply_logon_handshake(msg, reset_logon, out).await?;
        }

        let end = received - 1;
        // At most one ResendRequest is outstanding; further out-of-order
        // arrivals inside the requested range must not re-request it.
        if let SessionState::ResendPending { end: outstanding, .. } = self.state
            && end <= outstanding
        {
            debug!(
                session = %self.config.session_id,
                seq = received,
                outstanding,
                "gap already covered by outstanding resend request"
            );
        } else {
            info!(
                session = %self.config.session_id,
                expected,
                received,
                "sequence gap detected, requesting resend [{expected},{end}]"
            );
            let frame = self
                .send_admin(MsgType::ResendRequest, |admin, seq, ts| {
                    admin.resend_request(seq, ts, expected, end)
                })
                .await?;
            out.push(frame);
            self.transition(SessionState::ResendPending {
                begin: expected,
                end,
            });
        }

        match self.config.gap_policy {
            GapPolicy::BufferOne => {
                if self.parked.is_some() {
                    debug!(seq = received, "replacing previously parked message");
                }
                self.parked = Some(msg.to_owned_message());
            }
            GapPolicy::Discard => {
                debug!(seq = received, "discarding out-of-order message");
            }
        }
        Ok(())
    }

    async fn on_sequence_reset(
        &mut self,
        msg: &RawMessage<'_>,
        out: &mut Vec<BytesMut>,
    ) -> Result<(), FixError> {
        let new_seq: u64 = match msg.get_field_as(tags::NEW_SEQ_NO) {
            Ok(n) => n,
            Err(_) => {
                let ref_seq = self.seq.expected_inbound();
                let frame = self
                    .send_admin(MsgType::Reject, |admin, seq, ts| {
                        admin.reject(
                            seq,
                            ts,
                            ref_seq,
                            RejectReason::RequiredTagMissing,
                            "SequenceReset missing NewSeqNo",
                        )
                    })
                    .await?;
                out.push(frame);
                return Ok(());
            }
        };

        let expected = self.seq.expected_inbound();
        if new_seq > expected {
            debug!(
                session = %self.config.session_id,
                from = expected,
                to = new_seq,
                "sequence reset accepted"
            );
            self.seq.set_expected_inbound(new_seq);
            self.persist_inbound_counter().await?;
            self.check_gap_filled();
        } else if new_seq < expected && !msg.poss_dup() {
            let frame = self
                .send_admin(MsgType::Reject, |admin, seq, ts| {
                    admin.reject(
                        seq,
                        ts,
                        expected,
                        RejectReason::ValueIncorrect,
                        "NewSeqNo lower than expected",
                    )
                })
                .await?;
            out.push(frame);
        }
        Ok(())
    }

    async fn dispatch_in_order(
        &mut self,
        msg: &RawMessage<'_>,
        reset_logon: bool,
        out: &mut Vec<BytesMut>,
    ) -> Result<(), FixError> {
        // Advance and persist as one step before side effects, so a crash
        // cannot leave the counter behind an already-applied message.
        self.seq.advance_inbound();
        self.persist_inbound_counter().await?;

        match msg.msg_type().clone() {
            MsgType::Logon => {
                // A reset-logon mid-session re-runs the handshake; any
                // other repeated logon is noise.
                if matches!(self.state, SessionState::LogonPending) || reset_logon {
                    self.apply_logon_handshake(msg, reset_logon, out).await?;
                } else {
                    debug!(session = %self.config.session_id, "logon while already logged on, ignored");
                }
                self.app
                    .on_admin_message(&self.config.session_id, &msg.to_owned_message())
                    .await;
            }
            MsgType::Heartbeat => {
                self.app
                    .on_admin_message(&self.config.session_id, &msg.to_owned_message())
                    .await;
            }
            MsgType::TestRequest => {
                let test_req_id = msg.get_field_str(tags::TEST_REQ_ID).map(str::to_string);
                let frame = self
                    .send_admin(MsgType::Heartbeat, |admin, seq, ts| {
                        admin.heartbeat(seq, ts, test_req_id.as_deref())
                    })
                    .await?;
                out.push(frame);
            }
            MsgType::ResendRequest => {
                self.serve_resend(msg, out).await?;
            }
            MsgType::Reject => {
                warn!(
                    session = %self.config.session_id,
                    ref_seq = msg.get_field_str(tags::REF_SEQ_NUM).unwrap_or("?"),
                    text = msg.get_field_str(tags::TEXT).unwrap_or(""),
                    "session-level reject received"
                );
                self.app
                    .on_admin_message(&self.config.session_id, &msg.to_owned_message())
                    .await;
            }
            MsgType::Logout => {
                self.on_logout_msg(msg, out).await?;
            }
            // Handled before sequence classification.
            MsgType::SequenceReset => {}
            app_type => {
                let owned = msg.to_owned_message();
                if let Err(reason) = self
                    .app
                    .on_app_message(&self.config.session_id, &owned)
                    .await
                {
                    let ref_seq = match owned.msg_seq_num() {
                        Some(seq) => seq,
                        None => self.seq.expected_inbound() - 1,
                    };
                    debug!(
                        session = %self.config.session_id,
                        msg_type = %app_type,
                        "application rejected message"
                    );
                    let frame = self
                        .send_admin(MsgType::Reject, |admin, seq, ts| {
                            admin.reject(seq, ts, ref_seq, reason, "rejected by application")
                        })
                        .await?;
                    out.push(frame);
                }
            }
        }

        self.check_gap_filled();
        Ok(())
    }

    async fn apply_logon_handshake(
        &mut self,
        msg: &RawMessage<'_>,
        reset_logon: bool,
        out: &mut Vec<BytesMut>,
    ) -> Result<(), FixError> {
        if let Ok(interval) = msg.get_field_as::<u64>(tags::HEART_BT_INT) {
            self.heartbeat
                .set_interval(std::time::Duration::from_secs(interval));
        }

        if !self.initiator {
            let interval_secs = self.heartbeat.interval().as_secs();
            let frame = self
                .send_admin(MsgType::Logon, |admin, seq, ts| {
                    admin.logon(seq, ts, interval_secs, reset_logon)
                })
                .await?;
            out.push(frame);
        }

        self.transition(SessionState::Active);
        info!(session = %self.config.session_id, "logon complete");
        self.app.on_logon(&self.config.session_id).await;
        Ok(())
    }

    async fn on_logout_msg(
        &mut self,
        msg: &RawMessage<'_>,
        out: &mut Vec<BytesMut>,
    ) -> Result<(), FixError> {
        let text = msg.get_field_str(tags::TEXT).unwrap_or("");
        if matches!(self.state, SessionState::LogoutPending) {
            // Peer confirmed our logout.
            self.finish(DisconnectReason::LocalLogout).await;
        } else {
            info!(session = %self.config.session_id, text, "peer initiated logout");
            let frame = self
                .send_admin(MsgType::Logout, |admin, seq, ts| admin.logout(seq, ts, None))
                .await?;
            out.push(frame);
            self.finish(DisconnectReason::PeerLogout).await;
        }
        Ok(())
    }

    /// Serves the peer's ResendRequest from the store: verbatim
    /// retransmissions for what is stored, one SequenceReset-GapFill per
    /// sub-range that is not.
    async fn serve_resend(
        &mut self,
        msg: &RawMessage<'_>,
        out: &mut Vec<BytesMut>,
    ) -> Result<(), FixError> {
        let (begin, end) = match (
            msg.get_field_as::<u64>(tags::BEGIN_SEQ_NO),
            msg.get_field_as::<u64>(tags::END_SEQ_NO),
        ) {
            (Ok(b), Ok(e)) => (b, e),
            _ => {
                let ref_seq = self.seq.expected_inbound() - 1;
                let frame = self
                    .send_admin(MsgType::Reject, |admin, seq, ts| {
                        admin.reject(
                            seq,
                            ts,
                            ref_seq,
                            RejectReason::RequiredTagMissing,
                            "ResendRequest missing range",
                        )
                    })
                    .await?;
                out.push(frame);
                return Ok(());
            }
        };

        let next_outbound = self.seq.next_outbound();
        let highest_sent = next_outbound.saturating_sub(1);
        let end = if end == 0 || end > highest_sent {
            highest_sent
        } else {
            end
        };

        info!(
            session = %self.config.session_id,
            begin,
            end,
            "serving resend request"
        );

        if begin > end {
            // Nothing was ever sent in the requested range.
            let frame = self
                .admin
                .sequence_reset_gap_fill(begin, Timestamp::now(), next_outbound);
            self.push_retransmission(frame, out).await;
            return Ok(());
        }

        let mut visitor = CollectingVisitor::default();
        self.store.read_range(begin, end, &mut visitor).await?;

        // Records and gaps are each ascending and mutually disjoint; merge
        // them back into one ascending replay stream.
        let mut records = visitor.records.into_iter().peekable();
        let mut gaps = visitor.gaps.into_iter().peekable();
        loop {
            let next_record_seq = records.peek().map(|r| r.seq_num);
            let next_gap_start = gaps.peek().map(|&(from, _)| from);
            match (next_record_seq, next_gap_start) {
                (Some(r), Some(g)) if r < g => {
                    let record = records.next().ok_or_else(|| {
                        SessionError::Malformed("replay stream underflow".to_string())
                    })?;
                    let frame = retransmission(&record.payload)?;
                    self.push_retransmission(frame, out).await;
                }
                (Some(_), Some(_)) | (None, Some(_)) => {
                    let Some((from, to)) = gaps.next() else { break };
                    let frame =
                        self.admin
                            .sequence_reset_gap_fill(from, Timestamp::now(), to + 1);
                    self.push_retransmission(frame, out).await;
                }
                (Some(_), None) => {
                    let Some(record) = records.next() else { break };
                    let frame = retransmission(&record.payload)?;
                    self.push_retransmission(frame, out).await;
                }
                (None, None) => break,
            }
        }
        Ok(())
    }

    /// Retransmissions reuse their original sequence numbers: no store
    /// write, no counter movement, audit log only.
    async fn push_retransmission(&mut self, frame: BytesMut, out: &mut Vec<BytesMut>) {
        if let Err(e) = self.log.log(Direction::Outbound, &frame).await {
            warn!(error = %e, "audit log append failed");
        }
        self.heartbeat.on_sent(Instant::now());
        out.push(frame);
    }

    async fn send_admin<F>(&mut self, msg_type: MsgType, build: F) -> Result<BytesMut, FixError>
    where
        F: FnOnce(&AdminMessages, u64, Timestamp) -> BytesMut,
    {
        let seq_num = self.seq.next_outbound();
        let sending_time = Timestamp::now();
        let frame = build(&self.admin, seq_num, sending_time);
        self.commit_outbound(&msg_type, seq_num, sending_time, frame)
            .await
    }

    async fn commit_outbound(
        &mut self,
        msg_type: &MsgType,
        seq_num: u64,
        sending_time: Timestamp,
        frame: BytesMut,
    ) -> Result<BytesMut, FixError> {
        if let Err(e) = self
            .store
            .write(seq_num, sending_time, msg_type, &frame)
            .await
        {
            error!(session = %self.config.session_id, seq = seq_num, error = %e, "store write failed");
            self.finish(DisconnectReason::StoreFailure(e.to_string()))
                .await;
            return Err(e.into());
        }
        if let Err(e) = self.store.set_next_sender_seq(seq_num + 1).await {
            error!(session = %self.config.session_id, error = %e, "counter persistence failed");
            self.finish(DisconnectReason::StoreFailure(e.to_string()))
                .await;
            return Err(e.into());
        }
        if let Err(e) = self.log.log(Direction::Outbound, &frame).await {
            warn!(error = %e, "audit log append failed");
        }
        self.seq.advance_outbound();
        self.heartbeat.on_sent(Instant::now());
        Ok(frame)
    }

    async fn persist_inbound_counter(&mut self) -> Result<(), FixError> {
        let expected = self.seq.expected_inbound();
        if let Err(e) = self.store.set_next_target_seq(expected).await {
            error!(session = %self.config.session_id, error = %e, "counter persistence failed");
            self.finish(DisconnectReason::StoreFailure(e.to_string()))
                .await;
            return Err(e.into());
        }
        Ok(())
    }

    fn comp_ids_match(&self, msg: &RawMessage<'_>) -> bool {
        msg.get_field_str(tags::SENDER_COMP_ID)
            == Some(self.config.session_id.target_comp_id.as_str())
            && msg.get_field_str(tags::TARGET_COMP_ID)
                == Some(self.config.session_id.sender_comp_id.as_str())
    }

    fn check_gap_filled(&mut self) {
        if let SessionState::ResendPending { end, .. } = self.state
            && self.seq.expected_inbound() > end
        {
            info!(session = %self.config.session_id, "sequence gap filled");
            self.transition(SessionState::Active);
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(
                session = %self.config.session_id,
                from = %self.state,
                to = %next,
                "state transition"
            );
            self.state = next;
            self.state_since = Instant::now();
        }
    }

    async fn finish(&mut self, reason: DisconnectReason) {
        if matches!(self.state, SessionState::Disconnected) {
            return;
        }
        info!(session = %self.config.session_id, %reason, "session ended");
        self.transition(SessionState::Disconnected);
        self.parked = None;
        self.disconnect_reason = Some(reason.clone());
        self.app.on_logout(&self.config.session_id, &reason).await;
    }

    fn invalid_state(&self, expected: &str) -> FixError {
        SessionError::InvalidState {
            expected: expected.to_string(),
            current: self.state.name().to_string(),
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::NoOpApplication;
    use ferrofix_core::types::{CompId, SessionId};
    use ferrofix_log::NullLog;
    use ferrofix_store::{MemoryStore, NullStore};

    fn our_id() -> SessionId {
        SessionId::new(CompId::new("BUY").unwrap(), CompId::new("SELL").unwrap())
    }

    fn peer_admin() -> AdminMessages {
        let peer_id = SessionId::new(CompId::new("SELL").unwrap(), CompId::new("BUY").unwrap());
        AdminMessages::new("FIX.4.4", &peer_id)
    }

    fn ts() -> Timestamp {
        Timestamp::now()
    }

    async fn new_session(config: SessionConfig) -> Session {
        Session::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(NullLog::new()),
            Arc::new(NoOpApplication),
        )
        .await
        .unwrap()
    }

    fn config() -> SessionConfig {
        SessionConfig::builder(our_id())
            .heartbeat_interval_secs(30)
            .build()
    }

    /// Acceptor session taken through a complete logon handshake; the
    /// peer's next sequence number is 2.
    async fn active_session() -> Session {
        let mut session = new_session(config()).await;
        session.accept().unwrap();
        let out = session
            .on_message(&peer_admin().logon(1, ts(), 30, false))
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(out.len(), 1); // our logon reply
        session
    }

    fn decode(bytes: &[u8]) -> RawMessage<'_> {
        Decoder::new(bytes).decode().unwrap()
    }

    #[tokio::test]
    async fn test_acceptor_handshake() {
        let session = active_session().await;
        assert_eq!(session.expected_inbound_seq(), 2);
        assert_eq!(session.next_outbound_seq(), 2);
    }

    #[tokio::test]
    async fn test_initiator_handshake() {
        let mut session = new_session(config()).await;
        let out = session.initiate().await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(decode(&out[0]).msg_type(), &MsgType::Logon);
        assert_eq!(session.state(), SessionState::LogonPending);

        let out = session
            .on_message(&peer_admin().logon(1, ts(), 30, false))
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Active);
        // The initiator does not reply to the peer's logon response.
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_gap_triggers_single_resend_request() {
        let mut session = active_session().await;
        // Drive expected inbound to 5.
        for seq in 2..=4 {
            session
                .on_message(&peer_admin().heartbeat(seq, ts(), None))
                .await
                .unwrap();
        }
        assert_eq!(session.expected_inbound_seq(), 5);

        let out = session
            .on_message(&peer_admin().heartbeat(8, ts(), None))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        let req = decode(&out[0]);
        assert_eq!(req.msg_type(), &MsgType::ResendRequest);
        assert_eq!(req.get_field_str(tags::BEGIN_SEQ_NO), Some("5"));
        assert_eq!(req.get_field_str(tags::END_SEQ_NO), Some("7"));
        assert_eq!(
            session.state(),
            SessionState::ResendPending { begin: 5, end: 7 }
        );
        // Sequence 8 was not applied.
        assert_eq!(session.expected_inbound_seq(), 5);
    }

    #[tokio::test]
    async fn test_no_second_resend_request_while_gap_outstanding() {
        let mut session = active_session().await;
        let out = session
            .on_message(&peer_admin().heartbeat(8, ts(), None))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(
            session.state(),
            SessionState::ResendPending { begin: 2, end: 7 }
        );

        // Live traffic inside the requested range must not re-request it.
        let out = session
            .on_message(&peer_admin().heartbeat(6, ts(), None))
            .await
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(
            session.state(),
            SessionState::ResendPending { begin: 2, end: 7 }
        );
    }

    #[tokio::test]
    async fn test_resend_request_reissued_when_gap_grows() {
        let mut session = active_session().await;
        session
            .on_message(&peer_admin().heartbeat(8, ts(), None))
            .await
            .unwrap();

        // An arrival beyond the outstanding range widens the request.
        let out = session
            .on_message(&peer_admin().heartbeat(10, ts(), None))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        let req = decode(&out[0]);
        assert_eq!(req.msg_type(), &MsgType::ResendRequest);
        assert_eq!(req.get_field_str(tags::BEGIN_SEQ_NO), Some("2"));
        assert_eq!(req.get_field_str(tags::END_SEQ_NO), Some("9"));
        assert_eq!(
            session.state(),
            SessionState::ResendPending { begin: 2, end: 9 }
        );
    }

    #[tokio::test]
    async fn test_undecodable_frame_rejected_without_advancing() {
        let mut session = active_session().await;
        let expected_before = session.expected_inbound_seq();
        let outbound_before = session.next_outbound_seq();

        // Framed, but the body opens with Text instead of MsgType.
        let out = session
            .on_message(b"8=FIX.4.4\x019=7\x0158=bad\x0110=000\x01")
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(decode(&out[0]).msg_type(), &MsgType::Reject);
        // Inbound counter untouched, the reject itself sequenced.
        assert_eq!(session.expected_inbound_seq(), expected_before);
        assert_eq!(session.next_outbound_seq(), outbound_before + 1);
        assert_eq!(session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_gap_fill_reprocesses_parked_message() {
        let mut session = active_session().await;
        for seq in 2..=4 {
            session
                .on_message(&peer_admin().heartbeat(seq, ts(), None))
                .await
                .unwrap();
        }

        session
            .on_message(&peer_admin().heartbeat(8, ts(), None))
            .await
            .unwrap();

        // Replay 5..=7; the parked 8 is consumed right after.
        for seq in 5..=7 {
            session
                .on_message(&retransmission(&peer_admin().heartbeat(seq, ts(), None)).unwrap())
                .await
                .unwrap();
        }
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.expected_inbound_seq(), 9);
    }

    #[tokio::test]
    async fn test_duplicate_with_poss_dup_is_ignored() {
        let mut session = active_session().await;
        for seq in 2..=9 {
            session
                .on_message(&peer_admin().heartbeat(seq, ts(), None))
                .await
                .unwrap();
        }
        assert_eq!(session.expected_inbound_seq(), 10);

        let dup = retransmission(&peer_admin().heartbeat(9, ts(), None)).unwrap();
        let out = session.on_message(&dup).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(session.expected_inbound_seq(), 10);
        assert_eq!(session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_too_low_without_poss_dup_is_fatal() {
        let mut session = active_session().await;
        for seq in 2..=9 {
            session
                .on_message(&peer_admin().heartbeat(seq, ts(), None))
                .await
                .unwrap();
        }

        let out = session
            .on_message(&peer_admin().heartbeat(9, ts(), None))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(decode(&out[0]).msg_type(), &MsgType::Logout);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(
            session.disconnect_reason(),
            Some(DisconnectReason::ProtocolViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_test_request_answered_with_heartbeat() {
        let mut session = active_session().await;
        let out = session
            .on_message(&peer_admin().test_request(2, ts(), "PING-7"))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        let hb = decode(&out[0]);
        assert_eq!(hb.msg_type(), &MsgType::Heartbeat);
        assert_eq!(hb.get_field_str(tags::TEST_REQ_ID), Some("PING-7"));
    }

    #[tokio::test]
    async fn test_resend_served_verbatim_with_poss_dup() {
        let mut session = active_session().await;
        for i in 0..3 {
            session
                .send_app(&MsgType::NewOrderSingle, |enc| {
                    enc.put_uint(11, i); // ClOrdID
                })
                .await
                .unwrap();
        }
        // Outbound: 1=Logon, 2..=4 orders.
        assert_eq!(session.next_outbound_seq(), 5);

        let out = session
            .on_message(&peer_admin().resend_request(2, ts(), 2, 4))
            .await
            .unwrap();
        assert_eq!(out.len(), 3);
        for (i, frame) in out.iter().enumerate() {
            let msg = decode(frame);
            assert_eq!(msg.msg_type(), &MsgType::NewOrderSingle);
            assert!(msg.poss_dup());
            assert_eq!(msg.msg_seq_num().unwrap(), 2 + i as u64);
            assert!(msg.get_field(tags::ORIG_SENDING_TIME).is_some());
        }
        // Serving a resend never moves the outbound counter.
        assert_eq!(session.next_outbound_seq(), 5);
    }

    #[tokio::test]
    async fn test_repeated_resend_is_byte_identical() {
        let mut session = active_session().await;
        session
            .send_app(&MsgType::NewOrderSingle, |enc| enc.put_uint(11, 1))
            .await
            .unwrap();

        let first = session
            .on_message(&peer_admin().resend_request(2, ts(), 2, 2))
            .await
            .unwrap();
        let second = session
            .on_message(&peer_admin().resend_request(3, ts(), 2, 2))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_resend_from_null_store_gap_fills() {
        let mut session = Session::new(
            config(),
            Arc::new(NullStore::new()),
            Arc::new(NullLog::new()),
            Arc::new(NoOpApplication),
        )
        .await
        .unwrap();
        session.accept().unwrap();
        session
            .on_message(&peer_admin().logon(1, ts(), 30, false))
            .await
            .unwrap();
        session
            .send_app(&MsgType::NewOrderSingle, |enc| enc.put_uint(11, 1))
            .await
            .unwrap();

        let out = session
            .on_message(&peer_admin().resend_request(2, ts(), 1, 0))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        let gap_fill = decode(&out[0]);
        assert_eq!(gap_fill.msg_type(), &MsgType::SequenceReset);
        assert_eq!(gap_fill.get_field_str(tags::GAP_FILL_FLAG), Some("Y"));
        assert_eq!(gap_fill.msg_seq_num().unwrap(), 1);
        // Logon reply and the order consumed seqs 1 and 2; NewSeqNo points
        // one past everything sent so far.
        assert_eq!(gap_fill.get_field_str(tags::NEW_SEQ_NO), Some("3"));
    }

    #[tokio::test]
    async fn test_logon_with_reset_flag_clears_counters() {
        let mut session = active_session().await;
        for seq in 2..=6 {
            session
                .on_message(&peer_admin().heartbeat(seq, ts(), None))
                .await
                .unwrap();
        }
        session
            .send_app(&MsgType::NewOrderSingle, |enc| enc.put_uint(11, 1))
            .await
            .unwrap();
        assert!(session.next_outbound_seq() > 1);

        let out = session
            .on_message(&peer_admin().logon(1, ts(), 30, true))
            .await
            .unwrap();
        // Counters restarted: logon consumed seq 1, our reply carried seq 1.
        assert_eq!(session.expected_inbound_seq(), 2);
        assert_eq!(session.next_outbound_seq(), 2);
        let reply = decode(&out[0]);
        assert_eq!(reply.msg_type(), &MsgType::Logon);
        assert_eq!(reply.msg_seq_num().unwrap(), 1);
        assert_eq!(reply.get_field_str(tags::RESET_SEQ_NUM_FLAG), Some("Y"));
    }

    #[tokio::test]
    async fn test_sequence_reset_advances_expected() {
        let mut session = active_session().await;
        let out = session
            .on_message(&peer_admin().sequence_reset_gap_fill(2, ts(), 9))
            .await
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(session.expected_inbound_seq(), 9);
    }

    #[tokio::test]
    async fn test_peer_logout_confirmed() {
        let mut session = active_session().await;
        let out = session
            .on_message(&peer_admin().logout(2, ts(), None))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(decode(&out[0]).msg_type(), &MsgType::Logout);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(
            session.disconnect_reason(),
            Some(&DisconnectReason::PeerLogout)
        );
    }

    #[tokio::test]
    async fn test_local_logout_roundtrip() {
        let mut session = active_session().await;
        let out = session.request_logout(Some("done for today")).await.unwrap();
        assert_eq!(decode(&out[0]).msg_type(), &MsgType::Logout);
        assert_eq!(session.state(), SessionState::LogoutPending);

        session
            .on_message(&peer_admin().logout(2, ts(), None))
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(
            session.disconnect_reason(),
            Some(&DisconnectReason::LocalLogout)
        );
    }

    #[tokio::test]
    async fn test_comp_id_mismatch_is_fatal() {
        let mut session = active_session().await;
        let stranger = AdminMessages::new(
            "FIX.4.4",
            &SessionId::new(CompId::new("EVIL").unwrap(), CompId::new("BUY").unwrap()),
        );
        let out = session
            .on_message(&stranger.heartbeat(2, ts(), None))
            .await
            .unwrap();
        assert_eq!(decode(&out[0]).msg_type(), &MsgType::Logout);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_outbound_counter_contiguous_after_sends() {
        let mut session = active_session().await;
        let before = session.next_outbound_seq();
        for i in 0..5 {
            session
                .send_app(&MsgType::NewOrderSingle, |enc| enc.put_uint(11, i))
                .await
                .unwrap();
        }
        assert_eq!(session.next_outbound_seq(), before + 5);
    }

    #[tokio::test]
    async fn test_heartbeat_ladder_to_disconnect() {
        let mut session = active_session().await;
        let interval = session.config().heartbeat_interval();
        let grace = session.config().heartbeat_grace();
        let start = Instant::now();

        let out = session.on_tick(start + interval + grace).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(decode(&out[0]).msg_type(), &MsgType::TestRequest);

        let out = session
            .on_tick(start + interval + grace + interval)
            .await
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(
            session.disconnect_reason(),
            Some(&DisconnectReason::HeartbeatTimeout)
        );
    }

    #[tokio::test]
    async fn test_idle_send_side_emits_heartbeat() {
        let mut session = active_session().await;
        let interval = session.config().heartbeat_interval();

        // Keep the receive clock fresh so only the send clock expires.
        session
            .on_message(&peer_admin().heartbeat(2, ts(), None))
            .await
            .unwrap();
        let out = session.on_tick(Instant::now() + interval).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(decode(&out[0]).msg_type(), &MsgType::Heartbeat);
    }

    #[tokio::test]
    async fn test_counters_survive_reconnect() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut session = Session::new(
                config(),
                store.clone(),
                Arc::new(NullLog::new()),
                Arc::new(NoOpApplication),
            )
            .await
            .unwrap();
            session.accept().unwrap();
            session
                .on_message(&peer_admin().logon(1, ts(), 30, false))
                .await
                .unwrap();
            session
                .send_app(&MsgType::NewOrderSingle, |enc| enc.put_uint(11, 1))
                .await
                .unwrap();
            session.on_connection_lost("test teardown").await;
        }

        let session = Session::new(
            config(),
            store,
            Arc::new(NullLog::new()),
            Arc::new(NoOpApplication),
        )
        .await
        .unwrap();
        assert_eq!(session.next_outbound_seq(), 3);
        assert_eq!(session.expected_inbound_seq(), 2);
    }

    #[tokio::test]
    async fn test_send_app_requires_logon() {
        let mut session = new_session(config()).await;
        let err = session
            .send_app(&MsgType::NewOrderSingle, |enc| enc.put_uint(11, 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FixError::Session(SessionError::InvalidState { .. })
        ));
    }
}
