//! Administrative message construction.
//!
//! All session-level messages share the same header stamp: MsgType,
//! SenderCompID, TargetCompID, MsgSeqNum, SendingTime, in that order. The
//! encoder supplies BeginString, BodyLength, and Checksum.

use bytes::BytesMut;
use ferrofix_core::error::SessionError;
use ferrofix_core::tags;
use ferrofix_core::types::{SessionId, Timestamp};
use ferrofix_tagvalue::Decoder;
use ferrofix_tagvalue::Encoder;

/// Session-level reject reasons (tag 373).
///
/// Only the values this engine actually emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Required tag missing.
    RequiredTagMissing = 1,
    /// SenderCompID problem.
    CompIdProblem = 9,
    /// Value is incorrect for this tag.
    ValueIncorrect = 5,
    /// Invalid message type.
    InvalidMsgType = 11,
    /// Other; see Text (58).
    Other = 99,
}

/// Builds administrative messages for one session identity.
#[derive(Debug, Clone)]
pub struct AdminMessages {
    begin_string: String,
    sender_comp_id: String,
    target_comp_id: String,
}

impl AdminMessages {
    /// Creates a builder for the given identity.
    #[must_use]
    pub fn new(begin_string: impl Into<String>, session_id: &SessionId) -> Self {
        Self {
            begin_string: begin_string.into(),
            sender_comp_id: session_id.sender_comp_id.as_str().to_string(),
            target_comp_id: session_id.target_comp_id.as_str().to_string(),
        }
    }

    fn header(&self, msg_type: &str, seq_num: u64, sending_time: Timestamp) -> Encoder {
        let mut enc = Encoder::new(self.begin_string.as_str());
        enc.put_str(tags::MSG_TYPE, msg_type);
        enc.put_str(tags::SENDER_COMP_ID, &self.sender_comp_id);
        enc.put_str(tags::TARGET_COMP_ID, &self.target_comp_id);
        enc.put_uint(tags::MSG_SEQ_NUM, seq_num);
        enc.put_str(tags::SENDING_TIME, &sending_time.format_millis());
        enc
    }

    /// Logon (A) with the proposed heartbeat interval and optional full
    /// sequence reset.
    #[must_use]
    pub fn logon(
        &self,
        seq_num: u64,
        sending_time: Timestamp,
        heartbeat_interval_secs: u64,
        reset_seq_num: bool,
    ) -> BytesMut {
        let mut enc = self.header("A", seq_num, sending_time);
        enc.put_uint(tags::ENCRYPT_METHOD, 0);
        enc.put_uint(tags::HEART_BT_INT, heartbeat_interval_secs);
        if reset_seq_num {
            enc.put_bool(tags::RESET_SEQ_NUM_FLAG, true);
        }
        enc.finish()
    }

    /// Heartbeat (0), echoing the TestReqID when answering a TestRequest.
    #[must_use]
    pub fn heartbeat(
        &self,
        seq_num: u64,
        sending_time: Timestamp,
        test_req_id: Option<&str>,
    ) -> BytesMut {
        let mut enc = self.header("0", seq_num, sending_time);
        if let Some(id) = test_req_id {
            enc.put_str(tags::TEST_REQ_ID, id);
        }
        enc.finish()
    }

    /// TestRequest (1).
    #[must_use]
    pub fn test_request(&self, seq_num: u64, sending_time: Timestamp, test_req_id: &str) -> BytesMut {
        let mut enc = self.header("1", seq_num, sending_time);
        enc.put_str(tags::TEST_REQ_ID, test_req_id);
        enc.finish()
    }

    /// ResendRequest (2) for `[begin_seq_no, end_seq_no]`; an `end_seq_no`
    /// of 0 asks for everything from `begin_seq_no` on.
    #[must_use]
    pub fn resend_request(
        &self,
        seq_num: u64,
        sending_time: Timestamp,
        begin_seq_no: u64,
        end_seq_no: u64,
    ) -> BytesMut {
        let mut enc = self.header("2", seq_num, sending_time);
        enc.put_uint(tags::BEGIN_SEQ_NO, begin_seq_no);
        enc.put_uint(tags::END_SEQ_NO, end_seq_no);
        enc.finish()
    }

    /// Reject (3) referencing the offending message.
    #[must_use]
    pub fn reject(
        &self,
        seq_num: u64,
        sending_time: Timestamp,
        ref_seq_num: u64,
        reason: RejectReason,
        text: &str,
    ) -> BytesMut {
        let mut enc = self.header("3", seq_num, sending_time);
        enc.put_uint(tags::REF_SEQ_NUM, ref_seq_num);
        enc.put_uint(tags::SESSION_REJECT_REASON, reason as u64);
        enc.put_str(tags::TEXT, text);
        enc.finish()
    }

    /// SequenceReset-GapFill (4) covering a sub-range the store cannot
    /// replay. Carries the sequence number of the first skipped message
    /// and PossDupFlag, as a retransmission stand-in.
    #[must_use]
    pub fn sequence_reset_gap_fill(
        &self,
        gap_begin_seq: u64,
        sending_time: Timestamp,
        new_seq_no: u64,
    ) -> BytesMut {
        let mut enc = Encoder::new(self.begin_string.as_str());
        enc.put_str(tags::MSG_TYPE, "4");
        enc.put_str(tags::SENDER_COMP_ID, &self.sender_comp_id);
        enc.put_str(tags::TARGET_COMP_ID, &self.target_comp_id);
        enc.put_uint(tags::MSG_SEQ_NUM, gap_begin_seq);
        enc.put_bool(tags::POSS_DUP_FLAG, true);
        enc.put_str(tags::SENDING_TIME, &sending_time.format_millis());
        enc.put_bool(tags::GAP_FILL_FLAG, true);
        enc.put_uint(tags::NEW_SEQ_NO, new_seq_no);
        enc.finish()
    }

    /// Logout (5) with an optional reason.
    #[must_use]
    pub fn logout(&self, seq_num: u64, sending_time: Timestamp, text: Option<&str>) -> BytesMut {
        let mut enc = self.header("5", seq_num, sending_time);
        if let Some(text) = text {
            enc.put_str(tags::TEXT, text);
        }
        enc.finish()
    }
}

/// Re-encodes a stored message as a retransmission.
///
/// The copy is field-for-field identical to the original except that
/// PossDupFlag (43) is set and OrigSendingTime (122) carries the original
/// SendingTime (52), which itself is left untouched. Running this twice over
/// the same payload yields byte-identical output, so repeated resend
/// requests replay identically.
///
/// # Errors
/// Returns `SessionError::Malformed` if the stored payload is missing its
/// BeginString or SendingTime.
pub fn retransmission(payload: &[u8]) -> Result<BytesMut, SessionError> {
    let mut fields = Vec::new();
    let mut decoder = Decoder::new(payload);
    while let Some(field) = decoder.next_field() {
        fields.push(field);
    }

    let begin_string = fields
        .iter()
        .find(|f| f.tag == tags::BEGIN_STRING)
        .and_then(|f| f.as_str().ok())
        .ok_or_else(|| SessionError::Malformed("stored message missing tag 8".to_string()))?;
    let orig_sending_time = fields
        .iter()
        .find(|f| f.tag == tags::SENDING_TIME)
        .map(|f| f.value.to_vec())
        .ok_or_else(|| SessionError::Malformed("stored message missing tag 52".to_string()))?;

    let mut enc = Encoder::new(begin_string);
    for field in &fields {
        match field.tag {
            // Recomputed by the encoder.
            tags::BEGIN_STRING | tags::BODY_LENGTH | tags::CHECK_SUM => {}
            // Replaced below, at the SendingTime position.
            tags::POSS_DUP_FLAG | tags::ORIG_SENDING_TIME => {}
            tags::SENDING_TIME => {
                enc.put_bool(tags::POSS_DUP_FLAG, true);
                enc.put_raw(tags::SENDING_TIME, &orig_sending_time);
                enc.put_raw(tags::ORIG_SENDING_TIME, &orig_sending_time);
            }
            _ => enc.put_raw(field.tag, field.value),
        }
    }
    Ok(enc.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrofix_core::message::MsgType;
    use ferrofix_core::types::CompId;

    fn builder() -> AdminMessages {
        let id = SessionId::new(CompId::new("BUY").unwrap(), CompId::new("SELL").unwrap());
        AdminMessages::new("FIX.4.4", &id)
    }

    fn ts() -> Timestamp {
        Timestamp::from_millis(1_700_000_000_000)
    }

    fn decode(bytes: &[u8]) -> ferrofix_core::message::RawMessage<'_> {
        Decoder::new(bytes).decode().unwrap()
    }

    #[test]
    fn test_logon() {
        let bytes = builder().logon(1, ts(), 30, false);
        let msg = decode(&bytes);
        assert_eq!(msg.msg_type(), &MsgType::Logon);
        assert_eq!(msg.get_field_str(tags::SENDER_COMP_ID), Some("BUY"));
        assert_eq!(msg.get_field_str(tags::TARGET_COMP_ID), Some("SELL"));
        assert_eq!(msg.get_field_str(tags::HEART_BT_INT), Some("30"));
        assert_eq!(msg.msg_seq_num().unwrap(), 1);
        assert!(msg.get_field(tags::RESET_SEQ_NUM_FLAG).is_none());
    }

    #[test]
    fn test_logon_with_reset() {
        let bytes = builder().logon(1, ts(), 30, true);
        let msg = decode(&bytes);
        assert_eq!(msg.get_field_str(tags::RESET_SEQ_NUM_FLAG), Some("Y"));
    }

    #[test]
    fn test_heartbeat_echoes_test_req_id() {
        let bytes = builder().heartbeat(7, ts(), Some("PING-1"));
        let msg = decode(&bytes);
        assert_eq!(msg.msg_type(), &MsgType::Heartbeat);
        assert_eq!(msg.get_field_str(tags::TEST_REQ_ID), Some("PING-1"));
    }

    #[test]
    fn test_resend_request_range() {
        let bytes = builder().resend_request(3, ts(), 5, 7);
        let msg = decode(&bytes);
        assert_eq!(msg.msg_type(), &MsgType::ResendRequest);
        assert_eq!(msg.get_field_str(tags::BEGIN_SEQ_NO), Some("5"));
        assert_eq!(msg.get_field_str(tags::END_SEQ_NO), Some("7"));
    }

    #[test]
    fn test_gap_fill() {
        let bytes = builder().sequence_reset_gap_fill(5, ts(), 8);
        let msg = decode(&bytes);
        assert_eq!(msg.msg_type(), &MsgType::SequenceReset);
        assert_eq!(msg.get_field_str(tags::GAP_FILL_FLAG), Some("Y"));
        assert_eq!(msg.get_field_str(tags::NEW_SEQ_NO), Some("8"));
        assert!(msg.poss_dup());
        assert_eq!(msg.msg_seq_num().unwrap(), 5);
    }

    #[test]
    fn test_reject_carries_reason() {
        let bytes = builder().reject(4, ts(), 9, RejectReason::ValueIncorrect, "bad comp id");
        let msg = decode(&bytes);
        assert_eq!(msg.msg_type(), &MsgType::Reject);
        assert_eq!(msg.get_field_str(tags::REF_SEQ_NUM), Some("9"));
        assert_eq!(msg.get_field_str(tags::SESSION_REJECT_REASON), Some("5"));
        assert_eq!(msg.get_field_str(tags::TEXT), Some("bad comp id"));
    }

    #[test]
    fn test_retransmission_marks_and_preserves() {
        let original = builder().heartbeat(12, ts(), None);
        let copy = retransmission(&original).unwrap();
        let msg = decode(&copy);

        assert!(msg.poss_dup());
        assert_eq!(msg.msg_seq_num().unwrap(), 12);
        let orig_time = ts().format_millis();
        assert_eq!(msg.get_field_str(tags::SENDING_TIME), Some(orig_time.as_str()));
        assert_eq!(
            msg.get_field_str(tags::ORIG_SENDING_TIME),
            Some(orig_time.as_str())
        );
    }

    #[test]
    fn test_retransmission_is_idempotent() {
        let original = builder().heartbeat(12, ts(), None);
        let first = retransmission(&original).unwrap();
        let second = retransmission(&first).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_retransmission_rejects_garbage() {
        assert!(retransmission(b"35=0\x01").is_err());
    }
}
