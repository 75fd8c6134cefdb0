//! Heartbeat and liveness tracking.
//!
//! Two clocks drive keep-alive: time since the last *sent* message decides
//! when we owe the peer a Heartbeat, and time since the last *received*
//! message decides when to question the peer's liveness. The escalation is
//! a two-step ladder: silence for `interval + grace` triggers a TestRequest;
//! a further `interval` of silence declares the connection dead.

use std::time::{Duration, Instant};
use tracing::debug;

/// Action the session should take after a timer check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing due.
    None,
    /// We have been quiet for a full interval; send a Heartbeat.
    SendHeartbeat,
    /// The peer has been quiet past the grace window; send a TestRequest.
    SendTestRequest,
    /// The peer stayed silent after our TestRequest; tear down.
    Disconnect,
}

/// Tracks the send/receive clocks for one connection. Ephemeral: rebuilt on
/// every connect, never persisted.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    interval: Duration,
    grace: Duration,
    last_sent: Instant,
    last_received: Instant,
    test_request_pending: bool,
}

impl HeartbeatMonitor {
    /// Creates a monitor with both clocks at `now`.
    #[must_use]
    pub fn new(interval: Duration, grace: Duration, now: Instant) -> Self {
        Self {
            interval,
            grace,
            last_sent: now,
            last_received: now,
            test_request_pending: false,
        }
    }

    /// Records an outbound message.
    pub fn on_sent(&mut self, now: Instant) {
        self.last_sent = now;
    }

    /// Records an inbound message. Any outstanding TestRequest is satisfied
    /// by traffic of any kind.
    pub fn on_received(&mut self, now: Instant) {
        self.last_received = now;
        self.test_request_pending = false;
    }

    /// Renegotiates the interval (peer's HeartBtInt on Logon).
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Returns the negotiated interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true if a TestRequest is outstanding.
    #[must_use]
    pub const fn test_request_pending(&self) -> bool {
        self.test_request_pending
    }

    /// Milliseconds since the last inbound message.
    #[must_use]
    pub fn silence_ms(&self, now: Instant) -> u64 {
        now.duration_since(self.last_received).as_millis() as u64
    }

    /// Evaluates the timers. At most one action is due per call; liveness
    /// escalation takes priority over our own heartbeat obligation.
    pub fn check(&mut self, now: Instant) -> HeartbeatAction {
        let silence = now.duration_since(self.last_received);

        if self.test_request_pending {
            if silence >= self.interval + self.grace + self.interval {
                return HeartbeatAction::Disconnect;
            }
        } else if silence >= self.interval + self.grace {
            debug!(silence_ms = silence.as_millis() as u64, "peer quiet past grace window");
            self.test_request_pending = true;
            return HeartbeatAction::SendTestRequest;
        }

        if now.duration_since(self.last_sent) >= self.interval {
            return HeartbeatAction::SendHeartbeat;
        }

        HeartbeatAction::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(30);
    const GRACE: Duration = Duration::from_secs(3);

    #[test]
    fn test_quiet_connection_no_action() {
        let start = Instant::now();
        let mut hb = HeartbeatMonitor::new(INTERVAL, GRACE, start);
        assert_eq!(hb.check(start + Duration::from_secs(10)), HeartbeatAction::None);
    }

    #[test]
    fn test_heartbeat_due_after_send_silence() {
        let start = Instant::now();
        let mut hb = HeartbeatMonitor::new(INTERVAL, GRACE, start);
        hb.on_received(start + Duration::from_secs(25));

        let now = start + Duration::from_secs(31);
        assert_eq!(hb.check(now), HeartbeatAction::SendHeartbeat);
    }

    #[test]
    fn test_test_request_after_receive_silence() {
        let start = Instant::now();
        let mut hb = HeartbeatMonitor::new(INTERVAL, GRACE, start);
        hb.on_sent(start + Duration::from_secs(32));

        let now = start + INTERVAL + GRACE;
        assert_eq!(hb.check(now), HeartbeatAction::SendTestRequest);
        assert!(hb.test_request_pending());
    }

    #[test]
    fn test_disconnect_after_unanswered_test_request() {
        let start = Instant::now();
        let mut hb = HeartbeatMonitor::new(INTERVAL, GRACE, start);

        let t1 = start + INTERVAL + GRACE;
        assert_eq!(hb.check(t1), HeartbeatAction::SendTestRequest);
        hb.on_sent(t1);

        // Still short of the full escalation window.
        let t2 = t1 + Duration::from_secs(10);
        assert_ne!(hb.check(t2), HeartbeatAction::Disconnect);

        let t3 = start + INTERVAL + GRACE + INTERVAL;
        assert_eq!(hb.check(t3), HeartbeatAction::Disconnect);
    }

    #[test]
    fn test_inbound_traffic_cancels_test_request() {
        let start = Instant::now();
        let mut hb = HeartbeatMonitor::new(INTERVAL, GRACE, start);

        let t1 = start + INTERVAL + GRACE;
        assert_eq!(hb.check(t1), HeartbeatAction::SendTestRequest);

        hb.on_received(t1 + Duration::from_secs(1));
        assert!(!hb.test_request_pending());
        hb.on_sent(t1 + Duration::from_secs(1));
        assert_eq!(hb.check(t1 + Duration::from_secs(2)), HeartbeatAction::None);
    }
}
