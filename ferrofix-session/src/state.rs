//! Session state machine states.

use std::fmt;

/// Runtime state of one session.
///
/// Exactly one instance per session identity is active at a time. The
/// persisted counters outlive these states; only the in-memory connection
/// context moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection, or the connection has been torn down.
    Disconnected,
    /// Logon sent (initiator) or awaited (acceptor); not yet confirmed.
    LogonPending,
    /// Steady state: sequenced traffic flows both ways.
    Active,
    /// A ResendRequest for `[begin, end]` is outstanding; inbound messages
    /// above the gap are parked or dropped until it fills.
    ResendPending {
        /// First missing sequence number.
        begin: u64,
        /// Last missing sequence number.
        end: u64,
    },
    /// Logout sent; waiting for the peer's confirming Logout.
    LogoutPending,
}

impl SessionState {
    /// Returns true while the transport should stay open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// Returns true once the logon handshake has completed, including
    /// while a resend or logout is in flight.
    #[must_use]
    pub const fn is_logged_on(&self) -> bool {
        matches!(
            self,
            Self::Active | Self::ResendPending { .. } | Self::LogoutPending
        )
    }

    /// Short name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::LogonPending => "logon_pending",
            Self::Active => "active",
            Self::ResendPending { .. } => "resend_pending",
            Self::LogoutPending => "logout_pending",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResendPending { begin, end } => {
                write!(f, "resend_pending[{begin},{end}]")
            }
            other => write!(f, "{}", other.name()),
        }
    }
}
