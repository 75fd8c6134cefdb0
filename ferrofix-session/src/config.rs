//! Session configuration.

use ferrofix_core::types::SessionId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default heartbeat interval in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Default grace period added to the heartbeat interval before a
/// TestRequest is sent.
pub const DEFAULT_HEARTBEAT_GRACE_SECS: u64 = 3;

/// Default maximum inbound message size in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// What to do with an out-of-order message while its gap is being filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Park the message and reprocess it once the gap fills. At most one
    /// message is held; further out-of-order arrivals replace it.
    #[default]
    BufferOne,
    /// Drop the message; the peer's resend will redeliver it in order.
    Discard,
}

/// Static configuration for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session identity; selects the store partition.
    pub session_id: SessionId,
    /// FIX protocol version string (tag 8), e.g. `FIX.4.4`.
    pub begin_string: String,
    /// Proposed heartbeat interval in seconds (tag 108 on Logon).
    pub heartbeat_interval_secs: u64,
    /// Grace period in seconds added to the interval before the engine
    /// sends a TestRequest.
    pub heartbeat_grace_secs: u64,
    /// Send `ResetSeqNumFlag=Y` on Logon, clearing both sides' counters.
    pub reset_on_logon: bool,
    /// Seconds to wait for the peer's Logon response before giving up.
    pub logon_timeout_secs: u64,
    /// Seconds to wait for the peer's Logout response before dropping the
    /// connection anyway.
    pub logout_timeout_secs: u64,
    /// Maximum accepted inbound message size in bytes.
    pub max_message_size: usize,
    /// Out-of-order message policy during gap recovery.
    pub gap_policy: GapPolicy,
}

impl SessionConfig {
    /// Starts building a configuration for the given identity.
    #[must_use]
    pub fn builder(session_id: SessionId) -> SessionConfigBuilder {
        SessionConfigBuilder {
            config: Self {
                session_id,
                begin_string: "FIX.4.4".to_string(),
                heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
                heartbeat_grace_secs: DEFAULT_HEARTBEAT_GRACE_SECS,
                reset_on_logon: false,
                logon_timeout_secs: 10,
                logout_timeout_secs: 5,
                max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
                gap_policy: GapPolicy::BufferOne,
            },
        }
    }

    /// Heartbeat interval as a `Duration`.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Heartbeat grace period as a `Duration`.
    #[must_use]
    pub const fn heartbeat_grace(&self) -> Duration {
        Duration::from_secs(self.heartbeat_grace_secs)
    }

    /// Logon timeout as a `Duration`.
    #[must_use]
    pub const fn logon_timeout(&self) -> Duration {
        Duration::from_secs(self.logon_timeout_secs)
    }

    /// Logout timeout as a `Duration`.
    #[must_use]
    pub const fn logout_timeout(&self) -> Duration {
        Duration::from_secs(self.logout_timeout_secs)
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Sets the FIX protocol version string.
    #[must_use]
    pub fn begin_string(mut self, begin_string: impl Into<String>) -> Self {
        self.config.begin_string = begin_string.into();
        self
    }

    /// Sets the heartbeat interval in seconds.
    #[must_use]
    pub const fn heartbeat_interval_secs(mut self, secs: u64) -> Self {
        self.config.heartbeat_interval_secs = secs;
        self
    }

    /// Sets the heartbeat grace period in seconds.
    #[must_use]
    pub const fn heartbeat_grace_secs(mut self, secs: u64) -> Self {
        self.config.heartbeat_grace_secs = secs;
        self
    }

    /// Requests a full sequence reset on Logon.
    #[must_use]
    pub const fn reset_on_logon(mut self, reset: bool) -> Self {
        self.config.reset_on_logon = reset;
        self
    }

    /// Sets the logon timeout in seconds.
    #[must_use]
    pub const fn logon_timeout_secs(mut self, secs: u64) -> Self {
        self.config.logon_timeout_secs = secs;
        self
    }

    /// Sets the logout timeout in seconds.
    #[must_use]
    pub const fn logout_timeout_secs(mut self, secs: u64) -> Self {
        self.config.logout_timeout_secs = secs;
        self
    }

    /// Sets the maximum inbound message size.
    #[must_use]
    pub const fn max_message_size(mut self, bytes: usize) -> Self {
        self.config.max_message_size = bytes;
        self
    }

    /// Sets the out-of-order message policy.
    #[must_use]
    pub const fn gap_policy(mut self, policy: GapPolicy) -> Self {
        self.config.gap_policy = policy;
        self
    }

    /// Finalizes the configuration.
    #[must_use]
    pub fn build(self) -> SessionConfig {
        self.config
    }
}
