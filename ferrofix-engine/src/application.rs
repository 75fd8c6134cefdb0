//! Application callback interface.
//!
//! The session engine owns the admin protocol; everything above it arrives
//! through this trait. Callbacks run on the session's driver task, so long
//! work should be handed off rather than done inline.

use async_trait::async_trait;
use ferrofix_core::error::DisconnectReason;
use ferrofix_core::message::OwnedMessage;
use ferrofix_core::types::SessionId;
use ferrofix_session::RejectReason;

/// Receives session lifecycle events and in-order application messages.
#[async_trait]
pub trait Application: Send + Sync {
    /// The logon handshake completed; sequenced traffic may flow.
    async fn on_logon(&self, _session_id: &SessionId) {}

    /// The session ended, gracefully or not.
    async fn on_logout(&self, _session_id: &SessionId, _reason: &DisconnectReason) {}

    /// An in-order application message arrived. Returning an error makes
    /// the engine send a session-level Reject; the inbound counter still
    /// advances.
    async fn on_app_message(
        &self,
        _session_id: &SessionId,
        _message: &OwnedMessage,
    ) -> Result<(), RejectReason> {
        Ok(())
    }

    /// An in-order administrative message arrived. Informational; the
    /// engine has already handled the protocol side.
    async fn on_admin_message(&self, _session_id: &SessionId, _message: &OwnedMessage) {}
}

/// Application that ignores everything. Useful for admin-only sessions and
/// tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpApplication;

#[async_trait]
impl Application for NoOpApplication {}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use ferrofix_core::message::MsgType;
    use ferrofix_core::types::CompId;

    #[tokio::test]
    async fn test_noop_application_accepts_app_messages() {
        let app = NoOpApplication;
        let id = SessionId::new(CompId::new("A").unwrap(), CompId::new("B").unwrap());
        let msg = OwnedMessage::new(Bytes::from_static(b"35=D\x01"), MsgType::NewOrderSingle, vec![]);
        assert!(app.on_app_message(&id, &msg).await.is_ok());
    }
}
