//! Assembly of a runnable session.

use crate::application::{Application, NoOpApplication};
use crate::runner::{SessionHandle, SessionRole, SessionRunner};
use crate::session::Session;
use ferrofix_core::error::FixError;
use ferrofix_log::{MessageLog, NullLog};
use ferrofix_session::SessionConfig;
use ferrofix_store::{MemoryStore, MessageStore};
use ferrofix_transport::Channel;
use std::sync::Arc;

/// Wires a [`SessionConfig`] to its store, log, and application, producing
/// either a bare [`Session`] or a transport-coupled [`SessionRunner`].
///
/// Defaults: in-memory store, discarding log, no-op application.
pub struct EngineBuilder {
    config: SessionConfig,
    store: Arc<dyn MessageStore>,
    log: Arc<dyn MessageLog>,
    app: Arc<dyn Application>,
}

impl EngineBuilder {
    /// Starts a builder for the given session configuration.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            store: Arc::new(MemoryStore::new()),
            log: Arc::new(NullLog::new()),
            app: Arc::new(NoOpApplication),
        }
    }

    /// Sets the message store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = store;
        self
    }

    /// Sets the audit log.
    #[must_use]
    pub fn log(mut self, log: Arc<dyn MessageLog>) -> Self {
        self.log = log;
        self
    }

    /// Sets the application callbacks.
    #[must_use]
    pub fn application(mut self, app: Arc<dyn Application>) -> Self {
        self.app = app;
        self
    }

    /// Builds the bare session, opening the store and log.
    ///
    /// # Errors
    /// Returns `FixError` if the store or log cannot be opened.
    pub async fn build(self) -> Result<Session, FixError> {
        Session::new(self.config, self.store, self.log, self.app).await
    }

    /// Builds a session coupled to `channel`, ready to run.
    ///
    /// # Errors
    /// Returns `FixError` if the store or log cannot be opened.
    pub async fn connect<C: Channel>(
        self,
        channel: C,
        role: SessionRole,
    ) -> Result<(SessionRunner<C>, SessionHandle), FixError> {
        let session = self.build().await?;
        Ok(SessionRunner::new(session, channel, role))
    }
}
