//! Session supervision.
//!
//! The supervisor owns at most one live session. Every submission stops the
//! previous session before anything else happens, so only results of the
//! most recent non-empty query ever reach the sink.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::backend::SearchBackend;
use crate::config::SearchConfig;
use crate::query::Query;
use crate::session::{ResultSink, SearchSession, SessionHandle, SessionId, SessionOutcome};

struct ActiveSession {
    handle: SessionHandle,
    task: JoinHandle<SessionOutcome>,
}

/// Replaces the running session on each submitted query.
pub struct SessionSupervisor {
    backend: Arc<dyn SearchBackend>,
    sink: Arc<dyn ResultSink>,
    config: Arc<SearchConfig>,
    active: Option<ActiveSession>,
    next_id: SessionId,
}

impl SessionSupervisor {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        sink: Arc<dyn ResultSink>,
        config: SearchConfig,
    ) -> Self {
        Self {
            backend,
            sink,
            config: Arc::new(config),
            active: None,
            next_id: 0,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Submit new query text.
    ///
    /// Stops the current session first. Whitespace-only text clears the
    /// sink and starts nothing; otherwise a new session is spawned on the
    /// current tokio runtime and its handle returned.
    pub fn submit(&mut self, text: &str) -> Option<SessionHandle> {
        self.cancel();

        let query = Query::parse(text);
        if query.is_empty() {
            debug!("Empty query, clearing results");
            self.active = None;
            self.sink.cleared();
            return None;
        }

        self.next_id += 1;
        let session = SearchSession::new(
            self.next_id,
            query,
            Arc::clone(&self.backend),
            Arc::clone(&self.sink),
            Arc::clone(&self.config),
        );
        let handle = session.handle();
        debug!("Starting session {} for '{}'", handle.id(), text.trim());

        let task = tokio::spawn(session.run());
        self.active = Some(ActiveSession {
            handle: handle.clone(),
            task,
        });
        Some(handle)
    }

    /// Stop the current session, if any.
    pub fn cancel(&mut self) {
        if let Some(active) = &self.active {
            active.handle.stop();
        }
    }

    /// Handle of the most recently started session.
    pub fn active(&self) -> Option<&SessionHandle> {
        self.active.as_ref().map(|active| &active.handle)
    }

    pub fn is_running(&self) -> bool {
        self.active().is_some_and(SessionHandle::is_running)
    }

    /// Wait for the most recent session to finish and return its outcome.
    pub async fn wait(&mut self) -> Option<SessionOutcome> {
        let active = self.active.take()?;
        match active.task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!("Session {} task failed: {}", active.handle.id(), e);
                None
            }
        }
    }
}

impl Drop for SessionSupervisor {
    fn drop(&mut self) {
        self.cancel();
    }
}
