//! Search sessions.
//!
//! A [`SearchSession`] runs one query end to end: it walks the configured
//! categories in fixed order, pulls records from the backend, normalizes
//! and caps them, and hands them to a [`ResultSink`].
//!
//! ```text
//! Idle ──run()──▶ Running ──worklist empty──▶ Completed
//!   │                │
//!   └────stop()──────┴──────────────────────▶ Cancelled
//! ```
//!
//! Cancellation is cooperative. The token is checked before every state
//! mutation and raced against every backend wait, and sink calls are made
//! while holding the state lock after re-checking the state. Once
//! [`SessionHandle::stop`] returns, the sink sees nothing more from that
//! session.

use futures::StreamExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

use crate::backend::{BackendRequest, QueryPlan, QueryScope, RawStream, SearchBackend};
use crate::cancel::CancellationToken;
use crate::category::Category;
use crate::config::{DeliveryMode, SearchConfig};
use crate::error::{Result, SearchError};
use crate::query::Query;
use crate::record::{normalize, RawRecord, ResultRecord};
use crate::result_set::{InsertOutcome, ResultSet};

/// Monotonic session number assigned by the supervisor.
pub type SessionId = u64;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl SessionState {
    /// Completed or Cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Consumer of session results (the presentation layer).
///
/// Calls arrive from the session task while it holds its state lock.
/// Implementations must return promptly and must not call back into the
/// supervisor.
pub trait ResultSink: Send + Sync {
    /// One category's records, in rank order. Only sent in
    /// [`DeliveryMode::Incremental`], and never for an empty category.
    fn category_results(&self, session: SessionId, category: Category, records: &[ResultRecord]);

    /// The complete result set. Sent exactly once, when the session completes.
    fn finished(&self, session: SessionId, results: &ResultSet);

    /// The displayed results should be cleared (empty query submitted).
    fn cleared(&self) {}
}

fn lock_state(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cheap, cloneable control handle for a session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    cancel: CancellationToken,
    state: Arc<Mutex<SessionState>>,
}

impl SessionHandle {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            cancel: CancellationToken::new(),
            state: Arc::new(Mutex::new(SessionState::Idle)),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Cancel the session.
    ///
    /// Moves an Idle or Running session to Cancelled. Synchronous: when this
    /// returns, no further sink call for this session can happen. Calling it
    /// on a finished session is a no-op.
    pub fn stop(&self) {
        let mut state = lock_state(&self.state);
        if !state.is_terminal() {
            debug!("Session {} cancelled while {}", self.id, *state);
            *state = SessionState::Cancelled;
        }
        self.cancel.cancel();
    }

    pub fn state(&self) -> SessionState {
        *lock_state(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// The session's cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Summary of a finished (or cancelled) session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub id: SessionId,
    pub state: SessionState,
    /// Accepted records per non-empty category.
    pub counts: BTreeMap<Category, usize>,
    /// Backend requests that could not be issued.
    pub failed_steps: usize,
    /// Records dropped as malformed or unreadable.
    pub rejected_records: usize,
    pub duration_ms: u64,
}

impl SessionOutcome {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

/// One query's orchestration.
pub struct SearchSession {
    query: Query,
    backend: Arc<dyn SearchBackend>,
    sink: Arc<dyn ResultSink>,
    config: Arc<SearchConfig>,
    handle: SessionHandle,
    results: ResultSet,
    failed_steps: usize,
    rejected_records: usize,
}

impl SearchSession {
    pub fn new(
        id: SessionId,
        query: Query,
        backend: Arc<dyn SearchBackend>,
        sink: Arc<dyn ResultSink>,
        config: Arc<SearchConfig>,
    ) -> Self {
        let results = ResultSet::new(config.limits, config.dedup);
        Self {
            query,
            backend,
            sink,
            config,
            handle: SessionHandle::new(id),
            results,
            failed_steps: 0,
            rejected_records: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.handle.id
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Drive the session to Completed or Cancelled.
    ///
    /// A session stopped before `run` is called returns immediately without
    /// touching the backend.
    pub async fn run(mut self) -> SessionOutcome {
        let started = Instant::now();

        let runnable = {
            let mut state = lock_state(&self.handle.state);
            let idle = *state == SessionState::Idle;
            if idle {
                *state = SessionState::Running;
            }
            idle
        };
        if !runnable {
            return self.outcome(started);
        }

        debug!(
            "Session {} running '{}' on {} backend",
            self.handle.id,
            self.query,
            self.backend.name()
        );

        let run = match self.backend.plan() {
            QueryPlan::PerCategory => self.run_per_category().await,
            QueryPlan::Combined => self.run_combined().await,
        };
        if let Err(e) = run {
            debug!("Session {} stopped early: {}", self.handle.id, e);
        }

        self.finish();
        let outcome = self.outcome(started);
        debug!(
            "Session {} {} with {} results in {}ms",
            outcome.id,
            outcome.state,
            outcome.total(),
            outcome.duration_ms
        );
        outcome
    }

    /// One request per category, in worklist order.
    ///
    /// Returns `Err(SearchError::Cancelled)` as soon as the token fires.
    async fn run_per_category(&mut self) -> Result<()> {
        let cancel = self.handle.cancel.clone();

        for category in self.config.worklist() {
            cancel.check()?;

            let request = BackendRequest {
                scope: QueryScope::Category(category),
                query: self.query.clone(),
                limit: self.config.limits.limit_for(category),
            };
            let Some(mut stream) = self.open(request, &cancel).await? else {
                continue;
            };

            loop {
                let item = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(SearchError::Cancelled),
                    item = stream.next() => item,
                };
                let Some(item) = item else {
                    break;
                };
                cancel.check()?;

                self.accept(item);
                if self.results.is_full(category) {
                    break;
                }
            }

            self.deliver(category);
        }
        Ok(())
    }

    async fn run_combined(&mut self) -> Result<()> {
        let cancel = self.handle.cancel.clone();
        let worklist = self.config.worklist();
        let limit = worklist
            .iter()
            .map(|c| self.config.limits.limit_for(*c))
            .sum();

        let request = BackendRequest {
            scope: QueryScope::All,
            query: self.query.clone(),
            limit,
        };

        if let Some(mut stream) = self.open(request, &cancel).await? {
            loop {
                let item = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(SearchError::Cancelled),
                    item = stream.next() => item,
                };
                let Some(item) = item else {
                    break;
                };
                cancel.check()?;

                self.accept_if(item, |category| worklist.contains(&category));
                if worklist.iter().all(|c| self.results.is_full(*c)) {
                    debug!("Every category full, abandoning cursor");
                    break;
                }
            }
        }

        for category in worklist {
            self.deliver(category);
        }
        Ok(())
    }

    /// Issue a backend request, racing it against cancellation.
    ///
    /// `Ok(None)` when the request failed; the failure is logged and counted.
    async fn open(
        &mut self,
        request: BackendRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<RawStream>> {
        let scope = request.scope;
        let result: Result<RawStream> = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SearchError::Cancelled),
            result = self.backend.query(request) => result,
        };

        let err = match result {
            Ok(stream) => return Ok(Some(stream)),
            Err(err) => err,
        };

        // Errors after stop() are not failures.
        cancel.check()?;

        let backend = self.backend.name();
        match &err {
            SearchError::Cancelled => debug!("{} backend abandoned {:?}", backend, scope),
            e if e.is_backend_failure() => {
                warn!("{} backend failed for {:?}: {}", backend, scope, e)
            }
            e => warn!("{} backend rejected {:?}: {}", backend, scope, e),
        }
        self.failed_steps += 1;
        Ok(None)
    }

    fn accept(&mut self, item: Result<RawRecord>) {
        self.accept_if(item, |_| true);
    }

    fn accept_if(&mut self, item: Result<RawRecord>, wanted: impl Fn(Category) -> bool) {
        let record = match item.and_then(|raw| normalize(&raw)) {
            Ok(record) => record,
            Err(e) => {
                if e.is_backend_failure() {
                    warn!("Unreadable backend record: {}", e);
                } else {
                    debug!("Skipping record: {}", e);
                }
                self.rejected_records += 1;
                return;
            }
        };

        if !wanted(record.category) {
            return;
        }

        if let InsertOutcome::Duplicate = self.results.insert(record) {
            debug!("Duplicate uri suppressed");
        }
    }

    fn deliver(&self, category: Category) {
        if self.config.delivery != DeliveryMode::Incremental {
            return;
        }
        let records = self.results.get(category);
        if records.is_empty() {
            return;
        }

        let state = lock_state(&self.handle.state);
        if *state == SessionState::Running {
            self.sink.category_results(self.handle.id, category, records);
        }
    }

    fn finish(&self) {
        let mut state = lock_state(&self.handle.state);
        if *state != SessionState::Running {
            return;
        }
        self.sink.finished(self.handle.id, &self.results);
        *state = SessionState::Completed;
    }

    fn outcome(&self, started: Instant) -> SessionOutcome {
        SessionOutcome {
            id: self.handle.id,
            state: self.handle.state(),
            counts: self
                .results
                .iter()
                .map(|(category, records)| (category, records.len()))
                .collect(),
            failed_steps: self.failed_steps,
            rejected_records: self.rejected_records,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}
