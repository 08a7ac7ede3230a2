//! Integration tests for sessions and the supervisor.
//!
//! A scripted backend stands in for the real search command so completion
//! order and timing can be controlled exactly.

use async_trait::async_trait;
use deskfind_core::{
    BackendRequest, Category, DeliveryMode, Query, QueryPlan, QueryScope, RawRecord, RawStream,
    ResultRecord, ResultSet, ResultSink, SearchBackend, SearchConfig, SearchError, SearchSession,
    SessionId, SessionState, SessionSupervisor,
};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Category(SessionId, Category, Vec<String>),
    Finished(SessionId, Vec<(Category, usize)>),
    Cleared,
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn delivered_sessions(&self) -> HashSet<SessionId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Category(id, _, _) | Event::Finished(id, _) => Some(id),
                Event::Cleared => None,
            })
            .collect()
    }
}

impl ResultSink for RecordingSink {
    fn category_results(&self, session: SessionId, category: Category, records: &[ResultRecord]) {
        let uris = records.iter().map(|r| r.uri.clone()).collect();
        self.events
            .lock()
            .unwrap()
            .push(Event::Category(session, category, uris));
    }

    fn finished(&self, session: SessionId, results: &ResultSet) {
        let counts = results.iter().map(|(c, r)| (c, r.len())).collect();
        self.events
            .lock()
            .unwrap()
            .push(Event::Finished(session, counts));
    }

    fn cleared(&self) {
        self.events.lock().unwrap().push(Event::Cleared);
    }
}

/// Scripted backend keyed by query text.
struct FakeBackend {
    plan: QueryPlan,
    lines: HashMap<String, Vec<(Category, String)>>,
    /// Queries that wait for a permit before answering.
    gates: HashMap<String, Arc<Notify>>,
    /// Queries whose stream never ends after its scripted lines.
    hanging: HashSet<String>,
    failing: HashSet<Category>,
    calls: Mutex<Vec<(String, QueryScope, usize)>>,
}

impl FakeBackend {
    fn new(plan: QueryPlan) -> Self {
        Self {
            plan,
            lines: HashMap::new(),
            gates: HashMap::new(),
            hanging: HashSet::new(),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn with_line(mut self, query: &str, category: Category, line: &str) -> Self {
        self.lines
            .entry(query.to_string())
            .or_default()
            .push((category, line.to_string()));
        self
    }

    fn with_gate(mut self, query: &str) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gates.insert(query.to_string(), Arc::clone(&gate));
        (self, gate)
    }

    fn hanging(mut self, query: &str) -> Self {
        self.hanging.insert(query.to_string());
        self
    }

    fn failing(mut self, category: Category) -> Self {
        self.failing.insert(category);
        self
    }

    fn calls(&self) -> Vec<(String, QueryScope, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn plan(&self) -> QueryPlan {
        self.plan
    }

    async fn query(&self, request: BackendRequest) -> deskfind_core::Result<RawStream> {
        let text = request.query.text().to_string();
        self.calls
            .lock()
            .unwrap()
            .push((text.clone(), request.scope, request.limit));

        if let Some(gate) = self.gates.get(&text) {
            gate.notified().await;
        }

        if let QueryScope::Category(category) = request.scope {
            if self.failing.contains(&category) {
                return Err(SearchError::Backend {
                    message: format!("{category} exploded"),
                });
            }
        }

        let items: Vec<deskfind_core::Result<RawRecord>> = self
            .lines
            .get(&text)
            .into_iter()
            .flatten()
            .filter(|(category, _)| match request.scope {
                QueryScope::Category(wanted) => *category == wanted,
                QueryScope::All => true,
            })
            .map(|(category, line)| {
                Ok(RawRecord::Line {
                    category: *category,
                    line: line.clone(),
                })
            })
            .collect();

        let stream = futures::stream::iter(items);
        if self.hanging.contains(&text) {
            Ok(stream.chain(futures::stream::pending()).boxed())
        } else {
            Ok(stream.boxed())
        }
    }
}

fn supervisor(
    backend: FakeBackend,
    config: SearchConfig,
) -> (SessionSupervisor, Arc<FakeBackend>, Arc<RecordingSink>) {
    let backend = Arc::new(backend);
    let sink = Arc::new(RecordingSink::default());
    let supervisor = SessionSupervisor::new(backend.clone(), sink.clone(), config);
    (supervisor, backend, sink)
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_report_end_to_end() {
    let backend = FakeBackend::new(QueryPlan::PerCategory)
        .with_line("report", Category::Files, "file:///home/u/report.pdf")
        .with_line(
            "report",
            Category::Software,
            "file:///usr/share/applications/firefox.desktop",
        );
    let (mut supervisor, _backend, sink) = supervisor(backend, SearchConfig::default());

    supervisor.submit("report").unwrap();
    let outcome = supervisor.wait().await.unwrap();

    assert_eq!(outcome.state, SessionState::Completed);
    assert_eq!(
        sink.events(),
        vec![
            Event::Category(1, Category::Software, vec!["firefox.desktop".into()]),
            Event::Category(1, Category::Files, vec!["file:///home/u/report.pdf".into()]),
            Event::Finished(1, vec![(Category::Software, 1), (Category::Files, 1)]),
        ]
    );
}

#[tokio::test]
async fn test_categories_queried_in_declared_order() {
    let (mut supervisor, backend, _sink) =
        supervisor(FakeBackend::new(QueryPlan::PerCategory), SearchConfig::default());

    supervisor.submit("anything").unwrap();
    supervisor.wait().await.unwrap();

    let scopes: Vec<_> = backend.calls().into_iter().map(|(_, s, _)| s).collect();
    let expected: Vec<_> = Category::ALL.into_iter().map(QueryScope::Category).collect();
    assert_eq!(scopes, expected);
}

#[tokio::test]
async fn test_combined_delivery_uses_category_order() {
    // Files arrive before software from the backend.
    let backend = FakeBackend::new(QueryPlan::Combined)
        .with_line("mix", Category::Files, "file:///a/mix.txt")
        .with_line("mix", Category::Software, "file:///apps/mixer.desktop");
    let (mut supervisor, backend, sink) = supervisor(backend, SearchConfig::default());

    supervisor.submit("mix").unwrap();
    supervisor.wait().await.unwrap();

    assert_eq!(backend.calls().len(), 1);
    assert_eq!(backend.calls()[0].1, QueryScope::All);
    let categories: Vec<_> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Category(_, c, _) => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(categories, vec![Category::Software, Category::Files]);
}

#[tokio::test]
async fn test_no_stale_delivery() {
    let (backend, gate) = FakeBackend::new(QueryPlan::PerCategory)
        .with_line("old", Category::Files, "file:///old.txt")
        .with_line("new", Category::Files, "file:///new.txt")
        .with_gate("old");
    let (mut supervisor, _backend, sink) = supervisor(backend, SearchConfig::default());

    let old = supervisor.submit("old").unwrap();
    settle().await;
    assert!(old.is_running());

    supervisor.submit("new").unwrap();
    assert_eq!(old.state(), SessionState::Cancelled);

    // Let the old backend call complete after cancellation.
    gate.notify_one();
    let outcome = supervisor.wait().await.unwrap();
    settle().await;

    assert_eq!(outcome.id, 2);
    assert_eq!(sink.delivered_sessions(), HashSet::from([2]));
    assert!(sink
        .events()
        .iter()
        .all(|e| !matches!(e, Event::Category(_, _, uris) if uris.contains(&"file:///old.txt".to_string()))));
}

#[tokio::test]
async fn test_cancel_mid_stream() {
    let backend = FakeBackend::new(QueryPlan::PerCategory)
        .with_line("slow", Category::Software, "file:///apps/slow.desktop")
        .hanging("slow");
    let (mut supervisor, _backend, sink) = supervisor(backend, SearchConfig::default());

    let handle = supervisor.submit("slow").unwrap();
    settle().await;
    assert!(handle.is_running());

    supervisor.cancel();
    let outcome = supervisor.wait().await.unwrap();

    assert_eq!(outcome.state, SessionState::Cancelled);
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_category_caps() {
    let mut backend = FakeBackend::new(QueryPlan::PerCategory);
    for i in 0..8 {
        backend = backend.with_line("dir", Category::Folders, &format!("file:///d/{i}"));
    }
    for i in 0..14 {
        backend = backend.with_line("dir", Category::Files, &format!("file:///f/{i}"));
    }
    let (mut supervisor, backend, sink) = supervisor(backend, SearchConfig::default());

    supervisor.submit("dir").unwrap();
    let outcome = supervisor.wait().await.unwrap();

    assert_eq!(outcome.counts[&Category::Folders], 5);
    assert_eq!(outcome.counts[&Category::Files], 10);
    for event in sink.events() {
        if let Event::Category(_, category, uris) = event {
            let cap = if category == Category::Folders { 5 } else { 10 };
            assert!(uris.len() <= cap);
        }
    }

    let folder_limit = backend
        .calls()
        .into_iter()
        .find(|(_, scope, _)| *scope == QueryScope::Category(Category::Folders))
        .map(|(_, _, limit)| limit);
    assert_eq!(folder_limit, Some(5));
}

#[tokio::test]
async fn test_cross_category_dedup() {
    let backend = FakeBackend::new(QueryPlan::PerCategory)
        .with_line("beach", Category::Pictures, "file:///p/beach.png")
        .with_line("beach", Category::Files, "file:///p/beach.png")
        .with_line("beach", Category::Files, "file:///p/beach.txt");
    let (mut supervisor, _backend, sink) = supervisor(backend, SearchConfig::default());

    supervisor.submit("beach").unwrap();
    supervisor.wait().await.unwrap();

    let mut seen = HashSet::new();
    for event in sink.events() {
        if let Event::Category(_, _, uris) = event {
            for uri in uris {
                assert!(seen.insert(uri), "uri delivered twice");
            }
        }
    }
    assert_eq!(seen.len(), 2);
}

#[tokio::test]
async fn test_stop_before_run_makes_no_calls() {
    let backend = Arc::new(
        FakeBackend::new(QueryPlan::PerCategory).with_line("x", Category::Files, "file:///x"),
    );
    let sink = Arc::new(RecordingSink::default());
    let session = SearchSession::new(
        7,
        Query::parse("x"),
        backend.clone(),
        sink.clone(),
        Arc::new(SearchConfig::default()),
    );

    let handle = session.handle();
    handle.stop();
    let outcome = session.run().await;

    assert_eq!(outcome.state, SessionState::Cancelled);
    assert!(backend.calls().is_empty());
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_backend_failure_is_contained() {
    let backend = FakeBackend::new(QueryPlan::PerCategory)
        .with_line("tune", Category::Music, "file:///m/tune.ogg")
        .with_line("tune", Category::Files, "file:///m/tune.txt")
        .failing(Category::Music);
    let (mut supervisor, _backend, sink) = supervisor(backend, SearchConfig::default());

    supervisor.submit("tune").unwrap();
    let outcome = supervisor.wait().await.unwrap();

    assert_eq!(outcome.state, SessionState::Completed);
    assert_eq!(outcome.failed_steps, 1);
    assert_eq!(
        sink.events(),
        vec![
            Event::Category(1, Category::Files, vec!["file:///m/tune.txt".into()]),
            Event::Finished(1, vec![(Category::Files, 1)]),
        ]
    );
}

#[tokio::test]
async fn test_batched_delivery() {
    let backend = FakeBackend::new(QueryPlan::PerCategory)
        .with_line("report", Category::Files, "file:///home/u/report.pdf")
        .with_line("report", Category::Software, "file:///apps/report.desktop");
    let config = SearchConfig {
        delivery: DeliveryMode::Batched,
        ..Default::default()
    };
    let (mut supervisor, _backend, sink) = supervisor(backend, config);

    supervisor.submit("report").unwrap();
    supervisor.wait().await.unwrap();

    assert_eq!(
        sink.events(),
        vec![Event::Finished(
            1,
            vec![(Category::Software, 1), (Category::Files, 1)]
        )]
    );
}

#[tokio::test]
async fn test_empty_submit_clears() {
    let (mut supervisor, backend, sink) =
        supervisor(FakeBackend::new(QueryPlan::PerCategory), SearchConfig::default());

    assert!(supervisor.submit("  ").is_none());
    assert!(supervisor.submit("\"\"").is_none());

    assert_eq!(sink.events(), vec![Event::Cleared, Event::Cleared]);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_quoted_terms_reach_backend() {
    let (mut supervisor, backend, _sink) = supervisor(
        FakeBackend::new(QueryPlan::PerCategory),
        SearchConfig {
            categories: vec![Category::Files],
            ..Default::default()
        },
    );

    supervisor.submit("foo \"bar baz\"").unwrap();
    supervisor.wait().await.unwrap();

    let query = Query::parse(&backend.calls()[0].0);
    assert_eq!(query.process_args(), vec!["*foo*", "bar baz"]);
}
