//! Terminal rendering of search results.

use deskfind_core::{Category, DeliveryMode, ResultRecord, ResultSet, ResultSink, SessionId};
use serde_json::json;
use std::io::Write;
use std::sync::Mutex;
use tracing::{debug, warn};

const SEPARATOR: &str = "────────────────────────────────";

#[derive(Default)]
struct RenderState {
    session: SessionId,
    /// Categories printed so far for `session`.
    printed: usize,
}

/// Prints results to stdout as they arrive.
///
/// Text output has one header per non-empty category and a separator only
/// between non-empty categories. JSON output is one object per finished
/// session.
pub struct TerminalSink {
    delivery: DeliveryMode,
    json: bool,
    state: Mutex<RenderState>,
}

impl TerminalSink {
    pub fn new(delivery: DeliveryMode, json: bool) -> Self {
        Self {
            delivery,
            json,
            state: Mutex::new(RenderState::default()),
        }
    }

    fn print_category(
        &self,
        state: &mut RenderState,
        session: SessionId,
        category: Category,
        records: &[ResultRecord],
    ) {
        if state.session != session {
            state.session = session;
            state.printed = 0;
        }

        let mut out = String::new();
        if state.printed > 0 {
            out.push_str(SEPARATOR);
            out.push('\n');
        }
        out.push_str(category.label());
        out.push('\n');
        for record in records {
            out.push_str(&format_record(record));
            out.push('\n');
        }
        state.printed += 1;

        write_stdout(&out);
    }
}

fn format_record(record: &ResultRecord) -> String {
    let name = record.display_name();
    match (&record.performer, &record.album) {
        (Some(performer), Some(album)) => {
            format!("  {name}  ({performer}, {album})  {}", record.uri)
        }
        (Some(performer), None) => format!("  {name}  ({performer})  {}", record.uri),
        _ if record.is_application() => format!("  {name}"),
        _ => format!("  {name:<32} {}", record.uri),
    }
}

fn write_stdout(text: &str) {
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.flush())
    {
        warn!("Failed to write results: {}", e);
    }
}

impl ResultSink for TerminalSink {
    fn category_results(&self, session: SessionId, category: Category, records: &[ResultRecord]) {
        if self.json {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.print_category(&mut state, session, category, records);
    }

    fn finished(&self, session: SessionId, results: &ResultSet) {
        if self.json {
            let value = json!({ "session": session, "results": results });
            write_stdout(&format!("{value}\n"));
            return;
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if self.delivery == DeliveryMode::Batched {
            for (category, records) in results.iter() {
                self.print_category(&mut state, session, category, records);
            }
        }
        if results.is_empty() {
            write_stdout("No results\n");
        }
    }

    fn cleared(&self) {
        debug!("Results cleared");
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.printed = 0;
    }
}
