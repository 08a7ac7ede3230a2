//! Deskfind - search the desktop index from the terminal.
//!
//! Runs one query given on the command line, or with `--interactive` treats
//! every stdin line as a new query that replaces the previous one.

mod render;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use deskfind_core::{
    DeliveryMode, IndexBackend, IndexStore, ProcessBackend, SearchBackend, SearchConfig,
    SessionSupervisor,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::render::TerminalSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Run the search command once per category
    Process,
    /// Query the local full-text index
    Index,
}

#[derive(Parser, Debug)]
#[command(name = "deskfind")]
#[command(about = "Search desktop files, folders, media and applications")]
struct Args {
    /// Query words; wrap a phrase in quotes for an exact match
    query: Vec<String>,

    /// Backend to query
    #[arg(short, long, value_enum, default_value = "process")]
    backend: BackendKind,

    /// Index database (index backend)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Search command (process backend)
    #[arg(long)]
    program: Option<String>,

    /// Print results only once every category is done
    #[arg(long)]
    batched: bool,

    /// Print one JSON object per finished search
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read queries from stdin, one per line
    #[arg(short, long)]
    interactive: bool,
}

fn load_config(args: &Args) -> Result<SearchConfig> {
    let mut config = SearchConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    apply_overrides(args, &mut config);
    config.validate()?;
    Ok(config)
}

/// Command-line flags win over the config file.
fn apply_overrides(args: &Args, config: &mut SearchConfig) {
    if args.batched {
        config.delivery = DeliveryMode::Batched;
    }
    if let Some(program) = &args.program {
        config.process.program = program.clone();
    }
    if let Some(db) = &args.db {
        config.index.database_path = Some(db.clone());
    }
}

fn create_backend(kind: BackendKind, config: &SearchConfig) -> Result<Arc<dyn SearchBackend>> {
    match kind {
        BackendKind::Process => Ok(Arc::new(ProcessBackend::new(config.process.clone()))),
        BackendKind::Index => {
            let store = IndexStore::open(&config.index).with_context(|| {
                format!(
                    "Failed to open index at {}",
                    config.index.resolved_path().display()
                )
            })?;
            info!("Index has {} resources", store.count()?);
            Ok(Arc::new(IndexBackend::new(&store)))
        }
    }
}

async fn run_interactive(supervisor: &mut SessionSupervisor) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        supervisor.submit(&line);
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                supervisor.cancel();
                return Ok(());
            }
        }
    }

    // Let the last query finish once input ends.
    if let Some(outcome) = supervisor.wait().await {
        debug!("Last session: {}", serde_json::to_string(&outcome)?);
    }
    Ok(())
}

async fn run_once(supervisor: &mut SessionSupervisor, query: &str) -> Result<()> {
    if supervisor.submit(query).is_none() {
        return Ok(());
    }

    tokio::select! {
        outcome = supervisor.wait() => {
            if let Some(outcome) = outcome {
                debug!(
                    "Session {} {} with {} results ({} failed steps, {} rejected)",
                    outcome.id,
                    outcome.state,
                    outcome.total(),
                    outcome.failed_steps,
                    outcome.rejected_records
                );
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            supervisor.cancel();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging; stdout is reserved for results
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = load_config(&args)?;
    let backend = create_backend(args.backend, &config)?;
    debug!("Using {} backend", backend.name());

    let sink = Arc::new(TerminalSink::new(config.delivery, args.json));
    let mut supervisor = SessionSupervisor::new(backend, sink, config);

    if args.interactive {
        run_interactive(&mut supervisor).await
    } else {
        run_once(&mut supervisor, &args.query.join(" ")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["deskfind", "--batched", "-b", "index", "foo", "\"bar baz\""]);
        assert_eq!(args.backend, BackendKind::Index);
        assert!(args.batched);
        assert_eq!(args.query.join(" "), "foo \"bar baz\"");
    }

    #[test]
    fn test_overrides_apply() {
        let args = Args::parse_from([
            "deskfind",
            "--batched",
            "--program",
            "my-search",
            "--db",
            "/tmp/deskfind-test.db",
            "x",
        ]);
        let mut config = SearchConfig::default();
        apply_overrides(&args, &mut config);

        assert_eq!(config.delivery, DeliveryMode::Batched);
        assert_eq!(config.process.program, "my-search");
        assert_eq!(
            config.index.resolved_path(),
            PathBuf::from("/tmp/deskfind-test.db")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_leave_config_alone() {
        let args = Args::parse_from(["deskfind", "x"]);
        let mut config = SearchConfig::default();
        apply_overrides(&args, &mut config);
        assert_eq!(config, SearchConfig::default());
        assert_eq!(args.backend, BackendKind::Process);
    }
}
