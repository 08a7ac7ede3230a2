//! Line-oriented search command backend.

use async_trait::async_trait;
use futures::StreamExt;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use super::{BackendRequest, QueryPlan, QueryScope, RawStream, SearchBackend};
use crate::category::Category;
use crate::config::{EngineConfig, ProcessBackendConfig};
use crate::error::{Result, SearchError};
use crate::query::Query;
use crate::record::RawRecord;

/// Runs the search command once per category and streams its stdout.
///
/// The child is not killed when the stream is dropped; it finishes on its
/// own and its remaining output is discarded.
#[derive(Debug, Clone, Default)]
pub struct ProcessBackend {
    config: ProcessBackendConfig,
}

impl ProcessBackend {
    pub fn new(config: ProcessBackendConfig) -> Self {
        Self { config }
    }

    pub fn program(&self) -> &str {
        &self.config.program
    }

    /// Arguments for one category invocation (program excluded).
    ///
    /// `base args… -l <limit> <category flag> <terms…>`
    pub fn build_args(&self, category: Category, query: &Query, limit: usize) -> Vec<String> {
        let mut args = self.config.base_args.clone();
        args.push(EngineConfig::LIMIT_FLAG.to_string());
        args.push(limit.to_string());
        args.push(category.selector_flag().to_string());
        args.extend(query.process_args());
        args
    }
}

#[async_trait]
impl SearchBackend for ProcessBackend {
    fn name(&self) -> &str {
        "process"
    }

    fn plan(&self) -> QueryPlan {
        QueryPlan::PerCategory
    }

    async fn query(&self, request: BackendRequest) -> Result<RawStream> {
        let category = match request.scope {
            QueryScope::Category(category) => category,
            QueryScope::All => {
                return Err(SearchError::Backend {
                    message: "process backend needs one category per invocation".to_string(),
                })
            }
        };

        let args = self.build_args(category, &request.query, request.limit);
        debug!("Running {} {:?}", self.config.program, args);

        let mut child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SearchError::Spawn {
                program: self.config.program.clone(),
                message: e.to_string(),
                source: Some(e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| SearchError::Backend {
            message: format!("{} stdout was not captured", self.config.program),
        })?;

        let reader = OutputReader {
            stdout: Some(BufReader::new(stdout)),
            child: Some(child),
            line: Vec::new(),
            category,
            program: self.config.program.clone(),
        };

        Ok(futures::stream::unfold(reader, |mut reader| async move {
            let item = reader.next_record().await?;
            Some((item, reader))
        })
        .boxed())
    }
}

/// Incremental reader over one child's stdout.
struct OutputReader {
    /// Dropped once output ends.
    stdout: Option<BufReader<ChildStdout>>,
    child: Option<Child>,
    line: Vec<u8>,
    category: Category,
    program: String,
}

impl OutputReader {
    async fn next_record(&mut self) -> Option<Result<RawRecord>> {
        let stdout = self.stdout.as_mut()?;
        self.line.clear();

        let read = stdout.read_until(b'\n', &mut self.line).await;
        match read {
            Ok(0) => {
                self.reap().await;
                None
            }
            Ok(_) => Some(self.decode_line()),
            Err(e) => {
                warn!("Error reading {} output: {}", self.program, e);
                self.reap().await;
                Some(Err(e.into()))
            }
        }
    }

    /// A line that is not UTF-8 is one bad record; reading goes on.
    fn decode_line(&self) -> Result<RawRecord> {
        let bytes = self.line.strip_suffix(b"\n").unwrap_or(&self.line);
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);

        match std::str::from_utf8(bytes) {
            Ok(line) => Ok(RawRecord::Line {
                category: self.category,
                line: line.to_string(),
            }),
            Err(e) => Err(SearchError::malformed(format!(
                "{} printed a non UTF-8 line: {}",
                self.program, e
            ))),
        }
    }

    async fn reap(&mut self) {
        // Pipe closed before waiting, a child still writing must not block.
        self.stdout = None;
        let Some(mut child) = self.child.take() else {
            return;
        };
        match child.wait().await {
            Ok(status) if !status.success() => {
                debug!(
                    "{} ({}) exited with status {}",
                    self.program, self.category, status
                );
            }
            Ok(_) => {}
            Err(e) => debug!("Failed to reap {}: {}", self.program, e),
        }
    }
}
