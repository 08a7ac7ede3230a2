//! Deskfind Core - incremental multi-category desktop search.
//!
//! A query is run against an external index backend one category at a time
//! (or once for all categories), and the hits are normalized, capped per
//! category, deduplicated and handed to a presentation-layer sink in a fixed
//! category order. Submitting a new query cancels the previous one.
//!
//! # Example
//!
//! ```rust,ignore
//! use deskfind_core::{ProcessBackend, SearchConfig, SessionSupervisor};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> deskfind_core::Result<()> {
//!     let config = SearchConfig::load_or_default(None)?;
//!     let backend = Arc::new(ProcessBackend::new(config.process.clone()));
//!     let mut supervisor = SessionSupervisor::new(backend, Arc::new(MySink), config);
//!
//!     supervisor.submit("report");
//!     if let Some(outcome) = supervisor.wait().await {
//!         println!("Found {} results", outcome.total());
//!     }
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cancel;
pub mod category;
pub mod config;
pub mod error;
pub mod query;
pub mod record;
pub mod result_set;
pub mod session;
pub mod supervisor;

// Re-export commonly used types
pub use backend::{
    BackendRequest, IndexBackend, IndexStore, ProcessBackend, QueryPlan, QueryScope, RawStream,
    SearchBackend,
};
pub use cancel::{CancellationToken, CancelledError};
pub use category::Category;
pub use config::{
    CategoryLimits, DeliveryMode, EngineConfig, IndexConfig, ProcessBackendConfig, SearchConfig,
};
pub use error::{Result, SearchError};
pub use query::{Query, QueryTerm};
pub use record::{normalize, RawRecord, RawRow, ResultRecord};
pub use result_set::{InsertOutcome, ResultSet};
pub use session::{
    ResultSink, SearchSession, SessionHandle, SessionId, SessionOutcome, SessionState,
};
pub use supervisor::SessionSupervisor;
