//! Backend query adapters.
//!
//! A backend turns a query plus a category (or "all categories") into a lazy
//! stream of raw records. Two strategies exist:
//!
//! - [`ProcessBackend`]: one invocation of a line-oriented search command per
//!   category, output read incrementally.
//! - [`IndexBackend`]: one full-text query against a SQLite FTS5 index that
//!   returns every category interleaved, best match first.
//!
//! Adapters own nothing beyond one outstanding request. Dropping the
//! returned stream abandons the request without killing it.

mod index;
mod process;

pub use index::{IndexBackend, IndexStore};
pub use process::ProcessBackend;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::category::Category;
use crate::error::Result;
use crate::query::Query;
use crate::record::RawRecord;

/// Lazily produced raw records. An `Err` item is a single bad record or a
/// failed read; the stream may continue after it.
pub type RawStream = BoxStream<'static, Result<RawRecord>>;

/// What a single backend request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryScope {
    Category(Category),
    All,
}

/// How a session should drive a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPlan {
    /// One request per category, in category order.
    PerCategory,
    /// One request covering every category.
    Combined,
}

/// One backend request.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub scope: QueryScope,
    pub query: Query,
    /// Result cap the backend may apply on its side.
    pub limit: usize,
}

/// A search backend.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn plan(&self) -> QueryPlan;

    /// Issue a request and return its result stream.
    ///
    /// An `Err` here means the request could not be issued at all.
    async fn query(&self, request: BackendRequest) -> Result<RawStream>;
}
