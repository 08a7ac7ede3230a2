//! SQLite FTS5 index backend.
//!
//! The index mirrors what the desktop indexer knows about each resource:
//! a `resources` table holding the row fields, and an FTS5 virtual table
//! kept in sync by triggers. One query returns every category interleaved
//! in relevance order; rows are read on a blocking worker and handed over
//! through a bounded channel, so dropping the stream stops the cursor.

use async_trait::async_trait;
use futures::StreamExt;
use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{BackendRequest, QueryPlan, QueryScope, RawStream, SearchBackend};
use crate::config::{EngineConfig, IndexConfig};
use crate::error::{Result, SearchError};
use crate::record::{category_for_types, RawRow};

/// Owner of the index database: schema setup and maintenance.
pub struct IndexStore {
    db_path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
    config: IndexConfig,
}

impl IndexStore {
    /// Create or open the index at the configured path.
    pub fn open(config: &IndexConfig) -> Result<Self> {
        let db_path = config.resolved_path();

        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| SearchError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        Self::configure_connection(&conn)?;
        Self::with_connection(conn, Some(db_path), config)
    }

    /// Open a private in-memory index.
    pub fn open_in_memory(config: &IndexConfig) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, None, config)
    }

    fn with_connection(
        conn: Connection,
        db_path: Option<PathBuf>,
        config: &IndexConfig,
    ) -> Result<Self> {
        Self::ensure_schema(&conn)?;
        let store = Self {
            db_path,
            conn: Arc::new(Mutex::new(conn)),
            config: config.clone(),
        };
        store.ensure_fts5()?;
        Ok(store)
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA busy_timeout=30000;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            ",
        )?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS resources (
                id TEXT PRIMARY KEY,
                url TEXT,
                title TEXT,
                performer TEXT,
                album TEXT,
                track_number INTEGER,
                mime_type TEXT,
                rdf_types TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn ensure_fts5(&self) -> Result<()> {
        let conn = self.lock()?;
        let table = &self.config.table_name;

        let exists: i32 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table],
            |row| row.get(0),
        )?;

        if exists == 0 {
            Self::create_fts5_table(&conn, &self.config)?;
            Self::populate_fts5(&conn, table)?;
        }
        Self::create_triggers(&conn, table)?;
        Ok(())
    }

    fn create_fts5_table(conn: &Connection, config: &IndexConfig) -> Result<()> {
        let sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5(
                id UNINDEXED,
                title,
                url,
                performer,
                album,
                tokenize='{}'
            )",
            config.table_name, config.tokenizer
        );
        conn.execute(&sql, [])?;
        info!("Created FTS5 table: {}", config.table_name);
        Ok(())
    }

    fn create_triggers(conn: &Connection, table: &str) -> Result<()> {
        conn.execute_batch(&format!(
            "CREATE TRIGGER IF NOT EXISTS {t}_ai AFTER INSERT ON resources BEGIN
                INSERT INTO {t} (id, title, url, performer, album)
                VALUES (NEW.id, NEW.title, NEW.url, NEW.performer, NEW.album);
            END;
            CREATE TRIGGER IF NOT EXISTS {t}_au AFTER UPDATE ON resources BEGIN
                DELETE FROM {t} WHERE id = OLD.id;
                INSERT INTO {t} (id, title, url, performer, album)
                VALUES (NEW.id, NEW.title, NEW.url, NEW.performer, NEW.album);
            END;
            CREATE TRIGGER IF NOT EXISTS {t}_ad AFTER DELETE ON resources BEGIN
                DELETE FROM {t} WHERE id = OLD.id;
            END;",
            t = table
        ))?;
        debug!("Created FTS5 triggers for {}", table);
        Ok(())
    }

    fn populate_fts5(conn: &Connection, table: &str) -> Result<()> {
        conn.execute_batch(&format!("DELETE FROM {};", table))?;
        conn.execute(
            &format!(
                "INSERT INTO {} (id, title, url, performer, album)
                 SELECT id, title, url, performer, album FROM resources",
                table
            ),
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        lock_connection(&self.conn)
    }

    /// Database file, or `None` for an in-memory index.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn table_name(&self) -> &str {
        &self.config.table_name
    }

    /// Shared connection handle for backends.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// Insert or update one resource.
    pub fn upsert(&self, row: &RawRow) -> Result<()> {
        let conn = self.lock()?;
        let rdf_types = serde_json::to_string(&row.rdf_types)?;

        conn.execute(
            "INSERT INTO resources (id, url, title, performer, album,
                                    track_number, mime_type, rdf_types)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                 url=excluded.url,
                 title=excluded.title,
                 performer=excluded.performer,
                 album=excluded.album,
                 track_number=excluded.track_number,
                 mime_type=excluded.mime_type,
                 rdf_types=excluded.rdf_types",
            params![
                row.id,
                row.url,
                row.title,
                row.performer,
                row.album,
                row.track_number,
                row.mime_type,
                rdf_types,
            ],
        )?;

        debug!("Upserted resource: {}", row.id);
        Ok(())
    }

    /// Remove a resource. Returns whether it existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let affected = conn.execute("DELETE FROM resources WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: usize = conn.query_row("SELECT COUNT(*) FROM resources", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Drop and rebuild the FTS5 table from `resources`.
    pub fn rebuild(&self) -> Result<()> {
        let conn = self.lock()?;
        let table = &self.config.table_name;

        conn.execute_batch(&format!(
            "DROP TRIGGER IF EXISTS {t}_ai;
             DROP TRIGGER IF EXISTS {t}_au;
             DROP TRIGGER IF EXISTS {t}_ad;
             DROP TABLE IF EXISTS {t};",
            t = table
        ))?;
        Self::create_fts5_table(&conn, &self.config)?;
        Self::populate_fts5(&conn, table)?;
        Self::create_triggers(&conn, table)?;

        info!("Rebuilt FTS5 index");
        Ok(())
    }

    /// Merge FTS5 segments.
    pub fn optimize(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO {t}({t}) VALUES('optimize')",
                t = self.config.table_name
            ),
            [],
        )?;
        debug!("Optimized FTS5 index");
        Ok(())
    }
}

fn lock_connection(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| SearchError::Database {
        message: "Failed to acquire connection lock".to_string(),
        source: None,
    })
}

/// Full-text query backend over an [`IndexStore`] connection.
pub struct IndexBackend {
    conn: Arc<Mutex<Connection>>,
    table_name: String,
}

impl IndexBackend {
    pub fn new(store: &IndexStore) -> Self {
        Self::from_connection(store.connection(), store.table_name())
    }

    /// Use an existing connection whose schema is already set up.
    pub fn from_connection(conn: Arc<Mutex<Connection>>, table_name: impl Into<String>) -> Self {
        Self {
            conn,
            table_name: table_name.into(),
        }
    }

    fn select_sql(&self) -> String {
        // FTS5 rank: lower is better, so ascending order is best first.
        format!(
            "SELECT r.id, r.url, r.title, r.performer, r.album, \
             r.track_number, r.mime_type, r.rdf_types \
             FROM {t} s JOIN resources r ON s.id = r.id \
             WHERE {t} MATCH ?1 ORDER BY rank",
            t = self.table_name
        )
    }
}

#[async_trait]
impl SearchBackend for IndexBackend {
    fn name(&self) -> &str {
        "index"
    }

    fn plan(&self) -> QueryPlan {
        QueryPlan::Combined
    }

    async fn query(&self, request: BackendRequest) -> Result<RawStream> {
        let match_expr = request.query.to_fts5_match();
        if match_expr.is_empty() {
            return Ok(futures::stream::empty().boxed());
        }

        let sql = self.select_sql();
        let conn = Arc::clone(&self.conn);
        let (tx, rx) = mpsc::channel(EngineConfig::ROW_CHANNEL_CAPACITY);

        debug!("FTS5 query: {}", match_expr);

        tokio::task::spawn_blocking(move || {
            let send_error = |err: SearchError| {
                let _ = tx.blocking_send(Err(err));
            };

            let conn = match lock_connection(&conn) {
                Ok(conn) => conn,
                Err(e) => return send_error(e),
            };
            let mut stmt = match conn.prepare(&sql) {
                Ok(stmt) => stmt,
                Err(e) => return send_error(e.into()),
            };
            let rows = match stmt.query_map([&match_expr], row_to_raw) {
                Ok(rows) => rows,
                Err(e) => return send_error(e.into()),
            };

            for row in rows {
                if tx.blocking_send(row.map_err(SearchError::from)).is_err() {
                    debug!("Index cursor abandoned by consumer");
                    break;
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        let stream = match request.scope {
            QueryScope::All => stream.boxed(),
            QueryScope::Category(category) => stream
                .filter(move |item| {
                    let keep = match item {
                        Ok(row) => category_for_types(row.rdf_types.as_slice()) == category,
                        Err(_) => true,
                    };
                    futures::future::ready(keep)
                })
                .boxed(),
        };

        Ok(stream.map(|item| item.map(crate::record::RawRecord::Row)).boxed())
    }
}

fn row_to_raw(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    let rdf_types_json: String = row.get(7)?;
    let rdf_types: Vec<String> = serde_json::from_str(&rdf_types_json).map_err(|e| {
        warn!("Malformed rdf_types column: {}", e);
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let track_number: Option<i64> = row.get(5)?;

    Ok(RawRow {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        performer: row.get(3)?,
        album: row.get(4)?,
        track_number: track_number.and_then(|n| u32::try_from(n).ok()),
        mime_type: row.get(6)?,
        rdf_types,
    })
}
