//! Engine configuration.
//!
//! Fixed constants live on [`EngineConfig`]; the tunable parts are grouped in
//! [`SearchConfig`], which can be loaded from a JSON file. Every field has a
//! default, so a partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::category::Category;
use crate::error::{Result, SearchError};

/// Engine-level constants.
pub struct EngineConfig;

impl EngineConfig {
    pub const APP_NAME: &'static str = "deskfind";
    pub const CONFIG_FILE_NAME: &'static str = "config.json";
    pub const INDEX_FILE_NAME: &'static str = "index.db";

    // Result caps
    pub const DEFAULT_LIMIT: usize = 10;
    pub const FOLDER_LIMIT: usize = 5;

    // Process backend
    pub const SEARCH_PROGRAM: &'static str = "tracker-search";
    pub const SEARCH_BASE_ARGS: [&'static str; 2] = ["--disable-snippets", "--disable-color"];
    pub const LIMIT_FLAG: &'static str = "-l";

    // Index backend
    pub const FTS_TABLE_NAME: &'static str = "resource_search";
    pub const FTS_TOKENIZER: &'static str = "unicode61 remove_diacritics 1";
    pub const ROW_CHANNEL_CAPACITY: usize = 32;
}

/// Maximum records kept per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryLimits {
    pub default: usize,
    pub folders: usize,
}

impl Default for CategoryLimits {
    fn default() -> Self {
        Self {
            default: EngineConfig::DEFAULT_LIMIT,
            folders: EngineConfig::FOLDER_LIMIT,
        }
    }
}

impl CategoryLimits {
    pub fn limit_for(&self, category: Category) -> usize {
        match category {
            Category::Folders => self.folders,
            _ => self.default,
        }
    }
}

/// When a session hands results to its sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Push each category as soon as its step completes.
    #[default]
    Incremental,
    /// Push nothing until every category is done.
    Batched,
}

/// How to invoke the line-oriented search command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessBackendConfig {
    pub program: String,
    /// Arguments placed before the limit, category and query arguments.
    pub base_args: Vec<String>,
}

impl Default for ProcessBackendConfig {
    fn default() -> Self {
        Self {
            program: EngineConfig::SEARCH_PROGRAM.to_string(),
            base_args: EngineConfig::SEARCH_BASE_ARGS
                .iter()
                .map(|arg| arg.to_string())
                .collect(),
        }
    }
}

/// Where the structured index lives and how its FTS table is set up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Database file. Defaults to the user data directory.
    pub database_path: Option<PathBuf>,
    pub table_name: String,
    pub tokenizer: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            table_name: EngineConfig::FTS_TABLE_NAME.to_string(),
            tokenizer: EngineConfig::FTS_TOKENIZER.to_string(),
        }
    }
}

impl IndexConfig {
    /// The configured database path, or `<data dir>/deskfind/index.db`.
    pub fn resolved_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(EngineConfig::APP_NAME)
                .join(EngineConfig::INDEX_FILE_NAME)
        })
    }
}

/// Tunable search settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Categories to query. Always processed in declared category order.
    pub categories: Vec<Category>,
    pub limits: CategoryLimits,
    pub delivery: DeliveryMode,
    /// Suppress a uri already accepted under another category.
    pub dedup: bool,
    pub process: ProcessBackendConfig,
    pub index: IndexConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            categories: Category::ALL.to_vec(),
            limits: CategoryLimits::default(),
            delivery: DeliveryMode::default(),
            dedup: true,
            process: ProcessBackendConfig::default(),
            index: IndexConfig::default(),
        }
    }
}

impl SearchConfig {
    /// `<config dir>/deskfind/config.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join(EngineConfig::APP_NAME)
                .join(EngineConfig::CONFIG_FILE_NAME)
        })
    }

    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| SearchError::io_with_path(e, path))?;
        let config: SearchConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the default path if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::load(&path),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(config_error("at least one category is required"));
        }
        if self.limits.default == 0 || self.limits.folders == 0 {
            return Err(config_error("category limits must be positive"));
        }
        if self.process.program.trim().is_empty() {
            return Err(config_error("process.program must not be empty"));
        }
        if !is_sql_identifier(&self.index.table_name) {
            return Err(config_error(format!(
                "index.table_name is not a valid identifier: {}",
                self.index.table_name
            )));
        }
        Ok(())
    }

    /// The configured categories, deduplicated, in declared order.
    pub fn worklist(&self) -> Vec<Category> {
        let mut categories = self.categories.clone();
        categories.sort();
        categories.dedup();
        categories
    }
}

fn config_error(message: impl Into<String>) -> SearchError {
    SearchError::Config {
        message: message.into(),
    }
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
