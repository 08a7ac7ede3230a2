//! Result normalization.
//!
//! Backends hand back either raw output lines (process strategy) or typed
//! rows (index strategy). Both are reduced here to one [`ResultRecord`]
//! shape. Normalization is pure: the same raw input always gives the same
//! record or the same error.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use crate::category::Category;
use crate::error::{Result, SearchError};

/// URI scheme prefix every line-oriented hit must carry.
pub const FILE_URI_PREFIX: &str = "file://";

const DESKTOP_SUFFIX: &str = ".desktop";

/// A typed row from a structured index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    pub id: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub performer: Option<String>,
    pub album: Option<String>,
    pub track_number: Option<u32>,
    pub mime_type: Option<String>,
    pub rdf_types: Vec<String>,
}

/// Unnormalized backend output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRecord {
    /// One output line of a per-category command invocation.
    Line { category: Category, line: String },
    /// One row of a combined structured query.
    Row(RawRow),
}

/// A normalized search hit.
///
/// `uri` is never empty and never carries surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub category: Category,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl ResultRecord {
    /// Create a record with only the required fields.
    ///
    /// Fails on an empty or whitespace-only uri.
    pub fn new(category: Category, uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(SearchError::malformed("empty uri"));
        }
        Ok(Self {
            category,
            uri: uri.to_string(),
            title: None,
            performer: None,
            album: None,
            track_number: None,
            mime_type: None,
        })
    }

    /// True for application identifiers such as `firefox.desktop`.
    pub fn is_application(&self) -> bool {
        self.category == Category::Software && !self.uri.starts_with(FILE_URI_PREFIX)
    }

    /// Local path for `file://` records.
    pub fn file_path(&self) -> Option<PathBuf> {
        if !self.uri.starts_with(FILE_URI_PREFIX) {
            return None;
        }
        Url::parse(&self.uri).ok()?.to_file_path().ok()
    }

    /// Short name for display.
    ///
    /// Prefers the indexed title, then the decoded file name, then the
    /// application id without its `.desktop` suffix.
    pub fn display_name(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        if let Some(name) = self
            .file_path()
            .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        {
            return name;
        }
        self.uri
            .strip_suffix(DESKTOP_SUFFIX)
            .unwrap_or(&self.uri)
            .to_string()
    }
}

/// Normalize any raw backend record.
pub fn normalize(raw: &RawRecord) -> Result<ResultRecord> {
    match raw {
        RawRecord::Line { category, line } => normalize_line(line, *category),
        RawRecord::Row(row) => normalize_row(row),
    }
}

/// Normalize one output line of the search command.
///
/// Lines must start with `file://`. Software hits are reduced to their
/// `<name>.desktop` basename.
pub fn normalize_line(line: &str, category: Category) -> Result<ResultRecord> {
    let line = line.trim();
    if line.is_empty() {
        return Err(SearchError::malformed("empty line"));
    }
    if !line.starts_with(FILE_URI_PREFIX) {
        return Err(SearchError::malformed(format!(
            "not a {FILE_URI_PREFIX} uri: {line}"
        )));
    }

    match category {
        Category::Software => {
            let basename = line.rsplit('/').next().unwrap_or_default();
            let stem = basename.split(DESKTOP_SUFFIX).next().unwrap_or_default();
            if stem.is_empty() {
                return Err(SearchError::malformed(format!(
                    "no application name in {line}"
                )));
            }
            ResultRecord::new(category, &format!("{stem}{DESKTOP_SUFFIX}"))
        }
        _ => ResultRecord::new(category, line),
    }
}

/// Normalize one structured-index row.
///
/// The row's URL is used when present, its identifier otherwise. The
/// category comes from its RDF types.
pub fn normalize_row(row: &RawRow) -> Result<ResultRecord> {
    let uri = row
        .url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| row.id.trim());

    let mut record = ResultRecord::new(category_for_types(row.rdf_types.as_slice()), uri)
        .map_err(|_| SearchError::malformed(format!("row {:?} has no url or id", row.id)))?;
    record.title = non_blank(&row.title);
    record.performer = non_blank(&row.performer);
    record.album = non_blank(&row.album);
    record.track_number = row.track_number;
    record.mime_type = non_blank(&row.mime_type);
    Ok(record)
}

/// Category for an RDF type list: first recognised type wins, otherwise
/// [`Category::Files`].
pub fn category_for_types<S: AsRef<str>>(types: &[S]) -> Category {
    types
        .iter()
        .find_map(|t| Category::from_rdf_type(t.as_ref()))
        .unwrap_or(Category::Files)
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
