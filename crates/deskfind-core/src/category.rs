//! The closed set of result categories.
//!
//! Declaration order is significant: it is both the order in which
//! categories are queried and the order in which they are displayed, so
//! `Ord` is derived from it.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::SearchError;

/// A kind of search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Software,
    Pictures,
    Videos,
    Music,
    Folders,
    Files,
}

/// Namespace IRIs compacted to `prefix#Local` before type lookup.
const RDF_NAMESPACES: &[(&str, &str)] = &[
    ("nfo", "http://www.semanticdesktop.org/ontologies/2007/03/22/nfo#"),
    ("nie", "http://www.semanticdesktop.org/ontologies/2007/01/19/nie#"),
    ("nmm", "http://www.tracker-project.org/temp/nmm#"),
];

/// RDF type to category lookup. Anything not listed is a plain file.
const RDF_TYPE_CATEGORIES: &[(&str, Category)] = &[
    ("nfo#Software", Category::Software),
    ("nfo#SoftwareApplication", Category::Software),
    ("nfo#Image", Category::Pictures),
    ("nmm#Photo", Category::Pictures),
    ("nfo#Video", Category::Videos),
    ("nmm#Video", Category::Videos),
    ("nfo#Audio", Category::Music),
    ("nmm#MusicPiece", Category::Music),
    ("nfo#Folder", Category::Folders),
];

impl Category {
    /// Every category, in query and display order.
    pub const ALL: [Category; 6] = [
        Category::Software,
        Category::Pictures,
        Category::Videos,
        Category::Music,
        Category::Folders,
        Category::Files,
    ];

    /// The two-category set used by the first engine generation.
    pub const LEGACY: [Category; 2] = [Category::Software, Category::Files];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Software => "software",
            Category::Pictures => "pictures",
            Category::Videos => "videos",
            Category::Music => "music",
            Category::Folders => "folders",
            Category::Files => "files",
        }
    }

    /// Human-readable section header.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Software => "Software",
            Category::Pictures => "Pictures",
            Category::Videos => "Videos",
            Category::Music => "Music",
            Category::Folders => "Folders",
            Category::Files => "Files",
        }
    }

    /// Command-line switch restricting `tracker-search` to this category.
    pub fn selector_flag(&self) -> &'static str {
        match self {
            Category::Software => "--software",
            Category::Pictures => "-i",
            Category::Videos => "-v",
            Category::Music => "-m",
            Category::Folders => "-s",
            Category::Files => "-f",
        }
    }

    /// Map a single RDF type to a category, if it is a known one.
    ///
    /// Accepts full IRIs, `prefix#Local` and `prefix:Local` spellings.
    pub fn from_rdf_type(rdf_type: &str) -> Option<Category> {
        let compact = compact_rdf_type(rdf_type.trim());
        RDF_TYPE_CATEGORIES
            .iter()
            .find(|(name, _)| *name == compact)
            .map(|(_, category)| *category)
    }
}

fn compact_rdf_type(rdf_type: &str) -> Cow<'_, str> {
    for (prefix, namespace) in RDF_NAMESPACES {
        if let Some(local) = rdf_type.strip_prefix(namespace) {
            return Cow::Owned(format!("{prefix}#{local}"));
        }
    }
    match rdf_type.split_once(':') {
        Some((prefix, local)) if !local.starts_with("//") => {
            Cow::Owned(format!("{prefix}#{local}"))
        }
        _ => Cow::Borrowed(rdf_type),
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "software" | "applications" => Ok(Category::Software),
            "pictures" | "images" => Ok(Category::Pictures),
            "videos" => Ok(Category::Videos),
            "music" => Ok(Category::Music),
            "folders" | "directories" => Ok(Category::Folders),
            "files" => Ok(Category::Files),
            other => Err(SearchError::Config {
                message: format!("unknown category: {other}"),
            }),
        }
    }
}
