//! Per-session result accumulation.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::category::Category;
use crate::config::CategoryLimits;
use crate::record::ResultRecord;

/// What happened to a record offered to a [`ResultSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Added,
    /// The uri is already present (in any category when deduplicating).
    Duplicate,
    /// The record's category reached its cap.
    CategoryFull,
}

/// Results grouped by category.
///
/// Within a category, insertion order is backend rank order. Each category
/// is capped, and with deduplication enabled no uri appears twice across
/// the whole set. Iteration follows the fixed category order.
#[derive(Debug, Clone, Serialize)]
pub struct ResultSet {
    groups: BTreeMap<Category, Vec<ResultRecord>>,
    #[serde(skip)]
    seen: HashSet<String>,
    #[serde(skip)]
    limits: CategoryLimits,
    #[serde(skip)]
    dedup: bool,
}

impl Default for ResultSet {
    fn default() -> Self {
        Self::new(CategoryLimits::default(), true)
    }
}

impl ResultSet {
    pub fn new(limits: CategoryLimits, dedup: bool) -> Self {
        Self {
            groups: BTreeMap::new(),
            seen: HashSet::new(),
            limits,
            dedup,
        }
    }

    /// Offer a record; it is appended only if its category has room and its
    /// uri has not been seen.
    pub fn insert(&mut self, record: ResultRecord) -> InsertOutcome {
        if self.is_full(record.category) {
            return InsertOutcome::CategoryFull;
        }

        let duplicate = if self.dedup {
            self.contains_uri(&record.uri)
        } else {
            self.get(record.category).iter().any(|r| r.uri == record.uri)
        };
        if duplicate {
            return InsertOutcome::Duplicate;
        }

        self.seen.insert(record.uri.clone());
        self.groups.entry(record.category).or_default().push(record);
        InsertOutcome::Added
    }

    /// Records for one category, in rank order.
    pub fn get(&self, category: Category) -> &[ResultRecord] {
        self.groups.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_full(&self, category: Category) -> bool {
        self.get(category).len() >= self.limits.limit_for(category)
    }

    pub fn contains_uri(&self, uri: &str) -> bool {
        self.seen.contains(uri)
    }

    /// Total number of records across categories.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-empty categories in display order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &[ResultRecord])> {
        self.groups
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(category, records)| (*category, records.as_slice()))
    }

    /// Categories that have at least one record, in display order.
    pub fn categories(&self) -> Vec<Category> {
        self.iter().map(|(category, _)| category).collect()
    }
}
