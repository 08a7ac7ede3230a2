//! Query tokenization and backend-specific rendering.
//!
//! A query is split on whitespace. A double-quoted group is one exact-match
//! term (`"bar baz"`); every other token is a wildcard term. Empty tokens
//! never reach a backend.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

/// Characters that force an FTS5 term to be quoted.
static FTS5_BAREWORD_UNSAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]").expect("valid regex"));

/// One search term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum QueryTerm {
    /// Quote-delimited; matched literally.
    Exact(String),
    /// Bare word; matched as a substring or prefix.
    Wildcard(String),
}

impl QueryTerm {
    pub fn text(&self) -> &str {
        match self {
            QueryTerm::Exact(text) | QueryTerm::Wildcard(text) => text,
        }
    }

    /// Positional argument for a line-oriented search command.
    ///
    /// - `foo` → `*foo*`
    /// - `"bar baz"` → `bar baz`
    pub fn to_process_arg(&self) -> String {
        match self {
            QueryTerm::Exact(text) => text.clone(),
            QueryTerm::Wildcard(text) => format!("*{}*", text),
        }
    }

    /// FTS5 MATCH fragment.
    ///
    /// - `foo` → `foo*`
    /// - `gpt-2` → `"gpt-2"*`
    /// - `"bar baz"` → `"bar baz"`
    pub fn to_fts5(&self) -> String {
        match self {
            QueryTerm::Exact(text) => quote_fts5(text),
            QueryTerm::Wildcard(text) => format!("{}*", escape_fts5_term(&text.to_lowercase())),
        }
    }
}

/// Escape a bare term for FTS5.
///
/// Terms made only of letters and digits pass through; anything else is
/// wrapped in quotes with embedded quotes doubled.
pub fn escape_fts5_term(term: &str) -> String {
    if FTS5_BAREWORD_UNSAFE.is_match(term) {
        quote_fts5(term)
    } else {
        term.to_string()
    }
}

fn quote_fts5(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

/// An immutable, tokenized search query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    text: String,
    terms: Vec<QueryTerm>,
}

impl Query {
    /// Tokenize raw input.
    ///
    /// An unterminated quote is not an exact term; its words are treated as
    /// ordinary wildcard terms.
    pub fn parse(text: &str) -> Self {
        let mut terms = Vec::new();
        let mut rest = text;

        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }

            if let Some(after_quote) = rest.strip_prefix('"') {
                match after_quote.find('"') {
                    Some(end) => {
                        let phrase = after_quote[..end].trim();
                        if !phrase.is_empty() {
                            terms.push(QueryTerm::Exact(phrase.to_string()));
                        }
                        rest = &after_quote[end + 1..];
                    }
                    None => {
                        terms.extend(
                            after_quote
                                .split_whitespace()
                                .map(|word| QueryTerm::Wildcard(word.to_string())),
                        );
                        break;
                    }
                }
                continue;
            }

            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            terms.push(QueryTerm::Wildcard(rest[..end].to_string()));
            rest = &rest[end..];
        }

        Self {
            text: text.to_string(),
            terms,
        }
    }

    /// The raw input this query was parsed from.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn terms(&self) -> &[QueryTerm] {
        &self.terms
    }

    /// True when the input held nothing but whitespace.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Positional arguments for a line-oriented search command.
    pub fn process_args(&self) -> Vec<String> {
        self.terms.iter().map(QueryTerm::to_process_arg).collect()
    }

    /// FTS5 MATCH expression requiring every term.
    ///
    /// Returns an empty string for an empty query.
    pub fn to_fts5_match(&self) -> String {
        self.terms
            .iter()
            .map(QueryTerm::to_fts5)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
