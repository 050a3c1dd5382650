//! Messages produced by the parser.
//!
//! A [`CrawlUnit`] is either more fetch work or a terminal item, never both.
//! The parser returns its units together with any recoverable diagnostics in
//! a [`ParseOutput`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CrawlError;
use crate::request::FetchTask;

/// A comment: the terminal entity of a crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub score: i64,
    pub author: String,
}

/// Anything delivered to an item sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedItem {
    Comment(Comment),
}

impl fmt::Display for ParsedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedItem::Comment(c) => write!(f, "comment by {} (score {})", c.author, c.score),
        }
    }
}

/// The tagged message flowing on the coordinator's channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlUnit {
    Fetch(FetchTask),
    Item(ParsedItem),
}

/// Units and diagnostics produced from a single fetch result, in document order.
#[derive(Debug, Default)]
pub struct ParseOutput {
    units: Vec<CrawlUnit>,
    diagnostics: Vec<CrawlError>,
}

impl ParseOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// An output carrying a single diagnostic and no units.
    pub fn diagnostic(error: CrawlError) -> Self {
        Self {
            units: Vec::new(),
            diagnostics: vec![error],
        }
    }

    pub fn add_task(&mut self, task: FetchTask) {
        self.units.push(CrawlUnit::Fetch(task));
    }

    pub fn add_item(&mut self, item: ParsedItem) {
        self.units.push(CrawlUnit::Item(item));
    }

    pub fn add_diagnostic(&mut self, error: CrawlError) {
        self.diagnostics.push(error);
    }

    pub fn units(&self) -> &[CrawlUnit] {
        &self.units
    }

    pub fn diagnostics(&self) -> &[CrawlError] {
        &self.diagnostics
    }

    pub fn tasks(&self) -> impl Iterator<Item = &FetchTask> {
        self.units.iter().filter_map(|unit| match unit {
            CrawlUnit::Fetch(task) => Some(task),
            CrawlUnit::Item(_) => None,
        })
    }

    pub fn items(&self) -> impl Iterator<Item = &ParsedItem> {
        self.units.iter().filter_map(|unit| match unit {
            CrawlUnit::Item(item) => Some(item),
            CrawlUnit::Fetch(_) => None,
        })
    }

    pub fn into_parts(self) -> (Vec<CrawlUnit>, Vec<CrawlError>) {
        (self.units, self.diagnostics)
    }
}
