//! # Sink Module
//!
//! Destinations for terminal items.
//!
//! Sinks receive every `ParsedItem` the parser emits. A submission is
//! best-effort: the item processor bounds each call with a timeout and a
//! failing sink never stops the crawl.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::CrawlError;
use crate::item::ParsedItem;

#[async_trait]
pub trait ItemSink: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn submit(&self, item: ParsedItem) -> Result<(), CrawlError>;

    /// Called once after the last item of the crawl.
    async fn close(&self) -> Result<(), CrawlError> {
        Ok(())
    }
}

/// Prints items to stdout, either as text or one JSON object per line.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    json: bool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json() -> Self {
        Self { json: true }
    }
}

#[async_trait]
impl ItemSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn submit(&self, item: ParsedItem) -> Result<(), CrawlError> {
        if self.json {
            let line = serde_json::to_string(&item)
                .map_err(|e| CrawlError::Internal(format!("failed to encode item: {e}")))?;
            println!("{line}");
        } else {
            match &item {
                ParsedItem::Comment(comment) => {
                    println!("Comment");
                    println!("\tAuthor: {}", comment.author);
                    println!("\tScore: {}", comment.score);
                }
            }
        }
        Ok(())
    }
}

/// Collects items in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    items: Arc<Mutex<Vec<ParsedItem>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<ParsedItem> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[async_trait]
impl ItemSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn submit(&self, item: ParsedItem) -> Result<(), CrawlError> {
        self.items.lock().push(item);
        Ok(())
    }
}
