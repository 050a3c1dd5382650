//! # Statistics Module
//!
//! Collects counters about the crawl as it runs.
//!
//! ## Overview
//!
//! The `StatCollector` is shared by the workers, the coordinator and the item
//! processor. Every counter is atomic, so updates never need a lock. Together
//! with the `tracing` output it forms the diagnostic channel of the crawl:
//! recoverable failures are counted here and never reach an item sink.
//!
//! ## Key Metrics Tracked
//!
//! - **Tasks**: enqueued, sent to the network, answered by middleware
//! - **Fetches**: succeeded, failed, timed out, dropped, bytes downloaded
//! - **Parsing**: results parsed, decode and structural diagnostics
//! - **Items**: scraped, delivered, rejected by a sink
//!
//! ## Example
//!
//! ```rust,ignore
//! let crawler = CrawlerBuilder::new(spider).build()?;
//! let stats = crawler.get_stats();
//! crawler.start_crawl().await?;
//!
//! println!("{}", stats);
//! println!("{}", stats.to_json_string_pretty()?);
//! ```

use dashmap::DashMap;
use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use crate::error::CrawlError;

/// Collects and stores various statistics about the crawler's operation.
#[derive(Debug, serde::Serialize)]
pub struct StatCollector {
    #[serde(skip)]
    pub start_time: Instant,

    // Task-related metrics
    pub tasks_enqueued: AtomicUsize,
    pub requests_sent: AtomicUsize,
    pub responses_from_middleware: AtomicUsize,

    // Fetch-related metrics
    pub requests_succeeded: AtomicUsize,
    pub requests_failed: AtomicUsize,
    pub requests_timed_out: AtomicUsize,
    pub requests_dropped: AtomicUsize,
    pub total_bytes_downloaded: AtomicUsize,
    pub failure_status_counts: DashMap<u16, usize>,

    // Parse-related metrics
    pub results_parsed: AtomicUsize,
    pub decode_failures: AtomicUsize,
    pub structural_failures: AtomicUsize,

    // Item-related metrics
    pub items_scraped: AtomicUsize,
    pub items_delivered: AtomicUsize,
    pub items_rejected: AtomicUsize,
}

impl StatCollector {
    /// Creates a new `StatCollector` with all counters initialized to zero.
    pub fn new() -> Self {
        StatCollector {
            start_time: Instant::now(),
            tasks_enqueued: AtomicUsize::new(0),
            requests_sent: AtomicUsize::new(0),
            responses_from_middleware: AtomicUsize::new(0),
            requests_succeeded: AtomicUsize::new(0),
            requests_failed: AtomicUsize::new(0),
            requests_timed_out: AtomicUsize::new(0),
            requests_dropped: AtomicUsize::new(0),
            total_bytes_downloaded: AtomicUsize::new(0),
            failure_status_counts: DashMap::new(),
            results_parsed: AtomicUsize::new(0),
            decode_failures: AtomicUsize::new(0),
            structural_failures: AtomicUsize::new(0),
            items_scraped: AtomicUsize::new(0),
            items_delivered: AtomicUsize::new(0),
            items_rejected: AtomicUsize::new(0),
        }
    }

    pub(crate) fn increment_tasks_enqueued(&self) {
        self.tasks_enqueued.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_responses_from_middleware(&self) {
        self.responses_from_middleware.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_success(&self, bytes: usize) {
        self.requests_succeeded.fetch_add(1, Ordering::SeqCst);
        self.total_bytes_downloaded.fetch_add(bytes, Ordering::SeqCst);
    }

    pub(crate) fn record_failure(&self, timeout: bool, status: Option<u16>) {
        self.requests_failed.fetch_add(1, Ordering::SeqCst);
        if timeout {
            self.requests_timed_out.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(code) = status {
            *self.failure_status_counts.entry(code).or_insert(0) += 1;
        }
    }

    pub(crate) fn increment_requests_dropped(&self) {
        self.requests_dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_results_parsed(&self) {
        self.results_parsed.fetch_add(1, Ordering::SeqCst);
    }

    /// Counts a parse diagnostic by category. Transport failures are already
    /// counted by the worker that saw them.
    pub(crate) fn record_diagnostic(&self, error: &CrawlError) {
        match error {
            CrawlError::Decode(_) => {
                self.decode_failures.fetch_add(1, Ordering::SeqCst);
            }
            CrawlError::Structural(_) => {
                self.structural_failures.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }

    pub(crate) fn increment_items_scraped(&self) {
        self.items_scraped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_items_delivered(&self) {
        self.items_delivered.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_items_rejected(&self) {
        self.items_rejected.fetch_add(1, Ordering::SeqCst);
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Converts the statistics into a JSON string.
    pub fn to_json_string(&self) -> Result<String, CrawlError> {
        serde_json::to_string(self).map_err(|e| CrawlError::Internal(e.to_string()))
    }

    /// Converts the statistics into a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String, CrawlError> {
        serde_json::to_string_pretty(self).map_err(|e| CrawlError::Internal(e.to_string()))
    }
}

impl Default for StatCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn formatted_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

impl fmt::Display for StatCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let load = |counter: &AtomicUsize| counter.load(Ordering::SeqCst);

        writeln!(f, "\nCrawl Statistics")?;
        writeln!(f, "----------------")?;
        writeln!(f, "  duration : {:?}", self.elapsed())?;
        writeln!(
            f,
            "  tasks    : enqueued: {}, sent: {}, from_middleware: {}",
            load(&self.tasks_enqueued),
            load(&self.requests_sent),
            load(&self.responses_from_middleware)
        )?;
        writeln!(
            f,
            "  fetches  : ok: {}, fail: {}, timeout: {}, drop: {}, downloaded: {}",
            load(&self.requests_succeeded),
            load(&self.requests_failed),
            load(&self.requests_timed_out),
            load(&self.requests_dropped),
            formatted_bytes(load(&self.total_bytes_downloaded))
        )?;
        writeln!(
            f,
            "  parsing  : results: {}, decode: {}, structural: {}",
            load(&self.results_parsed),
            load(&self.decode_failures),
            load(&self.structural_failures)
        )?;
        writeln!(
            f,
            "  items    : scraped: {}, delivered: {}, rejected: {}",
            load(&self.items_scraped),
            load(&self.items_delivered),
            load(&self.items_rejected)
        )?;

        let status_string = if self.failure_status_counts.is_empty() {
            "none".to_string()
        } else {
            self.failure_status_counts
                .iter()
                .map(|entry| format!("{}: {}", entry.key(), entry.value()))
                .collect::<Vec<String>>()
                .join(", ")
        };

        writeln!(f, "  status   : {}\n", status_string)
    }
}
