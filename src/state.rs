//! Module for tracking the operational state of the crawler.
//!
//! `CrawlerState` holds the in-flight counter that decides when a crawl is
//! finished: the number of crawl units that have been created but not yet
//! resolved. Only the coordinator mutates it; workers update the separate
//! `fetching` gauge, which is informational.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::CrawlError;

/// Represents the shared state of the crawler's various actors.
#[derive(Debug, Default)]
pub struct CrawlerState {
    in_flight: AtomicUsize,
    /// The number of tasks currently inside a worker.
    pub fetching: AtomicUsize,
}

impl CrawlerState {
    /// Creates a new, atomically reference-counted `CrawlerState`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Records `count` newly created units.
    pub(crate) fn units_enqueued(&self, count: usize) {
        self.in_flight.fetch_add(count, Ordering::SeqCst);
    }

    /// Resolves one unit and returns how many remain.
    pub(crate) fn unit_resolved(&self) -> Result<usize, CrawlError> {
        self.in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(|previous| previous - 1)
            .map_err(|_| CrawlError::Internal("in-flight counter resolved below zero".into()))
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Checks if every unit has been resolved.
    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }
}
