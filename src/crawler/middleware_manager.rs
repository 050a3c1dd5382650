//! The downloader chain: ordered middleware stages shared by every worker.
//!
//! Stages are immutable once the crawl starts, so the chain is a cheap
//! `Arc` clone and workers run it concurrently without locking.

use std::sync::Arc;
use tracing::trace;

use crate::middleware::{Middleware, RequestAction};
use crate::request::FetchTask;
use crate::response::FetchResult;

#[derive(Clone)]
pub struct DownloaderChain {
    middlewares: Arc<Vec<Box<dyn Middleware>>>,
}

impl DownloaderChain {
    /// Creates a chain that runs `middlewares` in the given order.
    pub fn new(middlewares: Vec<Box<dyn Middleware>>) -> Self {
        Self {
            middlewares: Arc::new(middlewares),
        }
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Processes a task through all registered stages in order.
    ///
    /// Stops at the first stage that answers the task itself.
    pub async fn process_request(&self, task: FetchTask) -> RequestAction {
        let mut current_task = task;

        for middleware in self.middlewares.iter() {
            match middleware.process_request(current_task).await {
                RequestAction::Continue(task) => {
                    current_task = task;
                }
                RequestAction::Respond(result) => {
                    trace!(
                        "Middleware '{}' answered {} without a fetch",
                        middleware.name(),
                        result.task.url
                    );
                    return RequestAction::Respond(result);
                }
            }
        }

        RequestAction::Continue(current_task)
    }

    /// Processes a result through all registered stages in reverse order.
    ///
    /// Returns `None` as soon as a stage suppresses the result.
    pub async fn process_response(&self, result: FetchResult) -> Option<FetchResult> {
        let mut current_result = result;

        // Process in reverse order to mirror the request chain
        for middleware in self.middlewares.iter().rev() {
            match middleware.process_response(current_result).await {
                Some(result) => current_result = result,
                None => {
                    trace!("Middleware '{}' suppressed a response", middleware.name());
                    return None;
                }
            }
        }

        Some(current_result)
    }
}
