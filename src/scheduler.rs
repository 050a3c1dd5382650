//! # Scheduler Module
//!
//! Feeds fetch tasks into the worker pool's bounded Tasks conduit.
//!
//! ## Overview
//!
//! The crawl pipeline is self-feeding: parsing a result produces new tasks
//! that must re-enter the same worker pool. If the coordinator pushed those
//! tasks straight into the bounded Tasks conduit it could block while every
//! worker is blocked pushing into a full Results conduit, and nothing would
//! move again.
//!
//! The `Scheduler` breaks that cycle. `enqueue_request` hands the task to an
//! unbounded internal queue and returns immediately; a dedicated run loop
//! drains that queue into the bounded conduit. Only the run loop ever waits
//! on a full Tasks conduit, and it depends on nothing but the workers.
//!
//! ## Example
//!
//! ```rust,ignore
//! use forum_spider::scheduler::Scheduler;
//! use forum_spider::FetchTask;
//! use tokio_util::sync::CancellationToken;
//!
//! let (scheduler, task_receiver, feeder) = Scheduler::new(16, CancellationToken::new());
//!
//! scheduler.enqueue_request(FetchTask::parse("https://www.reddit.com/.json")?).await?;
//! let task = task_receiver.recv().await?;
//!
//! scheduler.shutdown().await?;
//! feeder.await?;
//! ```

use kanal::{bounded_async, unbounded_async, AsyncReceiver, AsyncSender};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::CrawlError;
use crate::request::FetchTask;

enum SchedulerMessage {
    Enqueue(Box<FetchTask>),
    Shutdown,
}

pub struct Scheduler {
    tx_internal: AsyncSender<SchedulerMessage>,
    staged_requests: AtomicUsize,
    pub(crate) is_shutting_down: AtomicBool,
}

impl Scheduler {
    /// Creates a new `Scheduler` and starts its run loop.
    ///
    /// Returns the scheduler, the receiving end of the Tasks conduit (bounded
    /// to `capacity`) and the run loop's handle.
    pub fn new(
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Arc<Self>, AsyncReceiver<FetchTask>, JoinHandle<()>) {
        let (tx_internal, rx_internal) = unbounded_async();
        let (tx_req_out, rx_req_out) = bounded_async(capacity);

        let scheduler = Arc::new(Scheduler {
            tx_internal,
            staged_requests: AtomicUsize::new(0),
            is_shutting_down: AtomicBool::new(false),
        });

        let scheduler_clone = Arc::clone(&scheduler);
        let handle = tokio::spawn(async move {
            scheduler_clone
                .run_loop(rx_internal, tx_req_out, cancel)
                .await;
        });

        (scheduler, rx_req_out, handle)
    }

    async fn run_loop(
        &self,
        rx_internal: AsyncReceiver<SchedulerMessage>,
        tx_req_out: AsyncSender<FetchTask>,
        cancel: CancellationToken,
    ) {
        debug!("Scheduler run_loop started");
        loop {
            let msg = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Scheduler cancelled");
                    break;
                }
                msg = rx_internal.recv() => msg,
            };

            match msg {
                Ok(SchedulerMessage::Enqueue(boxed_task)) => {
                    let task = *boxed_task;
                    trace!("Feeding task to workers: {}", task.url);
                    let sent = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        sent = tx_req_out.send(task) => sent,
                    };
                    self.staged_requests.fetch_sub(1, Ordering::SeqCst);
                    if sent.is_err() {
                        warn!("Task conduit closed, scheduler can no longer feed workers.");
                        break;
                    }
                }
                Ok(SchedulerMessage::Shutdown) => {
                    debug!("Scheduler received shutdown signal. Exiting run_loop.");
                    break;
                }
                Err(_) => {
                    warn!("Scheduler internal message channel closed. Exiting run_loop.");
                    break;
                }
            }
        }
        self.is_shutting_down.store(true, Ordering::SeqCst);
        info!(
            "Scheduler run_loop finished with {} staged tasks remaining.",
            self.staged_requests.load(Ordering::SeqCst)
        );
    }

    /// Stages a task for the worker pool. Never waits on the Tasks conduit.
    pub async fn enqueue_request(&self, task: FetchTask) -> Result<(), CrawlError> {
        if self.is_shutting_down.load(Ordering::SeqCst) {
            return Err(CrawlError::Internal(format!(
                "scheduler is shut down, cannot enqueue {}",
                task.url
            )));
        }

        trace!("Enqueuing task: {}", task.url);
        self.staged_requests.fetch_add(1, Ordering::SeqCst);
        let url = task.url.clone();
        if self
            .tx_internal
            .send(SchedulerMessage::Enqueue(Box::new(task)))
            .await
            .is_err()
        {
            self.staged_requests.fetch_sub(1, Ordering::SeqCst);
            return Err(CrawlError::Internal(format!(
                "scheduler internal channel closed, cannot enqueue {url}"
            )));
        }
        Ok(())
    }

    /// Sends a shutdown signal to the scheduler.
    pub async fn shutdown(&self) -> Result<(), CrawlError> {
        self.is_shutting_down.store(true, Ordering::SeqCst);

        if self
            .tx_internal
            .send(SchedulerMessage::Shutdown)
            .await
            .is_err()
        {
            debug!("Scheduler internal channel already closed, skipping shutdown signal");
        }
        Ok(())
    }

    /// Returns the number of tasks staged but not yet handed to a worker.
    #[inline]
    pub fn len(&self) -> usize {
        self.staged_requests.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
