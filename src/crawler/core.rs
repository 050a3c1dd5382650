//! The core Crawler implementation.
//!
//! This module defines the `Crawler` struct, the coordinator of a crawl. It
//! wires the scheduler, the fetch worker pool and the item processor together,
//! then runs the coordinator loop: it pulls each `FetchResult` off the Results
//! conduit, parses it with the spider, routes the produced units and keeps the
//! in-flight counter. The crawl completes when that counter returns to zero.
//!
//! The coordinator never waits on the Tasks conduit. New tasks go through the
//! scheduler's unbounded staging queue, so the coordinator is always free to
//! drain results and the workers can always make progress.

use futures_util::future::join_all;
use kanal::{bounded_async, AsyncReceiver, AsyncSender};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::builder::CrawlerConfig;
use crate::crawler::{
    process_crawl_outputs, spawn_downloader_task, spawn_item_processor_task, DownloaderChain,
};
use crate::error::CrawlError;
use crate::item::ParsedItem;
use crate::request::FetchTask;
use crate::response::FetchResult;
use crate::scheduler::Scheduler;
use crate::sink::ItemSink;
use crate::spider::Spider;
use crate::state::CrawlerState;
use crate::stats::StatCollector;
use crate::transport::Transport;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// How a crawl that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// Every unit was resolved.
    Completed,
    /// The cancel signal fired first.
    Cancelled,
}

/// The central orchestrator of a crawl.
pub struct Crawler<S: Spider> {
    spider: Arc<S>,
    transport: Arc<dyn Transport>,
    chain: DownloaderChain,
    sinks: Vec<Box<dyn ItemSink>>,
    config: CrawlerConfig,
    stats: Arc<StatCollector>,
    state: Arc<CrawlerState>,
    cancel: CancellationToken,
}

impl<S: Spider> Crawler<S> {
    pub(crate) fn new(
        spider: S,
        transport: Arc<dyn Transport>,
        chain: DownloaderChain,
        sinks: Vec<Box<dyn ItemSink>>,
        config: CrawlerConfig,
        stats: Arc<StatCollector>,
        cancel: CancellationToken,
    ) -> Self {
        Crawler {
            spider: Arc::new(spider),
            transport,
            chain,
            sinks,
            config,
            stats,
            state: CrawlerState::new(),
            cancel,
        }
    }

    /// Runs the crawl to completion or cancellation.
    ///
    /// Per-unit failures are logged and counted, never returned. An `Err` is
    /// only produced for a failure of the pipeline itself, in which case all
    /// tasks are cancelled before returning.
    pub async fn start_crawl(self) -> Result<CrawlOutcome, CrawlError> {
        let Crawler {
            spider,
            transport,
            chain,
            sinks,
            config,
            stats,
            state,
            cancel,
        } = self;

        info!(
            "Crawler starting with worker_count={}, conduit_capacity={}, middlewares={}, sinks={}",
            config.worker_count,
            config.conduit_capacity,
            chain.len(),
            sinks.len()
        );

        let seeds = spider.start_requests()?;
        let sinks = Arc::new(sinks);

        let (scheduler, task_rx, feeder_task) =
            Scheduler::new(config.conduit_capacity, cancel.clone());
        let (res_tx, res_rx) = bounded_async(config.conduit_capacity);
        let (item_tx, item_rx) = bounded_async(config.conduit_capacity);

        trace!("Spawning item processor task");
        let item_processor_task = spawn_item_processor_task(
            item_rx,
            Arc::clone(&sinks),
            config.worker_count,
            config.sink_timeout,
            Arc::clone(&stats),
        );

        trace!("Spawning downloader task");
        let downloader_task = spawn_downloader_task(
            task_rx,
            transport,
            chain,
            res_tx,
            config.worker_count,
            Arc::clone(&state),
            Arc::clone(&stats),
            cancel.clone(),
        );

        let outcome = coordinate(
            spider.as_ref(),
            seeds,
            &scheduler,
            &res_rx,
            &item_tx,
            &state,
            &stats,
            &cancel,
        )
        .await;

        match &outcome {
            Ok(CrawlOutcome::Completed) => {}
            Ok(CrawlOutcome::Cancelled) => {
                info!(
                    "Crawl cancelled with {} units in flight, shutting down.",
                    state.in_flight()
                );
            }
            Err(e) => {
                error!("Crawl aborted: {}", e);
                cancel.cancel();
            }
        }

        trace!("Closing communication channels");
        if let Err(e) = scheduler.shutdown().await {
            error!("Error during scheduler shutdown: {}", e);
        }
        drop(res_rx);
        drop(item_tx);

        let mut task_set = tokio::task::JoinSet::new();
        task_set.spawn(feeder_task);
        task_set.spawn(downloader_task);
        task_set.spawn(item_processor_task);

        let joined = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
            let mut results = Vec::new();
            while let Some(result) = task_set.join_next().await {
                results.push(result);
            }
            results
        })
        .await;

        match joined {
            Ok(results) => {
                for result in results {
                    match result {
                        Ok(Err(e)) => error!("Task failed during shutdown: {}", e),
                        Err(e) => error!("Task failed during shutdown: {}", e),
                        Ok(Ok(())) => {}
                    }
                }
                trace!("All tasks completed during shutdown");
            }
            Err(_) => {
                warn!(
                    "Tasks did not complete within timeout ({}s), aborting remaining tasks.",
                    SHUTDOWN_TIMEOUT.as_secs()
                );
                task_set.abort_all();
            }
        }

        debug!("Closing item sinks");
        let closing: Vec<_> = sinks.iter().map(|sink| sink.close()).collect();
        for (sink, result) in sinks.iter().zip(join_all(closing).await) {
            if let Err(e) = result {
                warn!("Sink '{}' failed to close: {}", sink.name(), e);
            }
        }

        info!(
            "Crawl finished. Stats: tasks_enqueued={}, requests_succeeded={}, requests_failed={}, items_scraped={}",
            stats.tasks_enqueued.load(Ordering::SeqCst),
            stats.requests_succeeded.load(Ordering::SeqCst),
            stats.requests_failed.load(Ordering::SeqCst),
            stats.items_scraped.load(Ordering::SeqCst)
        );
        debug!("{}", stats);

        outcome
    }

    /// Returns the token that cancels this crawl.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns a cloned Arc to the `StatCollector` instance used by this crawler.
    ///
    /// This allows programmatic access to the collected statistics at any time during or after the crawl.
    pub fn get_stats(&self) -> Arc<StatCollector> {
        Arc::clone(&self.stats)
    }

    /// Returns the shared crawl state, including the in-flight counter.
    pub fn state(&self) -> Arc<CrawlerState> {
        Arc::clone(&self.state)
    }
}

/// The coordinator loop. Owns every change of the in-flight counter.
#[allow(clippy::too_many_arguments)]
async fn coordinate<S: Spider>(
    spider: &S,
    seeds: Vec<FetchTask>,
    scheduler: &Scheduler,
    res_rx: &AsyncReceiver<FetchResult>,
    item_tx: &AsyncSender<ParsedItem>,
    state: &CrawlerState,
    stats: &StatCollector,
    cancel: &CancellationToken,
) -> Result<CrawlOutcome, CrawlError> {
    state.units_enqueued(seeds.len());
    for seed in seeds {
        debug!("Seeding crawl with {}", seed.url);
        scheduler.enqueue_request(seed).await?;
        stats.increment_tasks_enqueued();
    }

    loop {
        if state.is_idle() {
            info!("All crawl units resolved, initiating shutdown.");
            return Ok(CrawlOutcome::Completed);
        }

        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(CrawlOutcome::Cancelled),
            received = res_rx.recv() => received,
        };
        let result = received.map_err(|_| {
            CrawlError::Internal(format!(
                "result conduit closed with {} units in flight",
                state.in_flight()
            ))
        })?;

        stats.increment_results_parsed();
        let source = result.task.url.clone();
        trace!("Parsing result from {}", source);
        let output = spider.parse(result);

        let routed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(CrawlOutcome::Cancelled),
            routed = process_crawl_outputs(&source, output, scheduler, item_tx, state, stats) => routed,
        };
        routed?;

        let remaining = state.unit_resolved()?;
        trace!("Resolved result from {}, {} units in flight", source, remaining);
    }
}
