//! Contains the fetch worker pool of the crawler.
//!
//! This module runs a fixed number of workers. Each worker loops over:
//!
//! - Receiving a task from the Tasks conduit
//! - Running it through the downloader chain and the transport
//! - Pushing the `FetchResult` into the Results conduit, waiting when it is full
//!
//! Every task a worker takes produces exactly one result, including failures,
//! drops and panics inside the transport, so the coordinator can resolve the
//! unit. Workers exit when the Tasks conduit is closed, when the Results
//! conduit is gone, or when the cancel signal fires; cancellation abandons the
//! fetch in progress.

use futures_util::FutureExt;
use kanal::{AsyncReceiver, AsyncSender};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::crawler::DownloaderChain;
use crate::error::TransportError;
use crate::middleware::RequestAction;
use crate::request::FetchTask;
use crate::response::FetchResult;
use crate::state::CrawlerState;
use crate::stats::StatCollector;
use crate::transport::Transport;

#[allow(clippy::too_many_arguments)]
pub fn spawn_downloader_task(
    task_rx: AsyncReceiver<FetchTask>,
    transport: Arc<dyn Transport>,
    chain: DownloaderChain,
    res_tx: AsyncSender<FetchResult>,
    worker_count: usize,
    state: Arc<CrawlerState>,
    stats: Arc<StatCollector>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut workers = JoinSet::new();
    for worker_id in 0..worker_count {
        workers.spawn(run_worker(
            worker_id,
            task_rx.clone(),
            Arc::clone(&transport),
            chain.clone(),
            res_tx.clone(),
            Arc::clone(&state),
            Arc::clone(&stats),
            cancel.clone(),
        ));
    }
    drop(task_rx);
    drop(res_tx);

    tokio::spawn(async move {
        trace!("Downloader task started with {} workers", worker_count);
        while let Some(res) = workers.join_next().await {
            if let Err(e) = res {
                error!("A fetch worker failed: {:?}", e);
            }
        }
        trace!("Downloader task finished");
    })
}

#[allow(clippy::too_many_arguments)]
async fn run_worker(
    worker_id: usize,
    task_rx: AsyncReceiver<FetchTask>,
    transport: Arc<dyn Transport>,
    chain: DownloaderChain,
    res_tx: AsyncSender<FetchResult>,
    state: Arc<CrawlerState>,
    stats: Arc<StatCollector>,
    cancel: CancellationToken,
) {
    trace!("Fetch worker {} started", worker_id);
    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = task_rx.recv() => match received {
                Ok(task) => task,
                Err(_) => {
                    trace!("Task conduit closed, fetch worker {} exiting", worker_id);
                    break;
                }
            },
        };

        state.fetching.fetch_add(1, Ordering::SeqCst);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = process_task(task, &transport, &chain, &stats) => Some(result),
        };
        state.fetching.fetch_sub(1, Ordering::SeqCst);

        let Some(result) = result else {
            break;
        };

        trace!("Sending result for {}", result.task.url);
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = res_tx.send(result) => sent,
        };
        if sent.is_err() {
            debug!("Result conduit closed, fetch worker {} exiting", worker_id);
            break;
        }
    }
    trace!("Fetch worker {} finished", worker_id);
}

/// Runs one task through the chain, turning a panic anywhere below into a
/// failure result.
async fn process_task(
    task: FetchTask,
    transport: &Arc<dyn Transport>,
    chain: &DownloaderChain,
    stats: &StatCollector,
) -> FetchResult {
    let fallback = task.clone();
    match AssertUnwindSafe(fetch_through_chain(task, transport, chain, stats))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(_) => {
            error!("Fetch of {} panicked", fallback.url);
            stats.record_failure(false, None);
            FetchResult::failure(
                fallback,
                TransportError::connection("fetch panicked"),
            )
        }
    }
}

async fn fetch_through_chain(
    task: FetchTask,
    transport: &Arc<dyn Transport>,
    chain: &DownloaderChain,
    stats: &StatCollector,
) -> FetchResult {
    let original_task = task.clone();

    let result = match chain.process_request(task).await {
        RequestAction::Respond(result) => {
            stats.increment_responses_from_middleware();
            result
        }
        RequestAction::Continue(task) => {
            trace!("Fetching {}", task.url);
            stats.increment_requests_sent();
            let start_time = Instant::now();

            match transport.fetch(&task).await {
                Ok(body) => {
                    debug!(
                        "Fetched {} ({} bytes) in {:?}",
                        task.url,
                        body.len(),
                        start_time.elapsed()
                    );
                    stats.record_success(body.len());
                    FetchResult::document(task, body)
                }
                Err(e) => {
                    if e.timeout {
                        warn!("Request to {} timed out", task.url);
                    } else {
                        warn!("Failed request to {}: {}", task.url, e);
                    }
                    stats.record_failure(e.timeout, e.status);
                    FetchResult::failure(task, e)
                }
            }
        }
    };

    match chain.process_response(result).await {
        Some(result) => result,
        None => {
            debug!("Response for {} dropped by middleware", original_task.url);
            stats.increment_requests_dropped();
            FetchResult::dropped(original_task)
        }
    }
}
