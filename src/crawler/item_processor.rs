//! Contains the item processor of the crawler.
//! Delivers parsed items to every registered sink concurrently, bounding each
//! submission with a timeout so a slow sink cannot stall the crawl.

use kanal::AsyncReceiver;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, trace, warn};

use crate::item::ParsedItem;
use crate::sink::ItemSink;
use crate::stats::StatCollector;

pub fn spawn_item_processor_task(
    item_rx: AsyncReceiver<ParsedItem>,
    sinks: Arc<Vec<Box<dyn ItemSink>>>,
    max_concurrent_submissions: usize,
    sink_timeout: Duration,
    stats: Arc<StatCollector>,
) -> tokio::task::JoinHandle<()> {
    let mut tasks = JoinSet::new();
    let semaphore = Arc::new(Semaphore::new(max_concurrent_submissions.max(1)));

    trace!(
        "Starting item processor with max_concurrent_submissions: {}",
        max_concurrent_submissions
    );
    tokio::spawn(async move {
        while let Ok(item) = item_rx.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    warn!("Semaphore closed, shutting down item processor.");
                    break;
                }
            };

            let sinks = Arc::clone(&sinks);
            let stats = Arc::clone(&stats);

            tasks.spawn(async move {
                let mut delivered = true;
                for sink in sinks.iter() {
                    match tokio::time::timeout(sink_timeout, sink.submit(item.clone())).await {
                        Ok(Ok(())) => {
                            trace!("Sink '{}' accepted {}", sink.name(), item);
                        }
                        Ok(Err(e)) => {
                            warn!("Sink '{}' rejected {}: {}", sink.name(), item, e);
                            delivered = false;
                        }
                        Err(_) => {
                            warn!(
                                "Sink '{}' timed out after {:?} on {}",
                                sink.name(),
                                sink_timeout,
                                item
                            );
                            delivered = false;
                        }
                    }
                }

                if delivered {
                    stats.increment_items_delivered();
                } else {
                    stats.increment_items_rejected();
                }
                drop(permit);
            });

            // Reap finished submissions so the set does not grow with the crawl.
            while let Some(res) = tasks.try_join_next() {
                if let Err(e) = res {
                    error!("An item submission task failed: {:?}", e);
                }
            }
        }

        trace!("Waiting for active item submissions to complete");
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!("An item submission task failed: {:?}", e);
            }
        }
        trace!("Item processor finished");
    })
}
