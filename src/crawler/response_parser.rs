//! # Response Parser Module
//!
//! Routes the output of one parsed `FetchResult` back into the pipeline.
//!
//! ## Overview
//!
//! The coordinator calls `process_crawl_outputs` for every result it pulls off
//! the Results conduit. Each unit in the output is accounted for before it is
//! dispatched:
//!
//! - **Fetch tasks** are staged on the `Scheduler`, which never waits on the
//!   bounded Tasks conduit. They stay in flight until their own result is
//!   parsed.
//! - **Items** are handed to the item processor and resolved immediately.
//! - **Diagnostics** are logged and counted; they are not units.
//!
//! The caller resolves the unit of the parsed result itself afterwards, so the
//! in-flight counter changes by `units - 1` per result.

use kanal::AsyncSender;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::CrawlError;
use crate::item::{CrawlUnit, ParseOutput, ParsedItem};
use crate::scheduler::Scheduler;
use crate::state::CrawlerState;
use crate::stats::StatCollector;

pub async fn process_crawl_outputs(
    source: &Url,
    output: ParseOutput,
    scheduler: &Scheduler,
    item_tx: &AsyncSender<ParsedItem>,
    state: &CrawlerState,
    stats: &StatCollector,
) -> Result<(), CrawlError> {
    let (units, diagnostics) = output.into_parts();

    for diagnostic in &diagnostics {
        warn!("Parse diagnostic for {}: {}", source, diagnostic);
        stats.record_diagnostic(diagnostic);
    }

    if units.is_empty() {
        trace!("Result from {} produced no units", source);
        return Ok(());
    }
    debug!("Result from {} produced {} units", source, units.len());

    // Count every unit before dispatching any, so the counter cannot reach
    // zero while siblings are still being handed off.
    state.units_enqueued(units.len());

    for unit in units {
        match unit {
            CrawlUnit::Fetch(task) => {
                scheduler.enqueue_request(task).await?;
                stats.increment_tasks_enqueued();
            }
            CrawlUnit::Item(item) => {
                stats.increment_items_scraped();
                item_tx.send(item).await.map_err(|_| {
                    CrawlError::Internal("item channel closed before the crawl finished".into())
                })?;
                state.unit_resolved()?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Comment;
    use crate::request::FetchTask;
    use std::sync::atomic::Ordering;
    use tokio_util::sync::CancellationToken;

    fn url(path: &str) -> Url {
        Url::parse(&format!("https://www.reddit.com/{path}")).unwrap()
    }

    fn comment(score: i64) -> ParsedItem {
        ParsedItem::Comment(Comment {
            score,
            author: "a".into(),
        })
    }

    #[tokio::test]
    async fn tasks_stay_in_flight_and_items_resolve() {
        let (scheduler, task_rx, _feeder) = Scheduler::new(4, CancellationToken::new());
        let (item_tx, item_rx) = kanal::bounded_async(4);
        let state = CrawlerState::new();
        let stats = StatCollector::new();

        let mut output = ParseOutput::new();
        output.add_task(FetchTask::new(url("a.json")));
        output.add_item(comment(1));
        output.add_item(comment(2));
        output.add_diagnostic(CrawlError::Structural("missing author".into()));

        process_crawl_outputs(&url(".json"), output, &scheduler, &item_tx, &state, &stats)
            .await
            .unwrap();

        assert_eq!(state.in_flight(), 1);
        assert_eq!(task_rx.recv().await.unwrap().url, url("a.json"));
        assert_eq!(item_rx.recv().await.unwrap(), comment(1));
        assert_eq!(item_rx.recv().await.unwrap(), comment(2));
        assert_eq!(stats.items_scraped.load(Ordering::SeqCst), 2);
        assert_eq!(stats.tasks_enqueued.load(Ordering::SeqCst), 1);
        assert_eq!(stats.structural_failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closed_item_channel_is_internal_error() {
        let (scheduler, _task_rx, _feeder) = Scheduler::new(4, CancellationToken::new());
        let (item_tx, item_rx) = kanal::bounded_async(1);
        drop(item_rx);
        let state = CrawlerState::new();

        let mut output = ParseOutput::new();
        output.add_item(comment(1));

        let err = process_crawl_outputs(
            &url(".json"),
            output,
            &scheduler,
            &item_tx,
            &state,
            &StatCollector::new(),
        )
        .await
        .unwrap_err();

        assert!(err.is_fatal());
    }
}
