//! # forum-spider
//!
//! A concurrent crawler for forum APIs that expose a tree of
//! listing -> post -> comment documents.
//!
//! The crawl is self-feeding: every fetched document is parsed into follow-up
//! fetch tasks and comment items, and the tasks go back to the same fixed pool
//! of fetch workers. A single coordinator owns the in-flight counter and stops
//! the crawl once every unit it created has been resolved.
//!
//! ## Example
//!
//! ```rust,ignore
//! use forum_spider::{CrawlerBuilder, CrawlerConfig, ForumSpider};
//! use forum_spider::sink::MemorySink;
//!
//! async fn crawl() -> Result<(), forum_spider::CrawlError> {
//!     let config = CrawlerConfig::default();
//!     let sink = MemorySink::new();
//!     let crawler = CrawlerBuilder::new(ForumSpider::from_config(&config)?)
//!         .config(config)
//!         .add_sink(sink.clone())
//!         .build()?;
//!
//!     crawler.start_crawl().await?;
//!     println!("{} comments", sink.len());
//!     Ok(())
//! }
//! ```
//!
//! The binary wraps [`run`], which also installs the Ctrl-C handler and maps
//! the result onto a process exit code.

pub mod builder;
pub mod crawler;
pub mod error;
pub mod item;
pub mod middleware;
pub mod node;
pub mod prelude;
pub mod request;
pub mod response;
pub mod scheduler;
pub mod sink;
pub mod spider;
pub mod state;
pub mod stats;
pub mod transport;

pub use builder::{CrawlerBuilder, CrawlerConfig};
pub use crawler::{CrawlOutcome, Crawler};
pub use error::{CrawlError, TransportError};
pub use item::{Comment, CrawlUnit, ParseOutput, ParsedItem};
pub use request::FetchTask;
pub use response::{FetchOutcome, FetchResult};
pub use scheduler::Scheduler;
pub use spider::{ForumSpider, Spider};

pub use async_trait::async_trait;
pub use tokio;

use tracing::{error, info, warn};

use crate::sink::ConsoleSink;

/// How a call to [`run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Completed,
    Cancelled,
    ConfigurationError,
    InternalError,
}

impl ExitStatus {
    /// The process exit code for this status.
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Completed => 0,
            ExitStatus::InternalError => 1,
            ExitStatus::ConfigurationError => 2,
            ExitStatus::Cancelled => 130,
        }
    }
}

impl From<&CrawlError> for ExitStatus {
    fn from(err: &CrawlError) -> Self {
        match err {
            CrawlError::Configuration(_) => ExitStatus::ConfigurationError,
            _ => ExitStatus::InternalError,
        }
    }
}

/// Crawls from `seed_uri` with `config`, printing comments to stdout.
///
/// Configuration problems are reported before any task is spawned. Ctrl-C
/// cancels the crawl.
pub async fn run(seed_uri: &str, config: CrawlerConfig) -> ExitStatus {
    run_with_sink(seed_uri, config, ConsoleSink::new()).await
}

/// Like [`run`], delivering items to `sink` instead of stdout.
pub async fn run_with_sink<K: sink::ItemSink>(
    seed_uri: &str,
    config: CrawlerConfig,
    sink: K,
) -> ExitStatus {
    let config = CrawlerConfig {
        seed_uri: seed_uri.to_string(),
        ..config
    };

    let crawler = match ForumSpider::from_config(&config).and_then(|spider| {
        CrawlerBuilder::new(spider)
            .config(config)
            .add_sink(sink)
            .build()
    }) {
        Ok(crawler) => crawler,
        Err(e) => {
            error!("Cannot start crawl: {}", e);
            return ExitStatus::from(&e);
        }
    };

    let cancel = crawler.cancellation_token();
    let signal_token = cancel.clone();
    let signal_task = tokio::spawn(async move {
        tokio::select! {
            _ = signal_token.cancelled() => {}
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    info!("Ctrl-C received, initiating graceful shutdown.");
                    signal_token.cancel();
                }
                Err(e) => warn!("Unable to listen for Ctrl-C: {}", e),
            },
        }
    });

    let status = match crawler.start_crawl().await {
        Ok(CrawlOutcome::Completed) => ExitStatus::Completed,
        Ok(CrawlOutcome::Cancelled) => ExitStatus::Cancelled,
        Err(e) => {
            error!("Crawl failed: {}", e);
            ExitStatus::from(&e)
        }
    };

    signal_task.abort();
    status
}
