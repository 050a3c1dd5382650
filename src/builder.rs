//! # Builder Module
//!
//! Provides `CrawlerConfig` and the `CrawlerBuilder`, a fluent API for
//! assembling a `Crawler` from a spider, a transport, middleware stages and
//! item sinks.
//!
//! ## Overview
//!
//! Every knob has a default, so `CrawlerBuilder::new(spider).build()` gives a
//! working crawler that fetches over HTTP and prints items to stdout. Invalid
//! settings are rejected by `build()` with `CrawlError::Configuration` before
//! any task is spawned.
//!
//! ## Example
//!
//! ```rust,ignore
//! use forum_spider::{CrawlerBuilder, ForumSpider, CrawlerConfig};
//! use forum_spider::sink::MemorySink;
//!
//! async fn setup_crawler() -> Result<(), CrawlError> {
//!     let config = CrawlerConfig::default();
//!     let sink = MemorySink::new();
//!     let crawler = CrawlerBuilder::new(ForumSpider::from_config(&config)?)
//!         .config(config)
//!         .worker_count(4)
//!         .conduit_capacity(32)
//!         .add_sink(sink.clone())
//!         .build()?;
//!
//!     crawler.start_crawl().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::crawler::{Crawler, DownloaderChain};
use crate::error::CrawlError;
use crate::middleware::{Middleware, RateLimitMiddleware, UserAgentMiddleware};
use crate::sink::{ConsoleSink, ItemSink};
use crate::spider::Spider;
use crate::stats::StatCollector;
use crate::transport::{ReqwestTransport, Transport};

pub const DEFAULT_ORIGIN: &str = "https://www.reddit.com";
pub const DEFAULT_SEED_URI: &str = "https://www.reddit.com/.json";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; WOW64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/49.0.2623.112 Safari/537.36";

/// Configuration for a crawl.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Number of concurrent fetch workers.
    pub worker_count: usize,
    /// Capacity of the Tasks and Results conduits.
    pub conduit_capacity: usize,
    /// Origin prefixed to relative post permalinks.
    pub origin_prefix: String,
    pub user_agent: String,
    pub seed_uri: String,
    /// Deadline for a single fetch.
    pub request_timeout: Duration,
    /// Deadline for a single item sink submission.
    pub sink_timeout: Duration,
    /// Minimum spacing between outgoing requests, if any.
    pub request_delay: Option<Duration>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        CrawlerConfig {
            worker_count: num_cpus::get(),
            conduit_capacity: 100,
            origin_prefix: DEFAULT_ORIGIN.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            seed_uri: DEFAULT_SEED_URI.to_string(),
            request_timeout: Duration::from_secs(10),
            sink_timeout: Duration::from_secs(5),
            request_delay: None,
        }
    }
}

impl CrawlerConfig {
    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.worker_count == 0 {
            return Err(CrawlError::Configuration(
                "worker_count must be greater than 0.".to_string(),
            ));
        }
        if self.conduit_capacity == 0 {
            return Err(CrawlError::Configuration(
                "conduit_capacity must be greater than 0.".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(CrawlError::Configuration(
                "request_timeout must be greater than 0.".to_string(),
            ));
        }
        if self.sink_timeout.is_zero() {
            return Err(CrawlError::Configuration(
                "sink_timeout must be greater than 0.".to_string(),
            ));
        }
        match Url::parse(&self.origin_prefix) {
            Ok(origin) if matches!(origin.scheme(), "http" | "https") => {}
            _ => {
                return Err(CrawlError::Configuration(format!(
                    "origin_prefix {:?} must be an absolute http(s) origin.",
                    self.origin_prefix
                )))
            }
        }
        Url::parse(&self.seed_uri).map_err(|e| {
            CrawlError::Configuration(format!("seed_uri {:?} is invalid: {}", self.seed_uri, e))
        })?;
        Ok(())
    }
}

pub struct CrawlerBuilder<S: Spider> {
    crawler_config: CrawlerConfig,
    spider: S,
    transport: Option<Arc<dyn Transport>>,
    middlewares: Vec<Box<dyn Middleware>>,
    sinks: Vec<Box<dyn ItemSink>>,
    cancel: Option<CancellationToken>,
}

impl<S: Spider> CrawlerBuilder<S> {
    /// Creates a new `CrawlerBuilder` for a given spider with default settings.
    pub fn new(spider: S) -> Self {
        Self {
            crawler_config: CrawlerConfig::default(),
            spider,
            transport: None,
            middlewares: Vec::new(),
            sinks: Vec::new(),
            cancel: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: CrawlerConfig) -> Self {
        self.crawler_config = config;
        self
    }

    /// Sets the number of concurrent fetch workers.
    pub fn worker_count(mut self, count: usize) -> Self {
        self.crawler_config.worker_count = count;
        self
    }

    /// Sets the capacity of the Tasks and Results conduits.
    pub fn conduit_capacity(mut self, capacity: usize) -> Self {
        self.crawler_config.conduit_capacity = capacity;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.crawler_config.request_timeout = timeout;
        self
    }

    pub fn sink_timeout(mut self, timeout: Duration) -> Self {
        self.crawler_config.sink_timeout = timeout;
        self
    }

    pub fn request_delay(mut self, delay: Duration) -> Self {
        self.crawler_config.request_delay = Some(delay);
        self
    }

    /// Sets a custom transport instead of the default HTTP client.
    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Adds a middleware stage after the ones already registered.
    pub fn add_middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middlewares.push(Box::new(middleware));
        self
    }

    /// Adds an item sink.
    pub fn add_sink<K: ItemSink>(mut self, sink: K) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Uses an externally owned cancel signal.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Validates the configuration and builds the `Crawler`.
    pub fn build(self) -> Result<Crawler<S>, CrawlError> {
        let CrawlerBuilder {
            crawler_config,
            spider,
            transport,
            middlewares,
            mut sinks,
            cancel,
        } = self;

        crawler_config.validate()?;

        if sinks.is_empty() {
            sinks.push(Box::new(ConsoleSink::new()));
        }

        let transport: Arc<dyn Transport> = match transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(crawler_config.request_timeout)?),
        };

        let mut stages: Vec<Box<dyn Middleware>> = Vec::with_capacity(middlewares.len() + 2);
        stages.push(Box::new(UserAgentMiddleware::new(
            crawler_config.user_agent.clone(),
        )));
        if let Some(delay) = crawler_config.request_delay {
            stages.push(Box::new(RateLimitMiddleware::new(delay)));
        }
        stages.extend(middlewares);

        Ok(Crawler::new(
            spider,
            transport,
            DownloaderChain::new(stages),
            sinks,
            crawler_config,
            Arc::new(StatCollector::new()),
            cancel.unwrap_or_default(),
        ))
    }
}
