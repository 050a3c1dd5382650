//! A "prelude" for users of the `forum-spider` crate.
//!
//! This prelude re-exports the most commonly used traits and structs so that
//! custom spiders, transports, middleware and sinks can be written with a
//! single import.
//!
//! # Example
//!
//! ```
//! use forum_spider::prelude::*;
//! ```

pub use crate::{
    // Core structs
    CrawlOutcome,
    Crawler,
    CrawlerBuilder,
    CrawlerConfig,
    ForumSpider,
    // Core traits
    Spider,
    // Essential re-exports for trait implementation
    async_trait,
};

pub use crate::error::{CrawlError, TransportError};
pub use crate::item::{Comment, CrawlUnit, ParseOutput, ParsedItem};
pub use crate::middleware::{Middleware, RequestAction};
pub use crate::request::FetchTask;
pub use crate::response::{FetchOutcome, FetchResult};
pub use crate::sink::ItemSink;
pub use crate::transport::Transport;
