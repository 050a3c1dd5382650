//! # Crawler Module
//!
//! Implements the crawl engine: the coordinator loop and the tasks it drives.
//!
//! ## Architecture
//!
//! ```text
//! coordinator --enqueue--> Scheduler (unbounded) --feeder--> Tasks conduit (C)
//!      ^                                                         |
//!      |                                                    W fetch workers
//!      +---------------------- Results conduit (C) <-------------+
//!      |
//!      +--items--> item processor --> sinks
//! ```
//!
//! ## Internal Components
//!
//! These are implementation details and are not typically used directly:
//! - `spawn_downloader_task`: Runs the fixed pool of fetch workers
//! - `process_crawl_outputs`: Routes one parse output back into the pipeline
//! - `spawn_item_processor_task`: Delivers items to the registered sinks
//! - `DownloaderChain`: The ordered middleware stages shared by all workers

mod core;
mod item_processor;
mod middleware_manager;
mod request_handler;
mod response_parser;

pub use self::core::{CrawlOutcome, Crawler};
pub(crate) use item_processor::spawn_item_processor_task;
pub use middleware_manager::DownloaderChain;
pub(crate) use request_handler::spawn_downloader_task;
pub(crate) use response_parser::process_crawl_outputs;
