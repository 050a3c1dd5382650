use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use forum_spider::builder::{DEFAULT_ORIGIN, DEFAULT_SEED_URI, DEFAULT_USER_AGENT};
use forum_spider::sink::ConsoleSink;
use forum_spider::CrawlerConfig;

/// Crawl a forum API from a listing down to every comment.
#[derive(Parser, Debug)]
#[command(name = "forum-spider", version, about)]
struct Cli {
    /// Listing document to start from.
    #[arg(default_value = DEFAULT_SEED_URI)]
    seed_uri: String,

    /// Number of concurrent fetch workers (defaults to the CPU count).
    #[arg(short, long)]
    workers: Option<usize>,

    /// Capacity of the task and result conduits.
    #[arg(short, long, default_value_t = 100)]
    capacity: usize,

    /// Origin prefixed to relative post permalinks.
    #[arg(long, default_value = DEFAULT_ORIGIN)]
    origin: String,

    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Minimum delay between requests in milliseconds.
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,

    /// Print comments as JSON lines.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn config(&self) -> CrawlerConfig {
        let defaults = CrawlerConfig::default();
        CrawlerConfig {
            worker_count: self.workers.unwrap_or(defaults.worker_count),
            conduit_capacity: self.capacity,
            origin_prefix: self.origin.clone(),
            user_agent: self.user_agent.clone(),
            seed_uri: self.seed_uri.clone(),
            request_timeout: Duration::from_secs(self.timeout_secs),
            request_delay: self.delay_ms.map(Duration::from_millis),
            ..defaults
        }
    }
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,forum_spider=debug".into());

    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .try_init()
        .context("failed to install tracing subscriber")
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.json_logs) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    let sink = if cli.json {
        ConsoleSink::json()
    } else {
        ConsoleSink::new()
    };
    let status = forum_spider::run_with_sink(&cli.seed_uri, cli.config(), sink).await;
    std::process::exit(status.code());
}
