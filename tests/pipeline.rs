use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::{json, Value};
use tokio::time::timeout;

use forum_spider::sink::MemorySink;
use forum_spider::transport::Transport;
use forum_spider::{
    async_trait, CrawlOutcome, CrawlerBuilder, FetchTask, ForumSpider, ParsedItem,
    TransportError,
};

const ORIGIN: &str = "https://test.local";
const SEED: &str = "https://test.local/.json";

/// Serves a synthetic forum: every page links `fanout` posts until `depth`,
/// and every page below the seed carries a comment with one reply.
struct TreeTransport {
    fanout: usize,
    depth: usize,
    failing_path: Option<&'static str>,
    calls: Arc<AtomicUsize>,
}

impl TreeTransport {
    fn new(fanout: usize, depth: usize) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = Self {
            fanout,
            depth,
            failing_path: None,
            calls: Arc::clone(&calls),
        };
        (transport, calls)
    }

    fn failing_on(mut self, path: &'static str) -> Self {
        self.failing_path = Some(path);
        self
    }

    fn page(&self, id: &str) -> Value {
        let level = if id.is_empty() {
            0
        } else {
            id.split('-').count()
        };

        let posts: Vec<Value> = if level < self.depth {
            (0..self.fanout)
                .map(|k| {
                    let child = if id.is_empty() {
                        k.to_string()
                    } else {
                        format!("{id}-{k}")
                    };
                    json!({
                        "kind": "t3",
                        "data": {
                            "score": 1,
                            "permalink": format!("/p/{child}/"),
                            "author": "poster",
                            "num_comments": 2
                        }
                    })
                })
                .collect()
        } else {
            Vec::new()
        };
        let post_listing = json!({"kind": "Listing", "data": {"children": posts}});

        if level == 0 {
            return post_listing;
        }

        let comments = json!({
            "kind": "Listing",
            "data": {"children": [
                {
                    "kind": "t1",
                    "data": {
                        "score": 5,
                        "author": format!("top-{id}"),
                        "replies": {
                            "kind": "Listing",
                            "data": {"children": [
                                {"kind": "t1", "data": {"score": 2, "author": format!("reply-{id}"), "replies": ""}}
                            ]}
                        }
                    }
                },
                {"kind": "more", "data": {"count": 10}}
            ]}
        });
        json!([post_listing, comments])
    }
}

#[async_trait]
impl Transport for TreeTransport {
    async fn fetch(&self, task: &FetchTask) -> Result<Bytes, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = task.url.path();
        if Some(path) == self.failing_path {
            return Err(TransportError::connection(format!("refused: {}", task.url)));
        }

        let id = path
            .strip_prefix("/p/")
            .and_then(|rest| rest.strip_suffix(".json"))
            .unwrap_or("");
        // Yield so workers interleave.
        tokio::task::yield_now().await;
        Ok(Bytes::from(self.page(id).to_string()))
    }
}

struct HangingTransport;

#[async_trait]
impl Transport for HangingTransport {
    async fn fetch(&self, _task: &FetchTask) -> Result<Bytes, TransportError> {
        std::future::pending().await
    }
}

struct GarbageTransport;

#[async_trait]
impl Transport for GarbageTransport {
    async fn fetch(&self, _task: &FetchTask) -> Result<Bytes, TransportError> {
        Ok(Bytes::from_static(b"<html>not json</html>"))
    }
}

fn spider() -> ForumSpider {
    ForumSpider::new(ORIGIN, "test-agent", SEED).unwrap()
}

fn tree_size(fanout: usize, depth: usize) -> usize {
    (0..=depth).map(|level| fanout.pow(level as u32)).sum()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn smallest_conduits_do_not_deadlock() {
    let (transport, calls) = TreeTransport::new(3, 5);
    let sink = MemorySink::new();
    let crawler = CrawlerBuilder::new(spider())
        .worker_count(2)
        .conduit_capacity(1)
        .transport(transport)
        .add_sink(sink.clone())
        .build()
        .unwrap();
    let stats = crawler.get_stats();
    let state = crawler.state();

    let outcome = timeout(Duration::from_secs(30), crawler.start_crawl())
        .await
        .expect("crawl deadlocked")
        .unwrap();

    let pages = tree_size(3, 5);
    assert_eq!(pages, 364);
    assert_eq!(outcome, CrawlOutcome::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), pages);
    assert_eq!(stats.requests_succeeded.load(Ordering::SeqCst), pages);
    assert!(state.is_idle());

    // Two comments on every page except the seed, none lost on the way out.
    assert_eq!(sink.len(), (pages - 1) * 2);
    assert_eq!(stats.items_delivered.load(Ordering::SeqCst), (pages - 1) * 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_comment_reaches_the_sink_once() {
    let (transport, _) = TreeTransport::new(2, 3);
    let sink = MemorySink::new();
    let crawler = CrawlerBuilder::new(spider())
        .worker_count(4)
        .conduit_capacity(8)
        .transport(transport)
        .add_sink(sink.clone())
        .build()
        .unwrap();

    let outcome = timeout(Duration::from_secs(10), crawler.start_crawl())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome, CrawlOutcome::Completed);

    let mut authors: Vec<String> = sink
        .items()
        .into_iter()
        .map(|item| match item {
            ParsedItem::Comment(c) => c.author,
        })
        .collect();
    authors.sort();
    let before = authors.len();
    authors.dedup();

    assert_eq!(before, authors.len());
    assert_eq!(authors.len(), (tree_size(2, 3) - 1) * 2);
    assert!(authors.contains(&"top-1-0-1".to_string()));
    assert!(authors.contains(&"reply-1-0-1".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_fetch_only_loses_its_own_subtree() {
    let (transport, calls) = TreeTransport::new(2, 3);
    let sink = MemorySink::new();
    let crawler = CrawlerBuilder::new(spider())
        .worker_count(2)
        .conduit_capacity(2)
        .transport(transport.failing_on("/p/1.json"))
        .add_sink(sink.clone())
        .build()
        .unwrap();
    let stats = crawler.get_stats();

    let outcome = timeout(Duration::from_secs(10), crawler.start_crawl())
        .await
        .unwrap()
        .unwrap();

    // 15 pages in the tree; the failing page hides the 6 below it.
    assert_eq!(outcome, CrawlOutcome::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 9);
    assert_eq!(stats.requests_failed.load(Ordering::SeqCst), 1);
    assert_eq!(stats.requests_succeeded.load(Ordering::SeqCst), 8);
    assert_eq!(sink.len(), 14);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn undecodable_seed_completes_with_no_items() {
    let sink = MemorySink::new();
    let crawler = CrawlerBuilder::new(spider())
        .worker_count(1)
        .conduit_capacity(1)
        .transport(GarbageTransport)
        .add_sink(sink.clone())
        .build()
        .unwrap();
    let stats = crawler.get_stats();

    let outcome = timeout(Duration::from_secs(5), crawler.start_crawl())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome, CrawlOutcome::Completed);
    assert!(sink.is_empty());
    assert_eq!(stats.decode_failures.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_stops_a_stuck_crawl() {
    let crawler = CrawlerBuilder::new(spider())
        .worker_count(2)
        .conduit_capacity(1)
        .transport(HangingTransport)
        .add_sink(MemorySink::new())
        .build()
        .unwrap();
    let cancel = crawler.cancellation_token();
    let state = crawler.state();

    let handle = tokio::spawn(crawler.start_crawl());
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let outcome = timeout(Duration::from_secs(5), handle)
        .await
        .expect("cancelled crawl did not stop")
        .unwrap()
        .unwrap();

    assert_eq!(outcome, CrawlOutcome::Cancelled);
    assert_eq!(state.in_flight(), 1);
}
