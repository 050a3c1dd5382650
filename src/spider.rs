//! # Spider Module
//!
//! Defines the `Spider` trait and `ForumSpider`, the parser for forum APIs that
//! expose nested listing -> post -> comment trees.
//!
//! ## Overview
//!
//! A spider seeds the crawl through `start_requests` and turns each
//! `FetchResult` into a `ParseOutput`: follow-up `FetchTask`s, terminal
//! `ParsedItem`s, and recoverable diagnostics. Parsing is a pure function of
//! the result; the coordinator owns all pipeline state.
//!
//! ## Traversal
//!
//! `ForumSpider` walks the node tree with an explicit work stack instead of
//! native recursion, so arbitrarily deep reply chains cannot overflow the call
//! stack. Children are pushed in reverse so units come out in document order:
//!
//! - **Listing**: its `children` are walked in sequence order.
//! - **Post** (`t3`): emits one `FetchTask` for the normalized permalink.
//! - **Comment** (`t1`): emits one item, then walks its `replies` subtree.
//! - **Continuation** (`more`): ignored, pagination is not followed.
//! - **Unknown**: reported as a diagnostic.
//!
//! A node that fails to decode is reported and skipped; its siblings are
//! still processed.
//!
//! ## Example
//!
//! ```rust,ignore
//! use forum_spider::{CrawlerConfig, ForumSpider, Spider};
//!
//! let spider = ForumSpider::from_config(&CrawlerConfig::default())?;
//! let output = spider.parse(fetch_result);
//! for task in output.tasks() {
//!     println!("follow {}", task.url);
//! }
//! ```

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;

use crate::builder::CrawlerConfig;
use crate::error::CrawlError;
use crate::item::{ParseOutput, ParsedItem};
use crate::node::{split_document, DocumentDecoder, JsonDecoder, NodeKind, ParsedNode, Post};
use crate::request::FetchTask;
use crate::response::{FetchOutcome, FetchResult};

/// Defines the contract for a crawl parser.
pub trait Spider: Send + Sync + 'static {
    /// Generates the initial requests to start crawling.
    fn start_requests(&self) -> Result<Vec<FetchTask>, CrawlError>;

    /// Turns one fetch result into follow-up work, items and diagnostics.
    fn parse(&self, result: FetchResult) -> ParseOutput;
}

/// Parser for listing/post/comment trees.
pub struct ForumSpider {
    origin: String,
    user_agent: String,
    seed: Url,
    decoder: Arc<dyn DocumentDecoder>,
}

impl ForumSpider {
    pub fn new(
        origin: impl Into<String>,
        user_agent: impl Into<String>,
        seed_uri: &str,
    ) -> Result<Self, CrawlError> {
        let origin = origin.into();
        let parsed_origin = Url::parse(&origin).map_err(|e| {
            CrawlError::Configuration(format!("origin_prefix {origin:?} is not a URI: {e}"))
        })?;
        if !matches!(parsed_origin.scheme(), "http" | "https") {
            return Err(CrawlError::Configuration(format!(
                "origin_prefix {origin:?} must be an http(s) origin"
            )));
        }
        let seed = Url::parse(seed_uri).map_err(|e| {
            CrawlError::Configuration(format!("seed_uri {seed_uri:?} is not a URI: {e}"))
        })?;

        Ok(Self {
            origin: origin.trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
            seed,
            decoder: Arc::new(JsonDecoder),
        })
    }

    pub fn from_config(config: &CrawlerConfig) -> Result<Self, CrawlError> {
        Self::new(
            config.origin_prefix.clone(),
            config.user_agent.clone(),
            &config.seed_uri,
        )
    }

    /// Replaces the document decoder.
    pub fn with_decoder<D: DocumentDecoder>(mut self, decoder: D) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Parses an already-decoded document.
    pub fn parse_value(&self, raw: Value) -> ParseOutput {
        match split_document(raw) {
            Ok(roots) => self.walk(roots),
            Err(e) => ParseOutput::diagnostic(e),
        }
    }

    /// Dispatches already-built nodes in order.
    pub fn parse_nodes(&self, nodes: impl IntoIterator<Item = ParsedNode>) -> ParseOutput {
        self.walk(nodes.into_iter().map(Ok).collect())
    }

    fn walk(&self, roots: Vec<Result<ParsedNode, CrawlError>>) -> ParseOutput {
        let mut output = ParseOutput::new();
        let mut stack: Vec<Result<ParsedNode, CrawlError>> = roots;
        stack.reverse();

        while let Some(entry) = stack.pop() {
            let mut node = match entry {
                Ok(node) => node,
                Err(e) => {
                    output.add_diagnostic(e);
                    continue;
                }
            };

            let kind = node.kind.clone();
            match kind {
                NodeKind::Listing => match node.take_children() {
                    Ok(children) => {
                        stack.extend(children.into_iter().rev().map(ParsedNode::from_value));
                    }
                    Err(e) => output.add_diagnostic(e),
                },
                NodeKind::Post => match node.into_post().and_then(|post| self.follow(post)) {
                    Ok(task) => output.add_task(task),
                    Err(e) => output.add_diagnostic(e),
                },
                NodeKind::Comment => {
                    let replies = node.take_replies();
                    match node.into_comment() {
                        Ok(comment) => output.add_item(ParsedItem::Comment(comment)),
                        Err(e) => output.add_diagnostic(e),
                    }
                    // Replies are walked even when their parent is rejected.
                    if let Some(replies) = replies {
                        stack.push(ParsedNode::from_value(replies));
                    }
                }
                NodeKind::Continuation => {
                    trace!("Ignoring continuation marker");
                }
                NodeKind::Unknown(tag) => {
                    output.add_diagnostic(CrawlError::Decode(format!(
                        "unknown node kind {tag:?}"
                    )));
                }
            }
        }

        output
    }

    fn follow(&self, post: Post) -> Result<FetchTask, CrawlError> {
        if !has_path(&post.permalink) {
            return Err(CrawlError::Structural(format!(
                "t3 node by {} has no permalink path: {:?}",
                post.author, post.permalink
            )));
        }
        let link = normalize_permalink(&self.origin, &post.permalink);
        debug!(
            author = %post.author,
            score = post.score,
            comments = post.comment_count,
            "Found post {}",
            link
        );
        let url = Url::parse(&link)?;
        Ok(FetchTask::new(url).with_user_agent(self.user_agent.clone()))
    }
}

impl Spider for ForumSpider {
    fn start_requests(&self) -> Result<Vec<FetchTask>, CrawlError> {
        Ok(vec![
            FetchTask::new(self.seed.clone()).with_user_agent(self.user_agent.clone())
        ])
    }

    fn parse(&self, result: FetchResult) -> ParseOutput {
        match result.outcome {
            FetchOutcome::Document(body) => match self.decoder.decode(&body) {
                Ok(raw) => self.parse_value(raw),
                Err(e) => ParseOutput::diagnostic(e),
            },
            FetchOutcome::Failure(e) => ParseOutput::diagnostic(CrawlError::Transport(e)),
            FetchOutcome::Dropped => {
                trace!("Fetch of {} was dropped by middleware", result.task.url);
                ParseOutput::new()
            }
        }
    }
}

/// Turns a post permalink into the absolute URI of its API document.
///
/// Relative links get `origin` prefixed; a trailing-slash page link becomes
/// the `.json` document form. Normalizing an already normalized link is a
/// no-op.
pub fn normalize_permalink(origin: &str, permalink: &str) -> String {
    let origin = origin.trim_end_matches('/');
    let mut link = if permalink.starts_with("https://") || permalink.starts_with("http://") {
        permalink.to_string()
    } else if permalink.starts_with('/') {
        format!("{origin}{permalink}")
    } else {
        format!("{origin}/{permalink}")
    };

    if !link.ends_with(".json") {
        let len = link.trim_end_matches('/').len();
        link.truncate(len);
        link.push_str(".json");
    }
    link
}

/// Whether `permalink` names anything below the origin root.
fn has_path(permalink: &str) -> bool {
    let path = match permalink
        .strip_prefix("https://")
        .or_else(|| permalink.strip_prefix("http://"))
    {
        Some(rest) => rest.split_once('/').map_or("", |(_, path)| path),
        None => permalink,
    };
    !path.trim_matches('/').is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::item::{Comment, CrawlUnit};
    use serde_json::{json, Map};

    const ORIGIN: &str = "https://www.reddit.com";

    fn spider() -> ForumSpider {
        ForumSpider::new(ORIGIN, "test-agent", "https://www.reddit.com/.json").unwrap()
    }

    fn seed_task() -> FetchTask {
        FetchTask::parse("https://www.reddit.com/.json").unwrap()
    }

    fn document(value: Value) -> FetchResult {
        FetchResult::document(seed_task(), serde_json::to_vec(&value).unwrap())
    }

    // Built field by field so nesting the fixtures never recurses.
    fn node(kind: &str, data: Map<String, Value>) -> Value {
        let mut node = Map::new();
        node.insert("kind".into(), Value::String(kind.into()));
        node.insert("data".into(), Value::Object(data));
        Value::Object(node)
    }

    fn comment(score: i64, author: &str, replies: Value) -> Value {
        let mut data = Map::new();
        data.insert("score".into(), Value::from(score));
        data.insert("author".into(), Value::String(author.into()));
        data.insert("replies".into(), replies);
        node("t1", data)
    }

    fn listing(children: Vec<Value>) -> Value {
        let mut data = Map::new();
        data.insert("children".into(), Value::Array(children));
        node("Listing", data)
    }

    fn post(permalink: &str, author: &str) -> Value {
        json!({"kind": "t3", "data": {
            "score": 1,
            "permalink": permalink,
            "author": author,
            "num_comments": 0
        }})
    }

    #[test]
    fn normalizes_relative_trailing_slash_permalink() {
        assert_eq!(
            normalize_permalink(ORIGIN, "/r/x/comments/1/"),
            "https://www.reddit.com/r/x/comments/1.json"
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        for link in [
            "/r/x/comments/1/",
            "/r/x/comments/1",
            "r/x/comments/1/",
            "http://www.reddit.com/r/x/comments/2/",
            "https://www.reddit.com/r/x/comments/3.json",
        ] {
            let once = normalize_permalink(ORIGIN, link);
            assert_eq!(normalize_permalink(ORIGIN, &once), once, "{link}");
            assert!(once.ends_with(".json"));
        }
    }

    #[test]
    fn normalization_keeps_http_origin_links() {
        assert_eq!(
            normalize_permalink(ORIGIN, "http://www.reddit.com/r/y/comments/9/"),
            "http://www.reddit.com/r/y/comments/9.json"
        );
    }

    #[test]
    fn origin_with_trailing_slash_is_trimmed() {
        assert_eq!(
            normalize_permalink("https://example.org/", "/r/z/comments/4/"),
            "https://example.org/r/z/comments/4.json"
        );
    }

    #[test]
    fn listing_with_post_and_more_yields_one_task() {
        let doc = listing(vec![
            json!({"kind": "t3", "data": {
                "score": 5,
                "permalink": "/r/a/comments/1/",
                "author": "amy",
                "num_comments": 3
            }}),
            json!({"kind": "more", "data": {"count": 10, "children": ["abc"]}}),
        ]);

        let output = spider().parse(document(doc));

        let tasks: Vec<_> = output.tasks().collect();
        assert_eq!(tasks.len(), 1);
        assert_eq!(
            tasks[0].url.as_str(),
            "https://www.reddit.com/r/a/comments/1.json"
        );
        assert_eq!(tasks[0].user_agent(), Some("test-agent"));
        assert_eq!(output.items().count(), 0);
        assert!(output.diagnostics().is_empty());
    }

    #[test]
    fn comment_without_replies_yields_one_item() {
        let doc = json!({"kind": "t1", "data": {"score": 10, "author": "bob"}});
        let output = spider().parse(document(doc));

        assert_eq!(
            output.units(),
            &[CrawlUnit::Item(ParsedItem::Comment(Comment {
                score: 10,
                author: "bob".into()
            }))]
        );
        assert!(output.diagnostics().is_empty());
    }

    #[test]
    fn structural_failure_does_not_stop_siblings() {
        let doc = listing(vec![
            json!({"kind": "t3", "data": {"score": 1, "author": "nolink", "num_comments": 0}}),
            json!({"kind": "t3", "data": {
                "score": 2,
                "permalink": "/r/b/comments/2/",
                "author": "ok",
                "num_comments": 0
            }}),
            comment(7, "carol", json!("")),
        ]);

        let output = spider().parse(document(doc));

        assert_eq!(output.tasks().count(), 1);
        assert_eq!(output.items().count(), 1);
        assert_eq!(output.diagnostics().len(), 1);
        assert!(matches!(output.diagnostics()[0], CrawlError::Structural(_)));
    }

    #[test]
    fn units_follow_document_order() {
        // Comment page: [post listing, comment listing] with nested replies.
        let doc = json!([
            listing(vec![json!({"kind": "t3", "data": {
                "score": 1, "permalink": "/r/c/comments/3/", "author": "op", "num_comments": 3
            }})]),
            listing(vec![
                comment(1, "a", listing(vec![
                    comment(2, "a.1", listing(vec![comment(3, "a.1.1", json!(""))])),
                    comment(4, "a.2", json!("")),
                ])),
                comment(5, "b", json!("")),
            ]),
        ]);

        let output = spider().parse(document(doc));

        assert!(matches!(output.units()[0], CrawlUnit::Fetch(_)));
        let authors: Vec<_> = output
            .items()
            .map(|ParsedItem::Comment(c)| c.author.as_str())
            .collect();
        assert_eq!(authors, ["a", "a.1", "a.1.1", "a.2", "b"]);
    }

    #[test]
    fn deeply_nested_replies_do_not_overflow() {
        let depth = 20_000;
        let mut tree = comment(0, "leaf", json!(""));
        for level in 1..depth {
            tree = comment(level, "reply", listing(vec![tree]));
        }

        let output = spider().parse_value(tree);

        assert_eq!(output.items().count(), depth as usize);
        assert!(output.diagnostics().is_empty());
    }

    #[test]
    fn deep_reply_chain_survives_decoding() {
        let depth = 5_000;
        let mut body = String::new();
        for level in 1..depth {
            body.push_str(&format!(
                r#"{{"kind":"t1","data":{{"score":{level},"author":"reply","replies":{{"kind":"Listing","data":{{"children":["#
            ));
        }
        body.push_str(r#"{"kind":"t1","data":{"score":0,"author":"leaf","replies":""}}"#);
        for _ in 1..depth {
            body.push_str("]}}}}");
        }

        let output = spider().parse(FetchResult::document(seed_task(), body.into_bytes()));

        assert!(output.diagnostics().is_empty());
        assert_eq!(output.items().count(), depth);
        assert!(matches!(
            output.items().last(),
            Some(ParsedItem::Comment(c)) if c.author == "leaf"
        ));
    }

    #[test]
    fn post_without_permalink_path_is_structural() {
        for bad in ["", "/", "https://www.reddit.com/", "http://www.reddit.com"] {
            let doc = listing(vec![post(bad, "rootless"), post("/r/d/comments/5/", "ok")]);

            let output = spider().parse(document(doc));

            let tasks: Vec<_> = output.tasks().collect();
            assert_eq!(tasks.len(), 1, "{bad:?}");
            assert_eq!(
                tasks[0].url.as_str(),
                "https://www.reddit.com/r/d/comments/5.json"
            );
            assert!(
                matches!(output.diagnostics(), [CrawlError::Structural(m)] if m.contains("rootless")),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn permalink_path_detection() {
        assert!(has_path("/r/x/comments/1/"));
        assert!(has_path("r/x"));
        assert!(has_path("https://www.reddit.com/r/x/comments/1.json"));
        assert!(!has_path(""));
        assert!(!has_path("//"));
        assert!(!has_path("https://www.reddit.com"));
    }

    #[test]
    fn transport_failure_is_diagnostic_only() {
        let result = FetchResult::failure(seed_task(), TransportError::timeout("slow"));
        let output = spider().parse(result);
        assert!(output.units().is_empty());
        assert!(matches!(
            output.diagnostics(),
            [CrawlError::Transport(TransportError { timeout: true, .. })]
        ));
    }

    #[test]
    fn dropped_result_yields_nothing() {
        let output = spider().parse(FetchResult::dropped(seed_task()));
        assert!(output.units().is_empty());
        assert!(output.diagnostics().is_empty());
    }

    #[test]
    fn malformed_document_is_decode_failure() {
        let result = FetchResult::document(seed_task(), &b"<html>rate limited</html>"[..]);
        let output = spider().parse(result);
        assert!(output.units().is_empty());
        assert!(matches!(output.diagnostics(), [CrawlError::Decode(_)]));
    }

    #[test]
    fn unknown_kind_is_reported_and_skipped() {
        let doc = listing(vec![
            json!({"kind": "t5", "data": {}}),
            comment(3, "dan", json!("")),
        ]);
        let output = spider().parse(document(doc));
        assert_eq!(output.items().count(), 1);
        assert!(matches!(output.diagnostics(), [CrawlError::Decode(m)] if m.contains("t5")));
    }

    #[test]
    fn replies_of_rejected_comment_are_still_walked() {
        let doc = json!({"kind": "t1", "data": {
            "author": "no-score",
            "replies": listing(vec![comment(1, "child", json!(""))])
        }});
        let output = spider().parse(document(doc));
        assert_eq!(output.items().count(), 1);
        assert_eq!(output.diagnostics().len(), 1);
    }

    #[test]
    fn start_requests_seeds_one_task() {
        let tasks = spider().start_requests().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].url.as_str(), "https://www.reddit.com/.json");
        assert_eq!(tasks[0].user_agent(), Some("test-agent"));
    }

    #[test]
    fn rejects_non_http_origin() {
        assert!(matches!(
            ForumSpider::new("ftp://files.example", "ua", "https://www.reddit.com/.json"),
            Err(CrawlError::Configuration(_))
        ));
    }
}
