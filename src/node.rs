//! # Node Module
//!
//! Decoding of fetched documents into kind-tagged tree nodes.
//!
//! A document is either a single node object or a sequence of node objects.
//! Every node has the shape `{"kind": <tag>, "data": {...}}`; the tag selects
//! how `data` is interpreted:
//!
//! | tag       | kind           |
//! |-----------|----------------|
//! | `Listing` | `Listing`      |
//! | `t3`      | `Post`         |
//! | `t1`      | `Comment`      |
//! | `more`    | `Continuation` |
//!
//! Recognized kinds must carry all of their required fields; a missing or
//! mistyped field rejects the node with [`CrawlError::Structural`] instead of
//! producing zero values.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::CrawlError;
use crate::item::Comment;

/// Generic structured-data decode of a raw document body.
pub trait DocumentDecoder: Send + Sync + 'static {
    fn decode(&self, body: &[u8]) -> Result<Value, CrawlError>;
}

/// Decodes JSON bodies of any nesting depth.
///
/// Reply chains nest several levels per comment, so the parser's recursion
/// limit is lifted and the stack is grown on the heap as the decoder descends.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl DocumentDecoder for JsonDecoder {
    fn decode(&self, body: &[u8]) -> Result<Value, CrawlError> {
        let mut de = serde_json::Deserializer::from_slice(body);
        de.disable_recursion_limit();
        let value = Value::deserialize(serde_stacker::Deserializer::new(&mut de))?;
        if let Err(e) = de.end() {
            release(value);
            return Err(e.into());
        }
        Ok(value)
    }
}

/// Drops a value without recursing into it.
///
/// `Value`'s own destructor recurses once per nesting level.
pub fn release(value: Value) {
    let mut stack = vec![value];
    while let Some(value) = stack.pop() {
        match value {
            Value::Array(items) => stack.extend(items),
            Value::Object(fields) => stack.extend(fields.into_iter().map(|(_, v)| v)),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Listing,
    Post,
    Comment,
    /// A "load more" marker.
    Continuation,
    Unknown(String),
}

impl NodeKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Listing" => NodeKind::Listing,
            "t3" => NodeKind::Post,
            "t1" => NodeKind::Comment,
            "more" => NodeKind::Continuation,
            other => NodeKind::Unknown(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            NodeKind::Listing => "Listing",
            NodeKind::Post => "t3",
            NodeKind::Comment => "t1",
            NodeKind::Continuation => "more",
            NodeKind::Unknown(tag) => tag,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A post: always followed up by a fetch of its comment page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub score: i64,
    pub permalink: String,
    pub author: String,
    #[serde(rename = "num_comments")]
    pub comment_count: i64,
}

const POST_FIELDS: &[&str] = &["score", "permalink", "author", "num_comments"];
const COMMENT_FIELDS: &[&str] = &["score", "author"];

/// A decoded, kind-tagged tree node.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNode {
    pub kind: NodeKind,
    pub data: Map<String, Value>,
}

impl ParsedNode {
    pub fn new(kind: NodeKind, data: Map<String, Value>) -> Self {
        Self { kind, data }
    }

    /// Builds a node from a raw `{"kind", "data"}` object.
    pub fn from_value(value: Value) -> Result<Self, CrawlError> {
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                let found = value_type(&other);
                release(other);
                return Err(CrawlError::Decode(format!(
                    "expected a node object, found {found}"
                )));
            }
        };
        let kind = object.remove("kind");
        let data = object.remove("data");
        release(Value::Object(object));

        let kind = match kind {
            Some(Value::String(tag)) => NodeKind::from_tag(&tag),
            other => {
                let found = other.as_ref().map_or("nothing", value_type);
                data.into_iter().chain(other).for_each(release);
                return Err(CrawlError::Structural(format!(
                    "node \"kind\" must be a string, found {found}"
                )));
            }
        };

        match data {
            Some(Value::Object(data)) => Ok(Self { kind, data }),
            other => {
                let found = other.as_ref().map_or("nothing", value_type);
                other.into_iter().for_each(release);
                Err(CrawlError::Structural(format!(
                    "{kind} node \"data\" must be an object, found {found}"
                )))
            }
        }
    }

    /// Removes and returns the raw child nodes of a listing.
    pub fn take_children(&mut self) -> Result<Vec<Value>, CrawlError> {
        match self.data.remove("children") {
            Some(Value::Array(children)) => Ok(children),
            Some(other) => {
                let found = value_type(&other);
                release(other);
                Err(CrawlError::Structural(format!(
                    "{} \"children\" must be a sequence, found {found}",
                    self.kind
                )))
            }
            None => Err(CrawlError::Structural(format!(
                "{} node has no \"children\"",
                self.kind
            ))),
        }
    }

    /// Removes the nested reply subtree of a comment, if it has one.
    ///
    /// Comments without replies carry an empty string or null in this slot;
    /// anything that is not an object counts as absent.
    pub fn take_replies(&mut self) -> Option<Value> {
        match self.data.remove("replies") {
            Some(replies @ Value::Object(_)) => Some(replies),
            other => {
                other.into_iter().for_each(release);
                None
            }
        }
    }

    pub fn into_post(self) -> Result<Post, CrawlError> {
        self.extract(POST_FIELDS)
    }

    pub fn into_comment(self) -> Result<Comment, CrawlError> {
        self.extract(COMMENT_FIELDS)
    }

    /// Deserializes only `fields`; everything else in `data` is released
    /// with the node.
    fn extract<T: DeserializeOwned>(mut self, fields: &[&str]) -> Result<T, CrawlError> {
        let mut picked = Map::new();
        for field in fields {
            if let Some(value) = self.data.remove(*field) {
                picked.insert((*field).to_string(), value);
            }
        }
        let picked = Value::Object(picked);
        let extracted = T::deserialize(&picked)
            .map_err(|e| CrawlError::Structural(format!("{} node: {e}", self.kind)));
        release(picked);
        extracted
    }
}

impl Drop for ParsedNode {
    fn drop(&mut self) {
        if !self.data.is_empty() {
            release(Value::Object(std::mem::take(&mut self.data)));
        }
    }
}

/// Splits a decoded document into its top-level nodes.
///
/// A sequence is decoded element-wise and each element keeps its own result,
/// so one malformed element does not hide its siblings. A single object that
/// is not a valid node fails the whole document.
pub fn split_document(raw: Value) -> Result<Vec<Result<ParsedNode, CrawlError>>, CrawlError> {
    match raw {
        Value::Array(elements) => Ok(elements.into_iter().map(ParsedNode::from_value).collect()),
        object @ Value::Object(_) => Ok(vec![Ok(ParsedNode::from_value(object)?)]),
        other => Err(CrawlError::Decode(format!(
            "expected an object or a sequence of objects, found {}",
            value_type(&other)
        ))),
    }
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "an object",
    }
}
