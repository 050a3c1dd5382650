//! Fetch targets flowing from the parser (or the seed) to the worker pool.

use std::collections::BTreeMap;
use url::Url;

/// A single unit of fetch work. Immutable once handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub url: Url,
    /// Caller-supplied request metadata, e.g. `user-agent`.
    pub headers: BTreeMap<String, String>,
}

impl FetchTask {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: BTreeMap::new(),
        }
    }

    /// Parses `uri` into a task.
    pub fn parse(uri: &str) -> Result<Self, url::ParseError> {
        Url::parse(uri).map(Self::new)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_user_agent(self, user_agent: impl Into<String>) -> Self {
        self.with_header("user-agent", user_agent)
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get("user-agent").map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_names_are_case_insensitive() {
        let task = FetchTask::parse("https://www.reddit.com/.json")
            .unwrap()
            .with_header("User-Agent", "spider/1.0");
        assert_eq!(task.user_agent(), Some("spider/1.0"));
        assert_eq!(task.header("USER-AGENT"), Some("spider/1.0"));
    }
}
