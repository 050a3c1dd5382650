//! Outcomes of running a [`FetchTask`] through the downloader chain.

use bytes::Bytes;

use crate::error::TransportError;
use crate::request::FetchTask;

/// What happened to a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The raw document body.
    Document(Bytes),
    Failure(TransportError),
    /// A middleware stage suppressed the fetch or its response.
    Dropped,
}

/// The result of one fetch, tied back to the task that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub task: FetchTask,
    pub outcome: FetchOutcome,
}

impl FetchResult {
    pub fn document(task: FetchTask, body: impl Into<Bytes>) -> Self {
        Self {
            task,
            outcome: FetchOutcome::Document(body.into()),
        }
    }

    pub fn failure(task: FetchTask, error: TransportError) -> Self {
        Self {
            task,
            outcome: FetchOutcome::Failure(error),
        }
    }

    pub fn dropped(task: FetchTask) -> Self {
        Self {
            task,
            outcome: FetchOutcome::Dropped,
        }
    }

    pub fn is_document(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Document(_))
    }

    /// Size of the document body, zero for failures and drops.
    pub fn body_len(&self) -> usize {
        match &self.outcome {
            FetchOutcome::Document(body) => body.len(),
            _ => 0,
        }
    }
}
