//! # Middleware Module
//!
//! Request/response interceptors that wrap every network fetch.
//!
//! Stages run in registration order on the way out and in reverse order on
//! the way back. A stage can answer a request itself with
//! [`RequestAction::Respond`], which skips the network call, or suppress a
//! response by returning `None` from `process_response`.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::request::FetchTask;
use crate::response::FetchResult;

/// What a stage decided to do with an outgoing task.
#[derive(Debug)]
pub enum RequestAction {
    /// Hand the (possibly rewritten) task to the next stage.
    Continue(FetchTask),
    /// Answer the task without touching the network.
    Respond(FetchResult),
}

#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn process_request(&self, task: FetchTask) -> RequestAction {
        RequestAction::Continue(task)
    }

    async fn process_response(&self, result: FetchResult) -> Option<FetchResult> {
        Some(result)
    }
}

/// Fills in a user agent on tasks that do not carry one.
pub struct UserAgentMiddleware {
    user_agent: String,
}

impl UserAgentMiddleware {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl Middleware for UserAgentMiddleware {
    fn name(&self) -> &str {
        "user_agent"
    }

    async fn process_request(&self, task: FetchTask) -> RequestAction {
        if task.user_agent().is_some() {
            return RequestAction::Continue(task);
        }
        RequestAction::Continue(task.with_user_agent(self.user_agent.clone()))
    }
}

/// Keeps at least `interval` between consecutive outgoing requests across
/// all workers.
pub struct RateLimitMiddleware {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimitMiddleware {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    async fn reserve_slot(&self) -> Instant {
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        let slot = match *next_slot {
            Some(slot) if slot > now => slot,
            _ => now,
        };
        *next_slot = Some(slot + self.interval);
        slot
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &str {
        "rate_limit"
    }

    async fn process_request(&self, task: FetchTask) -> RequestAction {
        let slot = self.reserve_slot().await;
        if slot > Instant::now() {
            trace!("Delaying request to {} until its rate-limit slot", task.url);
            tokio::time::sleep_until(slot).await;
        }
        RequestAction::Continue(task)
    }
}
