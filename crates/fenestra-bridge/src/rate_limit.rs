//! Sliding-window rate limiting for exposed bridge methods.
//!
//! Each wrapped handler owns one window. Stale timestamps are evicted lazily
//! on every attempt; at capacity the call fails with code −32029 before the
//! wrapped handler is invoked. Access to one handler's window is mutually
//! exclusive across concurrent calls; unrelated handlers are independent.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;

use fenestra_core::{RateLimit, RpcError};

use crate::rpc::MethodHandler;

/// Per-handler sliding-window call budget.
#[derive(Debug)]
pub struct RateLimitWindow {
    limit: RateLimit,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimitWindow {
    /// Create an empty window with the given budget.
    #[must_use]
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Record one call attempt.
    ///
    /// Evicts timestamps older than the window, then either rejects with
    /// [`fenestra_core::codes::RATE_LIMIT_EXCEEDED`] or records the attempt.
    pub fn try_acquire(&self) -> Result<(), RpcError> {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock();

        while timestamps
            .front()
            .is_some_and(|t| now.duration_since(*t) > self.limit.window)
        {
            let _ = timestamps.pop_front();
        }

        if timestamps.len() >= self.limit.max_calls {
            return Err(RpcError::rate_limited());
        }

        timestamps.push_back(now);
        Ok(())
    }
}

/// A handler wrapped with a sliding-window budget.
pub struct RateLimited<H> {
    inner: H,
    window: Arc<RateLimitWindow>,
}

impl<H> RateLimited<H> {
    /// Wrap a handler with the given (possibly shared) window.
    pub fn new(inner: H, window: Arc<RateLimitWindow>) -> Self {
        Self { inner, window }
    }
}

#[async_trait]
impl<H: MethodHandler> MethodHandler for RateLimited<H> {
    async fn handle(&self, params: Option<Value>) -> Result<Value, RpcError> {
        self.window.try_acquire()?;
        self.inner.handle(params).await
    }
}
