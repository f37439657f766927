// Client-side rate limiter.
// Enforces at most N calls per rolling window of T across all remote
// traffic, sharing one quota between concurrent fetch workers.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{ChatError, Result};

/// GitHub's documented quota for the unauthenticated search-style endpoints
/// the chat repository workload resembles: 30 calls per minute.
pub const DEFAULT_MAX_CALLS: usize = 30;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Rolling-window rate limiter.
///
/// Keeps a log of recent call instants and prunes entries older than the
/// window on each acquire. In blocking mode (the default) a caller over
/// quota sleeps until the oldest call ages out; in fail-fast mode it gets
/// `RateLimited` carrying the computed wait instead.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    fail_fast: bool,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Limiter that blocks callers until capacity frees up.
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            fail_fast: false,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Limiter that surfaces `RateLimited` instead of waiting.
    pub fn fail_fast(max_calls: usize, window: Duration) -> Self {
        Self {
            fail_fast: true,
            ..Self::new(max_calls, window)
        }
    }

    /// Acquire one call slot, waiting (or failing fast) when the window
    /// is saturated.
    pub async fn acquire(&self) -> Result<()> {
        loop {
            let wait = {
                let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
                let now = Instant::now();
                while calls
                    .front()
                    .is_some_and(|&t| now.duration_since(t) >= self.window)
                {
                    calls.pop_front();
                }
                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    return Ok(());
                }
                match calls.front() {
                    Some(&oldest) => self.window.saturating_sub(now.duration_since(oldest)),
                    None => continue,
                }
            };
            if self.fail_fast {
                return Err(ChatError::RateLimited { retry_after: wait });
            }
            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate window saturated");
            tokio::time::sleep(wait).await;
        }
    }
}
