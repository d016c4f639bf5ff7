//! Bounded waits.
//!
//! Every suspension point in the adaptation layer goes through a
//! [`Deadline`]: poll, pause, give up with a typed `Timeout`. Nothing waits
//! indefinitely. Timeouts are already scaled for the device by the caller.
//!
//! ## Toyota Way Application
//!
//! - **Jidoka**: Exceeding a bound surfaces as `ProbeError::Timeout`, never a hang
//! - **Muda**: Polling interval is configurable per session

use std::time::Duration;

use tokio::time::Instant;

use crate::engine::{BrowserEngine, ElementHandle};
use crate::locator::Selector;
use crate::result::{ProbeError, ProbeResult};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for element waits (10 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

/// Default polling interval (100ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

// =============================================================================
// OPTIONS
// =============================================================================

/// Options for a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration, never zero
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Start the clock
    #[must_use]
    pub fn start(&self) -> Deadline {
        Deadline {
            started: Instant::now(),
            options: *self,
        }
    }
}

// =============================================================================
// RESULT
// =============================================================================

/// Outcome of a completed wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitResult {
    /// Time spent waiting
    pub elapsed: Duration,
    /// Description of what was waited for
    pub waited_for: String,
}

impl WaitResult {
    /// Create a wait result
    #[must_use]
    pub fn success(elapsed: Duration, waited_for: impl Into<String>) -> Self {
        Self {
            elapsed,
            waited_for: waited_for.into(),
        }
    }
}

// =============================================================================
// DEADLINE
// =============================================================================

/// A started wait: elapsed time, expiry and pacing
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    options: WaitOptions,
}

impl Deadline {
    /// Time since the wait started
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the bound has been reached
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.options.timeout()
    }

    /// Configured bound in milliseconds
    #[must_use]
    pub const fn timeout_ms(&self) -> u64 {
        self.options.timeout_ms
    }

    /// Sleep one poll interval, or less if the deadline is closer
    pub async fn pause(&self) {
        let remaining = self.options.timeout().saturating_sub(self.elapsed());
        tokio::time::sleep(self.options.poll_interval().min(remaining)).await;
    }

    /// Successful result stamped with the elapsed time
    #[must_use]
    pub fn success(&self, waited_for: impl Into<String>) -> WaitResult {
        WaitResult::success(self.elapsed(), waited_for)
    }

    /// Timeout error for this wait
    #[must_use]
    pub fn timeout_error(&self, waited_for: impl Into<String>) -> ProbeError {
        ProbeError::Timeout {
            ms: self.options.timeout_ms,
            waited_for: waited_for.into(),
        }
    }
}

// =============================================================================
// ENGINE WAITS
// =============================================================================

/// Wait until any candidate matches a visible element
pub async fn wait_for_visible<E>(
    engine: &mut E,
    candidates: &[Selector],
    options: WaitOptions,
) -> ProbeResult<ElementHandle>
where
    E: BrowserEngine + ?Sized,
{
    let deadline = options.start();
    loop {
        for selector in candidates {
            if let Some(handle) = engine.first_visible(selector).await? {
                return Ok(handle);
            }
        }
        if deadline.is_expired() {
            let described: Vec<String> = candidates.iter().map(ToString::to_string).collect();
            return Err(deadline.timeout_error(format!("visible element ({})", described.join(" | "))));
        }
        deadline.pause().await;
    }
}

/// Wait until the current URL satisfies the predicate
pub async fn wait_for_url<E, P>(
    engine: &mut E,
    description: &str,
    predicate: P,
    options: WaitOptions,
) -> ProbeResult<WaitResult>
where
    E: BrowserEngine + ?Sized,
    P: Fn(&str) -> bool + Send,
{
    let deadline = options.start();
    loop {
        let url = engine.current_url().await?;
        if predicate(&url) {
            return Ok(deadline.success(description));
        }
        if deadline.is_expired() {
            tracing::warn!(url = %url, waited_for = description, "url wait timed out");
            return Err(deadline.timeout_error(description));
        }
        deadline.pause().await;
    }
}

/// Wait until no candidate is visible
pub async fn wait_for_hidden<E>(
    engine: &mut E,
    candidates: &[Selector],
    options: WaitOptions,
) -> ProbeResult<WaitResult>
where
    E: BrowserEngine + ?Sized,
{
    let deadline = options.start();
    loop {
        let mut visible = false;
        for selector in candidates {
            if engine.any_visible(selector).await? {
                visible = true;
                break;
            }
        }
        if !visible {
            return Ok(deadline.success("indicators hidden"));
        }
        if deadline.is_expired() {
            return Err(deadline.timeout_error("indicators hidden"));
        }
        deadline.pause().await;
    }
}
