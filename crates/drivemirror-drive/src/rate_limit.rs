//! Proactive rate limiting for Drive API calls
//!
//! Drive enforces per-user quotas and answers with 429 or a rate-limit 403
//! when they are exceeded. Each [`EndpointCategory`] gets its own token bucket
//! whose capacity adapts to the provider's feedback.
//!
//! ## Architecture
//!
//! - [`TokenBucket`]: Token bucket for a single category
//! - [`AdaptiveRateLimiter`]: One bucket per category; halves capacity on
//!   throttle and recovers 5% every 100 consecutive successes
//!
//! Retrying is not done here. The limiter only paces requests and the sync
//! engine's retry policy decides what to do with a `RateLimited` error.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use drivemirror_core::config::RateLimitingConfig;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Successes needed before capacity grows again
const RECOVERY_INTERVAL: u64 = 100;

/// Upper bound for a Retry-After expressed as an HTTP date
const MAX_RETRY_AFTER_SECS: i64 = 3600;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// EndpointCategory
// ============================================================================

/// Groups of Drive endpoints sharing a quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointCategory {
    /// `files.list`
    Listing,
    /// `files.get` without media
    Metadata,
    /// `files.get?alt=media`
    Download,
    /// `files.export`
    Export,
}

impl EndpointCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointCategory::Listing => "listing",
            EndpointCategory::Metadata => "metadata",
            EndpointCategory::Download => "download",
            EndpointCategory::Export => "export",
        }
    }
}

// ============================================================================
// TokenBucket
// ============================================================================

#[derive(Debug)]
struct BucketState {
    /// Fractional for smooth refill
    tokens: f64,
    last_refill: Instant,
    effective_capacity: u32,
    successes: u64,
}

/// Token bucket rate limiter for a single endpoint category.
///
/// Starts full. Tokens are consumed one per request and refilled at a
/// constant rate up to the current effective capacity.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    /// Tokens added per second
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
                effective_capacity: capacity,
                successes: 0,
            }),
        }
    }

    fn refill(state: &mut BucketState, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens =
                (state.tokens + elapsed * refill_rate).min(f64::from(state.effective_capacity));
            state.last_refill = now;
        }
    }

    /// Takes one token if available.
    pub fn try_acquire(&self) -> bool {
        let mut state = lock(&self.state);
        Self::refill(&mut state, self.refill_rate);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Estimated wait until one token is available.
    pub fn time_until_available(&self) -> Duration {
        let mut state = lock(&self.state);
        Self::refill(&mut state, self.refill_rate);
        if state.tokens >= 1.0 {
            Duration::ZERO
        } else if self.refill_rate > 0.0 {
            Duration::from_secs_f64((1.0 - state.tokens) / self.refill_rate)
        } else {
            Duration::from_secs(1)
        }
    }

    pub fn available_tokens(&self) -> f64 {
        let mut state = lock(&self.state);
        Self::refill(&mut state, self.refill_rate);
        state.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn effective_capacity(&self) -> u32 {
        lock(&self.state).effective_capacity
    }

    /// Records a successful call. Every [`RECOVERY_INTERVAL`] successes the
    /// effective capacity grows by 5% (at least one token) up to the original.
    pub fn on_success(&self) {
        let mut state = lock(&self.state);
        state.successes += 1;
        if state.successes % RECOVERY_INTERVAL == 0 && state.effective_capacity < self.capacity {
            let old = state.effective_capacity;
            let increase = ((f64::from(old) * 0.05) as u32).max(1);
            state.effective_capacity = (old + increase).min(self.capacity);
            debug!(
                old_capacity = old,
                new_capacity = state.effective_capacity,
                "Adaptive recovery: increasing bucket capacity"
            );
        }
    }

    /// Records a throttle response: halves the effective capacity (minimum 1),
    /// drops excess tokens and resets the success streak.
    pub fn on_throttle(&self) {
        let mut state = lock(&self.state);
        let old = state.effective_capacity;
        state.effective_capacity = (old / 2).max(1);
        state.tokens = state.tokens.min(f64::from(state.effective_capacity));
        state.successes = 0;
        warn!(
            old_capacity = old,
            new_capacity = state.effective_capacity,
            "Throttle detected: reducing bucket capacity by 50%"
        );
    }
}

// ============================================================================
// RateLimitConfig
// ============================================================================

/// Bucket parameters per endpoint category: `(capacity, refill per second)`
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub buckets: HashMap<EndpointCategory, (u32, f64)>,
}

impl RateLimitConfig {
    /// Derives buckets from per-minute budgets; capacity equals one minute of
    /// budget so short bursts are not delayed.
    pub fn from_settings(settings: &RateLimitingConfig) -> Self {
        let per_minute = |n: u32| (n, f64::from(n) / 60.0);
        let mut buckets = HashMap::new();
        buckets.insert(
            EndpointCategory::Listing,
            per_minute(settings.list_requests_per_minute),
        );
        buckets.insert(
            EndpointCategory::Metadata,
            per_minute(settings.list_requests_per_minute),
        );
        buckets.insert(
            EndpointCategory::Download,
            per_minute(settings.download_requests_per_minute),
        );
        buckets.insert(
            EndpointCategory::Export,
            per_minute(settings.export_requests_per_minute),
        );
        Self { buckets }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::from_settings(&RateLimitingConfig::default())
    }
}

// ============================================================================
// AdaptiveRateLimiter
// ============================================================================

/// Adaptive rate limiter holding one bucket per endpoint category.
///
/// Designed to be shared via `Arc<AdaptiveRateLimiter>`.
#[derive(Debug)]
pub struct AdaptiveRateLimiter {
    buckets: HashMap<EndpointCategory, TokenBucket>,
}

impl AdaptiveRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let buckets = config
            .buckets
            .into_iter()
            .map(|(category, (capacity, rate))| (category, TokenBucket::new(capacity, rate)))
            .collect();
        Self { buckets }
    }

    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    /// Waits until a token is available for `category`. Categories without a
    /// configured bucket are not limited.
    pub async fn acquire(&self, category: EndpointCategory) {
        let Some(bucket) = self.buckets.get(&category) else {
            return;
        };
        loop {
            if bucket.try_acquire() {
                return;
            }
            let wait = bucket.time_until_available().max(Duration::from_millis(10));
            debug!(
                endpoint = category.as_str(),
                wait_ms = wait.as_millis() as u64,
                "No tokens available, waiting for refill"
            );
            tokio::time::sleep(wait).await;
        }
    }

    pub fn on_success(&self, category: EndpointCategory) {
        if let Some(bucket) = self.buckets.get(&category) {
            bucket.on_success();
        }
    }

    pub fn on_throttle(&self, category: EndpointCategory) {
        info!(endpoint = category.as_str(), "Recording throttle event");
        if let Some(bucket) = self.buckets.get(&category) {
            bucket.on_throttle();
        }
    }

    pub fn effective_capacity(&self, category: EndpointCategory) -> Option<u32> {
        self.buckets.get(&category).map(TokenBucket::effective_capacity)
    }
}

// ============================================================================
// Retry-After parsing
// ============================================================================

/// Parses a Retry-After header: either delay seconds or an HTTP date.
///
/// Returns `None` when the value is unusable so the caller falls back to
/// its own backoff schedule.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let secs = (date.with_timezone(&chrono::Utc) - chrono::Utc::now()).num_seconds();
        if (0..=MAX_RETRY_AFTER_SECS).contains(&secs) {
            return Some(Duration::from_secs(secs as u64));
        }
    }

    warn!(value, "Could not parse Retry-After header");
    None
}
