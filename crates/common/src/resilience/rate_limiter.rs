//! Token-bucket rate limiter for outbound query pacing.
//!
//! Tokens refill continuously at a fixed rate and are capped at the bucket
//! capacity. Callers ask for admission with [`TokenBucket::consume`]; a
//! rejected call leaves the bucket untouched so the caller can back off and
//! re-attempt the same unit of work.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use super::{Clock, SystemClock};

/// Mutable bucket state, guarded by a single mutex.
#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter.
///
/// One instance paces one outbound client. Cloning shares the underlying
/// state, so clones count against the same budget.
///
/// # Examples
///
/// ```rust
/// use atlas_common::resilience::TokenBucket;
///
/// # fn example() -> Result<(), String> {
/// let limiter = TokenBucket::new(15, 1.0)?;
///
/// if limiter.consume(1) {
///     // admitted, issue the call
/// } else {
///     // rejected, back off and try again
/// }
/// # Ok(())
/// # }
/// ```
pub struct TokenBucket<C: Clock = SystemClock> {
    capacity: f64,
    refill_rate: f64,
    state: Arc<Mutex<BucketState>>,
    clock: Arc<C>,
}

impl<C: Clock> TokenBucket<C> {
    /// Create a token bucket with a custom clock.
    ///
    /// `capacity` is the maximum (and initial) number of tokens;
    /// `refill_rate` is tokens added per second. A zero rate is allowed and
    /// means the bucket never refills.
    pub fn with_clock(capacity: u32, refill_rate: f64, clock: C) -> Result<Self, String> {
        if capacity == 0 {
            return Err("capacity must be greater than 0".to_string());
        }
        if !refill_rate.is_finite() || refill_rate < 0.0 {
            return Err("refill_rate must be a non-negative number".to_string());
        }

        Ok(Self {
            capacity: f64::from(capacity),
            refill_rate,
            state: Arc::new(Mutex::new(BucketState {
                tokens: f64::from(capacity),
                last_refill: clock.now(),
            })),
            clock: Arc::new(clock),
        })
    }

    /// Try to consume `n` tokens.
    ///
    /// Refills the bucket from elapsed time first, then admits the request
    /// if enough tokens remain. Returns `false` without modifying the token
    /// count when the bucket cannot cover `n`. `n == 0` is always admitted;
    /// a negative `n` credits tokens back (capped at capacity), which lets
    /// a caller compensate for over-consumption.
    pub fn consume(&self, n: i64) -> bool {
        let mut state = self.state.lock();

        let now = self.clock.now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;

        if n <= 0 {
            state.tokens = (state.tokens - n as f64).min(self.capacity);
            return true;
        }

        let requested = n as f64;
        if state.tokens >= requested {
            state.tokens -= requested;
            debug!(tokens = state.tokens, requested, "rate limiter admitted request");
            true
        } else {
            debug!(tokens = state.tokens, requested, "rate limiter rejected request");
            false
        }
    }

    /// Current token count after applying pending refill.
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        let now = self.clock.now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;
        state.tokens
    }
}

impl TokenBucket<SystemClock> {
    /// Create a token bucket driven by the system clock.
    pub fn new(capacity: u32, refill_rate: f64) -> Result<Self, String> {
        Self::with_clock(capacity, refill_rate, SystemClock)
    }
}

impl<C: Clock> Clone for TokenBucket<C> {
    fn clone(&self) -> Self {
        Self {
            capacity: self.capacity,
            refill_rate: self.refill_rate,
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
        }
    }
}
