//! Token bucket pacing of outbound requests.
use std::{
    fmt,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use futures::{ready, Future};
use parking_lot::Mutex;
use tokio::time::{Instant, Sleep};
use tower::{Layer, Service};

use crate::error::PolicyError;

// Added to every computed wait so float and timer rounding can only make it longer
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Sustained rate and burst capacity of a token bucket.
///
/// The default is one request per second with no burst beyond a single request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateLimitPolicy {
    rate: f64,
    burst: u32,
}

impl RateLimitPolicy {
    /// Create a policy admitting `rate` requests per second with bursts up to `burst`
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] unless `rate` is positive and finite and `burst` is at least 1.
    pub fn new(rate: f64, burst: u32) -> Result<Self, PolicyError> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(PolicyError::InvalidRate(rate));
        }
        if burst == 0 {
            return Err(PolicyError::InvalidBurst(burst));
        }
        Ok(Self { rate, burst })
    }

    /// Permits replenished per second
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Maximum permits the bucket holds
    pub fn burst(&self) -> u32 {
        self.burst
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self { rate: 1.0, burst: 1 }
    }
}

impl fmt::Display for RateLimitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} req/s (burst {})", self.rate, self.burst)
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Permit counter shared by every service built from one [`RateLimitLayer`]
#[derive(Debug)]
pub(crate) struct TokenBucket {
    policy: RateLimitPolicy,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// A full bucket
    pub(crate) fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(BucketState {
                tokens: f64::from(policy.burst),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one permit at `now`, or return how long until the next one accrues
    pub(crate) fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
        let mut state = self.state.lock();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.policy.rate).min(f64::from(self.policy.burst));
        if now > state.last_refill {
            state.last_refill = now;
        }

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - state.tokens) / self.policy.rate) + MIN_WAIT)
        }
    }
}

/// Layer pacing requests through a shared token bucket.
///
/// Requests beyond the burst allowance wait in `poll_ready` until a permit accrues.
/// They are never dropped or failed.
#[derive(Clone)]
pub struct RateLimitLayer {
    bucket: Arc<TokenBucket>,
}

impl RateLimitLayer {
    /// Create a layer with a fresh, full bucket for `policy`
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            bucket: Arc::new(TokenBucket::new(policy)),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimit<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimit {
            inner,
            bucket: self.bucket.clone(),
            state: State::Idle,
        }
    }
}

enum State {
    /// No permit held
    Idle,
    /// Bucket empty, sleeping until the next permit accrues
    Waiting(Pin<Box<Sleep>>),
    /// Permit held for the next `call`
    Acquired,
}

/// Service pacing requests through a shared token bucket. See [`RateLimitLayer`].
pub struct RateLimit<S> {
    inner: S,
    bucket: Arc<TokenBucket>,
    state: State,
}

impl<S: Clone> Clone for RateLimit<S> {
    fn clone(&self) -> Self {
        // permits are per instance, the bucket is shared
        Self {
            inner: self.inner.clone(),
            bucket: self.bucket.clone(),
            state: State::Idle,
        }
    }
}

impl<S, Req> Service<Req> for RateLimit<S>
where
    S: Service<Req>,
{
    type Error = S::Error;
    type Future = S::Future;
    type Response = S::Response;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        loop {
            match &mut self.state {
                State::Acquired => return self.inner.poll_ready(cx),
                State::Waiting(sleep) => {
                    ready!(sleep.as_mut().poll(cx));
                    self.state = State::Idle;
                }
                State::Idle => match self.bucket.try_acquire_at(Instant::now()) {
                    Ok(()) => self.state = State::Acquired,
                    Err(wait) => {
                        tracing::debug!("rate limited, next permit in {}ms", wait.as_millis());
                        self.state = State::Waiting(Box::pin(tokio::time::sleep(wait)));
                    }
                },
            }
        }
    }

    fn call(&mut self, req: Req) -> Self::Future {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Acquired => self.inner.call(req),
            // same contract as every tower service
            _ => panic!("service not ready; poll_ready must be called first"),
        }
    }
}
