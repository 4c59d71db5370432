//! Retrying transport for outbound HTTP requests.
//!
//! Every request the scrobbler sends passes through [`Retrying`], which
//! wraps any other [`Transport`] and retries transient failures with
//! exponential backoff and jitter.
//!
//! # Retry rules
//!
//! * `429 Too Many Requests` is retried for any method.
//! * `5xx` responses and transport errors are retried only for idempotent
//!   methods (`GET`, `HEAD`, `OPTIONS`).
//! * Everything else is returned as-is.
//!
//! After `max_retries` additional attempts the last response is returned,
//! even if it is still an error, or the last transport error is.
//!
//! # Backoff
//!
//! For retry `n` (starting at 1) the delay is capped at
//! `min(base_delay * 2^(n-1), max_delay)`. Half of that is fixed, the other
//! half is random, so a delay never exceeds the cap.

use std::{
    io,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::{Method, Request, Response, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Something that can execute an HTTP request.
///
/// Implemented by the [`http::Client`](crate::http::Client) that actually
/// goes on the wire, and by [`Retrying`] that wraps it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn execute(&self, request: Request) -> Result<Response> {
        (**self).execute(request).await
    }
}

/// Bounds and timing of retries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RetryPolicy {
    /// Attempts made in addition to the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Whether repeating a request with this method has the same effect as
    /// sending it once.
    #[must_use]
    pub fn is_idempotent(method: &Method) -> bool {
        *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS
    }

    /// Decides whether an attempt should be repeated.
    ///
    /// `status` is the response status if a response was received;
    /// `io_error` is set when the request failed below HTTP instead.
    #[must_use]
    pub fn should_retry(&self, method: &Method, status: Option<StatusCode>, io_error: bool) -> bool {
        if status == Some(StatusCode::TOO_MANY_REQUESTS) {
            return true;
        }

        if !Self::is_idempotent(method) {
            return false;
        }

        io_error || status.is_some_and(|status| status.is_server_error())
    }

    /// Delay before retry `attempt`, where the first retry is attempt 1.
    ///
    /// In the range `[capped / 2, capped]`.
    #[must_use]
    pub fn delay(&self, attempt: u32, rng: &mut fastrand::Rng) -> Duration {
        let base = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);

        let exponent = attempt.saturating_sub(1);
        let exponential = 2_u64
            .checked_pow(exponent)
            .and_then(|factor| base.checked_mul(factor))
            .unwrap_or(u64::MAX);
        let capped = exponential.min(max);

        let half = capped / 2;
        let jitter = rng.u64(0..=half);
        Duration::from_millis(half + jitter)
    }
}

/// Transport that retries transient failures of another transport.
pub struct Retrying<T> {
    inner: T,
    policy: RetryPolicy,
    rng: Mutex<fastrand::Rng>,
    shutdown: CancellationToken,
}

impl<T> Retrying<T>
where
    T: Transport,
{
    /// Wraps `inner`.
    ///
    /// Cancelling `shutdown` interrupts any backoff in progress; the
    /// interrupted request then fails with a `Cancelled` I/O error.
    #[must_use]
    pub fn new(inner: T, policy: RetryPolicy, shutdown: CancellationToken) -> Self {
        Self {
            inner,
            policy,
            rng: Mutex::new(fastrand::Rng::new()),
            shutdown,
        }
    }

    /// Replaces the jitter source, for example with a seeded generator.
    #[must_use]
    pub fn with_rng(mut self, rng: fastrand::Rng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    fn next_delay(&self, attempt: u32) -> Duration {
        // The generator holds no invariants a panic could have broken.
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        self.policy.delay(attempt, &mut rng)
    }

    async fn backoff(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            () = tokio::time::sleep(delay) => Ok(()),
            () = self.shutdown.cancelled() => Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "retry backoff interrupted",
            )
            .into()),
        }
    }
}

#[async_trait]
impl<T> Transport for Retrying<T>
where
    T: Transport,
{
    async fn execute(&self, mut request: Request) -> Result<Response> {
        let method = request.method().clone();
        let mut attempt = 0;

        loop {
            // Streaming bodies cannot be cloned, and so cannot be retried.
            let spare = if attempt < self.policy.max_retries {
                request.try_clone()
            } else {
                None
            };

            let url = request.url().clone();
            let outcome = self.inner.execute(request).await;

            let retry = match &outcome {
                Ok(response) => self.policy.should_retry(&method, Some(response.status()), false),
                Err(e) if e.is_cancelled() => false,
                Err(_) => self.policy.should_retry(&method, None, true),
            };

            let next = match spare {
                Some(spare) if retry => spare,
                _ => return outcome,
            };

            attempt += 1;
            let delay = self.next_delay(attempt);
            match &outcome {
                Ok(response) => debug!(
                    "{method} {url} returned {}; retry {attempt}/{} in {}ms",
                    response.status(),
                    self.policy.max_retries,
                    delay.as_millis()
                ),
                Err(e) => debug!(
                    "{method} {url} failed: {e}; retry {attempt}/{} in {}ms",
                    self.policy.max_retries,
                    delay.as_millis()
                ),
            }
            drop(outcome);

            self.backoff(delay).await?;
            request = next;
        }
    }
}
