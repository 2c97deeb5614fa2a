//! Bounded exponential-backoff retry loop driven by the shared classifier.
//!
//! Only `network`, `timeout`, and `server` failures are retried. Authentication failures
//! belong to the recovery path and client errors are not transient, so both surface after a
//! single attempt. The final error always carries the attempt count and elapsed time.

// std
use std::time::Instant;
// self
use crate::{
	_prelude::*,
	classify::{ErrorCategory, FailureDescriptor, classify},
	config::millis,
	error::{ConfigError, RequestError, TransportError},
	executor::RequestContext,
	obs::{self, EventJournal, LogCategory},
};

/// Retry settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	/// Total attempts, including the first one.
	pub max_attempts: u32,
	/// Delay before the second attempt; doubled for every further attempt.
	#[serde(rename = "base_delay_ms", with = "millis")]
	pub base_delay: Duration,
	/// Upper bound for the exponential delay (jitter excluded).
	#[serde(rename = "max_delay_ms", with = "millis")]
	pub max_delay: Duration,
	/// Random extra delay as a fraction of the computed delay, within `[0, 1]`.
	pub jitter_ratio: f64,
}
impl RetryPolicy {
	/// Overrides the attempt bound.
	pub fn with_max_attempts(mut self, attempts: u32) -> Self {
		self.max_attempts = attempts;

		self
	}

	/// Overrides the base delay.
	pub fn with_base_delay(mut self, delay: Duration) -> Self {
		self.base_delay = delay;

		self
	}

	/// Overrides the delay cap.
	pub fn with_max_delay(mut self, delay: Duration) -> Self {
		self.max_delay = delay;

		self
	}

	/// Overrides the jitter ratio.
	pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
		self.jitter_ratio = ratio;

		self
	}

	/// Policy that performs exactly one attempt.
	pub fn no_retries() -> Self {
		Self::default().with_max_attempts(1)
	}

	/// Rejects settings the retry loop cannot honor.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_attempts == 0 {
			return Err(ConfigError::ZeroAttempts);
		}
		if self.base_delay.is_negative() {
			return Err(ConfigError::NegativeDuration { field: "retry.base_delay" });
		}
		if self.max_delay.is_negative() {
			return Err(ConfigError::NegativeDuration { field: "retry.max_delay" });
		}
		if !(0.0..=1.0).contains(&self.jitter_ratio) {
			return Err(ConfigError::JitterOutOfRange);
		}

		Ok(())
	}

	/// Exponential delay after the `attempt`-th failure (1-indexed), capped, without jitter.
	pub fn backoff(&self, attempt: u32) -> Duration {
		let exponent = attempt.saturating_sub(1).min(30);
		let factor = 1_i32 << exponent;
		let delay = self.base_delay.checked_mul(factor).unwrap_or(self.max_delay);

		delay.min(self.max_delay).max(Duration::ZERO)
	}

	/// [`backoff`](Self::backoff) plus a uniformly random share of up to `jitter_ratio`.
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let delay = self.backoff(attempt);

		if self.jitter_ratio <= 0.0 || delay.is_zero() {
			return delay;
		}

		delay + delay * (rand::random::<f64>() * self.jitter_ratio.min(1.0))
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::seconds(1),
			max_delay: Duration::seconds(10),
			jitter_ratio: 0.25,
		}
	}
}

/// One failed attempt as seen by the retry loop.
#[derive(Debug)]
pub struct AttemptFailure {
	/// Classifier input.
	pub descriptor: FailureDescriptor,
	/// Human-readable summary.
	pub message: String,
	/// Transport error, when no response was received.
	pub source: Option<TransportError>,
}
impl AttemptFailure {
	/// Failure carried by an HTTP response.
	pub fn http(status: u16, provider_code: Option<String>, message: impl Into<String>) -> Self {
		Self {
			descriptor: FailureDescriptor { provider_code, ..FailureDescriptor::http(status) },
			message: message.into(),
			source: None,
		}
	}

	/// Failure without a response.
	pub fn transport(error: TransportError) -> Self {
		Self {
			descriptor: FailureDescriptor::transport(error.kind()),
			message: error.to_string(),
			source: Some(error),
		}
	}

	/// Category assigned by the shared classifier.
	pub fn category(&self) -> ErrorCategory {
		classify(&self.descriptor)
	}

	fn into_request_error(
		self,
		context: &RequestContext,
		attempts: u32,
		elapsed: Duration,
	) -> RequestError {
		RequestError {
			category: self.category(),
			status: self.descriptor.status,
			provider_code: self.descriptor.provider_code,
			message: self.message,
			retry_key: context.retry_key.clone(),
			attempts,
			elapsed,
			source: self.source,
		}
	}
}
impl From<TransportError> for AttemptFailure {
	fn from(error: TransportError) -> Self {
		Self::transport(error)
	}
}

/// Wraps an asynchronous operation in the retry policy.
#[derive(Clone, Debug)]
pub struct RetryExecutor {
	policy: RetryPolicy,
	journal: Arc<EventJournal>,
}
impl RetryExecutor {
	/// Creates an executor that records retry decisions in `journal`.
	pub fn new(policy: RetryPolicy, journal: Arc<EventJournal>) -> Self {
		Self { policy, journal }
	}

	/// Active policy.
	pub fn policy(&self) -> &RetryPolicy {
		&self.policy
	}

	/// Runs `operation` until it succeeds, fails with a non-retryable category, or the attempt
	/// bound is reached. Every attempt invokes `operation` afresh.
	pub async fn execute<T, F, Fut>(
		&self,
		context: &RequestContext,
		mut operation: F,
	) -> Result<T, RequestError>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, AttemptFailure>>,
	{
		let started = Instant::now();
		let max_attempts = self.policy.max_attempts.max(1);
		let mut attempt = 0;

		loop {
			attempt += 1;

			let failure = match operation().await {
				Ok(value) => {
					if attempt > 1 {
						self.journal
							.info(LogCategory::Retry, "Request succeeded after retrying.")
							.field("retry_key", context.retry_key.as_str())
							.field("attempts", attempt);
					}

					return Ok(value);
				},
				Err(failure) => failure,
			};
			let category = failure.category();
			let retrying = category.is_retryable() && attempt < max_attempts;

			obs::record_attempt_failure(category, retrying);

			if !retrying {
				let elapsed = Duration::try_from(started.elapsed()).unwrap_or(Duration::MAX);

				if category.is_retryable() {
					self.journal
						.error(LogCategory::Retry, "Retry budget exhausted.")
						.field("retry_key", context.retry_key.as_str())
						.field("category", category.as_str())
						.field("attempts", attempt)
						.field("elapsed_ms", elapsed.whole_milliseconds() as i64);
				}

				return Err(failure.into_request_error(context, attempt, elapsed));
			}

			let delay = self.policy.delay_for(attempt);

			self.journal
				.warn(LogCategory::Retry, "Transient failure, backing off.")
				.field("retry_key", context.retry_key.as_str())
				.field("category", category.as_str())
				.field("attempt", attempt)
				.field("delay_ms", delay.whole_milliseconds() as i64)
				.field("message", failure.message.as_str());

			tokio::time::sleep(delay.unsigned_abs()).await;
		}
	}
}
