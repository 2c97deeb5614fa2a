//! Executor configuration with serde support and builder-style overrides.
//!
//! Durations are serialized as integer milliseconds (`*_ms` keys) so configuration files stay
//! readable; parsing goes through `serde_path_to_error` so a bad value names its field.

// self
use crate::{
	_prelude::*, error::ConfigError, obs::DEFAULT_JOURNAL_CAPACITY, retry::RetryPolicy,
	store::DEFAULT_EXPIRING_SOON,
};

/// Settings shared by the executor, the coordinator, and the notice dispatcher.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
	/// Base URL every endpoint is appended to.
	pub base_url: Url,
	/// Per-attempt timeout applied when a request does not set its own.
	#[serde(rename = "default_timeout_ms", with = "millis", default = "defaults::timeout")]
	pub default_timeout: Duration,
	/// Remaining lifetime under which a background refresh is started.
	#[serde(
		rename = "expiring_soon_threshold_ms",
		with = "millis",
		default = "defaults::expiring_soon"
	)]
	pub expiring_soon_threshold: Duration,
	/// Deadline for the fresh-session fetch inside a recovery cycle.
	#[serde(rename = "refresh_timeout_ms", with = "millis", default = "defaults::refresh_timeout")]
	pub refresh_timeout: Duration,
	/// Window inside which identical user notices are coalesced.
	#[serde(rename = "notice_window_ms", with = "millis", default = "defaults::notice_window")]
	pub notice_window: Duration,
	/// Number of entries retained by the event journal.
	#[serde(default = "defaults::journal_capacity")]
	pub journal_capacity: usize,
	/// Retry policy applied to every request.
	#[serde(default)]
	pub retry: RetryPolicy,
}
impl ExecutorConfig {
	/// Creates a configuration for `base_url` with default settings.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			default_timeout: defaults::timeout(),
			expiring_soon_threshold: defaults::expiring_soon(),
			refresh_timeout: defaults::refresh_timeout(),
			notice_window: defaults::notice_window(),
			journal_capacity: defaults::journal_capacity(),
			retry: RetryPolicy::default(),
		}
	}

	/// Parses and validates a JSON document.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		let de = &mut serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(de).map_err(|err| {
			let path = err.path().to_string();

			ConfigError::Parse { path, source: err.into_inner() }
		})?;

		config.validate()?;

		Ok(config)
	}

	/// Overrides the per-attempt timeout.
	pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
		self.default_timeout = timeout;

		self
	}

	/// Overrides the expiring-soon threshold.
	pub fn with_expiring_soon_threshold(mut self, threshold: Duration) -> Self {
		self.expiring_soon_threshold = threshold;

		self
	}

	/// Overrides the recovery fetch deadline.
	pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
		self.refresh_timeout = timeout;

		self
	}

	/// Overrides the notice coalescing window.
	pub fn with_notice_window(mut self, window: Duration) -> Self {
		self.notice_window = window;

		self
	}

	/// Overrides the journal capacity.
	pub fn with_journal_capacity(mut self, capacity: usize) -> Self {
		self.journal_capacity = capacity;

		self
	}

	/// Replaces the retry policy.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Rejects settings the executor cannot honor.
	pub fn validate(&self) -> Result<(), ConfigError> {
		for (field, value) in [
			("default_timeout", self.default_timeout),
			("expiring_soon_threshold", self.expiring_soon_threshold),
			("refresh_timeout", self.refresh_timeout),
			("notice_window", self.notice_window),
		] {
			if value.is_negative() {
				return Err(ConfigError::NegativeDuration { field });
			}
		}

		self.retry.validate()
	}
}

mod defaults {
	// self
	use super::*;

	pub(super) fn timeout() -> Duration {
		Duration::seconds(30)
	}

	pub(super) fn expiring_soon() -> Duration {
		DEFAULT_EXPIRING_SOON
	}

	pub(super) fn refresh_timeout() -> Duration {
		Duration::seconds(15)
	}

	pub(super) fn notice_window() -> Duration {
		Duration::seconds(5)
	}

	pub(super) fn journal_capacity() -> usize {
		DEFAULT_JOURNAL_CAPACITY
	}
}

/// Serde adapter storing a [`Duration`] as whole milliseconds.
pub(crate) mod millis {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use super::*;

	pub(crate) fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let millis = i64::try_from(value.whole_milliseconds()).unwrap_or(i64::MAX);

		serializer.serialize_i64(millis)
	}

	pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		i64::deserialize(deserializer).map(Duration::milliseconds)
	}
}
