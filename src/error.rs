//! Crate-level error types shared by the executor, coordinator, and transports.

// self
use crate::{
	_prelude::*,
	auth::SessionError,
	classify::{ErrorCategory, FailureDescriptor},
};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// No usable session or access token exists; the call is not attempted.
	#[error("No authenticated session is available.")]
	NotAuthenticated,
	/// The recovery procedure ran and failed; the session has been invalidated.
	#[error("Token refresh failed: {reason}.")]
	TokenRefreshFailed {
		/// Human-readable summary of the recovery outcome.
		reason: String,
	},
	/// Classified request failure surfaced after the retry policy gave up.
	#[error(transparent)]
	Request(#[from] RequestError),
	/// Session provider failure.
	#[error(transparent)]
	Session(#[from] SessionError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Response body could not be decoded into the requested type.
	#[error("Response body could not be decoded.")]
	Decode {
		/// Structured decoding failure pointing at the offending field.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl Error {
	/// Returns the classified category when the error came from a request attempt.
	pub fn category(&self) -> Option<ErrorCategory> {
		match self {
			Self::Request(err) => Some(err.category),
			_ => None,
		}
	}

	/// Returns the HTTP status of the last attempt, when one was received.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Request(err) => err.status,
			_ => None,
		}
	}
}

/// Final failure of a request after the retry policy has been applied.
///
/// The error is tagged with the attempt count and elapsed wall time so callers can tell a
/// fast non-retryable rejection apart from an exhausted retry budget.
#[derive(Debug, ThisError)]
#[error("Request to `{retry_key}` failed with a {category} error after {attempts} attempt(s): {message}.")]
pub struct RequestError {
	/// Category assigned by [`classify`](crate::classify::classify).
	pub category: ErrorCategory,
	/// HTTP status code of the last attempt, if a response was received.
	pub status: Option<u16>,
	/// Provider-reported error code of the last attempt, if any.
	pub provider_code: Option<String>,
	/// Human-readable failure summary.
	pub message: String,
	/// Retry key of the request context (`METHOD_endpoint`).
	pub retry_key: String,
	/// Number of attempts performed, including the failing one.
	pub attempts: u32,
	/// Wall time spent across all attempts and backoff sleeps.
	pub elapsed: Duration,
	/// Transport-level error behind the last attempt, when there was one.
	#[source]
	pub source: Option<TransportError>,
}
impl RequestError {
	/// Rebuilds the descriptor that produced this error.
	pub fn descriptor(&self) -> FailureDescriptor {
		FailureDescriptor {
			status: self.status,
			provider_code: self.provider_code.clone(),
			transport: self.source.as_ref().map(TransportError::kind),
		}
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Endpoint cannot be joined onto the base URL.
	#[error("Endpoint `{endpoint}` does not form a valid URL.")]
	InvalidEndpoint {
		/// Endpoint path supplied by the caller.
		endpoint: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Configuration document could not be parsed.
	#[error("Configuration is invalid at `{path}`.")]
	Parse {
		/// Path of the failing field.
		path: String,
		/// Underlying JSON failure.
		#[source]
		source: serde_json::Error,
	},
	/// Retry policy allows no attempt at all.
	#[error("Retry policy must allow at least one attempt.")]
	ZeroAttempts,
	/// A duration setting is negative.
	#[error("The {field} setting must not be negative.")]
	NegativeDuration {
		/// Setting name.
		field: &'static str,
	},
	/// Jitter ratio outside `[0, 1]`.
	#[error("The jitter ratio must be within [0, 1].")]
	JitterOutOfRange,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (no HTTP response was received).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Connection could not be established or was aborted.
	#[error("Connection to the API failed: {message}.")]
	Connect {
		/// Transport-supplied message.
		message: String,
	},
	/// The attempt exceeded its deadline.
	#[error("Request timed out after {after}.")]
	Timeout {
		/// Deadline that expired.
		after: Duration,
	},
	/// Any other transport failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Returns the classifier-facing kind of this failure.
	pub fn kind(&self) -> crate::classify::TransportFailureKind {
		use crate::classify::TransportFailureKind;

		match self {
			Self::Connect { .. } => TransportFailureKind::Connect,
			Self::Timeout { .. } => TransportFailureKind::Timeout,
			Self::Network { .. } => TransportFailureKind::Other,
		}
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_connect() {
			Self::Connect { message: e.to_string() }
		} else {
			Self::network(e)
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::classify::TransportFailureKind;

	#[test]
	fn request_error_reports_attempts_and_category() {
		let err = RequestError {
			category: ErrorCategory::Server,
			status: Some(503),
			provider_code: None,
			message: "upstream unavailable".into(),
			retry_key: "GET_/designs".into(),
			attempts: 3,
			elapsed: Duration::milliseconds(40),
			source: None,
		};
		let rendered = err.to_string();

		assert!(rendered.contains("server"));
		assert!(rendered.contains("3 attempt(s)"));
		assert!(rendered.contains("GET_/designs"));

		let wrapped = Error::from(err);

		assert_eq!(wrapped.category(), Some(ErrorCategory::Server));
		assert_eq!(wrapped.status(), Some(503));
	}

	#[test]
	fn transport_error_exposes_kind_and_source() {
		let timeout = TransportError::Timeout { after: Duration::seconds(30) };

		assert_eq!(timeout.kind(), TransportFailureKind::Timeout);

		let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
		let network = TransportError::network(io);

		assert_eq!(network.kind(), TransportFailureKind::Other);
		assert!(StdError::source(&network).is_some());
	}
}
