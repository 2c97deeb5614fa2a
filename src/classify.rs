//! Failure classification shared by the retry policy and the recovery path.
//!
//! Both consumers call [`classify`] on the same [`FailureDescriptor`], so a failed attempt
//! can never be retried as transient by one component while the other treats it as an
//! authentication problem. The descriptor keeps only primitive data (status code, provider
//! code, transport failure kind) so the rules stay independent of any HTTP client.

// self
use crate::_prelude::*;

/// Category attached to every failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
	/// No response; the connection was refused or aborted.
	Network,
	/// The attempt exceeded its deadline.
	Timeout,
	/// The bearer token expired (including the extremely stale variant).
	AuthExpired,
	/// The bearer token is malformed or was issued for another audience.
	AuthInvalid,
	/// The token is not yet valid because client and server clocks disagree.
	AuthClockSkew,
	/// Upstream 5xx.
	Server,
	/// Any other 4xx.
	Client,
	/// Anything the rules do not cover.
	Unknown,
}
impl ErrorCategory {
	/// Returns a stable label suitable for log or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Network => "network",
			Self::Timeout => "timeout",
			Self::AuthExpired => "auth_expired",
			Self::AuthInvalid => "auth_invalid",
			Self::AuthClockSkew => "auth_clock_skew",
			Self::Server => "server",
			Self::Client => "client",
			Self::Unknown => "unknown",
		}
	}

	/// Returns `true` for categories the retry policy may re-attempt.
	pub const fn is_retryable(self) -> bool {
		matches!(self, Self::Network | Self::Timeout | Self::Server)
	}

	/// Returns `true` for categories handled by the recovery path.
	pub const fn is_auth(self) -> bool {
		matches!(self, Self::AuthExpired | Self::AuthInvalid | Self::AuthClockSkew)
	}
}
impl Display for ErrorCategory {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Error codes the identity-aware gateway reports alongside a 401.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderCode {
	/// `TOKEN_EXPIRED`.
	TokenExpired,
	/// `TOKEN_EXTREMELY_STALE`; the session is beyond refreshing.
	TokenExtremelyStale,
	/// `INVALID_TOKEN` (alias `TOKEN_INVALID`).
	InvalidToken,
	/// `INVALID_AUDIENCE` (alias `AUDIENCE_MISMATCH`).
	InvalidAudience,
	/// `TOKEN_TOO_EARLY`.
	TokenTooEarly,
}
impl ProviderCode {
	/// Parses a provider code, ignoring ASCII case. Unknown codes yield `None`.
	pub fn parse(raw: &str) -> Option<Self> {
		const TABLE: [(&str, ProviderCode); 7] = [
			("TOKEN_EXPIRED", ProviderCode::TokenExpired),
			("TOKEN_EXTREMELY_STALE", ProviderCode::TokenExtremelyStale),
			("INVALID_TOKEN", ProviderCode::InvalidToken),
			("TOKEN_INVALID", ProviderCode::InvalidToken),
			("INVALID_AUDIENCE", ProviderCode::InvalidAudience),
			("AUDIENCE_MISMATCH", ProviderCode::InvalidAudience),
			("TOKEN_TOO_EARLY", ProviderCode::TokenTooEarly),
		];

		let raw = raw.trim();

		TABLE.iter().find(|(label, _)| raw.eq_ignore_ascii_case(label)).map(|(_, code)| *code)
	}

	/// Returns the canonical wire spelling.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::TokenExpired => "TOKEN_EXPIRED",
			Self::TokenExtremelyStale => "TOKEN_EXTREMELY_STALE",
			Self::InvalidToken => "INVALID_TOKEN",
			Self::InvalidAudience => "INVALID_AUDIENCE",
			Self::TokenTooEarly => "TOKEN_TOO_EARLY",
		}
	}
}

/// Transport failure kinds visible to the classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportFailureKind {
	/// Connection refused or aborted.
	Connect,
	/// Deadline exceeded.
	Timeout,
	/// Any other failure without a response.
	Other,
}

/// Primitive description of one failed attempt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FailureDescriptor {
	/// HTTP status code, when a response was received.
	pub status: Option<u16>,
	/// Provider-reported error code from the response body.
	pub provider_code: Option<String>,
	/// Transport failure, when no response was received.
	pub transport: Option<TransportFailureKind>,
}
impl FailureDescriptor {
	/// Descriptor for a response with the given HTTP status.
	pub fn http(status: u16) -> Self {
		Self { status: Some(status), ..Default::default() }
	}

	/// Descriptor for a transport failure without a response.
	pub fn transport(kind: TransportFailureKind) -> Self {
		Self { transport: Some(kind), ..Default::default() }
	}

	/// Adds the provider-reported error code.
	pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
		self.provider_code = Some(code.into());

		self
	}

	/// Parsed provider code, if it is one the classifier knows.
	pub fn known_code(&self) -> Option<ProviderCode> {
		self.provider_code.as_deref().and_then(ProviderCode::parse)
	}

	/// Shorthand for [`classify`].
	pub fn category(&self) -> ErrorCategory {
		classify(self)
	}
}

/// Maps a failed attempt to exactly one [`ErrorCategory`].
pub fn classify(failure: &FailureDescriptor) -> ErrorCategory {
	if let Some(kind) = failure.transport {
		return match kind {
			TransportFailureKind::Timeout => ErrorCategory::Timeout,
			TransportFailureKind::Connect | TransportFailureKind::Other => ErrorCategory::Network,
		};
	}

	match failure.status {
		Some(401) => classify_unauthorized(failure.known_code()),
		Some(status) if status >= 500 => ErrorCategory::Server,
		Some(status) if (400..500).contains(&status) => ErrorCategory::Client,
		_ => ErrorCategory::Unknown,
	}
}

fn classify_unauthorized(code: Option<ProviderCode>) -> ErrorCategory {
	match code {
		Some(ProviderCode::TokenExpired | ProviderCode::TokenExtremelyStale) =>
			ErrorCategory::AuthExpired,
		Some(ProviderCode::InvalidToken | ProviderCode::InvalidAudience) =>
			ErrorCategory::AuthInvalid,
		Some(ProviderCode::TokenTooEarly) => ErrorCategory::AuthClockSkew,
		None => ErrorCategory::Client,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn unauthorized(code: &str) -> FailureDescriptor {
		FailureDescriptor::http(401).with_provider_code(code)
	}

	#[test]
	fn transport_failures_map_to_network_or_timeout() {
		assert_eq!(
			classify(&FailureDescriptor::transport(TransportFailureKind::Connect)),
			ErrorCategory::Network
		);
		assert_eq!(
			classify(&FailureDescriptor::transport(TransportFailureKind::Other)),
			ErrorCategory::Network
		);
		assert_eq!(
			classify(&FailureDescriptor::transport(TransportFailureKind::Timeout)),
			ErrorCategory::Timeout
		);
	}

	#[test]
	fn unauthorized_codes_select_auth_categories() {
		assert_eq!(classify(&unauthorized("TOKEN_EXPIRED")), ErrorCategory::AuthExpired);
		assert_eq!(classify(&unauthorized("TOKEN_EXTREMELY_STALE")), ErrorCategory::AuthExpired);
		assert_eq!(classify(&unauthorized("INVALID_TOKEN")), ErrorCategory::AuthInvalid);
		assert_eq!(classify(&unauthorized("invalid_audience")), ErrorCategory::AuthInvalid);
		assert_eq!(classify(&unauthorized("TOKEN_TOO_EARLY")), ErrorCategory::AuthClockSkew);
	}

	#[test]
	fn gateway_aliases_are_invalid_tokens() {
		assert_eq!(classify(&unauthorized("TOKEN_INVALID")), ErrorCategory::AuthInvalid);
		assert_eq!(classify(&unauthorized("AUDIENCE_MISMATCH")), ErrorCategory::AuthInvalid);
	}

	#[test]
	fn status_codes_fall_back_to_server_client_unknown() {
		assert_eq!(classify(&FailureDescriptor::http(401)), ErrorCategory::Client);
		assert_eq!(classify(&unauthorized("SOMETHING_ELSE")), ErrorCategory::Client);
		assert_eq!(classify(&FailureDescriptor::http(404)), ErrorCategory::Client);
		assert_eq!(classify(&FailureDescriptor::http(500)), ErrorCategory::Server);
		assert_eq!(classify(&FailureDescriptor::http(503)), ErrorCategory::Server);
		assert_eq!(classify(&FailureDescriptor::http(302)), ErrorCategory::Unknown);
		assert_eq!(classify(&FailureDescriptor::default()), ErrorCategory::Unknown);
	}

	#[test]
	fn provider_codes_only_matter_on_401() {
		let forbidden = FailureDescriptor::http(403).with_provider_code("TOKEN_EXPIRED");

		assert_eq!(classify(&forbidden), ErrorCategory::Client);
	}

	#[test]
	fn retryable_set_is_network_timeout_server() {
		let retryable = [
			ErrorCategory::Network,
			ErrorCategory::Timeout,
			ErrorCategory::AuthExpired,
			ErrorCategory::AuthInvalid,
			ErrorCategory::AuthClockSkew,
			ErrorCategory::Server,
			ErrorCategory::Client,
			ErrorCategory::Unknown,
		]
		.into_iter()
		.filter(|category| category.is_retryable())
		.collect::<Vec<_>>();

		assert_eq!(retryable, [ErrorCategory::Network, ErrorCategory::Timeout, ErrorCategory::Server]);
	}
}
