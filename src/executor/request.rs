// self
use crate::{_prelude::*, http::Method};

/// Per-call options accepted by the executor.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestOptions {
	/// HTTP method; `GET` when unset.
	pub method: Method,
	/// Caller headers; they override the executor's defaults.
	pub headers: BTreeMap<String, String>,
	/// JSON body.
	pub body: Option<serde_json::Value>,
	/// Query parameters.
	pub query: Vec<(String, String)>,
	/// Per-attempt timeout; the configured default applies when unset.
	pub timeout: Option<Duration>,
	/// Free-form labels copied into the request context for diagnostics.
	pub labels: BTreeMap<String, String>,
}
impl RequestOptions {
	/// Options for a request using `method`.
	pub fn new(method: Method) -> Self {
		Self { method, ..Default::default() }
	}

	/// Shorthand for `GET`.
	pub fn get() -> Self {
		Self::new(Method::Get)
	}

	/// Shorthand for `POST` with a JSON body.
	pub fn post(body: serde_json::Value) -> Self {
		Self::new(Method::Post).with_body(body)
	}

	/// Overrides the method.
	pub fn with_method(mut self, method: Method) -> Self {
		self.method = method;

		self
	}

	/// Adds or replaces a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}

	/// Sets the JSON body.
	pub fn with_body(mut self, body: serde_json::Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Appends a query parameter.
	pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((name.into(), value.into()));

		self
	}

	/// Overrides the per-attempt timeout.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Attaches a diagnostic label.
	pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.labels.insert(key.into(), value.into());

		self
	}
}

/// Logging context of one logical request.
///
/// The retry key only names the request in logs and metrics; two independent calls with the
/// same key never suppress each other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
	/// Endpoint path as supplied by the caller.
	pub endpoint: String,
	/// HTTP method.
	pub method: Method,
	/// `METHOD_endpoint`, prefixed with `public_` for unauthenticated requests.
	pub retry_key: String,
	/// Per-attempt timeout.
	pub timeout: Duration,
	/// Caller labels.
	pub labels: BTreeMap<String, String>,
}
impl RequestContext {
	/// Context of an authenticated request.
	pub fn new(endpoint: impl Into<String>, method: Method, timeout: Duration) -> Self {
		let endpoint = endpoint.into();
		let retry_key = format!("{method}_{endpoint}");

		Self { endpoint, method, retry_key, timeout, labels: BTreeMap::new() }
	}

	/// Context of a request sent without credentials.
	pub fn public(endpoint: impl Into<String>, method: Method, timeout: Duration) -> Self {
		let mut context = Self::new(endpoint, method, timeout);

		context.retry_key = format!("public_{}", context.retry_key);

		context
	}

	/// Replaces the labels.
	pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
		self.labels = labels;

		self
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn retry_keys_carry_method_and_endpoint() {
		let timeout = Duration::seconds(30);

		assert_eq!(RequestContext::new("/designs", Method::Post, timeout).retry_key, "POST_/designs");
		assert_eq!(
			RequestContext::public("/health", Method::Get, timeout).retry_key,
			"public_GET_/health"
		);
	}

	#[test]
	fn options_builders_accumulate() {
		let options = RequestOptions::post(serde_json::json!({ "name": "poster" }))
			.with_header("x-trace", "abc")
			.with_param("page", "2")
			.with_param("size", "20")
			.with_timeout(Duration::seconds(5))
			.with_label("screen", "editor");

		assert_eq!(options.method, Method::Post);
		assert_eq!(options.headers["x-trace"], "abc");
		assert_eq!(options.query.len(), 2);
		assert_eq!(options.timeout, Some(Duration::seconds(5)));
		assert_eq!(options.labels["screen"], "editor");
	}
}
