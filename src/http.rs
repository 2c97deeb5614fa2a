//! Transport primitives for outbound API calls.
//!
//! [`HttpTransport`] is the crate's only dependency on an HTTP stack. Implementations return
//! `Ok` for every HTTP response regardless of status; only failures without a response
//! (connection refused, deadline exceeded, broken stream) are reported as
//! [`TransportError`]. Status interpretation is left to the executor and the classifier.

// self
use crate::{_prelude::*, error::TransportError};

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP clients capable of executing API requests.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Issues one request. Must honor [`ApiRequest::timeout`].
	fn send(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// HTTP methods used by API callers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// `GET`.
	#[default]
	Get,
	/// `POST`.
	Post,
	/// `PUT`.
	Put,
	/// `PATCH`.
	Patch,
	/// `DELETE`.
	Delete,
}
impl Method {
	/// Returns the canonical upper-case spelling.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Patch => "PATCH",
			Self::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Fully built request handed to a transport.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute URL (query parameters excluded).
	pub url: Url,
	/// Header map; names are stored as given.
	pub headers: BTreeMap<String, String>,
	/// JSON body, if any.
	pub body: Option<serde_json::Value>,
	/// Query parameters appended by the transport.
	pub query: Vec<(String, String)>,
	/// Deadline for this attempt.
	pub timeout: Duration,
}
impl ApiRequest {
	/// Returns a header value, matching the name case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}
}

/// Response returned by a transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers (lower-case names).
	pub headers: BTreeMap<String, String>,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Creates a response with the provided status and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: BTreeMap::new(), body: body.into() }
	}

	/// Creates a response with a JSON body.
	pub fn json_body(status: u16, body: &serde_json::Value) -> Self {
		Self::new(status, body.to_string())
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Body as UTF-8 text, replacing invalid sequences.
	pub fn text(&self) -> Cow<'_, str> {
		String::from_utf8_lossy(&self.body)
	}

	/// Decodes the body as JSON, reporting the failing path on error.
	pub fn json<T>(&self) -> Result<T>
	where
		T: serde::de::DeserializeOwned,
	{
		let de = &mut serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(de).map_err(|source| Error::Decode { source })
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	fn method(method: Method) -> reqwest::Method {
		match method {
			Method::Get => reqwest::Method::GET,
			Method::Post => reqwest::Method::POST,
			Method::Put => reqwest::Method::PUT,
			Method::Patch => reqwest::Method::PATCH,
			Method::Delete => reqwest::Method::DELETE,
		}
	}

	fn map_error(err: ReqwestError, timeout: Duration) -> TransportError {
		if err.is_timeout() { TransportError::Timeout { after: timeout } } else { err.into() }
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let timeout = request.timeout;
			let mut builder = self
				.0
				.request(Self::method(request.method), request.url)
				.timeout(timeout.unsigned_abs());

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if !request.query.is_empty() {
				builder = builder.query(&request.query);
			}
			if let Some(body) = &request.body {
				builder = builder.body(body.to_string());
			}

			let response =
				builder.send().await.map_err(|err| Self::map_error(err, timeout))?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body =
				response.bytes().await.map_err(|err| Self::map_error(err, timeout))?.to_vec();

			Ok(ApiResponse { status, headers, body })
		})
	}
}
