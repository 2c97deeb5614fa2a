//! Authenticated request execution.
//!
//! [`AuthenticatedRequestExecutor`] wraps every outbound call: it reads the current session,
//! mirrors it into the [`TokenStore`], recovers an expired token before sending, starts a
//! background refresh when the token is close to expiry, runs the call through the
//! [`RetryExecutor`], and, when the final failure is an authentication rejection, lets the
//! [`TokenRefreshCoordinator`] decide whether the call may be replayed once.

mod diagnostics;
mod request;

pub use diagnostics::TokenSnapshot;
pub use request::{RequestContext, RequestOptions};

// crates.io
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	auth::{SessionProvider, TokenSecret},
	config::ExecutorConfig,
	error::{ConfigError, RequestError, TransportError},
	http::{ApiRequest, ApiResponse, HttpTransport},
	notice::{JournalSink, NoticeDispatcher, NotificationSink},
	obs::{self, EventJournal, FlowKind, FlowOutcome, FlowSpan, LogCategory, LogEntry},
	refresh::{
		CoordinatorState, RecoveryOutcome, RecoveryTrigger, RefreshMetrics, TokenRefreshCoordinator,
	},
	retry::{AttemptFailure, RetryExecutor},
	store::TokenStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Header carrying the client's send time.
pub const REQUEST_TIMESTAMP_HEADER: &str = "x-request-timestamp";

/// Executes API calls with bearer credentials, recovery, and bounded retries.
///
/// Cloning is cheap; clones share the store, journal, and coordinator.
#[derive(Clone)]
pub struct AuthenticatedRequestExecutor {
	config: Arc<ExecutorConfig>,
	store: Arc<TokenStore>,
	sessions: Arc<dyn SessionProvider>,
	transport: Arc<dyn HttpTransport>,
	journal: Arc<EventJournal>,
	retry: RetryExecutor,
	coordinator: TokenRefreshCoordinator,
}
impl AuthenticatedRequestExecutor {
	/// Creates an executor backed by the process-wide [`TokenStore`].
	pub fn new(
		config: ExecutorConfig,
		sessions: Arc<dyn SessionProvider>,
		transport: Arc<dyn HttpTransport>,
	) -> Result<Self, ConfigError> {
		Self::with_store(config, TokenStore::global(), sessions, transport)
	}

	/// Creates an executor backed by an explicit store.
	pub fn with_store(
		config: ExecutorConfig,
		store: Arc<TokenStore>,
		sessions: Arc<dyn SessionProvider>,
		transport: Arc<dyn HttpTransport>,
	) -> Result<Self, ConfigError> {
		config.validate()?;

		let journal = Arc::new(EventJournal::new(config.journal_capacity));
		let sink = Arc::new(JournalSink(journal.clone()));
		let retry = RetryExecutor::new(config.retry.clone(), journal.clone());
		let coordinator =
			Self::build_coordinator(&config, store.clone(), sessions.clone(), journal.clone(), sink);

		Ok(Self {
			config: Arc::new(config),
			store,
			sessions,
			transport,
			journal,
			retry,
			coordinator,
		})
	}

	/// Creates an executor that talks HTTP through a fresh reqwest client.
	#[cfg(feature = "reqwest")]
	pub fn with_reqwest(
		config: ExecutorConfig,
		sessions: Arc<dyn SessionProvider>,
	) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().build()?;

		Self::new(config, sessions, Arc::new(ReqwestTransport::with_client(client)))
	}

	/// Routes user notices to `sink` instead of the journal.
	///
	/// Rebuilds the coordinator, so call it before the executor is shared.
	pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
		self.coordinator = Self::build_coordinator(
			&self.config,
			self.store.clone(),
			self.sessions.clone(),
			self.journal.clone(),
			sink,
		);

		self
	}

	fn build_coordinator(
		config: &ExecutorConfig,
		store: Arc<TokenStore>,
		sessions: Arc<dyn SessionProvider>,
		journal: Arc<EventJournal>,
		sink: Arc<dyn NotificationSink>,
	) -> TokenRefreshCoordinator {
		let notices = Arc::new(NoticeDispatcher::new(sink, config.notice_window));

		TokenRefreshCoordinator::new(store, sessions, notices, journal, config.refresh_timeout)
	}

	/// Active configuration.
	pub fn config(&self) -> &ExecutorConfig {
		&self.config
	}

	/// Store this executor mirrors sessions into.
	pub fn store(&self) -> &Arc<TokenStore> {
		&self.store
	}

	/// Event journal shared by every component of this executor.
	pub fn journal(&self) -> &Arc<EventJournal> {
		&self.journal
	}

	/// Sends an authenticated request and returns the successful response.
	pub async fn request(&self, endpoint: &str, options: RequestOptions) -> Result<ApiResponse> {
		let context = RequestContext::new(endpoint, options.method, self.timeout(&options))
			.with_labels(options.labels.clone());
		let span = FlowSpan::with_key(FlowKind::Request, "request", &context.retry_key);

		obs::record_flow_outcome(FlowKind::Request, FlowOutcome::Attempt);

		let result = span.instrument(self.authenticated(&context, &options)).await;

		obs::record_flow_outcome(FlowKind::Request, flow_outcome(&result));

		result
	}

	/// [`request`](Self::request) followed by JSON decoding of the response body.
	pub async fn request_json<T>(&self, endpoint: &str, options: RequestOptions) -> Result<T>
	where
		T: serde::de::DeserializeOwned,
	{
		self.request(endpoint, options).await?.json()
	}

	/// Sends a request without credentials. Recovery never runs for it.
	pub async fn request_without_auth(
		&self,
		endpoint: &str,
		options: RequestOptions,
	) -> Result<ApiResponse> {
		let context = RequestContext::public(endpoint, options.method, self.timeout(&options))
			.with_labels(options.labels.clone());
		let span = FlowSpan::with_key(FlowKind::PublicRequest, "request", &context.retry_key);

		obs::record_flow_outcome(FlowKind::PublicRequest, FlowOutcome::Attempt);

		let result = span.instrument(self.send(&context, &options, None)).await;

		obs::record_flow_outcome(FlowKind::PublicRequest, flow_outcome(&result));

		result
	}

	/// Secret-free view of the current token state.
	pub fn token_snapshot(&self) -> TokenSnapshot {
		TokenSnapshot::at(
			&self.store.snapshot(),
			OffsetDateTime::now_utc(),
			self.config.expiring_soon_threshold,
		)
	}

	/// Newest `count` journal entries, optionally limited to one category, oldest first.
	pub fn recent_logs(&self, count: usize, category: Option<LogCategory>) -> Vec<LogEntry> {
		self.journal.recent(count, category)
	}

	/// Forces a fresh-session fetch, joining a cycle that is already running.
	pub async fn refresh_now(&self) -> RecoveryOutcome {
		self.coordinator.recover(RecoveryTrigger::Expired).await
	}

	/// Tears the session down as if the gateway had rejected the token.
	pub async fn invalidate_now(&self) -> RecoveryOutcome {
		self.coordinator.recover(RecoveryTrigger::Invalid).await
	}

	/// Recovery counters.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		self.coordinator.metrics()
	}

	/// Whether a recovery cycle is running.
	pub fn coordinator_state(&self) -> CoordinatorState {
		self.coordinator.state()
	}

	fn timeout(&self, options: &RequestOptions) -> Duration {
		options.timeout.unwrap_or(self.config.default_timeout)
	}

	async fn authenticated(
		&self,
		context: &RequestContext,
		options: &RequestOptions,
	) -> Result<ApiResponse> {
		let token = self.authorize().await?;
		let err = match self.send(context, options, Some(&token)).await {
			Err(Error::Request(err)) if err.category.is_auth() => err,
			result => return result,
		};

		self.recover_and_replay(context, options, err).await
	}

	async fn authorize(&self) -> Result<TokenSecret> {
		let Some(token) = self.mirror_session().await? else {
			self.journal.warn(LogCategory::Auth, "No authenticated session available.");

			return Err(Error::NotAuthenticated);
		};

		if self.store.is_token_expired() {
			self.journal
				.warn(LogCategory::Token, "Access token expired before sending, recovering.")
				.field("expires_at", self.store.expires_at().map(|at| at.to_string()));

			let outcome = self.coordinator.recover(RecoveryTrigger::Expired).await;

			if !outcome.should_replay() {
				return Err(Error::TokenRefreshFailed {
					reason: outcome.reason().unwrap_or("recovery did not complete").to_owned(),
				});
			}

			return self.refetch_token().await;
		}
		if self.store.is_token_expiring_soon(self.config.expiring_soon_threshold)
			&& !self.store.is_refreshing()
		{
			self.spawn_background_refresh();
		}

		Ok(token)
	}

	/// Reads the current session and mirrors it into the store.
	async fn mirror_session(&self) -> Result<Option<TokenSecret>> {
		let Some(session) = self.sessions.current_session().await? else {
			return Ok(None);
		};
		let Some(token) = session.access_token.clone() else {
			return Ok(None);
		};

		self.store.set_tokens(Some(token.clone()), session.refresh_token, session.expires_at);

		Ok(Some(token))
	}

	async fn refetch_token(&self) -> Result<TokenSecret> {
		match self.mirror_session().await? {
			Some(token) => Ok(token),
			None => Err(Error::TokenRefreshFailed {
				reason: "recovered session carries no access token".into(),
			}),
		}
	}

	fn spawn_background_refresh(&self) {
		let coordinator = self.coordinator.clone();
		let journal = self.journal.clone();

		journal.info(LogCategory::Token, "Access token expiring soon, refreshing in background.");

		tokio::spawn(async move {
			match coordinator.recover(RecoveryTrigger::ExpiringSoon).await {
				RecoveryOutcome::Recovered => {
					journal.info(LogCategory::Token, "Background refresh completed.");
				},
				outcome => {
					journal
						.warn(LogCategory::Token, "Background refresh did not complete.")
						.field("reason", outcome.reason());
				},
			}
		});
	}

	async fn recover_and_replay(
		&self,
		context: &RequestContext,
		options: &RequestOptions,
		err: RequestError,
	) -> Result<ApiResponse> {
		let Some(trigger) = RecoveryTrigger::from_failure(&err.descriptor()) else {
			return Err(err.into());
		};

		self.journal
			.warn(LogCategory::Auth, "Request rejected by the gateway, recovering.")
			.field("retry_key", context.retry_key.as_str())
			.field("category", err.category.as_str())
			.field("trigger", trigger.as_str());

		let outcome = self.coordinator.recover(trigger).await;

		if !outcome.should_replay() {
			self.journal
				.error(LogCategory::Auth, "Recovery did not allow a replay.")
				.field("retry_key", context.retry_key.as_str())
				.field("reason", outcome.reason());

			return Err(err.into());
		}

		let token = self.refetch_token().await?;
		let span = FlowSpan::with_key(FlowKind::Replay, "replay", &context.retry_key);

		obs::record_flow_outcome(FlowKind::Replay, FlowOutcome::Attempt);
		self.journal
			.info(LogCategory::Api, "Replaying request with the recovered token.")
			.field("retry_key", context.retry_key.as_str());

		let replayed = span.instrument(self.send(context, options, Some(&token))).await;

		obs::record_flow_outcome(FlowKind::Replay, flow_outcome(&replayed));

		replayed
	}

	async fn send(
		&self,
		context: &RequestContext,
		options: &RequestOptions,
		token: Option<&TokenSecret>,
	) -> Result<ApiResponse> {
		let request = self.build_request(context, options, token)?;

		self.journal
			.debug(LogCategory::Api, "Sending request.")
			.field("retry_key", context.retry_key.as_str())
			.field("authenticated", token.is_some());

		let response = self
			.retry
			.execute(context, || {
				let mut request = request.clone();

				if request.header(REQUEST_TIMESTAMP_HEADER).is_none() {
					request.headers.insert(REQUEST_TIMESTAMP_HEADER.into(), timestamp());
				}

				self.attempt(request)
			})
			.await
			.inspect_err(|err| {
				self.journal
					.error(LogCategory::Api, "Request failed.")
					.field("retry_key", err.retry_key.as_str())
					.field("category", err.category.as_str())
					.field("status", err.status)
					.field("attempts", err.attempts);
			})?;

		Ok(response)
	}

	async fn attempt(&self, request: ApiRequest) -> Result<ApiResponse, AttemptFailure> {
		let timeout = request.timeout;
		let response = tokio::time::timeout(timeout.unsigned_abs(), self.transport.send(request))
			.await
			.map_err(|_| TransportError::Timeout { after: timeout })??;

		if response.is_success() {
			return Ok(response);
		}

		Err(failure_from_response(&response))
	}

	fn build_request(
		&self,
		context: &RequestContext,
		options: &RequestOptions,
		token: Option<&TokenSecret>,
	) -> Result<ApiRequest, ConfigError> {
		let url = join_url(&self.config.base_url, &context.endpoint)?;
		let mut headers = BTreeMap::new();

		if let Some(token) = token {
			headers.insert("Authorization".to_owned(), token.bearer());
		}

		headers.insert("Content-Type".to_owned(), "application/json".to_owned());

		for (name, value) in &options.headers {
			headers.retain(|existing: &String, _| !existing.eq_ignore_ascii_case(name));
			headers.insert(name.clone(), value.clone());
		}

		Ok(ApiRequest {
			method: context.method,
			url,
			headers,
			body: options.body.clone(),
			query: options.query.clone(),
			timeout: context.timeout,
		})
	}
}
impl Debug for AuthenticatedRequestExecutor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthenticatedRequestExecutor")
			.field("base_url", &self.config.base_url.as_str())
			.field("coordinator", &self.coordinator)
			.finish()
	}
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
	code: Option<String>,
	error: Option<String>,
	message: Option<String>,
}

fn failure_from_response(response: &ApiResponse) -> AttemptFailure {
	let body = serde_json::from_slice::<ErrorBody>(&response.body).unwrap_or_default();
	let message = body
		.error
		.or(body.message)
		.unwrap_or_else(|| format!("HTTP status {}", response.status));

	AttemptFailure::http(response.status, body.code, message)
}

fn join_url(base: &Url, endpoint: &str) -> Result<Url, ConfigError> {
	let base = base.as_str().trim_end_matches('/');
	let raw = if endpoint.starts_with('/') {
		format!("{base}{endpoint}")
	} else {
		format!("{base}/{endpoint}")
	};

	Url::parse(&raw)
		.map_err(|source| ConfigError::InvalidEndpoint { endpoint: endpoint.to_owned(), source })
}

fn timestamp() -> String {
	OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

fn flow_outcome<T>(result: &Result<T>) -> FlowOutcome {
	if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure }
}
