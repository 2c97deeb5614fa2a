//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	sync::{
		Arc,
		atomic::{AtomicU32, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use parking_lot::Mutex;
use serde_json::json;
use time::Duration;
// self
use bearer_guard::{
	auth::{Session, SessionError, SessionFuture, SessionProvider},
	config::ExecutorConfig,
	error::TransportError,
	executor::AuthenticatedRequestExecutor,
	http::{ApiRequest, ApiResponse, HttpTransport, TransportFuture},
	notice::{Notice, NotificationSink},
	retry::RetryPolicy,
	store::TokenStore,
	url::Url,
};

/// Session provider whose current and fresh sessions are set by the test.
///
/// A successful fresh fetch rotates the current session, like a real identity layer would.
#[derive(Default)]
pub struct ScriptedSessions {
	pub current: Mutex<Option<Session>>,
	pub fresh: Mutex<Option<Session>>,
	pub fresh_delay: Mutex<StdDuration>,
	pub current_calls: AtomicU32,
	pub fresh_calls: AtomicU32,
	pub invalidations: AtomicU32,
}
impl ScriptedSessions {
	pub fn new(current: Option<Session>, fresh: Option<Session>) -> Arc<Self> {
		Arc::new(Self {
			current: Mutex::new(current),
			fresh: Mutex::new(fresh),
			..Default::default()
		})
	}

	pub fn with_fresh_delay(self: Arc<Self>, delay: StdDuration) -> Arc<Self> {
		*self.fresh_delay.lock() = delay;

		self
	}

	pub fn current_calls(&self) -> u32 {
		self.current_calls.load(Ordering::SeqCst)
	}

	pub fn fresh_calls(&self) -> u32 {
		self.fresh_calls.load(Ordering::SeqCst)
	}

	pub fn invalidations(&self) -> u32 {
		self.invalidations.load(Ordering::SeqCst)
	}
}
impl SessionProvider for ScriptedSessions {
	fn current_session(&self) -> SessionFuture<'_, Option<Session>> {
		Box::pin(async move {
			self.current_calls.fetch_add(1, Ordering::SeqCst);

			Ok(self.current.lock().clone())
		})
	}

	fn fresh_session(&self) -> SessionFuture<'_, Option<Session>> {
		Box::pin(async move {
			self.fresh_calls.fetch_add(1, Ordering::SeqCst);

			let delay = *self.fresh_delay.lock();

			if !delay.is_zero() {
				tokio::time::sleep(delay).await;
			}

			let fresh = self.fresh.lock().clone();

			if fresh.is_some() {
				*self.current.lock() = fresh.clone();
			}

			Ok(fresh)
		})
	}

	fn invalidate_session(&self) -> SessionFuture<'_, ()> {
		Box::pin(async move {
			self.invalidations.fetch_add(1, Ordering::SeqCst);
			self.current.lock().take();

			Ok::<(), SessionError>(())
		})
	}
}

/// Transport that replays queued results and records every request it receives.
///
/// Once the queue is drained every request gets `200 {}`.
#[derive(Default)]
pub struct ScriptedTransport {
	pub queue: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
	pub requests: Mutex<Vec<ApiRequest>>,
}
impl ScriptedTransport {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn respond(self: Arc<Self>, status: u16, body: serde_json::Value) -> Arc<Self> {
		self.queue.lock().push_back(Ok(ApiResponse::json_body(status, &body)));

		self
	}

	pub fn reject(self: Arc<Self>, code: &str) -> Arc<Self> {
		self.respond(401, json!({ "code": code, "error": "Unauthorized" }))
	}

	pub fn fail(self: Arc<Self>, error: TransportError) -> Arc<Self> {
		self.queue.lock().push_back(Err(error));

		self
	}

	pub fn requests(&self) -> Vec<ApiRequest> {
		self.requests.lock().clone()
	}

	pub fn bearers(&self) -> Vec<Option<String>> {
		self.requests
			.lock()
			.iter()
			.map(|request| request.header("authorization").map(ToOwned::to_owned))
			.collect()
	}
}
impl HttpTransport for ScriptedTransport {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			self.requests.lock().push(request);

			let next = self.queue.lock().pop_front();

			next.unwrap_or_else(|| Ok(ApiResponse::json_body(200, &json!({}))))
		})
	}
}

/// Notification sink that keeps every notice it receives.
#[derive(Default)]
pub struct RecordingSink(pub Mutex<Vec<Notice>>);
impl RecordingSink {
	pub fn titles(&self) -> Vec<String> {
		self.0.lock().iter().map(|notice| notice.title.to_string()).collect()
	}
}
impl NotificationSink for RecordingSink {
	fn notify(&self, notice: &Notice) {
		self.0.lock().push(notice.clone());
	}
}

pub fn session(token: &str, lifetime: Duration) -> Session {
	Session::new(token).with_refresh_token(format!("{token}-refresh")).expires_in(lifetime)
}

pub fn fast_config() -> ExecutorConfig {
	let base = Url::parse("https://api.example.com").expect("Fixture base URL should parse.");

	ExecutorConfig::new(base).with_retry(
		RetryPolicy::default()
			.with_base_delay(Duration::milliseconds(5))
			.with_max_delay(Duration::milliseconds(20))
			.with_jitter_ratio(0.0),
	)
}

pub fn executor(
	config: ExecutorConfig,
	sessions: Arc<ScriptedSessions>,
	transport: Arc<ScriptedTransport>,
) -> (AuthenticatedRequestExecutor, Arc<TokenStore>) {
	let store = Arc::new(TokenStore::default());
	let executor = AuthenticatedRequestExecutor::with_store(config, store.clone(), sessions, transport)
		.expect("Test configuration should be valid.");

	(executor, store)
}
