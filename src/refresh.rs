//! Single-flight token recovery.
//!
//! [`TokenRefreshCoordinator`] is a two-state machine (`Idle`/`Refreshing`). The first caller
//! that needs recovery raises the store's refreshing flag and spawns the recovery procedure on
//! the Tokio runtime; the cycle's outcome is published through a `watch` channel whose
//! receiver is parked in the coordinator. Callers arriving while the cycle runs clone that
//! receiver instead of starting their own procedure, so N concurrent callers observe exactly
//! one fetch and the same outcome. When the procedure ends (success, failure, timeout, or
//! panic) a drop guard clears the parked receiver and lowers the flag, returning the machine
//! to `Idle` so the next failure starts a fresh cycle.
//!
//! A joiner whose trigger is stricter than the cycle it joined (an expired token joining a
//! background refresh, or a rejected token joining an expiry refresh) does not accept an
//! outcome that leaves its own problem in place. It runs its own cycle after the joined one.

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use tokio::sync::watch;
// self
use crate::{
	_prelude::*,
	auth::{Session, SessionProvider},
	classify::{ErrorCategory, FailureDescriptor, ProviderCode},
	notice::{Notice, NoticeDispatcher},
	obs::{self, EventJournal, FlowKind, FlowOutcome, FlowSpan, LogCategory},
	store::TokenStore,
};

type CycleReceiver = watch::Receiver<Option<RecoveryOutcome>>;

/// Why recovery was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecoveryTrigger {
	/// Token expired (locally detected or `TOKEN_EXPIRED`); fetch a fresh session.
	Expired,
	/// `TOKEN_EXTREMELY_STALE`; skip the fetch and invalidate.
	ExtremelyStale,
	/// Token is fundamentally wrong; invalidate without fetching.
	Invalid,
	/// Client clock is off; tokens are left alone and the user is notified.
	ClockSkew,
	/// Token is still valid but close to expiry; a failed fetch keeps it.
	ExpiringSoon,
}
impl RecoveryTrigger {
	/// Derives the trigger for a failed attempt, or `None` if it is not an auth failure.
	pub fn from_failure(failure: &FailureDescriptor) -> Option<Self> {
		match failure.category() {
			ErrorCategory::AuthExpired
				if failure.known_code() == Some(ProviderCode::TokenExtremelyStale) =>
				Some(Self::ExtremelyStale),
			ErrorCategory::AuthExpired => Some(Self::Expired),
			ErrorCategory::AuthInvalid => Some(Self::Invalid),
			ErrorCategory::AuthClockSkew => Some(Self::ClockSkew),
			_ => None,
		}
	}

	/// Returns `true` when `outcome`, published by a cycle this trigger joined, leaves nothing
	/// for this trigger to do.
	///
	/// An expired token is not settled by a background refresh that kept the old token, and a
	/// rejected token is only settled by an invalidated session.
	pub fn is_settled_by(self, outcome: &RecoveryOutcome) -> bool {
		match self {
			Self::Expired => !matches!(outcome, RecoveryOutcome::Unchanged { .. }),
			Self::ExtremelyStale | Self::Invalid =>
				matches!(outcome, RecoveryOutcome::Invalidated { .. }),
			Self::ClockSkew | Self::ExpiringSoon => true,
		}
	}

	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Expired => "expired",
			Self::ExtremelyStale => "extremely_stale",
			Self::Invalid => "invalid",
			Self::ClockSkew => "clock_skew",
			Self::ExpiringSoon => "expiring_soon",
		}
	}
}

/// Result of a recovery cycle, shared by every caller that awaited it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecoveryOutcome {
	/// A fresh token was stored; the failed request may be replayed once.
	Recovered,
	/// The session was torn down; the user must authenticate again.
	Invalidated {
		/// Why recovery gave up.
		reason: String,
	},
	/// Nothing the client can fix automatically; the user was notified.
	UserActionable {
		/// What the user needs to fix.
		reason: String,
	},
	/// A background refresh failed; the still-valid token was kept.
	Unchanged {
		/// Why the refresh failed.
		reason: String,
	},
}
impl RecoveryOutcome {
	/// Returns `true` only for [`RecoveryOutcome::Recovered`].
	pub fn should_replay(&self) -> bool {
		matches!(self, Self::Recovered)
	}

	/// Failure reason, if the cycle did not recover.
	pub fn reason(&self) -> Option<&str> {
		match self {
			Self::Recovered => None,
			Self::Invalidated { reason }
			| Self::UserActionable { reason }
			| Self::Unchanged { reason } => Some(reason),
		}
	}

	fn aborted() -> Self {
		Self::Invalidated { reason: "recovery task ended without an outcome".into() }
	}
}

/// Coordinator state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinatorState {
	/// No recovery is running.
	Idle,
	/// A recovery cycle owns the token.
	Refreshing,
}

/// Owns the single-flight recovery protocol for one [`TokenStore`].
///
/// Cloning is cheap and clones share the same cycle. Requires a Tokio runtime because the
/// procedure is spawned so it completes even if every waiting caller is cancelled.
#[derive(Clone)]
pub struct TokenRefreshCoordinator(Arc<CoordinatorInner>);
impl TokenRefreshCoordinator {
	/// Creates a coordinator for `store`, fetching sessions from `sessions`.
	pub fn new(
		store: Arc<TokenStore>,
		sessions: Arc<dyn SessionProvider>,
		notices: Arc<NoticeDispatcher>,
		journal: Arc<EventJournal>,
		refresh_timeout: Duration,
	) -> Self {
		Self(Arc::new(CoordinatorInner {
			store,
			sessions,
			notices,
			journal,
			refresh_timeout,
			metrics: Default::default(),
			cycle: Mutex::new(None),
		}))
	}

	/// Current state of the machine.
	pub fn state(&self) -> CoordinatorState {
		if self.0.cycle.lock().is_some() {
			CoordinatorState::Refreshing
		} else {
			CoordinatorState::Idle
		}
	}

	/// Counters for fetches and joins.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.0.metrics
	}

	/// Runs (or joins) a recovery cycle and returns its outcome. Never fails.
	///
	/// A joined cycle's outcome is only returned when it settles `trigger`
	/// (see [`RecoveryTrigger::is_settled_by`]); otherwise the caller runs its own cycle once
	/// the joined one has ended.
	pub async fn recover(&self, trigger: RecoveryTrigger) -> RecoveryOutcome {
		if trigger == RecoveryTrigger::ClockSkew {
			return self.0.clock_skew();
		}

		loop {
			let (mut receiver, leader) = self.join_or_start(trigger);
			let outcome = match receiver.wait_for(Option::is_some).await {
				Ok(value) => value.clone(),
				Err(_) => None,
			};
			let outcome = outcome.unwrap_or_else(RecoveryOutcome::aborted);

			if leader || trigger.is_settled_by(&outcome) {
				return outcome;
			}

			self.0
				.journal
				.info(LogCategory::Token, "Joined recovery left this trigger unsettled, rerunning.")
				.field("trigger", trigger.as_str())
				.field("joined_reason", outcome.reason());
		}
	}

	fn join_or_start(&self, trigger: RecoveryTrigger) -> (CycleReceiver, bool) {
		let mut cycle = self.0.cycle.lock();

		if let Some(receiver) = cycle.as_ref() {
			self.0.metrics.record_join();
			self.0
				.journal
				.debug(LogCategory::Token, "Recovery already in progress, joining.")
				.field("trigger", trigger.as_str());

			return (receiver.clone(), false);
		}

		let (sender, receiver) = watch::channel(None);

		self.0.store.begin_refresh();
		*cycle = Some(receiver.clone());

		let inner = self.0.clone();

		tokio::spawn(async move {
			let mut guard = CycleGuard { inner: inner.clone(), recovered: false };
			let span = FlowSpan::new(FlowKind::Recovery, trigger.as_str());

			obs::record_flow_outcome(FlowKind::Recovery, FlowOutcome::Attempt);

			let outcome = span.instrument(inner.run(trigger)).await;

			guard.recovered = outcome.should_replay();
			obs::record_flow_outcome(
				FlowKind::Recovery,
				if guard.recovered { FlowOutcome::Success } else { FlowOutcome::Failure },
			);
			drop(guard);
			sender.send_replace(Some(outcome));
		});

		(receiver, true)
	}
}
impl Debug for TokenRefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRefreshCoordinator")
			.field("state", &self.state())
			.field("refresh_timeout", &self.0.refresh_timeout)
			.finish()
	}
}

struct CoordinatorInner {
	store: Arc<TokenStore>,
	sessions: Arc<dyn SessionProvider>,
	notices: Arc<NoticeDispatcher>,
	journal: Arc<EventJournal>,
	refresh_timeout: Duration,
	metrics: RefreshMetrics,
	cycle: Mutex<Option<CycleReceiver>>,
}
impl CoordinatorInner {
	async fn run(&self, trigger: RecoveryTrigger) -> RecoveryOutcome {
		self.journal
			.warn(LogCategory::Token, "Starting token recovery.")
			.field("trigger", trigger.as_str());

		match trigger {
			RecoveryTrigger::ExtremelyStale => {
				self.journal.critical(
					LogCategory::Token,
					"Extremely stale token detected, invalidating the session.",
				);

				self.invalidate("token is extremely stale").await
			},
			RecoveryTrigger::Invalid => self.invalidate("token was rejected as invalid").await,
			RecoveryTrigger::ClockSkew => self.clock_skew(),
			RecoveryTrigger::Expired => match self.fetch_fresh().await {
				Ok(session) => self.accept(session),
				Err(reason) => {
					self.journal
						.critical(LogCategory::Token, "Token recovery failed completely.")
						.field("reason", reason.as_str());

					self.invalidate(&reason).await
				},
			},
			RecoveryTrigger::ExpiringSoon => match self.fetch_fresh().await {
				Ok(session) => self.accept(session),
				Err(reason) => {
					self.journal
						.warn(LogCategory::Token, "Background refresh failed, keeping token.")
						.field("reason", reason.as_str());

					RecoveryOutcome::Unchanged { reason }
				},
			},
		}
	}

	async fn fetch_fresh(&self) -> Result<Session, String> {
		let attempt = self.store.record_refresh_attempt();

		self.metrics.record_attempt();

		let deadline = self.refresh_timeout.unsigned_abs();
		let result = match tokio::time::timeout(deadline, self.sessions.fresh_session()).await {
			Err(_) => Err(format!("session fetch timed out after {}", self.refresh_timeout)),
			Ok(Err(err)) => Err(err.to_string()),
			Ok(Ok(None)) => Err("no fresh session available".to_owned()),
			Ok(Ok(Some(session))) if !session.has_access_token() =>
				Err("fresh session carries no access token".to_owned()),
			Ok(Ok(Some(session))) => Ok(session),
		};

		match &result {
			Ok(_) => self.metrics.record_success(),
			Err(reason) => {
				self.metrics.record_failure();
				self.journal
					.error(LogCategory::Auth, "Fresh session fetch failed.")
					.field("attempt", attempt)
					.field("reason", reason.as_str());
			},
		}

		result
	}

	fn accept(&self, session: Session) -> RecoveryOutcome {
		self.journal
			.info(LogCategory::Token, "Fresh session obtained.")
			.field("has_refresh_token", session.refresh_token.is_some())
			.field("has_expiry", session.expires_at.is_some());
		self.store.set_tokens(session.access_token, session.refresh_token, session.expires_at);

		RecoveryOutcome::Recovered
	}

	async fn invalidate(&self, reason: &str) -> RecoveryOutcome {
		self.store.clear_tokens();

		let deadline = self.refresh_timeout.unsigned_abs();

		match tokio::time::timeout(deadline, self.sessions.invalidate_session()).await {
			Ok(Ok(())) => {
				self.journal
					.warn(LogCategory::Auth, "Session invalidated.")
					.field("reason", reason);
			},
			Ok(Err(err)) => {
				self.journal
					.error(LogCategory::Auth, "Session provider failed to invalidate.")
					.field("error", err.to_string());
			},
			Err(_) => {
				self.journal.error(LogCategory::Auth, "Session invalidation timed out.");
			},
		}

		RecoveryOutcome::Invalidated { reason: reason.to_owned() }
	}

	fn clock_skew(&self) -> RecoveryOutcome {
		let notified = self.notices.dispatch(&Notice::clock_skew());

		self.journal
			.warn(LogCategory::Auth, "Token rejected as issued in the future.")
			.field("notified", notified);

		RecoveryOutcome::UserActionable { reason: "client clock is out of sync".into() }
	}
}

struct CycleGuard {
	inner: Arc<CoordinatorInner>,
	recovered: bool,
}
impl Drop for CycleGuard {
	fn drop(&mut self) {
		self.inner.cycle.lock().take();
		self.inner.store.finish_refresh(self.recovered);
	}
}
