//! Process-wide holder of the current token triple and refresh bookkeeping.
//!
//! Every mutation takes a single write lock, so readers observe either the old triple or the
//! new one, never a mix. Queries come in two flavors: `*_at(now)` variants are pure functions
//! of the state and the supplied instant, the plain variants read the UTC clock.

// std
use std::sync::OnceLock;
// self
use crate::{_prelude::*, auth::TokenSecret};

/// Threshold used by [`TokenStore::is_token_expiring_soon`] callers that do not override it.
pub const DEFAULT_EXPIRING_SOON: Duration = Duration::minutes(5);

static GLOBAL: OnceLock<Arc<TokenStore>> = OnceLock::new();

/// Single authoritative record of authentication material.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenState {
	/// Bearer token.
	pub access_token: Option<TokenSecret>,
	/// Refresh token.
	pub refresh_token: Option<TokenSecret>,
	/// Absolute expiry; absence is treated as already expired.
	pub expires_at: Option<OffsetDateTime>,
	/// `true` exactly while a recovery cycle owns the token.
	pub is_refreshing: bool,
	/// Fresh-issuance attempts since the last successful refresh.
	pub refresh_attempts: u32,
}
impl TokenState {
	/// Returns `true` if `expires_at` is absent or not after `now`.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		match self.expires_at {
			Some(expires_at) => expires_at <= now,
			None => true,
		}
	}

	/// Returns `true` if the token is still valid but expires within `threshold`.
	pub fn is_expiring_soon_at(&self, now: OffsetDateTime, threshold: Duration) -> bool {
		match self.expires_at {
			Some(expires_at) if expires_at > now => expires_at - now < threshold,
			_ => false,
		}
	}

	/// Remaining lifetime clamped to zero; zero when the expiry is unknown.
	pub fn time_until_expiration_at(&self, now: OffsetDateTime) -> Duration {
		match self.expires_at {
			Some(expires_at) if expires_at > now => expires_at - now,
			_ => Duration::ZERO,
		}
	}
}

/// Thread-safe token store shared by the executor and the refresh coordinator.
#[derive(Debug, Default)]
pub struct TokenStore(RwLock<TokenState>);
impl TokenStore {
	/// Returns the process-wide store, creating it empty on first use.
	pub fn global() -> Arc<Self> {
		GLOBAL.get_or_init(Default::default).clone()
	}

	/// Replaces the token triple atomically; refresh bookkeeping is left untouched.
	pub fn set_tokens(
		&self,
		access_token: Option<TokenSecret>,
		refresh_token: Option<TokenSecret>,
		expires_at: Option<OffsetDateTime>,
	) {
		let mut state = self.0.write();

		state.access_token = access_token;
		state.refresh_token = refresh_token;
		state.expires_at = expires_at;
	}

	/// Sets every token field to absent.
	pub fn clear_tokens(&self) {
		self.set_tokens(None, None, None);
	}

	/// Returns a consistent copy of the whole state.
	pub fn snapshot(&self) -> TokenState {
		self.0.read().clone()
	}

	/// Returns the current access token, if any.
	pub fn access_token(&self) -> Option<TokenSecret> {
		self.0.read().access_token.clone()
	}

	/// Returns the stored expiry instant, if any.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.0.read().expires_at
	}

	/// Returns `true` while a recovery cycle is running.
	pub fn is_refreshing(&self) -> bool {
		self.0.read().is_refreshing
	}

	/// Returns the attempts counter of the current (or last failed) refresh cycle.
	pub fn refresh_attempts(&self) -> u32 {
		self.0.read().refresh_attempts
	}

	/// See [`TokenState::is_expired_at`].
	pub fn is_token_expired_at(&self, now: OffsetDateTime) -> bool {
		self.0.read().is_expired_at(now)
	}

	/// Checks expiry against the current UTC clock.
	pub fn is_token_expired(&self) -> bool {
		self.is_token_expired_at(OffsetDateTime::now_utc())
	}

	/// See [`TokenState::is_expiring_soon_at`].
	pub fn is_token_expiring_soon_at(&self, now: OffsetDateTime, threshold: Duration) -> bool {
		self.0.read().is_expiring_soon_at(now, threshold)
	}

	/// Checks the expiring-soon window against the current UTC clock.
	pub fn is_token_expiring_soon(&self, threshold: Duration) -> bool {
		self.is_token_expiring_soon_at(OffsetDateTime::now_utc(), threshold)
	}

	/// See [`TokenState::time_until_expiration_at`].
	pub fn time_until_expiration_at(&self, now: OffsetDateTime) -> Duration {
		self.0.read().time_until_expiration_at(now)
	}

	/// Remaining lifetime relative to the current UTC clock.
	pub fn time_until_expiration(&self) -> Duration {
		self.time_until_expiration_at(OffsetDateTime::now_utc())
	}

	/// Raises the refreshing flag. Returns `false` if it was already raised.
	pub(crate) fn begin_refresh(&self) -> bool {
		let mut state = self.0.write();

		if state.is_refreshing {
			return false;
		}

		state.is_refreshing = true;

		true
	}

	/// Counts one fresh-issuance attempt; ignored outside a refresh cycle.
	pub(crate) fn record_refresh_attempt(&self) -> u32 {
		let mut state = self.0.write();

		if state.is_refreshing {
			state.refresh_attempts = state.refresh_attempts.saturating_add(1);
		}

		state.refresh_attempts
	}

	/// Lowers the refreshing flag, resetting the attempts counter on success.
	pub(crate) fn finish_refresh(&self, success: bool) {
		let mut state = self.0.write();

		state.is_refreshing = false;

		if success {
			state.refresh_attempts = 0;
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	const NOW: OffsetDateTime = macros::datetime!(2025-06-01 12:00 UTC);

	fn store_expiring_at(expires_at: Option<OffsetDateTime>) -> TokenStore {
		let store = TokenStore::default();

		store.set_tokens(Some("access".into()), Some("refresh".into()), expires_at);

		store
	}

	#[test]
	fn set_then_read_returns_exact_triple() {
		let store = store_expiring_at(Some(NOW + Duration::hours(1)));
		let state = store.snapshot();

		assert_eq!(state.access_token.as_ref().map(TokenSecret::expose), Some("access"));
		assert_eq!(state.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh"));
		assert_eq!(state.expires_at, Some(NOW + Duration::hours(1)));
		assert!(!state.is_refreshing);
		assert_eq!(state.refresh_attempts, 0);
	}

	#[test]
	fn snapshot_debug_output_redacts_both_tokens() {
		let rendered = format!("{:?}", store_expiring_at(Some(NOW)).snapshot());

		assert!(rendered.contains("<redacted>"));
		assert!(!rendered.contains("\"access\""));
		assert!(!rendered.contains("\"refresh\""));
	}

	#[test]
	fn clear_sets_every_token_field_absent() {
		let store = store_expiring_at(Some(NOW));

		store.clear_tokens();

		let state = store.snapshot();

		assert!(state.access_token.is_none());
		assert!(state.refresh_token.is_none());
		assert!(state.expires_at.is_none());
	}

	#[test]
	fn expiry_is_fail_safe_and_inclusive() {
		assert!(store_expiring_at(None).is_token_expired_at(NOW));
		assert!(store_expiring_at(Some(NOW)).is_token_expired_at(NOW));
		assert!(store_expiring_at(Some(NOW - Duration::seconds(1))).is_token_expired_at(NOW));
		assert!(!store_expiring_at(Some(NOW + Duration::seconds(1))).is_token_expired_at(NOW));
	}

	#[test]
	fn expiring_soon_is_strictly_inside_the_window() {
		let threshold = DEFAULT_EXPIRING_SOON;

		assert!(
			store_expiring_at(Some(NOW + Duration::minutes(4)))
				.is_token_expiring_soon_at(NOW, threshold)
		);
		assert!(
			!store_expiring_at(Some(NOW + Duration::minutes(5)))
				.is_token_expiring_soon_at(NOW, threshold)
		);
		assert!(!store_expiring_at(Some(NOW)).is_token_expiring_soon_at(NOW, threshold));
		assert!(!store_expiring_at(None).is_token_expiring_soon_at(NOW, threshold));
	}

	#[test]
	fn time_until_expiration_clamps_to_zero() {
		assert_eq!(
			store_expiring_at(Some(NOW + Duration::minutes(10))).time_until_expiration_at(NOW),
			Duration::minutes(10)
		);
		assert_eq!(
			store_expiring_at(Some(NOW - Duration::minutes(10))).time_until_expiration_at(NOW),
			Duration::ZERO
		);
		assert_eq!(store_expiring_at(None).time_until_expiration_at(NOW), Duration::ZERO);
	}

	#[test]
	fn refresh_bookkeeping_only_counts_inside_a_cycle() {
		let store = TokenStore::default();

		assert_eq!(store.record_refresh_attempt(), 0);
		assert!(store.begin_refresh());
		assert!(!store.begin_refresh());
		assert_eq!(store.record_refresh_attempt(), 1);
		assert_eq!(store.record_refresh_attempt(), 2);

		store.set_tokens(Some("a".into()), None, None);

		assert!(store.is_refreshing());

		store.finish_refresh(false);

		assert!(!store.is_refreshing());
		assert_eq!(store.refresh_attempts(), 2);
		assert!(store.begin_refresh());

		store.finish_refresh(true);

		assert_eq!(store.refresh_attempts(), 0);
	}

	#[test]
	fn global_store_is_shared() {
		let first = TokenStore::global();
		let second = TokenStore::global();

		assert!(Arc::ptr_eq(&first, &second));
	}
}
