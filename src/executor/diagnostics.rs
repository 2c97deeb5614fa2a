// self
use crate::{_prelude::*, store::TokenState};

/// Secret-free view of the token state for debugging surfaces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSnapshot {
	/// An access token is stored.
	pub has_access_token: bool,
	/// A refresh token is stored.
	pub has_refresh_token: bool,
	/// Stored expiry.
	pub expires_at: Option<OffsetDateTime>,
	/// Remaining lifetime, zero when expired or unknown.
	pub time_until_expiration: Duration,
	/// Token is expired (or its expiry is unknown).
	pub is_expired: bool,
	/// Token expires inside the configured threshold.
	pub is_expiring_soon: bool,
	/// A recovery cycle is running.
	pub is_refreshing: bool,
	/// Attempts of the current (or last failed) refresh cycle.
	pub refresh_attempts: u32,
}
impl TokenSnapshot {
	/// Builds a snapshot of `state` as seen at `now`.
	pub fn at(state: &TokenState, now: OffsetDateTime, threshold: Duration) -> Self {
		Self {
			has_access_token: state.access_token.is_some(),
			has_refresh_token: state.refresh_token.is_some(),
			expires_at: state.expires_at,
			time_until_expiration: state.time_until_expiration_at(now),
			is_expired: state.is_expired_at(now),
			is_expiring_soon: state.is_expiring_soon_at(now, threshold),
			is_refreshing: state.is_refreshing,
			refresh_attempts: state.refresh_attempts,
		}
	}
}
