//! Session provider contract and an in-process implementation.
//!
//! The identity layer is an external collaborator: it may be slow, it may fail, and it owns
//! the authoritative session. The executor never caches a session beyond the
//! [`TokenStore`](crate::store::TokenStore) mirror and asks the provider again on every call.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Boxed future returned by [`SessionProvider`] methods.
pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SessionError>> + 'a + Send>>;

/// Source of the current authenticated session.
pub trait SessionProvider
where
	Self: Send + Sync,
{
	/// Returns the current session, or `None` when the user is signed out.
	fn current_session(&self) -> SessionFuture<'_, Option<Session>>;

	/// Obtains a completely fresh session during recovery.
	///
	/// The default implementation asks for the current session again, which is enough for
	/// providers that rotate tokens transparently. Override it when the identity layer
	/// exposes an explicit refresh call.
	fn fresh_session(&self) -> SessionFuture<'_, Option<Session>> {
		self.current_session()
	}

	/// Tears the session down so the user has to authenticate again.
	fn invalidate_session(&self) -> SessionFuture<'_, ()>;
}

/// Error type produced by [`SessionProvider`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SessionError {
	/// The identity layer could not be reached or answered with garbage.
	#[error("Session provider failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
impl SessionError {
	/// Builds a [`SessionError::Backend`] from any displayable message.
	pub fn backend(message: impl Into<String>) -> Self {
		Self::Backend { message: message.into() }
	}
}

/// Token material carried by an authenticated session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
	/// Bearer token presented on every request.
	pub access_token: Option<TokenSecret>,
	/// Refresh token, if the identity layer issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Absolute expiry of the access token.
	pub expires_at: Option<OffsetDateTime>,
}
impl Session {
	/// Creates a session carrying the provided access token.
	pub fn new(access_token: impl Into<TokenSecret>) -> Self {
		Self { access_token: Some(access_token.into()), ..Default::default() }
	}

	/// Adds a refresh token.
	pub fn with_refresh_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.refresh_token = Some(token.into());

		self
	}

	/// Sets the absolute expiry instant.
	pub fn with_expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets the expiry relative to the current clock.
	pub fn expires_in(self, duration: Duration) -> Self {
		self.with_expires_at(OffsetDateTime::now_utc() + duration)
	}

	/// Returns `true` when the session carries an access token.
	pub fn has_access_token(&self) -> bool {
		self.access_token.is_some()
	}
}

/// Thread-safe provider that keeps the session in-process for tests and demos.
///
/// [`SessionProvider::invalidate_session`] clears the held session, mirroring a sign-out.
#[derive(Clone, Debug, Default)]
pub struct MemorySessionProvider(Arc<RwLock<Option<Session>>>);
impl MemorySessionProvider {
	/// Creates a provider already holding `session`.
	pub fn with_session(session: Session) -> Self {
		Self(Arc::new(RwLock::new(Some(session))))
	}

	/// Replaces the held session.
	pub fn set_session(&self, session: Option<Session>) {
		*self.0.write() = session;
	}

	/// Returns a copy of the held session.
	pub fn session(&self) -> Option<Session> {
		self.0.read().clone()
	}
}
impl SessionProvider for MemorySessionProvider {
	fn current_session(&self) -> SessionFuture<'_, Option<Session>> {
		let session = self.session();

		Box::pin(async move { Ok(session) })
	}

	fn invalidate_session(&self) -> SessionFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			slot.write().take();

			Ok(())
		})
	}
}
