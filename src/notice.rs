//! User-facing notices for failures the user has to act on.
//!
//! Rendering is the caller's business; the crate only hands a [`Notice`] to a
//! [`NotificationSink`]. [`NoticeDispatcher`] coalesces notices sharing a key inside a
//! window, so a burst of failed requests produces one notice instead of one per request.

// self
use crate::{
	_prelude::*,
	classify::ErrorCategory,
	obs::{EventJournal, LogCategory},
};

/// Message handed to a [`NotificationSink`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
	/// De-duplication key.
	pub key: Cow<'static, str>,
	/// Category of the failure that produced the notice.
	pub category: ErrorCategory,
	/// Short title.
	pub title: Cow<'static, str>,
	/// One-sentence explanation.
	pub description: Cow<'static, str>,
}
impl Notice {
	/// Notice emitted when the gateway rejects a token as issued in the future.
	pub fn clock_skew() -> Self {
		Self {
			key: Cow::Borrowed("clock-sync-error"),
			category: ErrorCategory::AuthClockSkew,
			title: Cow::Borrowed("Clock Sync Issue"),
			description: Cow::Borrowed("Please check your system time and try again."),
		}
	}
}

/// Receiver of user-facing notices.
pub trait NotificationSink
where
	Self: Send + Sync,
{
	/// Delivers a notice. Must not block.
	fn notify(&self, notice: &Notice);
}

/// Sink that only records notices in the event journal.
#[derive(Clone, Debug)]
pub struct JournalSink(pub Arc<EventJournal>);
impl NotificationSink for JournalSink {
	fn notify(&self, notice: &Notice) {
		self.0
			.warn(LogCategory::Auth, "User notice raised.")
			.field("key", notice.key.as_ref())
			.field("title", notice.title.as_ref())
			.field("category", notice.category.as_str());
	}
}

/// De-duplicating front of a [`NotificationSink`].
pub struct NoticeDispatcher {
	sink: Arc<dyn NotificationSink>,
	window: Duration,
	last_sent: Mutex<HashMap<Cow<'static, str>, OffsetDateTime>>,
}
impl NoticeDispatcher {
	/// Creates a dispatcher coalescing notices with the same key inside `window`.
	pub fn new(sink: Arc<dyn NotificationSink>, window: Duration) -> Self {
		Self { sink, window, last_sent: Default::default() }
	}

	/// Delivers `notice` unless one with the same key went out less than `window` before
	/// `now`. Returns `true` when the sink was called.
	pub fn dispatch_at(&self, notice: &Notice, now: OffsetDateTime) -> bool {
		{
			let mut last_sent = self.last_sent.lock();

			if let Some(previous) = last_sent.get(&notice.key)
				&& now - *previous < self.window
			{
				return false;
			}

			last_sent.insert(notice.key.clone(), now);
		}

		self.sink.notify(notice);

		true
	}

	/// [`dispatch_at`](Self::dispatch_at) with the current UTC clock.
	pub fn dispatch(&self, notice: &Notice) -> bool {
		self.dispatch_at(notice, OffsetDateTime::now_utc())
	}
}
impl Debug for NoticeDispatcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("NoticeDispatcher").field("window", &self.window).finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[derive(Default)]
	struct CountingSink(Mutex<Vec<Notice>>);
	impl NotificationSink for CountingSink {
		fn notify(&self, notice: &Notice) {
			self.0.lock().push(notice.clone());
		}
	}

	#[test]
	fn identical_notices_inside_window_are_coalesced() {
		let sink = Arc::new(CountingSink::default());
		let dispatcher = NoticeDispatcher::new(sink.clone(), Duration::seconds(5));
		let start = macros::datetime!(2025-03-01 09:00 UTC);

		assert!(dispatcher.dispatch_at(&Notice::clock_skew(), start));
		assert!(!dispatcher.dispatch_at(&Notice::clock_skew(), start + Duration::seconds(2)));
		assert!(dispatcher.dispatch_at(&Notice::clock_skew(), start + Duration::seconds(5)));
		assert_eq!(sink.0.lock().len(), 2);
	}

	#[test]
	fn distinct_keys_are_independent() {
		let sink = Arc::new(CountingSink::default());
		let dispatcher = NoticeDispatcher::new(sink.clone(), Duration::seconds(5));
		let other = Notice { key: Cow::Borrowed("other"), ..Notice::clock_skew() };

		assert!(dispatcher.dispatch(&Notice::clock_skew()));
		assert!(dispatcher.dispatch(&other));
		assert_eq!(sink.0.lock().len(), 2);
	}

	#[test]
	fn journal_sink_records_a_warning() {
		let journal = Arc::new(EventJournal::default());

		JournalSink(journal.clone()).notify(&Notice::clock_skew());

		let entries = journal.recent(1, Some(LogCategory::Auth));

		assert_eq!(entries[0].fields["key"], "clock-sync-error");
	}
}
