//! Bounded, categorized event journal.
//!
//! Every component records its diagnostics here. The journal keeps the most recent entries in
//! a ring buffer so operators can inspect what happened to the token lifecycle without a log
//! pipeline, and forwards each entry to `tracing` when that feature is enabled.

// self
use crate::{_prelude::*, obs::tracing::emit_entry};

/// Default number of entries retained by [`EventJournal`].
pub const DEFAULT_JOURNAL_CAPACITY: usize = 200;

/// Severity of a journal entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
	/// Verbose diagnostics.
	Debug,
	/// Normal lifecycle events.
	Info,
	/// Recoverable anomalies.
	Warn,
	/// Failures surfaced to a caller.
	Error,
	/// Failures that forced a session teardown.
	Critical,
}

/// Subsystem an entry belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
	/// Token store and recovery cycles.
	Token,
	/// Session provider interactions.
	Auth,
	/// Outbound API requests.
	Api,
	/// Retry decisions.
	Retry,
}
impl LogCategory {
	/// Returns a stable label suitable for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Token => "token",
			Self::Auth => "auth",
			Self::Api => "api",
			Self::Retry => "retry",
		}
	}
}

/// One recorded event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
	/// Instant the entry was recorded.
	pub at: OffsetDateTime,
	/// Entry severity.
	pub severity: Severity,
	/// Entry category.
	pub category: LogCategory,
	/// Short human-readable message.
	pub message: Cow<'static, str>,
	/// Structured context.
	pub fields: serde_json::Map<String, serde_json::Value>,
}
impl LogEntry {
	/// Creates an entry stamped with the current clock.
	pub fn new(
		severity: Severity,
		category: LogCategory,
		message: impl Into<Cow<'static, str>>,
	) -> Self {
		Self {
			at: OffsetDateTime::now_utc(),
			severity,
			category,
			message: message.into(),
			fields: Default::default(),
		}
	}

	/// Attaches a structured field.
	pub fn field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
		self.fields.insert(key.to_owned(), value.into());

		self
	}
}

/// Thread-safe ring buffer of [`LogEntry`] values.
#[derive(Debug)]
pub struct EventJournal {
	capacity: usize,
	entries: Mutex<VecDeque<LogEntry>>,
}
impl EventJournal {
	/// Creates a journal retaining at most `capacity` entries (at least one).
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);

		Self { capacity, entries: Mutex::new(VecDeque::with_capacity(capacity)) }
	}

	/// Maximum number of retained entries.
	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// Records an entry, evicting the oldest one when full.
	pub fn record(&self, entry: LogEntry) {
		emit_entry(&entry);

		let mut entries = self.entries.lock();

		if entries.len() == self.capacity {
			entries.pop_front();
		}

		entries.push_back(entry);
	}

	/// Returns up to `count` of the newest entries, oldest first, optionally filtered.
	pub fn recent(&self, count: usize, category: Option<LogCategory>) -> Vec<LogEntry> {
		let entries = self.entries.lock();
		let mut picked = entries
			.iter()
			.rev()
			.filter(|entry| category.is_none_or(|wanted| entry.category == wanted))
			.take(count)
			.cloned()
			.collect::<Vec<_>>();

		picked.reverse();

		picked
	}

	/// Number of retained entries.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	/// Returns `true` when nothing has been recorded yet.
	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}

	/// Shorthand for a `Debug` entry.
	pub fn debug(
		&self,
		category: LogCategory,
		message: impl Into<Cow<'static, str>>,
	) -> EntryWriter<'_> {
		EntryWriter::new(self, Severity::Debug, category, message)
	}

	/// Shorthand for an `Info` entry.
	pub fn info(
		&self,
		category: LogCategory,
		message: impl Into<Cow<'static, str>>,
	) -> EntryWriter<'_> {
		EntryWriter::new(self, Severity::Info, category, message)
	}

	/// Shorthand for a `Warn` entry.
	pub fn warn(
		&self,
		category: LogCategory,
		message: impl Into<Cow<'static, str>>,
	) -> EntryWriter<'_> {
		EntryWriter::new(self, Severity::Warn, category, message)
	}

	/// Shorthand for an `Error` entry.
	pub fn error(
		&self,
		category: LogCategory,
		message: impl Into<Cow<'static, str>>,
	) -> EntryWriter<'_> {
		EntryWriter::new(self, Severity::Error, category, message)
	}

	/// Shorthand for a `Critical` entry.
	pub fn critical(
		&self,
		category: LogCategory,
		message: impl Into<Cow<'static, str>>,
	) -> EntryWriter<'_> {
		EntryWriter::new(self, Severity::Critical, category, message)
	}
}
impl Default for EventJournal {
	fn default() -> Self {
		Self::new(DEFAULT_JOURNAL_CAPACITY)
	}
}

/// Pending entry, recorded in the journal when the writer is dropped.
///
/// ```
/// # use bearer_guard::obs::{EventJournal, LogCategory};
/// let journal = EventJournal::default();
///
/// journal.info(LogCategory::Api, "request sent").field("status", 200);
///
/// assert_eq!(journal.len(), 1);
/// ```
pub struct EntryWriter<'a> {
	journal: &'a EventJournal,
	entry: Option<LogEntry>,
}
impl<'a> EntryWriter<'a> {
	fn new(
		journal: &'a EventJournal,
		severity: Severity,
		category: LogCategory,
		message: impl Into<Cow<'static, str>>,
	) -> Self {
		Self { journal, entry: Some(LogEntry::new(severity, category, message)) }
	}

	/// Attaches a structured field.
	pub fn field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
		self.entry = self.entry.take().map(|entry| entry.field(key, value));

		self
	}
}
impl Drop for EntryWriter<'_> {
	fn drop(&mut self) {
		if let Some(entry) = self.entry.take() {
			self.journal.record(entry);
		}
	}
}
impl Debug for EntryWriter<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("EntryWriter(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn capacity_evicts_oldest_entries() {
		let journal = EventJournal::new(3);

		for idx in 0..5_u64 {
			journal.info(LogCategory::Api, "tick").field("idx", idx);
		}

		let entries = journal.recent(10, None);

		assert_eq!(journal.len(), 3);
		assert_eq!(
			entries.iter().map(|entry| entry.fields["idx"].as_u64()).collect::<Vec<_>>(),
			[Some(2), Some(3), Some(4)]
		);
	}

	#[test]
	fn recent_filters_by_category_and_count() {
		let journal = EventJournal::default();

		journal.info(LogCategory::Token, "first token");
		journal.warn(LogCategory::Retry, "retrying");
		journal.critical(LogCategory::Token, "second token");
		journal.debug(LogCategory::Token, "third token");

		let tokens = journal.recent(2, Some(LogCategory::Token));

		assert_eq!(
			tokens.iter().map(|entry| entry.message.as_ref()).collect::<Vec<_>>(),
			["second token", "third token"]
		);
		assert_eq!(tokens[0].severity, Severity::Critical);
		assert_eq!(journal.recent(10, Some(LogCategory::Auth)), Vec::new());
	}

	#[test]
	fn zero_capacity_still_keeps_the_latest_entry() {
		let journal = EventJournal::new(0);

		journal.error(LogCategory::Auth, "one");
		journal.error(LogCategory::Auth, "two");

		assert_eq!(journal.capacity(), 1);
		assert_eq!(journal.recent(5, None)[0].message, "two");
	}
}
