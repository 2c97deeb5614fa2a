// self
use crate::{
	_prelude::*,
	obs::{FlowKind, LogEntry, Severity},
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by executor and coordinator operations.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		Self::with_key(kind, stage, "")
	}

	/// Creates a span that also records the request's retry key.
	pub fn with_key(kind: FlowKind, stage: &'static str, retry_key: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span =
				tracing::info_span!("bearer_guard.flow", flow = kind.as_str(), stage, retry_key);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage, retry_key);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Mirrors a journal entry into the `tracing` pipeline (no-op without the feature).
pub(crate) fn emit_entry(entry: &LogEntry) {
	#[cfg(feature = "tracing")]
	{
		let category = entry.category.as_str();
		let fields = serde_json::Value::Object(entry.fields.clone());

		match entry.severity {
			Severity::Debug => tracing::debug!(category, %fields, "{}", entry.message),
			Severity::Info => tracing::info!(category, %fields, "{}", entry.message),
			Severity::Warn => tracing::warn!(category, %fields, "{}", entry.message),
			Severity::Error => tracing::error!(category, %fields, "{}", entry.message),
			Severity::Critical =>
				tracing::error!(category, %fields, critical = true, "{}", entry.message),
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = entry;
	}
}
