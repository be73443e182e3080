//! Optional observability helpers for the perform pipeline.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `http_courier.perform` with
//!   the request `method` and `url` fields.
//! - Enable `metrics` to increment the `http_courier_perform_total` counter for
//!   every attempt/success/failure, labeled by `outcome`.

// self
use crate::_prelude::*;

/// Outcome labels recorded for each perform call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PerformOutcome {
	/// Entry to the perform pipeline.
	Attempt,
	/// Successful completion, including cache hits.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl PerformOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			PerformOutcome::Attempt => "attempt",
			PerformOutcome::Success => "success",
			PerformOutcome::Failure => "failure",
		}
	}
}
impl Display for PerformOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records a perform outcome via the global metrics recorder (when enabled).
pub fn record_perform_outcome(outcome: PerformOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("http_courier_perform_total", "outcome" => outcome.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedPerform<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedPerform<F> = F;

/// A span builder wrapping one perform call.
#[derive(Clone, Debug)]
pub struct PerformSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl PerformSpan {
	/// Creates a new span tagged with the request method + URL.
	pub fn new(method: &Method, url: &Url) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"http_courier.perform",
				method = %method,
				url = %url,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (method, url);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedPerform<Fut>
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

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_perform_outcome_noop_without_metrics() {
		record_perform_outcome(PerformOutcome::Failure);
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let url =
			Url::parse("https://api.example.com/").expect("Fixture URL should parse successfully.");
		let span = PerformSpan::new(&Method::GET, &url);
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
