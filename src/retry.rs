//! Retry classification and backoff policy.
//!
//! After every attempt the perform loop asks the request's [`RetryPolicy`] for a
//! [`Verdict`]: carry on with the response, wait and retry, or stop with a
//! terminal failure. All knobs are swappable closures so callers can tune
//! classification per request without subclassing anything.

// crates.io
use rand::Rng;
// self
use crate::{_prelude::*, error::TransportError, response::Response};

/// Predicate over response status codes.
pub type StatusPredicate = Arc<dyn Fn(StatusCode) -> bool + Send + Sync>;
/// Predicate deciding whether a transport failure may be retried.
pub type TransportPredicate = Arc<dyn Fn(&TransportError) -> bool + Send + Sync>;
/// Maps an attempt number (1-based) to a backoff wait.
pub type BackoffFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Decision produced after classifying one attempt's outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
	/// The response is not an error; the perform call succeeds with it.
	Success,
	/// The outcome is retryable and attempts remain; wait, then try again.
	Retry(Duration),
	/// Terminal failure; surface the last outcome to the caller.
	Fail,
}

/// Per-request retry configuration.
///
/// Defaults: one attempt (no retries), `is_error` = status ≥ 400, `is_transient`
/// = 429, 503, or any 5xx, every transport failure retryable, and full
/// exponential jitter (base 1 s, cap 60 s) for computed backoff. A non-transient
/// error status is terminal on its first occurrence no matter how many tries
/// remain: persistent client errors get exactly one attempt.
#[derive(Clone)]
pub struct RetryPolicy {
	max_tries: u32,
	is_error: StatusPredicate,
	is_transient: StatusPredicate,
	retry_on_transport: TransportPredicate,
	backoff: BackoffFn,
}
impl RetryPolicy {
	/// Creates a policy allowing up to `max_tries` attempts with default classifiers.
	pub fn with_max_tries(max_tries: u32) -> Self {
		Self { max_tries: max_tries.max(1), ..Self::default() }
	}

	/// Replaces the error classifier (default: status ≥ 400).
	pub fn with_is_error(mut self, predicate: impl Fn(StatusCode) -> bool + Send + Sync + 'static) -> Self {
		self.is_error = Arc::new(predicate);

		self
	}

	/// Replaces the transient classifier (default: 429, 503, or any 5xx).
	pub fn with_is_transient(
		mut self,
		predicate: impl Fn(StatusCode) -> bool + Send + Sync + 'static,
	) -> Self {
		self.is_transient = Arc::new(predicate);

		self
	}

	/// Replaces the transport-failure predicate (default: always retryable).
	pub fn with_transport_predicate(
		mut self,
		predicate: impl Fn(&TransportError) -> bool + Send + Sync + 'static,
	) -> Self {
		self.retry_on_transport = Arc::new(predicate);

		self
	}

	/// Replaces the backoff function.
	pub fn with_backoff(mut self, backoff: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
		self.backoff = Arc::new(backoff);

		self
	}

	/// Maximum number of attempts for one perform call.
	pub fn max_tries(&self) -> u32 {
		self.max_tries
	}

	/// Returns `true` when the policy classifies the status as an error.
	pub fn is_error(&self, status: StatusCode) -> bool {
		(self.is_error)(status)
	}

	/// Classifies a received response after `attempt` attempts have been made.
	///
	/// An explicit `Retry-After` header takes precedence over computed backoff.
	pub fn classify_response(&self, response: &Response, attempt: u32) -> Verdict {
		if !(self.is_error)(response.status()) {
			return Verdict::Success;
		}
		if (self.is_transient)(response.status()) && attempt < self.max_tries {
			let wait = response.retry_after().unwrap_or_else(|| (self.backoff)(attempt));

			return Verdict::Retry(wait);
		}

		Verdict::Fail
	}

	/// Classifies a transport failure after `attempt` attempts have been made.
	pub fn classify_transport(&self, error: &TransportError, attempt: u32) -> Verdict {
		if (self.retry_on_transport)(error) && attempt < self.max_tries {
			return Verdict::Retry((self.backoff)(attempt));
		}

		Verdict::Fail
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_tries: 1,
			is_error: Arc::new(|status| status.as_u16() >= 400),
			is_transient: Arc::new(|status| {
				matches!(status.as_u16(), 429 | 503) || status.is_server_error()
			}),
			retry_on_transport: Arc::new(|_| true),
			backoff: full_jitter(Duration::seconds(1), Duration::seconds(60)),
		}
	}
}
impl Debug for RetryPolicy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RetryPolicy").field("max_tries", &self.max_tries).finish()
	}
}

/// Full exponential jitter: uniform in `[0, min(cap, base × 2^attempt)]`.
pub fn full_jitter(base: Duration, cap: Duration) -> BackoffFn {
	let base_secs = base.as_seconds_f64().max(0.0);
	let cap_secs = cap.as_seconds_f64().max(0.0);

	Arc::new(move |attempt| {
		let exp = base_secs * 2_f64.powi(attempt.min(32) as i32);
		let upper = exp.min(cap_secs);

		if upper <= 0.0 {
			return Duration::ZERO;
		}

		Duration::seconds_f64(rand::rng().random_range(0.0..=upper))
	})
}

/// Per-perform attempt bookkeeping; discarded when the perform call returns.
#[derive(Clone, Debug, Default)]
pub struct Attempt {
	made: u32,
	waits: Vec<Duration>,
}
impl Attempt {
	/// Records that one more attempt has been made and returns the new count.
	pub fn record(&mut self) -> u32 {
		self.made += 1;

		self.made
	}

	/// Records a backoff wait taken before the next attempt.
	pub fn record_wait(&mut self, wait: Duration) {
		self.waits.push(wait);
	}

	/// Attempts made so far.
	pub fn made(&self) -> u32 {
		self.made
	}

	/// Backoff waits taken so far.
	pub fn waits(&self) -> &[Duration] {
		&self.waits
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn response(status: StatusCode) -> Response {
		Response::new(
			status,
			HeaderMap::new(),
			Bytes::new(),
			Method::GET,
			Url::parse("https://api.example.com/").expect("Fixture URL should parse successfully."),
		)
	}

	fn response_with_retry_after(status: StatusCode, seconds: &str) -> Response {
		let mut headers = HeaderMap::new();

		headers.insert(
			http::header::RETRY_AFTER,
			HeaderValue::from_str(seconds).expect("Retry-After fixture should be valid."),
		);

		Response::new(
			status,
			headers,
			Bytes::new(),
			Method::GET,
			Url::parse("https://api.example.com/").expect("Fixture URL should parse successfully."),
		)
	}

	#[test]
	fn non_transient_errors_fail_on_first_attempt_with_retries_remaining() {
		let policy = RetryPolicy::with_max_tries(5);

		assert_eq!(policy.classify_response(&response(StatusCode::NOT_FOUND), 1), Verdict::Fail);
	}

	#[test]
	fn transient_errors_retry_until_tries_exhaust() {
		let policy = RetryPolicy::with_max_tries(3);
		let too_many = response(StatusCode::TOO_MANY_REQUESTS);

		assert!(matches!(policy.classify_response(&too_many, 1), Verdict::Retry(_)));
		assert!(matches!(policy.classify_response(&too_many, 2), Verdict::Retry(_)));
		assert_eq!(policy.classify_response(&too_many, 3), Verdict::Fail);
	}

	#[test]
	fn server_errors_are_transient_by_default() {
		let policy = RetryPolicy::with_max_tries(2);

		assert!(matches!(
			policy.classify_response(&response(StatusCode::BAD_GATEWAY), 1),
			Verdict::Retry(_)
		));
	}

	#[test]
	fn success_statuses_pass_through() {
		let policy = RetryPolicy::default();

		assert_eq!(policy.classify_response(&response(StatusCode::OK), 1), Verdict::Success);
		assert_eq!(policy.classify_response(&response(StatusCode::NO_CONTENT), 1), Verdict::Success);
	}

	#[test]
	fn retry_after_header_takes_precedence_over_backoff() {
		let policy = RetryPolicy::with_max_tries(2).with_backoff(|_| Duration::seconds(500));
		let verdict =
			policy.classify_response(&response_with_retry_after(StatusCode::SERVICE_UNAVAILABLE, "7"), 1);

		assert_eq!(verdict, Verdict::Retry(Duration::seconds(7)));
	}

	#[test]
	fn transport_failures_retry_while_tries_remain() {
		let policy = RetryPolicy::with_max_tries(2);
		let error = TransportError::DeadlineExceeded;

		assert!(matches!(policy.classify_transport(&error, 1), Verdict::Retry(_)));
		assert_eq!(policy.classify_transport(&error, 2), Verdict::Fail);
	}

	#[test]
	fn transport_predicate_can_mark_failures_fatal() {
		let policy = RetryPolicy::with_max_tries(5)
			.with_transport_predicate(|error| !matches!(error, TransportError::Timeout { .. }));
		let timeout = TransportError::Timeout { timeout: Duration::seconds(1) };

		assert_eq!(policy.classify_transport(&timeout, 1), Verdict::Fail);
	}

	#[test]
	fn custom_error_classifier_overrides_default() {
		let policy = RetryPolicy::default().with_is_error(|status| status.as_u16() >= 500);

		assert_eq!(policy.classify_response(&response(StatusCode::NOT_FOUND), 1), Verdict::Success);
	}

	#[test]
	fn full_jitter_stays_within_the_envelope() {
		let backoff = full_jitter(Duration::seconds(1), Duration::seconds(8));

		for attempt in 1..=6 {
			let wait = backoff(attempt);
			let upper = Duration::seconds_f64((2_f64.powi(attempt as i32)).min(8.0));

			assert!(wait >= Duration::ZERO);
			assert!(wait <= upper, "attempt {attempt} produced {wait} above {upper}");
		}
	}

	#[test]
	fn attempt_bookkeeping_tracks_counts_and_waits() {
		let mut attempt = Attempt::default();

		assert_eq!(attempt.record(), 1);
		assert_eq!(attempt.record(), 2);

		attempt.record_wait(Duration::seconds(1));

		assert_eq!(attempt.made(), 2);
		assert_eq!(attempt.waits(), [Duration::seconds(1)]);
	}
}
