//! The perform pipeline: cache → throttle → auth → transport → retry → store.

// crates.io
use http::header::AUTHORIZATION;
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	cache::{self, CacheEntry, Lookup},
	client::{Client, ExchangeOutcome, LastExchange},
	error::TransportError,
	oauth,
	obs::{self, PerformOutcome, PerformSpan},
	request::Request,
	response::{Response, ResponseSource},
	retry::{Attempt, Verdict},
	transport::Transport,
};

impl<T> Client<T>
where
	T: Transport,
{
	/// Performs one logical request, applying every policy attached to it.
	///
	/// The pipeline consults the cache first, then loops: throttle admission,
	/// bearer injection, transport send, outcome classification. Retryable
	/// outcomes are recovered invisibly until tries or the deadline run out;
	/// terminal outcomes surface as a classified [`Error`] carrying the method,
	/// URL, and attempt count. Retries of one perform are strictly sequential.
	pub async fn perform(&self, request: Request) -> Result<Response> {
		let span = PerformSpan::new(request.method(), request.url());

		obs::record_perform_outcome(PerformOutcome::Attempt);

		let result = span.instrument(self.perform_pipeline(request)).await;

		match &result {
			Ok(_) => obs::record_perform_outcome(PerformOutcome::Success),
			Err(_) => obs::record_perform_outcome(PerformOutcome::Failure),
		}

		result
	}

	async fn perform_pipeline(&self, request: Request) -> Result<Response> {
		request.validate()?;

		let started = Instant::now();
		let policy = request.policy().clone();
		let deadline = policy.deadline;
		let mut outgoing = request.clone();
		let mut stale_entry: Option<CacheEntry> = None;

		if let Some(cache_policy) = &policy.cache {
			match cache_policy.lookup(&request).await? {
				Lookup::Fresh(response) => {
					let response = response.with_source(ResponseSource::Cache);

					self.record_exchange(exchange_for_response(&request, &response, 0));

					return Ok(response);
				},
				Lookup::Stale(entry) => {
					outgoing = cache::apply_validators(outgoing, &entry);
					stale_entry = Some(entry);
				},
				Lookup::Miss => {},
			}
		}

		let retry = &policy.retry;
		let mut attempt = Attempt::default();
		let mut auth_retried = false;
		let outcome = loop {
			if let Some(throttle) = &policy.throttle {
				let realm =
					throttle.realm().map(str::to_owned).unwrap_or_else(|| request.default_realm());
				let admitted = match budget_remaining(deadline, started) {
					Ok(Some(remaining)) => tokio::time::timeout(
						std_duration(remaining),
						self.throttles().acquire(&realm, throttle),
					)
					.await
					.is_ok(),
					Ok(None) => {
						self.throttles().acquire(&realm, throttle).await;

						true
					},
					Err(_) => false,
				};

				if !admitted {
					break Err(terminal_transport(
						&request,
						attempt.made(),
						TransportError::DeadlineExceeded,
					));
				}
			}

			let mut attempt_request = outgoing.clone();

			if let Some(auth) = &policy.auth
				&& !attempt_request.headers().contains_key(AUTHORIZATION)
			{
				let budget = match budget_remaining(deadline, started) {
					Ok(budget) => budget,
					Err(source) => break Err(terminal_transport(&request, attempt.made(), source)),
				};
				let token = self.tokens().bearer(self.transport(), auth, budget).await?;
				let bearer = HeaderValue::from_str(&token.bearer_header())
					.map_err(crate::error::ConfigError::from)?;

				attempt_request = attempt_request.with_header(AUTHORIZATION, bearer);
			}

			let budget = match budget_remaining(deadline, started) {
				Ok(budget) => budget,
				Err(source) => break Err(terminal_transport(&request, attempt.made(), source)),
			};
			let made = attempt.record();

			match self.transport().send(&attempt_request, budget).await {
				Ok(response) => {
					if response.status() == StatusCode::NOT_MODIFIED
						&& let Some(cache_policy) = &policy.cache
						&& let Some(entry) = stale_entry.take()
					{
						let freshened = cache_policy.freshen(&request, entry, &response).await?;
						let served =
							freshened.to_response(&request).with_source(ResponseSource::Revalidated);

						break Ok(served);
					}

					// One reactive re-acquisition per perform: a second
					// invalid_token 401 falls through to ordinary classification.
					if let Some(auth) = &policy.auth
						&& !auth_retried && oauth::indicates_invalid_token(&response)
					{
						self.tokens().invalidate(auth);

						auth_retried = true;

						continue;
					}

					match retry.classify_response(&response, made) {
						Verdict::Success => {
							if let Some(cache_policy) = &policy.cache {
								cache_policy.store(&request, &response).await?;
							}

							break Ok(response);
						},
						Verdict::Retry(wait) =>
							match sleep_within(wait, deadline, started).await {
								Ok(()) => {
									attempt.record_wait(wait);

									continue;
								},
								Err(source) =>
									break Err(terminal_transport(&request, made, source)),
							},
						Verdict::Fail => break Err(Error::Status {
							method: request.method().clone(),
							url: request.url().clone(),
							status: response.status(),
							attempts: made,
							response: Box::new(response),
						}),
					}
				},
				Err(source) => match retry.classify_transport(&source, made) {
					Verdict::Retry(wait) => match sleep_within(wait, deadline, started).await {
						Ok(()) => {
							attempt.record_wait(wait);

							continue;
						},
						Err(expired) => break Err(terminal_transport(&request, made, expired)),
					},
					_ => break Err(terminal_transport(&request, made, source)),
				},
			}
		};

		match &outcome {
			Ok(response) =>
				self.record_exchange(exchange_for_response(&request, response, attempt.made())),
			Err(error) => self.record_exchange(LastExchange {
				method: request.method().clone(),
				url: request.url().clone(),
				outcome: ExchangeOutcome::Failure(error.to_string()),
				attempts: attempt.made(),
				at: OffsetDateTime::now_utc(),
			}),
		}

		outcome
	}
}

fn exchange_for_response(request: &Request, response: &Response, attempts: u32) -> LastExchange {
	LastExchange {
		method: request.method().clone(),
		url: request.url().clone(),
		outcome: ExchangeOutcome::Response {
			status: response.status(),
			source: response.source(),
		},
		attempts,
		at: OffsetDateTime::now_utc(),
	}
}

fn terminal_transport(request: &Request, attempts: u32, source: TransportError) -> Error {
	Error::Transport {
		method: request.method().clone(),
		url: request.url().clone(),
		attempts,
		source,
	}
}

fn budget_remaining(
	deadline: Option<Duration>,
	started: Instant,
) -> Result<Option<Duration>, TransportError> {
	let Some(deadline) = deadline else {
		return Ok(None);
	};
	let elapsed = Duration::try_from(started.elapsed()).unwrap_or(Duration::MAX);
	let remaining = deadline - elapsed;

	if !remaining.is_positive() {
		return Err(TransportError::DeadlineExceeded);
	}

	Ok(Some(remaining))
}

async fn sleep_within(
	wait: Duration,
	deadline: Option<Duration>,
	started: Instant,
) -> Result<(), TransportError> {
	if let Some(remaining) = budget_remaining(deadline, started)?
		&& wait >= remaining
	{
		return Err(TransportError::DeadlineExceeded);
	}

	tokio::time::sleep(std_duration(wait)).await;

	Ok(())
}
