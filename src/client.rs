//! The client owning the transport and every piece of process-wide policy state.

// self
use crate::{
	_prelude::*,
	oauth::TokenCache,
	request::{Request, RequestPreview},
	response::ResponseSource,
	throttle::ThrottleRegistry,
	transport::Transport,
};
#[cfg(feature = "reqwest")] use crate::transport::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestCourier = Client<ReqwestTransport>;

/// Outcome summary stored in the last-exchange diagnostic slot.
#[derive(Clone, Debug)]
pub enum ExchangeOutcome {
	/// A response was produced (from the network or the cache).
	Response {
		/// Final status code.
		status: StatusCode,
		/// Where the body came from.
		source: ResponseSource,
	},
	/// The perform call failed; the rendered error message is kept.
	Failure(String),
}

/// Advisory record of the most recent perform call.
///
/// Purely diagnostic: reading it is never part of the execution contract, and
/// concurrent performs overwrite it in completion order.
#[derive(Clone, Debug)]
pub struct LastExchange {
	/// Request method.
	pub method: Method,
	/// Request URL.
	pub url: Url,
	/// How the exchange ended.
	pub outcome: ExchangeOutcome,
	/// Attempts made by the perform call.
	pub attempts: u32,
	/// Completion instant.
	pub at: OffsetDateTime,
}

/// Executes requests, composing throttle, retry, cache, and auth policies around
/// one transport.
///
/// The client owns the process-wide shared state those policies need: the
/// per-realm throttle buckets and the OAuth token cache. Embedding applications
/// normally create one client and share it; every piece of state is safe under
/// concurrent perform calls.
pub struct Client<T>
where
	T: ?Sized + Transport,
{
	transport: Arc<T>,
	throttles: Arc<ThrottleRegistry>,
	tokens: Arc<TokenCache>,
	last_exchange: Arc<Mutex<Option<LastExchange>>>,
}
impl<T> Client<T>
where
	T: ?Sized + Transport,
{
	/// Creates a client around the caller-provided transport.
	pub fn with_transport(transport: impl Into<Arc<T>>) -> Self {
		Self {
			transport: transport.into(),
			throttles: Arc::new(ThrottleRegistry::default()),
			tokens: Arc::new(TokenCache::default()),
			last_exchange: Arc::new(Mutex::new(None)),
		}
	}

	/// The transport requests are sent through.
	pub fn transport(&self) -> &T {
		&self.transport
	}

	/// Per-realm throttle buckets shared by every request through this client.
	pub fn throttles(&self) -> &ThrottleRegistry {
		&self.throttles
	}

	/// Process-wide OAuth token cache.
	pub fn tokens(&self) -> &TokenCache {
		&self.tokens
	}

	/// Returns the most recent exchange record, if any perform has completed.
	pub fn last_exchange(&self) -> Option<LastExchange> {
		self.last_exchange.lock().clone()
	}

	/// Renders the finalized request without sending it over the transport.
	pub fn dry_run(&self, request: &Request) -> Result<RequestPreview> {
		Ok(request.preview()?)
	}

	/// Clears throttle buckets, cached tokens, and the last-exchange slot.
	///
	/// Test hook so suites can isolate cases; never called by the pipeline.
	pub fn reset(&self) {
		self.throttles.reset();
		self.tokens.reset();
		*self.last_exchange.lock() = None;
	}

	pub(crate) fn record_exchange(&self, exchange: LastExchange) {
		*self.last_exchange.lock() = Some(exchange);
	}
}
#[cfg(feature = "reqwest")]
impl Client<ReqwestTransport> {
	/// Creates a client with a default reqwest transport.
	pub fn new() -> Self {
		Self::with_transport(ReqwestTransport::default())
	}
}
#[cfg(feature = "reqwest")]
impl Default for Client<ReqwestTransport> {
	fn default() -> Self {
		Self::new()
	}
}
impl<T> Clone for Client<T>
where
	T: ?Sized + Transport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			throttles: self.throttles.clone(),
			tokens: self.tokens.clone(),
			last_exchange: self.last_exchange.clone(),
		}
	}
}
impl<T> Debug for Client<T>
where
	T: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Client")
			.field("throttle_realms", &self.throttles.realm_count())
			.field("last_exchange_set", &self.last_exchange.lock().is_some())
			.finish()
	}
}
