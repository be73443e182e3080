//! Transport contract consumed by the perform pipeline.
//!
//! The trait is the crate's only dependency on an HTTP stack: one finalized
//! request goes in, a materialized [`Response`] or a [`TransportError`] comes
//! back. HTTP error statuses are *not* transport failures—the pipeline
//! classifies those itself—so implementations must surface 4xx/5xx as ordinary
//! responses and reserve errors for connect/timeout/IO conditions.

// self
use crate::{_prelude::*, error::TransportError, request::Request, response::Response};

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Response, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of executing one exchange.
///
/// Implementations must be `Send + Sync` so one transport can serve concurrent
/// perform calls; the crate never spawns tasks on their behalf. The `timeout`
/// argument is the remaining budget for this attempt—implementations must abort
/// the in-flight exchange once it elapses and report [`TransportError::Timeout`].
pub trait Transport: Send + Sync {
	/// Sends one finalized request, returning the response or a transport failure.
	fn send<'a>(&'a self, request: &'a Request, timeout: Option<Duration>) -> TransportFuture<'a>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// The same transport instance serves both ordinary performs and OAuth token
/// exchanges, so throttles and connection pools are shared across the two.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
	fn send<'a>(&'a self, request: &'a Request, timeout: Option<Duration>) -> TransportFuture<'a> {
		Box::pin(async move {
			let mut builder =
				self.0.request(request.method().clone(), request.url().clone());

			if let Some(budget) = timeout {
				builder = builder.timeout(std_duration(budget));
			}

			builder = builder.headers(request.headers().clone());

			if let Some((content_type, data)) =
				request.body().encode().map_err(TransportError::network)?
			{
				if !request.headers().contains_key(http::header::CONTENT_TYPE) {
					builder = builder.header(http::header::CONTENT_TYPE, content_type);
				}

				builder = builder.body(data);
			}

			let response = builder.send().await.map_err(|e| map_reqwest_error(e, timeout))?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await.map_err(|e| map_reqwest_error(e, timeout))?;

			Ok(Response::new(status, headers, body, request.method().clone(), request.url().clone()))
		})
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(err: ReqwestError, timeout: Option<Duration>) -> TransportError {
	if err.is_timeout() {
		return TransportError::Timeout { timeout: timeout.unwrap_or(Duration::ZERO) };
	}
	if err.is_connect() {
		return TransportError::connect(err);
	}

	TransportError::network(err)
}
