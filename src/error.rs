//! Crate-level error types shared across the request pipeline, cache, and OAuth engine.

// self
use crate::{_prelude::*, response::Response};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// Terminal request failures always carry the request method + URL and the number
/// of attempts that were made before giving up.
#[derive(Debug, ThisError)]
pub enum Error {
	/// The server answered with a status the retry policy classified as terminal.
	#[error("{method} {url} failed with HTTP status {status} after {attempts} attempt(s).")]
	Status {
		/// Request method.
		method: Method,
		/// Request URL.
		url: Url,
		/// Final status code observed.
		status: StatusCode,
		/// Total attempts performed, including the failing one.
		attempts: u32,
		/// The terminal response, kept for callers that inspect error bodies.
		response: Box<Response>,
	},
	/// The transport failed before any HTTP status was produced.
	#[error("{method} {url} failed at the transport layer after {attempts} attempt(s).")]
	Transport {
		/// Request method.
		method: Method,
		/// Request URL.
		url: Url,
		/// Total attempts performed, including the failing one.
		attempts: u32,
		/// Underlying transport failure.
		#[source]
		source: TransportError,
	},

	/// Cache storage failure.
	#[error(transparent)]
	Cache(#[from] CacheError),
	/// Token acquisition or refresh failure; distinct from the request's own outcome.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Local configuration problem detected before any network activity.
	#[error(transparent)]
	Config(#[from] ConfigError),
}
impl Error {
	/// Returns the attempt count for terminal request failures.
	pub fn attempts(&self) -> Option<u32> {
		match self {
			Self::Status { attempts, .. } | Self::Transport { attempts, .. } => Some(*attempts),
			_ => None,
		}
	}

	/// Returns the final status code for HTTP-status failures.
	pub fn status(&self) -> Option<StatusCode> {
		match self {
			Self::Status { status, .. } => Some(*status),
			_ => None,
		}
	}
}

/// Transport-level failures (connect, timeout, DNS); never carry an HTTP status.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// The request exceeded its configured time budget.
	#[error("Request timed out after {timeout}.")]
	Timeout {
		/// Budget that was exhausted.
		timeout: Duration,
	},
	/// The perform deadline elapsed before another attempt could be made.
	#[error("Deadline elapsed before the request could complete.")]
	DeadlineExceeded,
	/// Connection establishment failed (refused, reset, DNS).
	#[error("Failed to establish a connection.")]
	Connect {
		/// Transport-specific connection error.
		#[source]
		source: BoxError,
	},
	/// Any other network failure reported by the transport.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific connection error.
	pub fn connect(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Connect { source: Box::new(src) }
	}

	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Box::new(src) }
	}
}

/// Failures raised while acquiring, refreshing, or parsing OAuth tokens.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// Provider rejected the grant (bad code, refresh token, or assertion).
	#[error("Token endpoint rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Requested scopes exceed what the provider allows.
	#[error("Requested scope was rejected: {reason}.")]
	InvalidScope {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint response omitted the access token.
	#[error("Token endpoint response is missing an access token.")]
	MissingAccessToken,
	/// A refresh was requested but no refresh token is cached.
	#[error("Cached token is missing a refresh token.")]
	MissingRefreshToken,
	/// Device authorization expired before the user approved it.
	#[error("Device authorization expired before approval.")]
	DeviceAuthorizationExpired,
	/// Transport failure while calling the token endpoint.
	#[error("Transport failure while calling the token endpoint.")]
	Transport(#[from] TransportError),
}

/// Error type produced by cache store implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CacheError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Configuration and validation failures detected before sending.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Request URL lacks a host once finalized.
	#[error("Request URL `{url}` has no host.")]
	MissingHost {
		/// The offending URL.
		url: Url,
	},
	/// Request URL uses a scheme the transport cannot send.
	#[error("Request URL `{url}` uses an unsupported scheme.")]
	UnsupportedScheme {
		/// The offending URL.
		url: Url,
	},
	/// A header name failed validation.
	#[error("Invalid header name.")]
	InvalidHeaderName(#[from] http::header::InvalidHeaderName),
	/// A header value failed validation.
	#[error("Invalid header value.")]
	InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
	/// A URL string failed to parse.
	#[error("Invalid URL.")]
	InvalidUrl(#[from] url::ParseError),
	/// A structured body failed to encode.
	#[error("Failed to encode the request body.")]
	BodyEncode(#[from] serde_json::Error),
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
