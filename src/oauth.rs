//! OAuth 2.0 credential engine: clients, flows, token caching, and injection.
//!
//! The engine acquires bearer tokens through pluggable [`TokenFlow`] strategies,
//! caches them process-wide keyed by (client, flow parameters), refreshes them
//! when they expire, and invalidates them reactively when a response reports
//! `invalid_token`. Flows differ only in the token-endpoint exchange shape; the
//! caching, refresh, and injection logic is shared.

pub mod cache;
pub mod flows;
pub mod token;

pub use cache::TokenCache;
pub use flows::{
	AuthorizationCodeFlow, ClientCredentialsFlow, DeviceFlow, FlowKind, JwtBearerFlow,
	PasswordFlow, RefreshFlow, TokenExchanger, TokenFlow,
};
pub use token::Token;

// crates.io
use http::header::WWW_AUTHENTICATE;
// self
use crate::{_prelude::*, response::Response, secret::Secret};

/// Where client credentials are placed on token-endpoint requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientAuthPlacement {
	/// `Authorization: Basic` header (RFC 6749 §2.3.1 preferred form).
	#[default]
	Basic,
	/// `client_id` / `client_secret` form body parameters.
	Body,
}

/// Long-lived OAuth 2.0 client registration; constructed once, immutable.
#[derive(Clone)]
pub struct OAuthClient {
	id: String,
	secret: Option<Secret>,
	token_url: Url,
	auth_url: Option<Url>,
	auth_placement: ClientAuthPlacement,
}
impl OAuthClient {
	/// Creates a client for the given identifier and token endpoint.
	pub fn new(id: impl Into<String>, token_url: Url) -> Self {
		Self {
			id: id.into(),
			secret: None,
			token_url,
			auth_url: None,
			auth_placement: ClientAuthPlacement::default(),
		}
	}

	/// Attaches the confidential client secret.
	pub fn with_secret(mut self, secret: Secret) -> Self {
		self.secret = Some(secret);

		self
	}

	/// Sets the authorization endpoint, used by flows that reference it.
	pub fn with_auth_url(mut self, auth_url: Url) -> Self {
		self.auth_url = Some(auth_url);

		self
	}

	/// Overrides where client credentials are placed on token requests.
	pub fn with_auth_placement(mut self, placement: ClientAuthPlacement) -> Self {
		self.auth_placement = placement;

		self
	}

	/// Client identifier.
	pub fn id(&self) -> &str {
		&self.id
	}

	/// Confidential client secret, when registered.
	pub fn secret(&self) -> Option<&Secret> {
		self.secret.as_ref()
	}

	/// Token endpoint URL.
	pub fn token_url(&self) -> &Url {
		&self.token_url
	}

	/// Authorization endpoint URL, when configured.
	pub fn auth_url(&self) -> Option<&Url> {
		self.auth_url.as_ref()
	}

	/// Credential placement for token requests.
	pub fn auth_placement(&self) -> ClientAuthPlacement {
		self.auth_placement
	}

	/// Stable identity component for the token cache key.
	pub fn fingerprint(&self) -> String {
		format!("{}@{}", self.id, self.token_url)
	}
}
impl Debug for OAuthClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthClient")
			.field("id", &self.id)
			.field("token_url", &self.token_url.as_str())
			.field("secret_set", &self.secret.is_some())
			.finish()
	}
}

/// Per-request OAuth configuration: which client and which flow supply the bearer.
#[derive(Clone)]
pub struct AuthPolicy {
	/// Client registration used for the exchange.
	pub client: Arc<OAuthClient>,
	/// Flow strategy producing the token.
	pub flow: Arc<dyn TokenFlow>,
}
impl AuthPolicy {
	/// Pairs a client with a flow strategy.
	pub fn new(client: OAuthClient, flow: impl TokenFlow + 'static) -> Self {
		Self { client: Arc::new(client), flow: Arc::new(flow) }
	}
}
impl Debug for AuthPolicy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthPolicy")
			.field("client", &self.client)
			.field("flow", &self.flow.kind())
			.finish()
	}
}

/// Detects a 401 carrying an `invalid_token` indication (RFC 6750 §3.1).
///
/// Checks the `WWW-Authenticate` challenge first, then a JSON error body. Such
/// responses mean the cached credential is dead, not that the request itself is
/// unauthorized; the perform pipeline invalidates the token and retries once.
pub fn indicates_invalid_token(response: &Response) -> bool {
	if response.status() != StatusCode::UNAUTHORIZED {
		return false;
	}
	if let Some(challenge) = response.header(&WWW_AUTHENTICATE)
		&& challenge.to_ascii_lowercase().contains("invalid_token")
	{
		return true;
	}

	serde_json::from_slice::<serde_json::Value>(response.body())
		.ok()
		.and_then(|body| body.get("error").and_then(|error| error.as_str().map(str::to_owned)))
		.is_some_and(|error| error == "invalid_token")
}
