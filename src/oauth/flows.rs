//! Token acquisition flows and the shared token-endpoint exchanger.
//!
//! Every flow is a strategy value implementing [`TokenFlow`]: it describes the
//! grant-specific form shape and, for the device grant, overrides the
//! acquisition loop. The [`TokenExchanger`] owns everything the flows share:
//! posting the form through the crate's transport, client authentication,
//! payload parsing, and OAuth error classification.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use http::header::{ACCEPT, AUTHORIZATION};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	error::AuthError,
	oauth::{
		ClientAuthPlacement, OAuthClient,
		token::{ErrorPayload, Token, TokenPayload},
	},
	request::Request,
	secret::Secret,
	transport::Transport,
};

/// Boxed future returned by [`TokenFlow::acquire`].
pub type FlowFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AuthError>> + 'a + Send>>;

/// OAuth grant variants supported by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Authorization-code exchange for a pre-obtained code.
	AuthorizationCode,
	/// Client-credentials grant.
	ClientCredentials,
	/// Device-code polling grant.
	Device,
	/// JWT-bearer assertion grant.
	JwtBearer,
	/// Resource-owner password grant.
	Password,
	/// Direct refresh-token exchange.
	Refresh,
}
impl FlowKind {
	/// Returns a stable label suitable for cache keys, span, or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::AuthorizationCode => "authorization_code",
			FlowKind::ClientCredentials => "client_credentials",
			FlowKind::Device => "device_code",
			FlowKind::JwtBearer => "jwt_bearer",
			FlowKind::Password => "password",
			FlowKind::Refresh => "refresh_token",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Pluggable token-acquisition strategy.
///
/// Implementations only describe the token-endpoint exchange shape; caching and
/// injection live in [`TokenCache`](crate::oauth::TokenCache) and apply to every
/// flow uniformly. Override [`TokenFlow::acquire`] only when a grant needs more
/// than one exchange (the device grant polls, for example).
pub trait TokenFlow: Send + Sync {
	/// Grant variant implemented by this flow.
	fn kind(&self) -> FlowKind;

	/// Grant-specific form parameters for the token request.
	fn form(&self, client: &OAuthClient) -> Vec<(String, String)>;

	/// Parameter fingerprint contributed to the token cache key.
	///
	/// Two flow values with the same kind and seed share one cached token.
	fn cache_seed(&self) -> String;

	/// Runs the exchange and produces a token.
	fn acquire<'a>(&'a self, exchanger: &'a TokenExchanger<'a>) -> FlowFuture<'a, Token> {
		let form = self.form(exchanger.client());

		Box::pin(async move { exchanger.exchange(&form).await })
	}
}

/// Exchange failure annotated with the raw OAuth error code, when one was sent.
///
/// Polling flows branch on the code (`authorization_pending`, `slow_down`)
/// before deciding whether the classified error is terminal.
#[derive(Debug)]
pub struct ExchangeError {
	/// Raw `error` field from the token endpoint, if present.
	pub code: Option<String>,
	/// Classified failure.
	pub error: AuthError,
}
impl From<ExchangeError> for AuthError {
	fn from(e: ExchangeError) -> Self {
		e.error
	}
}

/// Shared token-endpoint plumbing handed to flows during acquisition.
pub struct TokenExchanger<'a> {
	transport: &'a dyn Transport,
	client: &'a OAuthClient,
	timeout: Option<Duration>,
}
impl<'a> TokenExchanger<'a> {
	/// Builds an exchanger for one acquisition.
	pub fn new(
		transport: &'a dyn Transport,
		client: &'a OAuthClient,
		timeout: Option<Duration>,
	) -> Self {
		Self { transport, client, timeout }
	}

	/// Client registration the exchange authenticates as.
	pub fn client(&self) -> &OAuthClient {
		self.client
	}

	/// Posts the form to the token endpoint and parses the result.
	pub async fn exchange(&self, form: &[(String, String)]) -> Result<Token, AuthError> {
		self.exchange_raw(form).await.map_err(AuthError::from)
	}

	/// Like [`TokenExchanger::exchange`], but keeps the raw OAuth error code.
	pub async fn exchange_raw(&self, form: &[(String, String)]) -> Result<Token, ExchangeError> {
		let mut pairs: Vec<(String, String)> = form.to_vec();
		let mut request = Request::new(Method::POST, self.client.token_url().clone())
			.with_header(ACCEPT, HeaderValue::from_static("application/json"));

		match (self.client.auth_placement(), self.client.secret()) {
			(ClientAuthPlacement::Basic, Some(secret)) => {
				let credentials =
					STANDARD.encode(format!("{}:{}", self.client.id(), secret.expose()));
				let value = HeaderValue::from_str(&format!("Basic {credentials}"))
					.unwrap_or(HeaderValue::from_static("Basic"));

				request = request.with_header(AUTHORIZATION, value);
			},
			(ClientAuthPlacement::Body, Some(secret)) => {
				pairs.push(("client_id".into(), self.client.id().to_owned()));
				pairs.push(("client_secret".into(), secret.expose().to_owned()));
			},
			// Public clients always identify themselves in the body.
			(_, None) => pairs.push(("client_id".into(), self.client.id().to_owned())),
		}

		request = request.with_body_form(pairs);

		let response = self
			.transport
			.send(&request, self.timeout)
			.await
			.map_err(|e| ExchangeError { code: None, error: AuthError::Transport(e) })?;
		let status = response.status();

		if status.is_success() {
			let mut deserializer = serde_json::Deserializer::from_slice(response.body());
			let payload: TokenPayload = serde_path_to_error::deserialize(&mut deserializer)
				.map_err(|source| ExchangeError {
					code: None,
					error: AuthError::TokenResponseParse { source, status: Some(status.as_u16()) },
				})?;

			return Token::from_payload(payload, OffsetDateTime::now_utc())
				.map_err(|error| ExchangeError { code: None, error });
		}

		let payload: ErrorPayload = serde_json::from_slice(response.body())
			.unwrap_or(ErrorPayload { error: None, error_description: None });
		let code = payload.error.clone();
		let error = classify_exchange_failure(status.as_u16(), &payload, response.retry_after());

		Err(ExchangeError { code, error })
	}
}

/// Maps a token-endpoint failure into the crate taxonomy.
///
/// Structured OAuth error codes win; the HTTP status is the fallback. Unknown
/// failures are treated as transient token-endpoint trouble.
fn classify_exchange_failure(
	status: u16,
	payload: &ErrorPayload,
	retry_after: Option<Duration>,
) -> AuthError {
	let reason = payload.reason();

	match payload.error.as_deref() {
		Some("invalid_grant" | "access_denied" | "expired_token") =>
			AuthError::InvalidGrant { reason },
		Some("invalid_client" | "unauthorized_client") => AuthError::InvalidClient { reason },
		Some("invalid_scope" | "insufficient_scope") => AuthError::InvalidScope { reason },
		Some(_) | None => match status {
			400 | 404 | 410 if payload.error.is_some() => AuthError::InvalidGrant { reason },
			401 => AuthError::InvalidClient { reason },
			403 => AuthError::InvalidScope { reason },
			_ => AuthError::TokenEndpoint {
				message: reason,
				status: Some(status),
				retry_after,
			},
		},
	}
}

fn digest(value: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(value.as_bytes());

	let bytes = hasher.finalize();
	let mut hex = String::with_capacity(bytes.len() * 2);

	for byte in bytes {
		hex.push_str(&format!("{byte:02x}"));
	}

	hex
}

/// Exchanges a pre-obtained authorization code for a token.
///
/// Obtaining the code (browser redirect, consent UI) is outside the crate's
/// scope; the flow starts where the redirect ends.
#[derive(Clone, Debug)]
pub struct AuthorizationCodeFlow {
	code: Secret,
	redirect_uri: Option<Url>,
	pkce_verifier: Option<Secret>,
}
impl AuthorizationCodeFlow {
	/// Creates the flow for an issued authorization code.
	pub fn new(code: impl Into<String>) -> Self {
		Self { code: Secret::new(code), redirect_uri: None, pkce_verifier: None }
	}

	/// Sets the redirect URI that was used to obtain the code.
	pub fn with_redirect_uri(mut self, redirect_uri: Url) -> Self {
		self.redirect_uri = Some(redirect_uri);

		self
	}

	/// Attaches the PKCE verifier matching the code challenge.
	pub fn with_pkce_verifier(mut self, verifier: impl Into<String>) -> Self {
		self.pkce_verifier = Some(Secret::new(verifier));

		self
	}
}
impl TokenFlow for AuthorizationCodeFlow {
	fn kind(&self) -> FlowKind {
		FlowKind::AuthorizationCode
	}

	fn form(&self, _client: &OAuthClient) -> Vec<(String, String)> {
		let mut pairs = vec![
			("grant_type".into(), "authorization_code".into()),
			("code".into(), self.code.expose().to_owned()),
		];

		if let Some(redirect_uri) = &self.redirect_uri {
			pairs.push(("redirect_uri".into(), redirect_uri.to_string()));
		}
		if let Some(verifier) = &self.pkce_verifier {
			pairs.push(("code_verifier".into(), verifier.expose().to_owned()));
		}

		pairs
	}

	fn cache_seed(&self) -> String {
		format!(
			"{}|{}",
			digest(self.code.expose()),
			self.redirect_uri.as_ref().map(Url::as_str).unwrap_or_default(),
		)
	}
}

/// Client-credentials grant for machine-to-machine access.
#[derive(Clone, Debug, Default)]
pub struct ClientCredentialsFlow {
	scope: Option<String>,
	params: Vec<(String, String)>,
}
impl ClientCredentialsFlow {
	/// Creates the flow with no scope restriction.
	pub fn new() -> Self {
		Self::default()
	}

	/// Requests a specific scope.
	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Adds a provider-specific form parameter (audience, resource, …).
	pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.params.push((key.into(), value.into()));

		self
	}
}
impl TokenFlow for ClientCredentialsFlow {
	fn kind(&self) -> FlowKind {
		FlowKind::ClientCredentials
	}

	fn form(&self, _client: &OAuthClient) -> Vec<(String, String)> {
		let mut pairs = vec![("grant_type".into(), "client_credentials".into())];

		if let Some(scope) = &self.scope {
			pairs.push(("scope".into(), scope.clone()));
		}

		pairs.extend(self.params.iter().cloned());

		pairs
	}

	fn cache_seed(&self) -> String {
		let mut seed = self.scope.clone().unwrap_or_default();

		for (key, value) in &self.params {
			seed.push('|');
			seed.push_str(key);
			seed.push('=');
			seed.push_str(value);
		}

		seed
	}
}

/// Device-code grant: polls the token endpoint until the user approves.
///
/// The device-authorization request that displays the user code is part of the
/// interactive surface this crate does not own; the flow starts from an issued
/// device code and drives the polling state machine
/// (`authorization_pending` / `slow_down` / terminal errors).
#[derive(Clone, Debug)]
pub struct DeviceFlow {
	device_code: Secret,
	interval: Duration,
	expires_in: Duration,
}
impl DeviceFlow {
	const DEFAULT_EXPIRES_IN: Duration = Duration::seconds(300);
	const DEFAULT_INTERVAL: Duration = Duration::seconds(5);
	const SLOW_DOWN_STEP: Duration = Duration::seconds(5);

	/// Creates the flow for an issued device code.
	pub fn new(device_code: impl Into<String>) -> Self {
		Self {
			device_code: Secret::new(device_code),
			interval: Self::DEFAULT_INTERVAL,
			expires_in: Self::DEFAULT_EXPIRES_IN,
		}
	}

	/// Overrides the polling interval advertised by the provider.
	pub fn with_interval(mut self, interval: Duration) -> Self {
		self.interval = if interval.is_positive() { interval } else { Self::DEFAULT_INTERVAL };

		self
	}

	/// Overrides the device-code lifetime advertised by the provider.
	pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
		self.expires_in =
			if expires_in.is_positive() { expires_in } else { Self::DEFAULT_EXPIRES_IN };

		self
	}
}
impl TokenFlow for DeviceFlow {
	fn kind(&self) -> FlowKind {
		FlowKind::Device
	}

	fn form(&self, _client: &OAuthClient) -> Vec<(String, String)> {
		vec![
			("grant_type".into(), "urn:ietf:params:oauth:grant-type:device_code".into()),
			("device_code".into(), self.device_code.expose().to_owned()),
		]
	}

	fn cache_seed(&self) -> String {
		digest(self.device_code.expose())
	}

	fn acquire<'a>(&'a self, exchanger: &'a TokenExchanger<'a>) -> FlowFuture<'a, Token> {
		Box::pin(async move {
			let deadline = tokio::time::Instant::now() + std_duration(self.expires_in);
			let mut interval = self.interval;

			loop {
				match exchanger.exchange_raw(&self.form(exchanger.client())).await {
					Ok(token) => return Ok(token),
					Err(failure) => match failure.code.as_deref() {
						Some("authorization_pending") => {},
						Some("slow_down") => interval += Self::SLOW_DOWN_STEP,
						Some("expired_token") =>
							return Err(AuthError::DeviceAuthorizationExpired),
						_ => return Err(failure.error),
					},
				}

				if tokio::time::Instant::now() + std_duration(interval) >= deadline {
					return Err(AuthError::DeviceAuthorizationExpired);
				}

				tokio::time::sleep(std_duration(interval)).await;
			}
		})
	}
}

/// JWT-bearer assertion grant (RFC 7523) for a caller-signed assertion.
///
/// Signing the assertion requires key material the crate never holds; callers
/// supply the finished JWT.
#[derive(Clone, Debug)]
pub struct JwtBearerFlow {
	assertion: Secret,
	scope: Option<String>,
}
impl JwtBearerFlow {
	/// Creates the flow for a signed assertion.
	pub fn new(assertion: impl Into<String>) -> Self {
		Self { assertion: Secret::new(assertion), scope: None }
	}

	/// Requests a specific scope.
	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}
}
impl TokenFlow for JwtBearerFlow {
	fn kind(&self) -> FlowKind {
		FlowKind::JwtBearer
	}

	fn form(&self, _client: &OAuthClient) -> Vec<(String, String)> {
		let mut pairs = vec![
			("grant_type".into(), "urn:ietf:params:oauth:grant-type:jwt-bearer".into()),
			("assertion".into(), self.assertion.expose().to_owned()),
		];

		if let Some(scope) = &self.scope {
			pairs.push(("scope".into(), scope.clone()));
		}

		pairs
	}

	fn cache_seed(&self) -> String {
		format!("{}|{}", digest(self.assertion.expose()), self.scope.clone().unwrap_or_default())
	}
}

/// Resource-owner password grant; legacy providers only.
#[derive(Clone, Debug)]
pub struct PasswordFlow {
	username: String,
	password: Secret,
	scope: Option<String>,
}
impl PasswordFlow {
	/// Creates the flow for the given resource-owner credentials.
	pub fn new(username: impl Into<String>, password: Secret) -> Self {
		Self { username: username.into(), password, scope: None }
	}

	/// Requests a specific scope.
	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}
}
impl TokenFlow for PasswordFlow {
	fn kind(&self) -> FlowKind {
		FlowKind::Password
	}

	fn form(&self, _client: &OAuthClient) -> Vec<(String, String)> {
		let mut pairs = vec![
			("grant_type".into(), "password".into()),
			("username".into(), self.username.clone()),
			("password".into(), self.password.expose().to_owned()),
		];

		if let Some(scope) = &self.scope {
			pairs.push(("scope".into(), scope.clone()));
		}

		pairs
	}

	fn cache_seed(&self) -> String {
		format!("{}|{}", self.username, self.scope.clone().unwrap_or_default())
	}
}

/// Direct refresh-token exchange for callers that already hold refresh material.
#[derive(Clone, Debug)]
pub struct RefreshFlow {
	refresh_token: Secret,
	scope: Option<String>,
}
impl RefreshFlow {
	/// Creates the flow for an existing refresh token.
	pub fn new(refresh_token: Secret) -> Self {
		Self { refresh_token, scope: None }
	}

	/// Requests a specific scope.
	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}
}
impl TokenFlow for RefreshFlow {
	fn kind(&self) -> FlowKind {
		FlowKind::Refresh
	}

	fn form(&self, _client: &OAuthClient) -> Vec<(String, String)> {
		let mut pairs = vec![
			("grant_type".into(), "refresh_token".into()),
			("refresh_token".into(), self.refresh_token.expose().to_owned()),
		];

		if let Some(scope) = &self.scope {
			pairs.push(("scope".into(), scope.clone()));
		}

		pairs
	}

	fn cache_seed(&self) -> String {
		format!("{}|{}", digest(self.refresh_token.expose()), self.scope.clone().unwrap_or_default())
	}
}
