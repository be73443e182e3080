//! Process-wide token cache with singleflight acquisition and refresh rotation.

// self
use crate::{
	_prelude::*,
	error::AuthError,
	oauth::{
		AuthPolicy,
		flows::{RefreshFlow, TokenExchanger, TokenFlow},
		token::Token,
	},
	transport::Transport,
};

/// Tokens are considered expiring slightly early so a credential injected now is
/// still alive when the request reaches the server.
const EXPIRY_MARGIN: Duration = Duration::seconds(5);

/// Caches issued tokens keyed by (client fingerprint, flow kind, flow parameters).
///
/// Acquisition runs under a per-key guard, so concurrent performs sharing one
/// key trigger exactly one exchange. An expired entry with refresh material goes
/// through a `grant_type=refresh_token` exchange first; if that fails, the cache
/// falls back to one full re-run of the original flow.
#[derive(Debug, Default)]
pub struct TokenCache {
	tokens: RwLock<HashMap<String, Token>>,
	guards: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}
impl TokenCache {
	/// Cache key for an auth policy.
	pub fn key(policy: &AuthPolicy) -> String {
		format!(
			"{}|{}|{}",
			policy.client.fingerprint(),
			policy.flow.kind().as_str(),
			policy.flow.cache_seed(),
		)
	}

	/// Returns a usable bearer token for the policy, acquiring or refreshing as needed.
	pub async fn bearer(
		&self,
		transport: &dyn Transport,
		policy: &AuthPolicy,
		timeout: Option<Duration>,
	) -> Result<Token, AuthError> {
		let key = Self::key(policy);

		if let Some(token) = self.usable(&key) {
			return Ok(token);
		}

		let guard = self.guard(&key);
		let _singleflight = guard.lock().await;

		// Another caller may have finished the exchange while this one waited.
		if let Some(token) = self.usable(&key) {
			return Ok(token);
		}

		let exchanger = TokenExchanger::new(transport, &policy.client, timeout);
		let expired = self.tokens.read().get(&key).cloned();

		if let Some(expired) = expired
			&& let Some(refresh_secret) = expired.refresh_token.clone()
		{
			let refresh = RefreshFlow::new(refresh_secret.clone());

			match refresh.acquire(&exchanger).await {
				Ok(mut token) => {
					// Providers that do not rotate keep the old refresh secret live.
					if token.refresh_token.is_none() {
						token.refresh_token = Some(refresh_secret);
					}

					self.tokens.write().insert(key, token.clone());

					return Ok(token);
				},
				Err(_) => {
					// Dead refresh material; drop to absent and re-run the flow once.
					self.tokens.write().remove(&key);
				},
			}
		}

		let token = policy.flow.acquire(&exchanger).await?;

		self.tokens.write().insert(key, token.clone());

		Ok(token)
	}

	/// Drops the cached token for the policy, forcing re-acquisition.
	pub fn invalidate(&self, policy: &AuthPolicy) {
		self.tokens.write().remove(&Self::key(policy));
	}

	/// Returns the cached token for the policy, usable or not.
	pub fn cached(&self, policy: &AuthPolicy) -> Option<Token> {
		self.tokens.read().get(&Self::key(policy)).cloned()
	}

	/// Seeds the cache with a token obtained elsewhere.
	pub fn insert(&self, policy: &AuthPolicy, token: Token) {
		self.tokens.write().insert(Self::key(policy), token);
	}

	/// Drops every cached token and guard. Test hook.
	pub fn reset(&self) {
		self.tokens.write().clear();
		self.guards.lock().clear();
	}

	fn usable(&self, key: &str) -> Option<Token> {
		let tokens = self.tokens.read();
		let token = tokens.get(key)?;

		(!token.is_expired_at(OffsetDateTime::now_utc() + EXPIRY_MARGIN)).then(|| token.clone())
	}

	// Returns (and creates on demand) the singleflight guard for a cache key.
	fn guard(&self, key: &str) -> Arc<AsyncMutex<()>> {
		let mut guards = self.guards.lock();

		guards.entry(key.to_owned()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		oauth::{ClientCredentialsFlow, OAuthClient},
		secret::Secret,
	};

	fn policy(scope: &str) -> AuthPolicy {
		AuthPolicy::new(
			OAuthClient::new(
				"client-1",
				Url::parse("https://auth.example.com/token")
					.expect("Fixture URL should parse successfully."),
			),
			ClientCredentialsFlow::new().with_scope(scope),
		)
	}

	fn token(access: &str, expires_at: Option<OffsetDateTime>) -> Token {
		Token {
			access_token: Secret::new(access),
			refresh_token: None,
			expires_at,
			token_type: "bearer".into(),
		}
	}

	#[test]
	fn keys_separate_clients_and_flow_parameters() {
		let read = TokenCache::key(&policy("api.read"));
		let write = TokenCache::key(&policy("api.write"));

		assert_ne!(read, write);
		assert!(read.starts_with("client-1@"));
	}

	#[test]
	fn insert_cached_invalidate_round_trip() {
		let cache = TokenCache::default();
		let policy = policy("api.read");

		assert!(cache.cached(&policy).is_none());

		cache.insert(&policy, token("seeded", None));

		assert_eq!(
			cache.cached(&policy).expect("Seeded token should be cached.").access_token.expose(),
			"seeded"
		);

		cache.invalidate(&policy);

		assert!(cache.cached(&policy).is_none());
	}

	#[test]
	fn usable_rejects_tokens_inside_the_expiry_margin() {
		let cache = TokenCache::default();
		let policy = policy("api.read");
		let key = TokenCache::key(&policy);

		cache.insert(&policy, token("expiring", Some(OffsetDateTime::now_utc() + Duration::seconds(2))));

		assert!(cache.usable(&key).is_none());

		cache.insert(&policy, token("alive", Some(OffsetDateTime::now_utc() + Duration::hours(1))));

		assert!(cache.usable(&key).is_some());
	}

	#[test]
	fn reset_clears_tokens_and_guards() {
		let cache = TokenCache::default();
		let policy = policy("api.read");

		cache.insert(&policy, token("seeded", None));
		cache.guard(&TokenCache::key(&policy));
		cache.reset();

		assert!(cache.cached(&policy).is_none());
		assert!(cache.guards.lock().is_empty());
	}
}
