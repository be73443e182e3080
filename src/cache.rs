//! HTTP-semantics-aware response cache.
//!
//! The cache intercepts the perform pipeline in three places: a fresh entry is
//! served without network access, a stale entry with a validator turns the
//! outgoing request into a conditional one (`If-None-Match` /
//! `If-Modified-Since`), and a storable response is written back after a
//! successful exchange. Only responses carrying a validator or an explicit
//! freshness directive are stored; everything else passes through uncached.

pub mod file;
pub mod memory;

pub use file::FileCacheStore;
pub use memory::MemoryCacheStore;

// std
use std::path::PathBuf;
// crates.io
use http::header::{
	CACHE_CONTROL, DATE, ETAG, EXPIRES, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
};
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::CacheError, request::Request, response::Response};

/// Boxed future returned by [`CacheStore`] operations.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + 'a + Send>>;

/// Persistence contract for cached responses, keyed by request fingerprint.
///
/// Implementations must tolerate concurrent access to distinct keys and give
/// atomic-replace semantics on one key: concurrent writers leave some writer's
/// intact entry, never a torn one.
pub trait CacheStore
where
	Self: Send + Sync,
{
	/// Fetches the entry stored under `key`, if present.
	fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<CacheEntry>>;

	/// Stores or atomically replaces the entry under `key`.
	fn put<'a>(&'a self, key: &'a str, entry: CacheEntry) -> CacheFuture<'a, ()>;

	/// Removes the entry under `key`, if present.
	fn delete<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()>;

	/// Removes every entry. This is the only eviction the cache ever performs.
	fn clear(&self) -> CacheFuture<'_, ()>;
}

/// Outcome of a cache lookup for one request.
#[derive(Debug)]
pub enum Lookup {
	/// Entry is within its freshness lifetime; serve it without network access.
	Fresh(Response),
	/// Entry is stale but revalidatable; send a conditional request.
	Stale(CacheEntry),
	/// Nothing usable is stored.
	Miss,
}

/// One stored response plus the metadata needed for freshness and revalidation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry {
	/// Stored response status code.
	pub status: u16,
	/// Stored response headers.
	pub headers: Vec<(String, String)>,
	/// Stored response body.
	pub body: Vec<u8>,
	/// `ETag` validator, when the origin supplied one.
	pub etag: Option<String>,
	/// `Last-Modified` validator, when the origin supplied one.
	pub last_modified: Option<String>,
	/// Instant the entry was stored or last revalidated.
	pub stored_at: OffsetDateTime,
	/// Freshness lifetime granted by the origin, when one was declared.
	pub max_age: Option<Duration>,
}
impl CacheEntry {
	fn from_response(response: &Response, now: OffsetDateTime) -> Self {
		let headers = response
			.headers()
			.iter()
			.map(|(name, value)| {
				(name.as_str().to_owned(), String::from_utf8_lossy(value.as_bytes()).into_owned())
			})
			.collect();

		Self {
			status: response.status().as_u16(),
			headers,
			body: response.body().to_vec(),
			etag: response.header(&ETAG).map(str::to_owned),
			last_modified: response.header(&LAST_MODIFIED).map(str::to_owned),
			stored_at: now,
			max_age: freshness_lifetime(response),
		}
	}

	/// Returns `true` while the entry is within its freshness lifetime.
	pub fn is_fresh(&self, now: OffsetDateTime) -> bool {
		match self.max_age {
			Some(lifetime) => now < self.stored_at + lifetime,
			None => false,
		}
	}

	/// Returns `true` when the entry can be revalidated with a conditional request.
	pub fn has_validator(&self) -> bool {
		self.etag.is_some() || self.last_modified.is_some()
	}

	/// Reconstructs a response from the stored bytes for the given request.
	pub fn to_response(&self, request: &Request) -> Response {
		let mut headers = HeaderMap::new();

		for (name, value) in &self.headers {
			if let (Ok(name), Ok(value)) =
				(HeaderName::from_str(name), HeaderValue::from_str(value))
			{
				headers.append(name, value);
			}
		}

		Response::new(
			StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
			headers,
			Bytes::from(self.body.clone()),
			request.method().clone(),
			request.url().clone(),
		)
	}
}

/// Per-request cache configuration: a store plus the opt-in vary header set.
///
/// The default fingerprint covers method + URL only. Responses whose
/// representation varies by header (content negotiation, per-user bodies) are
/// silently conflated under one key unless the distinguishing headers are named
/// in `vary`.
#[derive(Clone)]
pub struct CachePolicy {
	store: Arc<dyn CacheStore>,
	vary: Vec<HeaderName>,
}
impl CachePolicy {
	/// Wraps an existing cache store.
	pub fn new(store: Arc<dyn CacheStore>) -> Self {
		Self { store, vary: Vec::new() }
	}

	/// Opens a file-backed cache rooted at `dir`.
	pub fn in_dir(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
		Ok(Self::new(Arc::new(FileCacheStore::open(dir)?)))
	}

	/// Creates an in-process cache for tests and demos.
	pub fn in_memory() -> Self {
		Self::new(Arc::new(MemoryCacheStore::default()))
	}

	/// Adds request headers whose values participate in the cache key.
	pub fn with_vary(mut self, names: impl IntoIterator<Item = HeaderName>) -> Self {
		self.vary.extend(names);

		self
	}

	/// Canonical cache key for the request under this policy.
	pub fn fingerprint(&self, request: &Request) -> String {
		let mut hasher = Sha256::new();

		hasher.update(request.method().as_str().as_bytes());
		hasher.update(b"\n");
		hasher.update(request.url().as_str().as_bytes());

		for name in &self.vary {
			hasher.update(b"\n");
			hasher.update(name.as_str().as_bytes());
			hasher.update(b":");

			for value in request.headers().get_all(name) {
				hasher.update(value.as_bytes());
				hasher.update(b",");
			}
		}

		let digest = hasher.finalize();
		let mut key = String::with_capacity(digest.len() * 2);

		for byte in digest {
			key.push_str(&format!("{byte:02x}"));
		}

		key
	}

	/// Looks up the stored state for `request`.
	pub async fn lookup(&self, request: &Request) -> Result<Lookup, CacheError> {
		let key = self.fingerprint(request);
		let Some(entry) = self.store.get(&key).await? else {
			return Ok(Lookup::Miss);
		};

		if entry.is_fresh(OffsetDateTime::now_utc()) {
			return Ok(Lookup::Fresh(entry.to_response(request)));
		}
		if entry.has_validator() {
			return Ok(Lookup::Stale(entry));
		}

		Ok(Lookup::Miss)
	}

	/// Stores `response` when it is cacheable; replaces any previous entry.
	///
	/// Returns `true` when an entry was written.
	pub async fn store(&self, request: &Request, response: &Response) -> Result<bool, CacheError> {
		if !is_storable(response) {
			return Ok(false);
		}

		let key = self.fingerprint(request);
		let entry = CacheEntry::from_response(response, OffsetDateTime::now_utc());

		self.store.put(&key, entry).await?;

		Ok(true)
	}

	/// Refreshes a revalidated entry after a 304, merging any updated headers.
	pub async fn freshen(
		&self,
		request: &Request,
		mut entry: CacheEntry,
		not_modified: &Response,
	) -> Result<CacheEntry, CacheError> {
		let replaced: Vec<String> =
			not_modified.headers().keys().map(|name| name.as_str().to_owned()).collect();

		entry.headers.retain(|(name, _)| !replaced.iter().any(|new| new.eq_ignore_ascii_case(name)));

		for (name, value) in not_modified.headers() {
			entry
				.headers
				.push((name.as_str().to_owned(), String::from_utf8_lossy(value.as_bytes()).into_owned()));
		}

		entry.stored_at = OffsetDateTime::now_utc();
		entry.max_age = freshness_lifetime(not_modified).or(entry.max_age);

		if let Some(etag) = not_modified.header(&ETAG) {
			entry.etag = Some(etag.to_owned());
		}
		if let Some(last_modified) = not_modified.header(&LAST_MODIFIED) {
			entry.last_modified = Some(last_modified.to_owned());
		}

		let key = self.fingerprint(request);

		self.store.put(&key, entry.clone()).await?;

		Ok(entry)
	}

	/// Removes every stored entry.
	pub async fn clear(&self) -> Result<(), CacheError> {
		self.store.clear().await
	}
}
impl Debug for CachePolicy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CachePolicy").field("vary", &self.vary).finish()
	}
}

/// Attaches the entry's validators to an outgoing request copy.
pub fn apply_validators(request: Request, entry: &CacheEntry) -> Request {
	let mut request = request;

	if let Some(etag) = &entry.etag
		&& let Ok(value) = HeaderValue::from_str(etag)
	{
		request = request.with_header(IF_NONE_MATCH, value);
	}
	if let Some(last_modified) = &entry.last_modified
		&& let Ok(value) = HeaderValue::from_str(last_modified)
	{
		request = request.with_header(IF_MODIFIED_SINCE, value);
	}

	request
}

fn is_storable(response: &Response) -> bool {
	if !response.status().is_success() {
		return false;
	}
	if cache_control_directives(response).iter().any(|directive| directive == "no-store") {
		return false;
	}

	response.header(&ETAG).is_some()
		|| response.header(&LAST_MODIFIED).is_some()
		|| freshness_lifetime(response).is_some()
}

fn cache_control_directives(response: &Response) -> Vec<String> {
	response
		.header(&CACHE_CONTROL)
		.map(|value| value.split(',').map(|directive| directive.trim().to_ascii_lowercase()).collect())
		.unwrap_or_default()
}

fn freshness_lifetime(response: &Response) -> Option<Duration> {
	for directive in cache_control_directives(response) {
		if let Some(raw) = directive.strip_prefix("max-age=")
			&& let Ok(secs) = raw.trim().parse::<i64>()
		{
			return Some(Duration::seconds(secs.max(0)));
		}
	}

	let expires = response.header(&EXPIRES)?;
	let expires = OffsetDateTime::parse(expires.trim(), &Rfc2822).ok()?;
	let reference = response
		.header(&DATE)
		.and_then(|date| OffsetDateTime::parse(date.trim(), &Rfc2822).ok())
		.unwrap_or_else(OffsetDateTime::now_utc);
	let lifetime = expires - reference;

	lifetime.is_positive().then_some(lifetime)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn request() -> Request {
		Request::get("https://api.example.com/resource")
			.expect("Fixture URL should parse successfully.")
	}

	fn response_with(headers: &[(HeaderName, &str)], body: &'static [u8]) -> Response {
		let mut map = HeaderMap::new();

		for (name, value) in headers {
			map.insert(name.clone(), HeaderValue::from_str(value).expect("Value should be valid."));
		}

		Response::new(
			StatusCode::OK,
			map,
			Bytes::from_static(body),
			Method::GET,
			Url::parse("https://api.example.com/resource")
				.expect("Fixture URL should parse successfully."),
		)
	}

	#[test]
	fn fingerprint_distinguishes_method_and_url() {
		let policy = CachePolicy::in_memory();
		let get = request();
		let other_url = Request::get("https://api.example.com/other")
			.expect("Fixture URL should parse successfully.");
		let post = Request::post("https://api.example.com/resource")
			.expect("Fixture URL should parse successfully.");

		assert_eq!(policy.fingerprint(&get), policy.fingerprint(&get.clone()));
		assert_ne!(policy.fingerprint(&get), policy.fingerprint(&other_url));
		assert_ne!(policy.fingerprint(&get), policy.fingerprint(&post));
	}

	#[test]
	fn vary_headers_split_the_key_only_when_configured() {
		let plain = CachePolicy::in_memory();
		let varied = CachePolicy::in_memory().with_vary([http::header::ACCEPT]);
		let json = request().try_with_header("accept", "application/json").expect("Header is valid.");
		let xml = request().try_with_header("accept", "application/xml").expect("Header is valid.");

		assert_eq!(plain.fingerprint(&json), plain.fingerprint(&xml));
		assert_ne!(varied.fingerprint(&json), varied.fingerprint(&xml));
	}

	#[tokio::test]
	async fn lookup_classifies_fresh_stale_and_miss() {
		let policy = CachePolicy::in_memory();
		let request = request();

		assert!(matches!(policy.lookup(&request).await, Ok(Lookup::Miss)));

		let fresh = response_with(&[(CACHE_CONTROL, "max-age=3600")], b"fresh-body");

		assert!(policy.store(&request, &fresh).await.expect("Store should succeed."));
		assert!(matches!(policy.lookup(&request).await, Ok(Lookup::Fresh(_))));

		let stale = response_with(&[(ETAG, "\"v1\"")], b"stale-body");

		policy.store(&request, &stale).await.expect("Store should succeed.");

		match policy.lookup(&request).await.expect("Lookup should succeed.") {
			Lookup::Stale(entry) => assert_eq!(entry.etag.as_deref(), Some("\"v1\"")),
			other => panic!("Expected a stale entry, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn responses_without_validator_or_freshness_are_not_stored() {
		let policy = CachePolicy::in_memory();
		let request = request();
		let response = response_with(&[], b"uncacheable");

		assert!(!policy.store(&request, &response).await.expect("Store should succeed."));
		assert!(matches!(policy.lookup(&request).await, Ok(Lookup::Miss)));
	}

	#[tokio::test]
	async fn no_store_directive_is_honored() {
		let policy = CachePolicy::in_memory();
		let request = request();
		let response =
			response_with(&[(CACHE_CONTROL, "no-store"), (ETAG, "\"v1\"")], b"secret");

		assert!(!policy.store(&request, &response).await.expect("Store should succeed."));
	}

	#[tokio::test]
	async fn freshen_updates_metadata_and_keeps_the_body() {
		let policy = CachePolicy::in_memory();
		let request = request();
		let original = response_with(&[(ETAG, "\"v1\"")], b"cached-body");

		policy.store(&request, &original).await.expect("Store should succeed.");

		let entry = match policy.lookup(&request).await.expect("Lookup should succeed.") {
			Lookup::Stale(entry) => entry,
			other => panic!("Expected a stale entry, got {other:?}"),
		};
		let not_modified = Response::new(
			StatusCode::NOT_MODIFIED,
			{
				let mut map = HeaderMap::new();

				map.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=60"));

				map
			},
			Bytes::new(),
			Method::GET,
			Url::parse("https://api.example.com/resource")
				.expect("Fixture URL should parse successfully."),
		);
		let freshened = policy
			.freshen(&request, entry, &not_modified)
			.await
			.expect("Freshen should succeed.");

		assert_eq!(freshened.body, b"cached-body");
		assert_eq!(freshened.max_age, Some(Duration::seconds(60)));
		assert!(matches!(policy.lookup(&request).await, Ok(Lookup::Fresh(_))));
	}

	#[test]
	fn validators_are_attached_to_conditional_requests() {
		let entry = CacheEntry {
			status: 200,
			headers: Vec::new(),
			body: Vec::new(),
			etag: Some("\"v2\"".into()),
			last_modified: Some("Wed, 21 Oct 2015 07:28:00 GMT".into()),
			stored_at: OffsetDateTime::now_utc(),
			max_age: None,
		};
		let conditional = apply_validators(request(), &entry);

		assert_eq!(
			conditional.headers().get(IF_NONE_MATCH),
			Some(&HeaderValue::from_static("\"v2\""))
		);
		assert_eq!(
			conditional.headers().get(IF_MODIFIED_SINCE),
			Some(&HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"))
		);
	}

	#[test]
	fn expires_header_grants_freshness_relative_to_date() {
		let response = response_with(
			&[
				(DATE, "Wed, 21 Oct 2015 07:28:00 +0000"),
				(EXPIRES, "Wed, 21 Oct 2015 08:28:00 +0000"),
			],
			b"dated",
		);

		assert_eq!(freshness_lifetime(&response), Some(Duration::hours(1)));
	}
}
