//! Immutable request values and their attached execution policies.
//!
//! A [`Request`] is a plain value: every `with_*` operation consumes the value and
//! returns an updated copy, so configured requests can be cloned, stored, and
//! replayed without aliasing hazards. Policies (deadline, retry, throttle, cache,
//! auth) ride along on the value and are interpreted by
//! [`Client::perform`](crate::client::Client::perform).

// crates.io
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	cache::CachePolicy,
	error::ConfigError,
	oauth::AuthPolicy,
	retry::RetryPolicy,
	throttle::ThrottlePolicy,
};

const PREVIEW_BODY_LIMIT: usize = 1_024;

/// Request body representation.
///
/// Structured variants are encoded to bytes + content type at the send boundary;
/// until then the request stays cheap to clone and inspect.
#[derive(Clone, Debug, Default)]
pub enum Body {
	/// No body.
	#[default]
	Empty,
	/// Pre-encoded bytes with their content type.
	Bytes {
		/// MIME type sent as `Content-Type`.
		content_type: String,
		/// Raw payload.
		data: Bytes,
	},
	/// JSON payload, encoded with `serde_json` when the request is sent.
	Json(serde_json::Value),
	/// URL-encoded form payload, preserving pair order.
	Form(Vec<(String, String)>),
}
impl Body {
	/// Encodes the body into wire bytes plus the content type to send.
	pub fn encode(&self) -> Result<Option<(String, Bytes)>, ConfigError> {
		match self {
			Self::Empty => Ok(None),
			Self::Bytes { content_type, data } => Ok(Some((content_type.clone(), data.clone()))),
			Self::Json(value) => {
				let data = serde_json::to_vec(value)?;

				Ok(Some(("application/json".into(), Bytes::from(data))))
			},
			Self::Form(pairs) => {
				let mut serializer = form_urlencoded::Serializer::new(String::new());

				for (key, value) in pairs {
					serializer.append_pair(key, value);
				}

				Ok(Some((
					"application/x-www-form-urlencoded".into(),
					Bytes::from(serializer.finish().into_bytes()),
				)))
			},
		}
	}

	/// Returns `true` when no payload is attached.
	pub fn is_empty(&self) -> bool {
		matches!(self, Self::Empty)
	}
}

/// Per-request execution policies interpreted by the perform pipeline.
#[derive(Clone, Debug, Default)]
pub struct Policy {
	/// Overall time budget for the perform call, bounding transport calls and sleeps.
	pub deadline: Option<Duration>,
	/// Retry classification and backoff configuration.
	pub retry: RetryPolicy,
	/// Token-bucket throttle configuration, keyed by realm.
	pub throttle: Option<ThrottlePolicy>,
	/// Response cache configuration.
	pub cache: Option<CachePolicy>,
	/// OAuth bearer credential configuration.
	pub auth: Option<AuthPolicy>,
}

/// Immutable description of one HTTP exchange to perform.
#[derive(Clone)]
pub struct Request {
	method: Method,
	url: Url,
	headers: HeaderMap,
	body: Body,
	policy: Policy,
}
impl Request {
	/// Creates a request for the given method and URL.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: Body::Empty, policy: Policy::default() }
	}

	/// Creates a GET request, parsing the URL.
	pub fn get(url: &str) -> Result<Self, ConfigError> {
		Ok(Self::new(Method::GET, Url::parse(url)?))
	}

	/// Creates a POST request, parsing the URL.
	pub fn post(url: &str) -> Result<Self, ConfigError> {
		Ok(Self::new(Method::POST, Url::parse(url)?))
	}

	/// Creates a PUT request, parsing the URL.
	pub fn put(url: &str) -> Result<Self, ConfigError> {
		Ok(Self::new(Method::PUT, Url::parse(url)?))
	}

	/// Creates a PATCH request, parsing the URL.
	pub fn patch(url: &str) -> Result<Self, ConfigError> {
		Ok(Self::new(Method::PATCH, Url::parse(url)?))
	}

	/// Creates a DELETE request, parsing the URL.
	pub fn delete(url: &str) -> Result<Self, ConfigError> {
		Ok(Self::new(Method::DELETE, Url::parse(url)?))
	}

	/// Creates a HEAD request, parsing the URL.
	pub fn head(url: &str) -> Result<Self, ConfigError> {
		Ok(Self::new(Method::HEAD, Url::parse(url)?))
	}

	/// Appends a header, preserving any existing values under the same name.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.append(name, value);

		self
	}

	/// Appends a header from string parts, validating both.
	pub fn try_with_header(self, name: &str, value: &str) -> Result<Self, ConfigError> {
		let name = HeaderName::from_str(name)?;
		let value = HeaderValue::from_str(value)?;

		Ok(self.with_header(name, value))
	}

	/// Appends a query parameter to the URL.
	pub fn with_query(mut self, key: &str, value: &str) -> Self {
		self.url.query_pairs_mut().append_pair(key, value);

		self
	}

	/// Attaches a pre-encoded body.
	pub fn with_body_bytes(mut self, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
		self.body = Body::Bytes { content_type: content_type.into(), data: data.into() };

		self
	}

	/// Attaches a JSON body, serialized when the request is sent.
	pub fn with_body_json<T>(mut self, payload: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		self.body = Body::Json(serde_json::to_value(payload)?);

		Ok(self)
	}

	/// Attaches a URL-encoded form body.
	pub fn with_body_form<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
	where
		K: Into<String>,
		V: Into<String>,
	{
		self.body =
			Body::Form(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect());

		self
	}

	/// Sets the overall time budget for the perform call.
	pub fn with_deadline(mut self, deadline: Duration) -> Self {
		self.policy.deadline = Some(deadline);

		self
	}

	/// Replaces the retry policy.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.policy.retry = retry;

		self
	}

	/// Attaches a throttle policy.
	pub fn with_throttle(mut self, throttle: ThrottlePolicy) -> Self {
		self.policy.throttle = Some(throttle);

		self
	}

	/// Attaches a cache policy.
	pub fn with_cache(mut self, cache: CachePolicy) -> Self {
		self.policy.cache = Some(cache);

		self
	}

	/// Attaches an OAuth bearer credential policy.
	pub fn with_auth(mut self, auth: AuthPolicy) -> Self {
		self.policy.auth = Some(auth);

		self
	}

	/// Request method.
	pub fn method(&self) -> &Method {
		&self.method
	}

	/// Request URL.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Request headers.
	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// Request body.
	pub fn body(&self) -> &Body {
		&self.body
	}

	/// Attached execution policies.
	pub fn policy(&self) -> &Policy {
		&self.policy
	}

	/// Default throttle realm for the request: scheme + host (+ non-default port).
	pub fn default_realm(&self) -> String {
		let scheme = self.url.scheme();
		let host = self.url.host_str().unwrap_or_default();

		match self.url.port() {
			Some(port) => format!("{scheme}://{host}:{port}"),
			None => format!("{scheme}://{host}"),
		}
	}

	/// Validates that the request is sendable: an absolute http(s) URL with a host.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.url.host_str().is_none() {
			return Err(ConfigError::MissingHost { url: self.url.clone() });
		}
		if !matches!(self.url.scheme(), "http" | "https") {
			return Err(ConfigError::UnsupportedScheme { url: self.url.clone() });
		}

		Ok(())
	}

	/// Renders the finalized request without sending it.
	///
	/// Secrets are redacted and structured bodies are encoded exactly as they
	/// would be on the wire, so the preview is safe to print and faithful to what
	/// the transport would receive. Bearer injection is not applied: acquiring a
	/// credential would require network traffic, which a dry run must never
	/// produce.
	pub fn preview(&self) -> Result<RequestPreview, ConfigError> {
		self.validate()?;

		let mut headers: Vec<(String, String)> = Vec::with_capacity(self.headers.len() + 1);

		for (name, value) in &self.headers {
			let rendered = if name == AUTHORIZATION {
				"<redacted>".into()
			} else {
				String::from_utf8_lossy(value.as_bytes()).into_owned()
			};

			headers.push((name.as_str().to_owned(), rendered));
		}

		let body = match self.body.encode()? {
			Some((content_type, data)) => {
				if !self.headers.contains_key(CONTENT_TYPE) {
					headers.push((CONTENT_TYPE.as_str().to_owned(), content_type));
				}

				Some(preview_bytes(&data))
			},
			None => None,
		};

		Ok(RequestPreview { method: self.method.clone(), url: self.url.clone(), headers, body })
	}
}
impl Debug for Request {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Request")
			.field("method", &self.method)
			.field("url", &self.url.as_str())
			.field("headers", &self.headers.len())
			.field("body_set", &!self.body.is_empty())
			.finish()
	}
}

/// Printable projection of a finalized request, produced without network access.
#[derive(Clone, Debug)]
pub struct RequestPreview {
	/// Request method.
	pub method: Method,
	/// Finalized URL.
	pub url: Url,
	/// Header name/value pairs with secrets redacted.
	pub headers: Vec<(String, String)>,
	/// UTF-8 body preview, truncated for large payloads.
	pub body: Option<String>,
}
impl Display for RequestPreview {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		writeln!(f, "{} {}", self.method, self.url)?;

		for (name, value) in &self.headers {
			writeln!(f, "{name}: {value}")?;
		}
		if let Some(body) = &self.body {
			writeln!(f)?;
			f.write_str(body)?;
		}

		Ok(())
	}
}

fn preview_bytes(data: &Bytes) -> String {
	let text = String::from_utf8_lossy(data);

	if text.chars().count() <= PREVIEW_BODY_LIMIT {
		return text.into_owned();
	}

	let mut buf: String = text.chars().take(PREVIEW_BODY_LIMIT).collect();

	buf.push('…');

	buf
}

#[cfg(test)]
mod tests {
	// crates.io
	use http::header::ACCEPT;
	// self
	use super::*;

	#[test]
	fn builder_operations_leave_the_original_untouched() {
		let base = Request::get("https://api.example.com/items")
			.expect("Fixture URL should parse successfully.");
		let derived = base.clone().with_query("page", "2").with_header(
			ACCEPT,
			HeaderValue::from_static("application/json"),
		);

		assert_eq!(base.url().as_str(), "https://api.example.com/items");
		assert!(base.headers().is_empty());
		assert_eq!(derived.url().as_str(), "https://api.example.com/items?page=2");
		assert_eq!(derived.headers().len(), 1);
	}

	#[test]
	fn duplicate_headers_preserve_insertion_order() {
		let request = Request::get("https://api.example.com/")
			.expect("Fixture URL should parse successfully.")
			.try_with_header("x-tag", "first")
			.expect("First header should be valid.")
			.try_with_header("X-Tag", "second")
			.expect("Second header should be valid.");
		let values: Vec<_> = request.headers().get_all("x-tag").iter().collect();

		assert_eq!(values, [&HeaderValue::from_static("first"), &HeaderValue::from_static("second")]);
	}

	#[test]
	fn json_body_encodes_with_content_type() {
		let request = Request::post("https://api.example.com/items")
			.expect("Fixture URL should parse successfully.")
			.with_body_json(&serde_json::json!({ "name": "widget" }))
			.expect("JSON body should serialize successfully.");
		let (content_type, data) = request
			.body()
			.encode()
			.expect("Body should encode successfully.")
			.expect("JSON body should produce bytes.");

		assert_eq!(content_type, "application/json");
		assert_eq!(data.as_ref(), br#"{"name":"widget"}"#);
	}

	#[test]
	fn form_body_url_encodes_pairs_in_order() {
		let request = Request::post("https://api.example.com/token")
			.expect("Fixture URL should parse successfully.")
			.with_body_form([("grant_type", "client_credentials"), ("scope", "a b")]);
		let (content_type, data) = request
			.body()
			.encode()
			.expect("Body should encode successfully.")
			.expect("Form body should produce bytes.");

		assert_eq!(content_type, "application/x-www-form-urlencoded");
		assert_eq!(data.as_ref(), b"grant_type=client_credentials&scope=a+b");
	}

	#[test]
	fn validate_rejects_non_http_schemes() {
		let request = Request::new(
			Method::GET,
			Url::parse("file:///etc/hosts").expect("Fixture URL should parse successfully."),
		);

		assert!(matches!(request.validate(), Err(ConfigError::UnsupportedScheme { .. })));
	}

	#[test]
	fn preview_redacts_authorization_and_renders_body() {
		let preview = Request::post("https://api.example.com/items")
			.expect("Fixture URL should parse successfully.")
			.try_with_header("authorization", "Bearer visible-token")
			.expect("Authorization header should be valid.")
			.with_body_form([("name", "widget")])
			.preview()
			.expect("Preview should render successfully.");
		let rendered = preview.to_string();

		assert!(rendered.starts_with("POST https://api.example.com/items"));
		assert!(rendered.contains("authorization: <redacted>"));
		assert!(!rendered.contains("visible-token"));
		assert!(rendered.contains("content-type: application/x-www-form-urlencoded"));
		assert!(rendered.contains("name=widget"));
	}

	#[test]
	fn default_realm_is_scheme_and_host() {
		let request = Request::get("https://api.example.com/v1/items?page=1")
			.expect("Fixture URL should parse successfully.");

		assert_eq!(request.default_realm(), "https://api.example.com");

		let with_port = Request::get("http://localhost:8080/items")
			.expect("Fixture URL should parse successfully.");

		assert_eq!(with_port.default_realm(), "http://localhost:8080");
	}
}
