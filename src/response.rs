//! Immutable response values returned by the perform pipeline.

// crates.io
use http::header::RETRY_AFTER;
use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;

/// Where a response body came from.
///
/// `Cache` and `Revalidated` are observable, non-error conditions: the perform
/// call succeeded, and the body was served without (or with a conditional-only)
/// network exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseSource {
	/// Body received from the network on this perform call.
	Network,
	/// Fresh cache hit; no network access occurred.
	Cache,
	/// Server confirmed the cached body via 304; stored bytes were served.
	Revalidated,
}

/// Immutable response produced by one perform call.
#[derive(Clone)]
pub struct Response {
	status: StatusCode,
	headers: HeaderMap,
	body: Bytes,
	source: ResponseSource,
	method: Method,
	url: Url,
}
impl Response {
	/// Assembles a network response for the originating request.
	pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes, method: Method, url: Url) -> Self {
		Self { status, headers, body, source: ResponseSource::Network, method, url }
	}

	pub(crate) fn with_source(mut self, source: ResponseSource) -> Self {
		self.source = source;

		self
	}

	/// Response status code.
	pub fn status(&self) -> StatusCode {
		self.status
	}

	/// Response headers.
	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// Response body bytes.
	pub fn body(&self) -> &Bytes {
		&self.body
	}

	/// Where the body came from.
	pub fn source(&self) -> ResponseSource {
		self.source
	}

	/// Method of the request that produced this response.
	pub fn method(&self) -> &Method {
		&self.method
	}

	/// URL of the request that produced this response.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Returns the first value of a header as UTF-8, if present and valid.
	pub fn header(&self, name: &HeaderName) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}

	/// Response body decoded as UTF-8, with invalid sequences replaced.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Deserializes the body as JSON.
	pub fn json<T>(&self) -> serde_json::Result<T>
	where
		T: for<'de> Deserialize<'de>,
	{
		serde_json::from_slice(&self.body)
	}

	/// Parses the `Retry-After` header as a relative duration.
	///
	/// Accepts both delta-seconds and HTTP-date forms; a date in the past yields
	/// `None`.
	pub fn retry_after(&self) -> Option<Duration> {
		let raw = self.header(&RETRY_AFTER)?.trim();

		if let Ok(secs) = raw.parse::<u64>() {
			return Some(Duration::seconds(secs as i64));
		}
		if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
			let delta = moment - OffsetDateTime::now_utc();

			if delta.is_positive() {
				return Some(delta);
			}
		}

		None
	}
}
impl Debug for Response {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Response")
			.field("status", &self.status)
			.field("source", &self.source)
			.field("method", &self.method)
			.field("url", &self.url.as_str())
			.field("body_len", &self.body.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::format_description;
	// self
	use super::*;

	fn response_with_retry_after(value: &str) -> Response {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, HeaderValue::from_str(value).expect("Value should be valid."));

		Response::new(
			StatusCode::TOO_MANY_REQUESTS,
			headers,
			Bytes::new(),
			Method::GET,
			Url::parse("https://api.example.com/").expect("Fixture URL should parse successfully."),
		)
	}

	#[test]
	fn retry_after_parses_delta_seconds() {
		let response = response_with_retry_after("7");

		assert_eq!(response.retry_after(), Some(Duration::seconds(7)));
	}

	#[test]
	fn retry_after_parses_future_http_date() {
		let future = OffsetDateTime::now_utc() + Duration::minutes(2);
		let formatted = future
			.format(&format_description!(
				"[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] +0000"
			))
			.expect("HTTP date should format successfully.");
		let response = response_with_retry_after(&formatted);
		let parsed = response.retry_after().expect("Future HTTP date should yield a duration.");

		assert!(parsed > Duration::seconds(100));
		assert!(parsed <= Duration::seconds(121));
	}

	#[test]
	fn retry_after_ignores_past_dates_and_garbage() {
		assert_eq!(response_with_retry_after("Wed, 21 Oct 2015 07:28:00 +0000").retry_after(), None);
		assert_eq!(response_with_retry_after("soon").retry_after(), None);
	}

	#[test]
	fn json_helper_deserializes_bodies() {
		let response = Response::new(
			StatusCode::OK,
			HeaderMap::new(),
			Bytes::from_static(br#"{"id":7}"#),
			Method::GET,
			Url::parse("https://api.example.com/").expect("Fixture URL should parse successfully."),
		);
		let value: serde_json::Value =
			response.json().expect("JSON body should deserialize successfully.");

		assert_eq!(value["id"], 7);
	}
}
