//! Bearer token values and token-endpoint payload parsing.

// self
use crate::{_prelude::*, error::AuthError, secret::Secret};

/// Issued bearer credential plus its refresh material and expiry.
#[derive(Clone, Serialize, Deserialize)]
pub struct Token {
	/// Access token secret; callers must avoid logging it.
	pub access_token: Secret,
	/// Refresh token secret, if the provider issued one.
	pub refresh_token: Option<Secret>,
	/// Expiry instant; `None` means the provider declared no expiry.
	pub expires_at: Option<OffsetDateTime>,
	/// Token type reported by the provider, normally `bearer`.
	pub token_type: String,
}
impl Token {
	/// Converts a parsed token-endpoint payload into a token.
	pub fn from_payload(payload: TokenPayload, now: OffsetDateTime) -> Result<Self, AuthError> {
		let access_token = payload.access_token.ok_or(AuthError::MissingAccessToken)?;
		let expires_at = payload.expires_in.map(|secs| now + Duration::seconds_f64(secs));

		Ok(Self {
			access_token: Secret::new(access_token),
			refresh_token: payload.refresh_token.map(Secret::new),
			expires_at,
			token_type: payload.token_type.unwrap_or_else(|| "bearer".into()),
		})
	}

	/// Returns `true` once the token's expiry instant has passed.
	///
	/// Tokens without a declared expiry never expire locally; the reactive
	/// `invalid_token` path is their only invalidation.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| instant >= expires_at)
	}

	/// Returns `true` if the token is expired relative to the current clock.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}

	/// Renders the `Authorization` header value for this token.
	pub fn bearer_header(&self) -> String {
		format!("Bearer {}", self.access_token.expose())
	}
}
impl Debug for Token {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Token")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_at", &self.expires_at)
			.field("token_type", &self.token_type)
			.finish()
	}
}

/// Successful token-endpoint response shape (RFC 6749 §5.1).
#[derive(Clone, Debug, Deserialize)]
pub struct TokenPayload {
	/// Issued access token.
	pub access_token: Option<String>,
	/// Token type, normally `bearer`.
	pub token_type: Option<String>,
	/// Relative expiry in seconds.
	pub expires_in: Option<f64>,
	/// Optional rotating refresh token.
	pub refresh_token: Option<String>,
	/// Granted scope, when the provider narrows or echoes it.
	pub scope: Option<String>,
}

/// Token-endpoint error response shape (RFC 6749 §5.2).
#[derive(Clone, Debug, Deserialize)]
pub struct ErrorPayload {
	/// Machine-readable OAuth error code.
	pub error: Option<String>,
	/// Human-readable description, when supplied.
	pub error_description: Option<String>,
}
impl ErrorPayload {
	/// Best human-readable summary of the failure.
	pub fn reason(&self) -> String {
		self.error_description
			.clone()
			.or_else(|| self.error.clone())
			.unwrap_or_else(|| "no error details provided".into())
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn payload_conversion_computes_expiry() {
		let now = macros::datetime!(2025-06-01 12:00 UTC);
		let payload = TokenPayload {
			access_token: Some("access".into()),
			token_type: Some("Bearer".into()),
			expires_in: Some(1800.0),
			refresh_token: Some("refresh".into()),
			scope: None,
		};
		let token = Token::from_payload(payload, now).expect("Payload should convert to a token.");

		assert_eq!(token.expires_at, Some(macros::datetime!(2025-06-01 12:30 UTC)));
		assert!(!token.is_expired_at(macros::datetime!(2025-06-01 12:29 UTC)));
		assert!(token.is_expired_at(macros::datetime!(2025-06-01 12:30 UTC)));
		assert_eq!(token.bearer_header(), "Bearer access");
	}

	#[test]
	fn payload_without_access_token_is_rejected() {
		let payload = TokenPayload {
			access_token: None,
			token_type: None,
			expires_in: None,
			refresh_token: None,
			scope: None,
		};

		assert!(matches!(
			Token::from_payload(payload, OffsetDateTime::now_utc()),
			Err(AuthError::MissingAccessToken)
		));
	}

	#[test]
	fn tokens_without_expiry_never_expire_locally() {
		let payload = TokenPayload {
			access_token: Some("forever".into()),
			token_type: None,
			expires_in: None,
			refresh_token: None,
			scope: None,
		};
		let token = Token::from_payload(payload, OffsetDateTime::now_utc())
			.expect("Payload should convert to a token.");

		assert!(!token.is_expired());
		assert_eq!(token.token_type, "bearer");
	}

	#[test]
	fn token_debug_redacts_secrets() {
		let token = Token {
			access_token: Secret::new("visible"),
			refresh_token: Some(Secret::new("also-visible")),
			expires_at: None,
			token_type: "bearer".into(),
		};
		let rendered = format!("{token:?}");

		assert!(!rendered.contains("visible"));
		assert!(rendered.contains("<redacted>"));
	}
}
