//! Redacting secret wrapper with obfuscate-at-rest helpers.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
// self
use crate::_prelude::*;

/// Redacted secret wrapper keeping sensitive material out of logs.
///
/// Values only ever exist in memory in decrypted form; [`Secret::obfuscated`] and
/// [`Secret::from_obfuscated`] exist so embedding applications can park
/// credentials at rest without the plain text appearing in configuration files.
/// Obfuscation is reversible encoding, not encryption.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret(String);
impl Secret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Reconstructs a secret from its obfuscated at-rest form.
	pub fn from_obfuscated(value: &str) -> Option<Self> {
		let bytes = STANDARD.decode(value).ok()?;
		let plain = String::from_utf8(bytes).ok()?;

		Some(Self(plain))
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns the obfuscated at-rest form of the secret.
	pub fn obfuscated(&self) -> String {
		STANDARD.encode(self.0.as_bytes())
	}
}
impl AsRef<str> for Secret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Secret").field(&"<redacted>").finish()
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn secret_formatters_redact() {
		let secret = Secret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "Secret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
	}

	#[test]
	fn obfuscation_round_trips() {
		let secret = Secret::new("client-secret-value");
		let at_rest = secret.obfuscated();

		assert_ne!(at_rest, "client-secret-value");

		let restored =
			Secret::from_obfuscated(&at_rest).expect("Obfuscated form should decode successfully.");

		assert_eq!(restored.expose(), "client-secret-value");
	}
}
