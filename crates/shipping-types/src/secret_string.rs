//! Credential wrapper that never prints its contents.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

const REDACTED: &str = "[redacted]";

/// Holds a courier API key or similar token.
///
/// The buffer is zeroed on drop, and `Debug`, `Display` and `Serialize`
/// all emit a placeholder instead of the value.
#[derive(Clone)]
pub struct SecretString(Zeroizing<String>);

impl SecretString {
	pub fn new(value: impl Into<String>) -> Self {
		Self(Zeroizing::new(value.into()))
	}

	/// Returns the raw value. Only pass it to the transport layer.
	pub fn expose_secret(&self) -> &str {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.trim().is_empty()
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SecretString({})", REDACTED)
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl From<&str> for SecretString {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

impl From<String> for SecretString {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}

impl PartialEq for SecretString {
	fn eq(&self, other: &Self) -> bool {
		self.expose_secret() == other.expose_secret()
	}
}

impl Eq for SecretString {}

impl Serialize for SecretString {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(REDACTED)
	}
}

impl<'de> Deserialize<'de> for SecretString {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		String::deserialize(deserializer).map(SecretString::new)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_api_key_is_not_printed() {
		let key = SecretString::from("biteship_live.abc123");
		assert!(!format!("{:?}", key).contains("abc123"));
		assert_eq!(key.to_string(), "[redacted]");
		assert_eq!(serde_json::to_string(&key).unwrap(), "\"[redacted]\"");
		assert_eq!(key.expose_secret(), "biteship_live.abc123");
	}

	#[test]
	fn test_blank_key_is_empty() {
		assert!(SecretString::from("   ").is_empty());
		let parsed: SecretString = serde_json::from_str("\"k\"").unwrap();
		assert_eq!(parsed, SecretString::from("k"));
	}
}
