//! Long-lived credential obtained from the device flow.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Primary access token returned by the device flow.
///
/// The broker never stores this value; the caller persists it (it is serde-serializable) and
/// hands it back by reference whenever a session token is needed. It has no known expiry and stays
/// valid until the provider rejects it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryCredential {
	/// Access token secret.
	pub access_token: TokenSecret,
	/// Token type reported by the provider (usually `bearer`).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_type: Option<String>,
	/// Scope string granted by the provider.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<String>,
}
impl PrimaryCredential {
	/// Wraps an access token obtained elsewhere (e.g. loaded from host storage).
	pub fn new(access_token: impl Into<String>) -> Self {
		Self { access_token: TokenSecret::new(access_token), token_type: None, scope: None }
	}

	/// Stable fingerprint binding derived session tokens to this credential.
	pub fn fingerprint(&self) -> String {
		self.access_token.fingerprint()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn credential_round_trips_through_host_storage() {
		let credential = PrimaryCredential::new("gho_stored");
		let json = serde_json::to_string(&credential).expect("Credential should serialize.");

		assert_eq!(json, r#"{"access_token":"gho_stored"}"#);

		let restored: PrimaryCredential =
			serde_json::from_str(&json).expect("Credential should deserialize.");

		assert_eq!(restored, credential);
		assert_eq!(restored.fingerprint(), credential.fingerprint());
		assert!(!format!("{restored:?}").contains("gho_stored"));
	}
}
