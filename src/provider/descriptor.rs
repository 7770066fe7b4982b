//! Provider descriptor data structures shared by all flows.

/// Builder API for assembling provider descriptors.
pub mod builder;
/// Provider-specific quirk toggles.
pub mod quirks;

pub use builder::*;
pub use quirks::*;

// self
use crate::_prelude::*;

/// OAuth client identifier of the editor integration the Copilot endpoints recognize.
pub const COPILOT_CLIENT_ID: &str = "01ab8ac9400c4e429b23cb99b9409569";
/// GitHub device code endpoint.
pub const GITHUB_DEVICE_CODE_URL: &str = "https://github.com/login/device/code";
/// GitHub OAuth access token endpoint polled during the device flow.
pub const GITHUB_ACCESS_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
/// Copilot session token exchange endpoint.
pub const COPILOT_TOKEN_URL: &str = "https://api.github.com/copilot_internal/v2/token";
/// Copilot chat completion endpoint.
pub const COPILOT_CHAT_URL: &str = "https://api.githubcopilot.com/chat/completions";

/// Endpoint set declared by a provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Device authorization endpoint issuing device + user codes.
	pub device_authorization: Url,
	/// Token endpoint polled with the device code.
	pub device_token: Url,
	/// Endpoint exchanging the primary credential for a session token.
	pub session_token: Url,
	/// Chat completion endpoint.
	pub chat_completions: Url,
}

/// Immutable provider descriptor consumed by flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Endpoint definitions exposed by the provider.
	pub endpoints: ProviderEndpoints,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptor {
	/// Creates a new builder seeded with the GitHub Copilot production endpoints.
	pub fn builder() -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::default()
	}

	/// Descriptor for the public GitHub + Copilot endpoints.
	pub fn github_copilot() -> Result<Self, ProviderDescriptorError> {
		Self::builder().build()
	}
}
