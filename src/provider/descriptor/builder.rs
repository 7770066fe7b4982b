// self
use crate::{
	_prelude::*,
	provider::{
		COPILOT_CHAT_URL, COPILOT_TOKEN_URL, GITHUB_ACCESS_TOKEN_URL, GITHUB_DEVICE_CODE_URL,
		ProviderDescriptor, ProviderEndpoints, ProviderQuirks,
	},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum ProviderDescriptorError {
	/// Built-in endpoint constant failed to parse.
	#[error("The {endpoint} endpoint is not a valid URL.")]
	InvalidEndpoint {
		/// Which endpoint failed to parse.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Polling can only slow down by a positive amount.
	#[error("The slow_down increment must be positive.")]
	NonPositiveSlowDown,
	/// Identity headers cannot be blank.
	#[error("The {header} header value cannot be empty.")]
	EmptyHeader {
		/// Header whose configured value is blank.
		header: &'static str,
	},
	/// Reject scope delimiters that are control characters.
	#[error("Scope delimiter must be a printable character.")]
	InvalidScopeDelimiter {
		/// Invalid delimiter that was supplied.
		delimiter: char,
	},
}

/// Builder for [`ProviderDescriptor`] values. Unset endpoints fall back to GitHub production.
#[derive(Debug, Default)]
pub struct ProviderDescriptorBuilder {
	/// Overrides the device authorization endpoint.
	pub device_authorization_endpoint: Option<Url>,
	/// Overrides the device token endpoint.
	pub device_token_endpoint: Option<Url>,
	/// Overrides the session token endpoint.
	pub session_token_endpoint: Option<Url>,
	/// Overrides the chat completion endpoint.
	pub chat_completions_endpoint: Option<Url>,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptorBuilder {
	/// Sets the device authorization endpoint.
	pub fn device_authorization_endpoint(mut self, url: Url) -> Self {
		self.device_authorization_endpoint = Some(url);

		self
	}

	/// Sets the device token endpoint.
	pub fn device_token_endpoint(mut self, url: Url) -> Self {
		self.device_token_endpoint = Some(url);

		self
	}

	/// Sets the session token endpoint.
	pub fn session_token_endpoint(mut self, url: Url) -> Self {
		self.session_token_endpoint = Some(url);

		self
	}

	/// Sets the chat completion endpoint.
	pub fn chat_completions_endpoint(mut self, url: Url) -> Self {
		self.chat_completions_endpoint = Some(url);

		self
	}

	/// Overrides the provider quirks.
	pub fn quirks(mut self, quirks: ProviderQuirks) -> Self {
		self.quirks = quirks;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ProviderDescriptorError> {
		let endpoints = ProviderEndpoints {
			device_authorization: or_default(
				"device_authorization",
				self.device_authorization_endpoint,
				GITHUB_DEVICE_CODE_URL,
			)?,
			device_token: or_default(
				"device_token",
				self.device_token_endpoint,
				GITHUB_ACCESS_TOKEN_URL,
			)?,
			session_token: or_default(
				"session_token",
				self.session_token_endpoint,
				COPILOT_TOKEN_URL,
			)?,
			chat_completions: or_default(
				"chat_completions",
				self.chat_completions_endpoint,
				COPILOT_CHAT_URL,
			)?,
		};
		let descriptor = ProviderDescriptor { endpoints, quirks: self.quirks };

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl ProviderDescriptor {
	/// Validates invariants for the descriptor.
	fn validate(&self) -> Result<(), ProviderDescriptorError> {
		validate_endpoint("device_authorization", &self.endpoints.device_authorization)?;
		validate_endpoint("device_token", &self.endpoints.device_token)?;
		validate_endpoint("session_token", &self.endpoints.session_token)?;
		validate_endpoint("chat_completions", &self.endpoints.chat_completions)?;

		if !self.quirks.slow_down_increment.is_positive() {
			return Err(ProviderDescriptorError::NonPositiveSlowDown);
		}

		for (header, value) in [
			("user-agent", &self.quirks.user_agent),
			("editor-version", &self.quirks.editor_version),
			("openai-organization", &self.quirks.organization),
			("authorization", &self.quirks.session_token_scheme),
		] {
			if value.trim().is_empty() {
				return Err(ProviderDescriptorError::EmptyHeader { header });
			}
		}

		if self.quirks.scope_delimiter.is_control() {
			return Err(ProviderDescriptorError::InvalidScopeDelimiter {
				delimiter: self.quirks.scope_delimiter,
			});
		}

		Ok(())
	}
}

fn or_default(
	endpoint: &'static str,
	configured: Option<Url>,
	fallback: &str,
) -> Result<Url, ProviderDescriptorError> {
	match configured {
		Some(url) => Ok(url),
		None => Url::parse(fallback)
			.map_err(|source| ProviderDescriptorError::InvalidEndpoint { endpoint, source }),
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderDescriptorError> {
	if url.scheme() != "https" {
		Err(ProviderDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	} else {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Failed to parse descriptor test URL.")
	}

	#[test]
	fn defaults_point_at_github_production() {
		let descriptor =
			ProviderDescriptor::github_copilot().expect("Default descriptor should validate.");

		assert_eq!(descriptor.endpoints.device_authorization.as_str(), GITHUB_DEVICE_CODE_URL);
		assert_eq!(descriptor.endpoints.device_token.as_str(), GITHUB_ACCESS_TOKEN_URL);
		assert_eq!(descriptor.endpoints.session_token.as_str(), COPILOT_TOKEN_URL);
		assert_eq!(descriptor.endpoints.chat_completions.as_str(), COPILOT_CHAT_URL);
		assert_eq!(descriptor.quirks.slow_down_increment, Duration::seconds(5));
		assert_eq!(descriptor.quirks.session_token_scheme, "token");
	}

	#[test]
	fn overrides_replace_only_the_named_endpoint() {
		let descriptor = ProviderDescriptor::builder()
			.chat_completions_endpoint(url("https://proxy.example.com/v1/chat/completions"))
			.build()
			.expect("Descriptor with a chat override should validate.");

		assert_eq!(
			descriptor.endpoints.chat_completions.as_str(),
			"https://proxy.example.com/v1/chat/completions"
		);
		assert_eq!(descriptor.endpoints.session_token.as_str(), COPILOT_TOKEN_URL);
	}

	#[test]
	fn rejects_insecure_endpoints() {
		let err = ProviderDescriptor::builder()
			.device_token_endpoint(url("http://github.com/login/oauth/access_token"))
			.build()
			.expect_err("Plain HTTP endpoints must be rejected.");

		assert!(matches!(
			err,
			ProviderDescriptorError::InsecureEndpoint { endpoint: "device_token", .. }
		));
	}

	#[test]
	fn rejects_degenerate_quirks() {
		let quirks = ProviderQuirks { slow_down_increment: Duration::ZERO, ..Default::default() };
		let err = ProviderDescriptor::builder()
			.quirks(quirks)
			.build()
			.expect_err("A zero slow_down increment must be rejected.");

		assert_eq!(err, ProviderDescriptorError::NonPositiveSlowDown);

		let quirks = ProviderQuirks { user_agent: "  ".into(), ..Default::default() };
		let err = ProviderDescriptor::builder()
			.quirks(quirks)
			.build()
			.expect_err("A blank user agent must be rejected.");

		assert_eq!(err, ProviderDescriptorError::EmptyHeader { header: "user-agent" });

		let quirks = ProviderQuirks { scope_delimiter: '\n', ..Default::default() };
		let err = ProviderDescriptor::builder()
			.quirks(quirks)
			.build()
			.expect_err("Control-character delimiters must be rejected.");

		assert!(matches!(err, ProviderDescriptorError::InvalidScopeDelimiter { .. }));
	}
}
