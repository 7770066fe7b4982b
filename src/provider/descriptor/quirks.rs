// self
use crate::_prelude::*;

/// Provider-specific quirks that influence how flows build requests and pace polling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// `User-Agent` sent on every request; the Copilot endpoints reject unknown agents.
	pub user_agent: String,
	/// `Editor-Version` sent on chat completion requests.
	pub editor_version: String,
	/// `Openai-Organization` sent on chat completion requests.
	pub organization: String,
	/// Authorization scheme used when presenting the primary credential (`token <secret>`).
	pub session_token_scheme: String,
	/// Amount added to the polling interval for every `slow_down` response.
	pub slow_down_increment: Duration,
	/// Character used to join scopes when constructing `scope` parameters.
	pub scope_delimiter: char,
}
impl Default for ProviderQuirks {
	fn default() -> Self {
		Self {
			user_agent: "GithubCopilot/1.155.0".into(),
			editor_version: "vscode/1.85.1".into(),
			organization: "github-copilot".into(),
			session_token_scheme: "token".into(),
			slow_down_increment: Duration::seconds(5),
			scope_delimiter: ' ',
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn partial_quirks_fall_back_to_copilot_defaults() {
		let quirks: ProviderQuirks =
			serde_json::from_str(r#"{"editor_version":"vscode/1.96.0","scope_delimiter":","}"#)
				.expect("Partial quirks should deserialize.");

		assert_eq!(quirks.editor_version, "vscode/1.96.0");
		assert_eq!(quirks.scope_delimiter, ',');
		assert_eq!(quirks.user_agent, "GithubCopilot/1.155.0");
		assert_eq!(quirks.organization, "github-copilot");
		assert_eq!(quirks.slow_down_increment, Duration::seconds(5));
	}
}
