//! Chat completion issuer backed by the session token cache.

// crates.io
use oauth2::http::Method;
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	auth::PrimaryCredential,
	flows::Broker,
	http::ProviderHttpClient,
	oauth::{self, ProviderRequest, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Instruction sent as the `system` message when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str =
	"You are a smart home assistant for Home Assistant. Reply concisely and helpfully.";

/// Model and sampling settings applied to every completion request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
	/// Model identifier.
	pub model: String,
	/// Sampling temperature.
	pub temperature: f32,
	/// Nucleus sampling cutoff.
	pub top_p: f32,
	/// Fixed `system` instruction preceding the user prompt.
	pub system_prompt: String,
}
impl Default for ChatSettings {
	fn default() -> Self {
		Self {
			model: "gpt-4".into(),
			temperature: 0.1,
			top_p: 1.0,
			system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
		}
	}
}

/// Text reply extracted from a completion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
	/// Content of the first choice.
	pub text: String,
	/// Model echoed by the provider.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	/// Why generation stopped.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub finish_reason: Option<String>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
	messages: [ChatMessage<'a>; 2],
	model: &'a str,
	temperature: f32,
	top_p: f32,
	n: u8,
	stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
	role: &'static str,
	content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
	#[serde(default)]
	model: Option<String>,
	#[serde(default)]
	choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
	#[serde(default)]
	message: Option<CompletionMessage>,
	#[serde(default)]
	finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CompletionMessage {
	#[serde(default)]
	content: Option<String>,
}

/// Issues completions on behalf of one primary credential.
///
/// Created by [`Broker::chat`]. Every client carries its own editor session identifier while
/// sharing the broker's session token cache.
pub struct ChatClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	broker: Broker<C, M>,
	primary: PrimaryCredential,
	session_id: String,
}
impl<C, M> ChatClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Editor session identifier sent as `Vscode-Sessionid`.
	pub fn session_id(&self) -> &str {
		&self.session_id
	}

	/// Credential used to derive session tokens.
	pub fn primary(&self) -> &PrimaryCredential {
		&self.primary
	}

	/// Sends `prompt` as one non-streaming, single-candidate completion and returns the reply.
	///
	/// Performs exactly one session token lookup and one completion request. A `401` from the
	/// completion endpoint invalidates the cached session token before the error is returned.
	pub async fn complete(&self, prompt: &str) -> Result<ChatReply> {
		const KIND: FlowKind = FlowKind::ChatCompletion;

		let span = FlowSpan::new(KIND, "complete");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.request_completion(prompt)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(err) => {
				obs::record_provider_failure(KIND, err);
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}

	async fn request_completion(&self, prompt: &str) -> Result<ChatReply> {
		let session = self.broker.get_valid_token(&self.primary).await?;
		let settings = &self.broker.chat_settings;
		let quirks = &self.broker.descriptor.quirks;
		let payload = CompletionRequest {
			messages: [
				ChatMessage { role: "system", content: &settings.system_prompt },
				ChatMessage { role: "user", content: prompt },
			],
			model: &settings.model,
			temperature: settings.temperature,
			top_p: settings.top_p,
			n: 1,
			stream: false,
		};
		let request = ProviderRequest::new(
			Method::POST,
			&self.broker.descriptor.endpoints.chat_completions,
			quirks,
		)?
		.authorization("Bearer", session.token.expose())?
		.header("openai-organization", &quirks.organization)?
		.header("editor-version", &quirks.editor_version)?
		.header("x-request-id", &Uuid::new_v4().to_string())?
		.header("vscode-sessionid", &self.session_id)?
		.json(&payload)?;
		let response = oauth::dispatch(
			self.broker.http_client.as_ref(),
			self.broker.transport_mapper.as_ref(),
			FlowKind::ChatCompletion,
			request,
		)
		.await?;

		if !response.is_success() {
			if response.status == 401 {
				self.broker.session_cache().invalidate();
			}

			return Err(Error::CompletionRequestFailed {
				status: response.status,
				body: response.body_text(),
				retry_after: response.retry_after,
			});
		}

		let CompletionResponse { model, choices } = response.decode::<CompletionResponse>()?;
		let Some(CompletionChoice { message, finish_reason }) = choices.into_iter().next() else {
			return Err(response.invalid_payload("choices is empty").into());
		};
		let text = message
			.and_then(|message| message.content)
			.ok_or_else(|| response.invalid_payload("choices[0].message.content is missing"))?;

		Ok(ChatReply { text, model, finish_reason })
	}
}
impl<C, M> Clone for ChatClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			broker: self.broker.clone(),
			primary: self.primary.clone(),
			session_id: self.session_id.clone(),
		}
	}
}
impl<C, M> Debug for ChatClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ChatClient")
			.field("broker", &self.broker)
			.field("session_id", &self.session_id)
			.finish()
	}
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns a chat client that derives session tokens from `primary`.
	pub fn chat(&self, primary: PrimaryCredential) -> ChatClient<C, M> {
		let session_id =
			format!("{}{}", Uuid::new_v4(), OffsetDateTime::now_utc().unix_timestamp() * 1_000);

		ChatClient { broker: self.clone(), primary, session_id }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn settings_fill_missing_fields_with_defaults() {
		let settings: ChatSettings =
			serde_json::from_str(r#"{"model":"gpt-4o"}"#).expect("Partial settings should parse.");

		assert_eq!(settings.model, "gpt-4o");
		assert_eq!(settings.temperature, 0.1);
		assert_eq!(settings.top_p, 1.0);
		assert_eq!(settings.system_prompt, DEFAULT_SYSTEM_PROMPT);
	}

	#[test]
	fn request_body_is_single_candidate_and_non_streaming() {
		let settings = ChatSettings::default();
		let body = serde_json::to_value(CompletionRequest {
			messages: [
				ChatMessage { role: "system", content: &settings.system_prompt },
				ChatMessage { role: "user", content: "Accendi la luce." },
			],
			model: &settings.model,
			temperature: settings.temperature,
			top_p: settings.top_p,
			n: 1,
			stream: false,
		})
		.expect("Completion body should serialize.");

		assert_eq!(body["n"], 1);
		assert_eq!(body["stream"], false);
		assert_eq!(body["model"], "gpt-4");
		assert_eq!(body["messages"][0]["role"], "system");
		assert_eq!(body["messages"][1]["content"], "Accendi la luce.");
	}
}
