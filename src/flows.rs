//! High-level flow orchestrators powered by the broker facade.

pub mod chat;
pub mod common;
pub mod device_authorization;
pub mod device_poll;
pub mod session_token;

pub use chat::*;
pub use common::*;
pub use device_poll::*;
pub use session_token::*;

// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	error::ConfigError,
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	provider::ProviderDescriptor,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

/// Scope requested when the caller does not override it.
pub const DEFAULT_SCOPE: &str = "read:user";

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport stack.
pub type ReqwestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Coordinates the device flow, the session token cache, and chat completions against a single
/// provider descriptor.
///
/// The broker owns the HTTP client, the descriptor, the sleeper used for device-flow pacing, and
/// the session token cache. Clones share the transport and the cache, so a broker can be handed to
/// every task that needs a completion without multiplying token exchanges.
pub struct Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound provider request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Provider descriptor that defines endpoints and quirks.
	pub descriptor: ProviderDescriptor,
	/// OAuth 2.0 client identifier sent with device-flow requests.
	pub client_id: String,
	/// Scope requested during device authorization.
	pub scope: ScopeSet,
	/// Model + prompt settings used by chat completions.
	pub chat_settings: ChatSettings,
	sleeper: Option<Arc<dyn Sleeper>>,
	session_cache: Arc<SessionTokenCache>,
}
impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a broker that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		descriptor: ProviderDescriptor,
		client_id: impl Into<String>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			descriptor,
			client_id: client_id.into(),
			scope: ScopeSet::from_str(DEFAULT_SCOPE).unwrap_or_default(),
			chat_settings: ChatSettings::default(),
			sleeper: common::default_sleeper(),
			session_cache: Default::default(),
		}
	}

	/// Overrides the scope requested during device authorization.
	pub fn with_scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Replaces the sleeper used between device-flow polls.
	pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
		self.sleeper = Some(sleeper);

		self
	}

	/// Replaces the session token cache with an empty one using `margin` (negative clamps to 0).
	pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
		self.session_cache = Arc::new(SessionTokenCache::new(margin));

		self
	}

	/// Overrides the chat completion settings.
	pub fn with_chat_settings(mut self, settings: ChatSettings) -> Self {
		self.chat_settings = settings;

		self
	}

	/// Session token cache shared by every clone of this broker.
	pub fn session_cache(&self) -> &SessionTokenCache {
		&self.session_cache
	}

	pub(crate) fn sleeper(&self) -> Result<&dyn Sleeper> {
		self.sleeper.as_deref().ok_or_else(|| ConfigError::MissingSleeper.into())
	}
}
#[cfg(feature = "reqwest")]
impl Broker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a new broker for the provided descriptor and client identifier.
	///
	/// The broker provisions its own reqwest-backed transport so callers do not need to pass HTTP
	/// handles explicitly. Use [`Broker::with_http_client`] to share a tuned client (timeouts,
	/// proxies) with the rest of the host.
	pub fn new(descriptor: ProviderDescriptor, client_id: impl Into<String>) -> Self {
		Self::with_http_client(
			descriptor,
			client_id,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}
}
impl<C, M> Clone for Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			descriptor: self.descriptor.clone(),
			client_id: self.client_id.clone(),
			scope: self.scope.clone(),
			chat_settings: self.chat_settings.clone(),
			sleeper: self.sleeper.clone(),
			session_cache: self.session_cache.clone(),
		}
	}
}
impl<C, M> Debug for Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("scope", &self.scope)
			.field("sleeper_set", &self.sleeper.is_some())
			.finish()
	}
}
