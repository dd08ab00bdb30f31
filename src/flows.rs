//! The session service object and the flows it drives.
//!
//! A [`Session`] owns every singleton the client needs: the in-flight refresh guard,
//! the proactive refresh timer, the trigger debouncer, and the cross-session listener.
//! It is built behind an `Arc` and hands `Weak` references to the tasks it spawns, so
//! dropping the last handle stops all background work. Tests build one per case.

pub mod hooks;
pub mod login;
pub mod proactive;
pub mod refresh;
pub mod request;

mod listener;

pub use hooks::*;
pub use proactive::*;
pub use refresh::*;
pub use request::*;

// std
use std::sync::atomic::AtomicBool;
// self
use crate::{
	_prelude::*,
	auth::{CredentialKey, TokenSecret},
	config::ClientConfig,
	http::{CookieJar, HttpTransport},
	obs,
	schedule::{Debouncer, TaskSlot},
	store::CredentialStore,
	sync::{SyncChannel, SyncEvent, SyncMessage, TabId},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

#[cfg(feature = "reqwest")]
/// Session specialized for the crate's default reqwest transport.
pub type ReqwestSession = Session<ReqwestHttpClient>;

/// Authenticated API client for one logical tab.
pub struct Session<C>
where
	C: ?Sized + HttpTransport,
{
	/// Client configuration.
	pub config: ClientConfig,
	/// Transport used for every outbound request.
	pub http_client: Arc<C>,
	/// Durable credential storage, possibly shared with other sessions.
	pub store: Arc<dyn CredentialStore>,
	/// Cross-session broadcast bus.
	pub channel: Arc<dyn SyncChannel>,
	/// Same-origin cookies, including the anti-forgery token.
	pub cookies: CookieJar,
	/// Counters for refresh exchanges that reached the network.
	pub refresh_metrics: Arc<RefreshMetrics>,
	tab: TabId,
	me: Weak<Self>,
	hooks: RwLock<Hooks>,
	location: RwLock<String>,
	refresh_gate: RefreshGate,
	schedule: RefreshSchedule,
	debouncer: Debouncer,
	force_reschedule: AtomicBool,
	listener: TaskSlot,
}
impl<C> Session<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates a session over a caller-provided transport.
	///
	/// Inside a tokio runtime this also starts the cross-session listener and schedules
	/// a proactive refresh for any access token already in `store`. Outside a runtime
	/// both are skipped and the session still serves requests.
	pub fn with_http_client(
		config: ClientConfig,
		store: Arc<dyn CredentialStore>,
		channel: Arc<dyn SyncChannel>,
		http_client: impl Into<Arc<C>>,
	) -> Arc<Self> {
		let debounce = config.schedule.debounce.unsigned_abs();
		let session = Arc::new_cyclic(|me| Self {
			config,
			http_client: http_client.into(),
			store,
			channel,
			cookies: CookieJar::default(),
			refresh_metrics: Default::default(),
			tab: TabId::random(),
			me: me.clone(),
			hooks: Default::default(),
			location: RwLock::new("/".into()),
			refresh_gate: Default::default(),
			schedule: Default::default(),
			debouncer: Debouncer::new(debounce),
			force_reschedule: AtomicBool::new(false),
			listener: TaskSlot::default(),
		});

		session.spawn_listener();
		session.schedule_refresh();

		session
	}

	/// Identifier this session stamps on broadcast messages.
	pub fn tab_id(&self) -> TabId {
		self.tab
	}

	/// Returns the stored access token; `None` when absent or unreadable.
	pub fn access_token(&self) -> Option<TokenSecret> {
		self.load(CredentialKey::Access)
	}

	/// Returns the stored refresh token; `None` when absent or unreadable.
	pub fn refresh_token(&self) -> Option<TokenSecret> {
		self.load(CredentialKey::Refresh)
	}

	/// Stores (or clears, for `None`/empty) the access token.
	///
	/// Reschedules the proactive refresh and broadcasts the new value.
	pub fn set_access(&self, value: Option<&str>) {
		let token = self.persist(CredentialKey::Access, value);

		self.reschedule();
		self.broadcast(SyncEvent::Access { token });
	}

	/// Stores (or clears, for `None`/empty) the refresh token and broadcasts the new value.
	pub fn set_refresh(&self, value: Option<&str>) {
		let token = self.persist(CredentialKey::Refresh, value);

		self.broadcast(SyncEvent::Refresh { token });
	}

	/// Returns `true` when an access token is stored.
	pub fn is_authenticated(&self) -> bool {
		self.access_token().is_some()
	}

	/// Sets the location used as the `next` target of login redirects.
	pub fn set_location(&self, location: impl Into<String>) {
		*self.location.write() = location.into();
	}

	/// Current return target for login redirects.
	pub fn location(&self) -> String {
		self.location.read().clone()
	}

	#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
	fn load(&self, key: CredentialKey) -> Option<TokenSecret> {
		match self.store.load(key) {
			Ok(value) => value.and_then(TokenSecret::non_empty),
			Err(e) => {
				obs::log_warn!(key = key.as_str(), error = %e, "Credential store read failed.");

				None
			},
		}
	}

	#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
	fn persist(&self, key: CredentialKey, value: Option<&str>) -> Option<TokenSecret> {
		let token = value.and_then(TokenSecret::non_empty);
		let result = match &token {
			Some(token) => self.store.save(key, token.expose()),
			None => self.store.remove(key),
		};

		if let Err(e) = result {
			obs::log_warn!(key = key.as_str(), error = %e, "Credential store write failed.");
		}

		token
	}

	pub(crate) fn broadcast(&self, event: SyncEvent) {
		obs::log_debug!(tab = %self.tab, event = event.as_str(), "Broadcasting auth event.");

		self.channel.post(SyncMessage { origin: self.tab, event });
	}
}
#[cfg(feature = "reqwest")]
impl Session<ReqwestHttpClient> {
	/// Creates a session backed by a default reqwest transport.
	pub fn new(
		config: ClientConfig,
		store: Arc<dyn CredentialStore>,
		channel: Arc<dyn SyncChannel>,
	) -> Arc<Self> {
		Self::with_http_client(config, store, channel, ReqwestHttpClient::default())
	}
}
impl<C> Debug for Session<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("base_url", &self.config.base_url.as_str())
			.field("tab", &self.tab)
			.field("channel", &self.channel.name())
			.field("authenticated", &self.is_authenticated())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::*,
		store::{MemoryStore, StoreError},
		sync::{LocalBroadcast, NoopChannel},
	};

	struct BrokenStore;
	impl CredentialStore for BrokenStore {
		fn load(&self, _: CredentialKey) -> Result<Option<String>, StoreError> {
			Err(StoreError::Backend { message: "storage disabled".into() })
		}

		fn save(&self, _: CredentialKey, _: &str) -> Result<(), StoreError> {
			Err(StoreError::Backend { message: "storage disabled".into() })
		}

		fn remove(&self, _: CredentialKey) -> Result<(), StoreError> {
			Err(StoreError::Backend { message: "storage disabled".into() })
		}
	}

	fn unreachable_transport() -> ScriptedTransport {
		ScriptedTransport::new(|_, _| panic!("No request expected."))
	}

	#[tokio::test]
	async fn setters_round_trip_and_clear() {
		let (session, store, _) = build_test_session(unreachable_transport());

		session.set_access(Some("T"));
		session.set_refresh(Some("R"));

		assert_eq!(session.access_token().map(|t| t.expose().to_owned()), Some("T".into()));
		assert_eq!(session.refresh_token().map(|t| t.expose().to_owned()), Some("R".into()));
		assert!(session.is_authenticated());

		session.set_access(None);
		session.set_refresh(Some(""));

		assert!(session.access_token().is_none());
		assert!(session.refresh_token().is_none());
		assert!(store.snapshot().is_empty());
	}

	#[tokio::test]
	async fn setters_broadcast_changes() {
		let (session, _, channel) = build_test_session(unreachable_transport());
		let mut inbox = channel.subscribe().expect("Local broadcast should subscribe.");

		session.set_access(Some("A2"));
		session.set_refresh(None);

		let first = inbox.recv().await.expect("Access broadcast should arrive.");
		let second = inbox.recv().await.expect("Refresh broadcast should arrive.");

		assert_eq!(first.origin, session.tab_id());
		assert_eq!(first.event, SyncEvent::Access { token: Some(TokenSecret::new("A2")) });
		assert_eq!(second.event, SyncEvent::Refresh { token: None });
	}

	#[test]
	fn storage_failures_read_as_no_token() {
		let session = Session::<ScriptedTransport>::with_http_client(
			test_config(),
			Arc::new(BrokenStore),
			Arc::new(NoopChannel),
			unreachable_transport(),
		);

		session.set_access(Some("T"));

		assert!(session.access_token().is_none());
		assert!(!session.is_authenticated());
	}

	#[test]
	fn construction_outside_runtime_is_inert() {
		let store = MemoryStore::default();

		store
			.save(CredentialKey::Access, &unsigned_jwt(Duration::hours(1)))
			.expect("Memory save should succeed.");

		let session = Session::<ScriptedTransport>::with_http_client(
			test_config(),
			Arc::new(store),
			Arc::new(LocalBroadcast::new("auth")),
			unreachable_transport(),
		);

		assert!(session.is_authenticated());
		assert!(!session.is_refresh_scheduled());
		assert!(format!("{session:?}").contains("authenticated: true"));
	}
}
