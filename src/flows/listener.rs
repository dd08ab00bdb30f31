//! Cross-session listener reacting to auth events from other sessions.

// self
use crate::{
	flows::Session,
	http::HttpTransport,
	obs,
	sync::{SyncEvent, SyncMessage},
};

impl<C> Session<C>
where
	C: ?Sized + HttpTransport,
{
	pub(crate) fn spawn_listener(&self) {
		let Some(mut inbox) = self.channel.subscribe() else {
			obs::log_debug!(channel = self.channel.name(), "Sync channel cannot deliver; listener disabled.");

			return;
		};
		let me = self.me.clone();

		self.listener.arm(move |_| async move {
			while let Some(message) = inbox.recv().await {
				let Some(session) = me.upgrade() else {
					break;
				};

				session.handle_sync(message);
			}
		});
	}

	/// Applies an auth event posted by another session; this session's own messages are ignored.
	///
	/// A logout cancels the local refresh timer, a new access token reschedules it after
	/// the trigger debounce. Other events only matter through the shared store.
	#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
	pub fn handle_sync(&self, message: SyncMessage) {
		if message.origin == self.tab {
			return;
		}

		match message.event {
			SyncEvent::Logout => {
				obs::log_debug!(tab = %self.tab, from = %message.origin, "Peer logged out.");
				self.clear_schedule();
			},
			SyncEvent::Access { .. } => self.debounce_schedule(true),
			event => {
				obs::log_debug!(tab = %self.tab, from = %message.origin, event = event.as_str(), "Peer auth event.");
			},
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::time::Duration as StdDuration;
	// self
	use super::*;
	use crate::_preludet::*;

	#[tokio::test(start_paused = true)]
	async fn peer_access_reschedules_without_network() {
		let transport_a = ScriptedTransport::new(|_, _| panic!("Tab A should stay offline."));
		let transport_b = ScriptedTransport::new(|_, _| panic!("Tab B should stay offline."));
		let (tab_a, store, channel) = build_test_session(transport_a);
		let tab_b = build_tab(transport_b.clone(), &store, &channel);

		assert!(!tab_b.is_refresh_scheduled());

		tab_a.set_access(Some(unsigned_jwt(Duration::minutes(20)).as_str()));
		tokio::time::sleep(StdDuration::from_millis(400)).await;

		assert!(tab_b.is_refresh_scheduled());
		assert!(transport_b.requests().is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn peer_logout_clears_schedule() {
		let idle = || ScriptedTransport::new(|_, _| panic!("No request expected."));
		let (tab_a, store, channel) = build_test_session(idle());

		tab_a.set_access(Some(unsigned_jwt(Duration::minutes(20)).as_str()));

		let tab_b = build_tab(idle(), &store, &channel);

		assert!(tab_b.is_refresh_scheduled());

		tab_a.logout();
		tokio::time::sleep(StdDuration::from_millis(10)).await;

		assert!(!tab_b.is_refresh_scheduled());
		assert!(!tab_b.is_authenticated());
	}

	#[tokio::test]
	async fn own_messages_are_ignored() {
		let (session, _, _) =
			build_test_session(ScriptedTransport::new(|_, _| panic!("No request expected.")));

		session.set_access(Some(unsigned_jwt(Duration::minutes(20)).as_str()));
		session.handle_sync(SyncMessage { origin: session.tab_id(), event: SyncEvent::Logout });

		assert!(session.is_refresh_scheduled());
	}

	#[tokio::test]
	async fn noop_channel_disables_listener() {
		let session = Session::<ScriptedTransport>::with_http_client(
			test_config(),
			Arc::new(crate::store::MemoryStore::default()),
			Arc::new(crate::sync::NoopChannel),
			ScriptedTransport::new(|_, _| panic!("No request expected.")),
		);

		session.set_access(Some("A1"));

		assert!(!session.listener.is_armed());
		assert!(session.is_authenticated());
	}
}
