//! Best-effort auth-state broadcast between sessions sharing one credential store.
//!
//! A session stands in for one browser tab. Sessions that share a store also share a
//! [`SyncChannel`] so a login, logout, or token replacement in one of them reaches the
//! others without a server round trip. Delivery is fire-and-forget: no acknowledgement,
//! no ordering across senders, and a channel that cannot deliver degrades to a no-op.

// crates.io
use tokio::sync::broadcast::{self, error::RecvError};
// self
use crate::{_prelude::*, auth::TokenSecret};

const DEFAULT_CAPACITY: usize = 64;

/// Random identifier distinguishing sessions on one channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(u64);
impl TabId {
	/// Draws a fresh random identifier.
	pub fn random() -> Self {
		Self(rand::random())
	}
}
impl Display for TabId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{:016x}", self.0)
	}
}

/// Auth-state change announced to other sessions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
	/// A new credential pair was obtained by logging in.
	Login,
	/// The session was torn down.
	Logout,
	/// The stored access token changed (`None` when cleared).
	Access {
		/// New value.
		token: Option<TokenSecret>,
	},
	/// The stored refresh token changed (`None` when cleared).
	Refresh {
		/// New value.
		token: Option<TokenSecret>,
	},
	/// A refresh exchange completed.
	Refreshed,
}
impl SyncEvent {
	/// Stable label for logs.
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::Login => "login",
			Self::Logout => "logout",
			Self::Access { .. } => "access",
			Self::Refresh { .. } => "refresh",
			Self::Refreshed => "refreshed",
		}
	}
}

/// Envelope carried on the channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMessage {
	/// Sender; receivers ignore their own messages.
	pub origin: TabId,
	/// What happened.
	#[serde(flatten)]
	pub event: SyncEvent,
}

/// Capability interface for the cross-session bus.
pub trait SyncChannel
where
	Self: Send + Sync,
{
	/// Logical channel name shared by every participant.
	fn name(&self) -> &str;

	/// Posts `message` to every subscriber. Never fails; undeliverable messages are dropped.
	fn post(&self, message: SyncMessage);

	/// Opens a receiver, or `None` when the channel cannot deliver messages.
	fn subscribe(&self) -> Option<SyncReceiver>;
}

/// Receiving half handed to a session's listener task.
#[derive(Debug)]
pub struct SyncReceiver(broadcast::Receiver<SyncMessage>);
impl SyncReceiver {
	/// Waits for the next message; `None` once every sender is gone.
	///
	/// Messages dropped because this receiver fell behind are skipped silently.
	pub async fn recv(&mut self) -> Option<SyncMessage> {
		loop {
			match self.0.recv().await {
				Ok(message) => return Some(message),
				Err(RecvError::Lagged(_)) => continue,
				Err(RecvError::Closed) => return None,
			}
		}
	}
}

/// In-process broadcast bus; clones share the same channel.
#[derive(Clone, Debug)]
pub struct LocalBroadcast {
	name: Arc<str>,
	sender: broadcast::Sender<SyncMessage>,
}
impl LocalBroadcast {
	/// Opens a channel with the given logical name.
	pub fn new(name: impl Into<Arc<str>>) -> Self {
		Self::with_capacity(name, DEFAULT_CAPACITY)
	}

	/// Opens a channel buffering at most `capacity` undelivered messages per receiver.
	pub fn with_capacity(name: impl Into<Arc<str>>, capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));

		Self { name: name.into(), sender }
	}
}
impl SyncChannel for LocalBroadcast {
	fn name(&self) -> &str {
		&self.name
	}

	fn post(&self, message: SyncMessage) {
		// Err only means nobody is listening right now.
		let _ = self.sender.send(message);
	}

	fn subscribe(&self) -> Option<SyncReceiver> {
		Some(SyncReceiver(self.sender.subscribe()))
	}
}

/// Stand-in used when no broadcast transport is available.
#[derive(Clone, Debug, Default)]
pub struct NoopChannel;
impl SyncChannel for NoopChannel {
	fn name(&self) -> &str {
		""
	}

	fn post(&self, _message: SyncMessage) {}

	fn subscribe(&self) -> Option<SyncReceiver> {
		None
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn clones_share_one_bus() {
		let tab_a = LocalBroadcast::new("auth");
		let tab_b = tab_a.clone();
		let mut inbox = tab_b.subscribe().expect("Local broadcast should subscribe.");
		let origin = TabId::random();

		tab_a.post(SyncMessage { origin, event: SyncEvent::Logout });

		assert_eq!(
			inbox.recv().await,
			Some(SyncMessage { origin, event: SyncEvent::Logout }),
		);
		assert_eq!(tab_b.name(), "auth");
	}

	#[tokio::test]
	async fn lagging_receivers_skip_ahead() {
		let channel = LocalBroadcast::with_capacity("auth", 1);
		let mut inbox = channel.subscribe().expect("Local broadcast should subscribe.");
		let origin = TabId::random();

		channel.post(SyncMessage { origin, event: SyncEvent::Login });
		channel.post(SyncMessage { origin, event: SyncEvent::Refreshed });

		assert_eq!(inbox.recv().await.map(|m| m.event), Some(SyncEvent::Refreshed));
	}

	#[test]
	fn noop_channel_never_delivers() {
		let channel = NoopChannel;

		channel.post(SyncMessage { origin: TabId::random(), event: SyncEvent::Login });

		assert!(channel.subscribe().is_none());
	}

	#[test]
	fn wire_format_is_tagged() {
		let message = SyncMessage {
			origin: TabId(255),
			event: SyncEvent::Access { token: Some(TokenSecret::new("A2")) },
		};
		let json = serde_json::to_value(&message).expect("Sync message should serialize.");

		assert_eq!(json, serde_json::json!({ "origin": 255, "type": "access", "token": "A2" }));

		let back: SyncMessage = serde_json::from_value(json).expect("Sync message should parse.");

		assert_eq!(back, message);
	}
}
