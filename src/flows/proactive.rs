//! Proactive refresh ahead of access-token expiry.
//!
//! At most one timer is pending per session. It is armed from the unverified `exp` claim
//! of the stored access token, fires [`Session::refresh_once`], and is re-armed whenever a
//! new access token lands. Wake-up signals from the embedding application (visibility,
//! focus, storage changes) are coalesced by a debouncer before they touch the timer.

// std
use std::sync::atomic::{AtomicBool, Ordering};
// crates.io
use tokio::runtime::Handle;
// self
use crate::{
	_prelude::*,
	auth::{CredentialKey, decode_payload},
	config::RefreshPlan,
	flows::Session,
	http::HttpTransport,
	obs,
	schedule::TaskSlot,
};

#[derive(Debug, Default)]
pub(crate) struct RefreshSchedule {
	slot: TaskSlot,
	scheduled: AtomicBool,
	plan: Mutex<Option<RefreshPlan>>,
}
impl RefreshSchedule {
	fn reset(&self) {
		self.scheduled.store(false, Ordering::SeqCst);
		*self.plan.lock() = None;
	}
}

/// Environment signal that may warrant re-checking the refresh timer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trigger {
	/// The application became visible again.
	Visible,
	/// The application was hidden; ignored.
	Hidden,
	/// The application regained focus.
	Focus,
	/// Another process wrote to the shared credential storage under `key`.
	///
	/// Keys other than the credential slots are ignored.
	StorageChanged {
		/// Storage key that changed.
		key: String,
	},
}

impl<C> Session<C>
where
	C: ?Sized + HttpTransport,
{
	/// Milliseconds until the stored access token expires; negative once expired.
	///
	/// `None` when no token is stored or it carries no usable `exp` claim.
	pub fn ms_until_expiry(&self) -> Option<i64> {
		let token = self.access_token()?;

		decode_payload(token.expose())?.ms_until_expiry(OffsetDateTime::now_utc())
	}

	/// Arms the proactive refresh timer unless one is already pending.
	///
	/// A token already inside the lead window is refreshed right away instead.
	pub fn schedule_refresh(&self) {
		if self.schedule.scheduled.load(Ordering::SeqCst) {
			return;
		}

		self.schedule.slot.cancel();

		let Some(ms) = self.ms_until_expiry() else {
			return;
		};

		match self.config.schedule.plan(Duration::milliseconds(ms)) {
			RefreshPlan::Immediate => {
				obs::log_debug!(tab = %self.tab, ms, "Access token expires within the lead window; refreshing now.");
				self.refresh_in_background();
			},
			plan @ RefreshPlan::After(delay) => {
				if self.schedule.scheduled.swap(true, Ordering::SeqCst) {
					return;
				}

				*self.schedule.plan.lock() = Some(plan);

				let me = self.me.clone();
				let armed = self.schedule.slot.arm(move |id| async move {
					tokio::time::sleep(delay).await;

					let Some(session) = me.upgrade() else {
						return;
					};

					session.schedule.slot.release(id);
					session.schedule.reset();
					session.refresh_once().await;
				});

				if armed {
					obs::log_debug!(tab = %self.tab, delay_ms = delay.as_millis() as u64, "Proactive refresh armed.");
				} else {
					self.schedule.reset();
				}
			},
		}
	}

	/// Cancels the pending timer, if any, and clears the scheduled flag.
	pub fn clear_schedule(&self) {
		self.schedule.slot.cancel();
		self.schedule.reset();
	}

	/// Replaces the pending timer with one computed from the current access token.
	pub fn reschedule(&self) {
		self.clear_schedule();
		self.schedule_refresh();
	}

	/// Returns `true` while a proactive refresh timer is pending.
	pub fn is_refresh_scheduled(&self) -> bool {
		self.schedule.scheduled.load(Ordering::SeqCst)
	}

	/// Plan of the pending timer, if any.
	pub fn scheduled_plan(&self) -> Option<RefreshPlan> {
		*self.schedule.plan.lock()
	}

	/// Feeds an environment signal into the debounced scheduler.
	pub fn notify(&self, trigger: Trigger) {
		let force = match &trigger {
			Trigger::Hidden => return,
			Trigger::Visible | Trigger::Focus => false,
			Trigger::StorageChanged { key } => {
				if key.parse::<CredentialKey>().is_err() {
					return;
				}

				true
			},
		};

		obs::log_debug!(tab = %self.tab, trigger = ?trigger, "Scheduler trigger received.");
		self.debounce_schedule(force);
	}

	/// Queues a debounced schedule check; `force` upgrades the whole burst to a reschedule.
	pub(crate) fn debounce_schedule(&self, force: bool) {
		if force {
			self.force_reschedule.store(true, Ordering::SeqCst);
		}

		let me = self.me.clone();
		let queued = self.debouncer.trigger(move || {
			if let Some(session) = me.upgrade() {
				session.apply_pending_schedule();
			}
		});

		if !queued {
			self.apply_pending_schedule();
		}
	}

	fn apply_pending_schedule(&self) {
		if self.force_reschedule.swap(false, Ordering::SeqCst) {
			self.reschedule();
		} else {
			self.schedule_refresh();
		}
	}

	fn refresh_in_background(&self) {
		let Ok(runtime) = Handle::try_current() else {
			return;
		};
		let me = self.me.clone();

		runtime.spawn(async move {
			if let Some(session) = me.upgrade() {
				session.refresh_once().await;
			}
		});
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::time::Duration as StdDuration;
	// self
	use super::*;
	use crate::{_preludet::*, store::CredentialStore};

	fn idle_transport() -> ScriptedTransport {
		ScriptedTransport::new(|_, _| Ok(json_response(500, serde_json::json!({}))))
	}

	#[tokio::test(start_paused = true)]
	async fn schedule_is_idempotent() {
		let transport = idle_transport();
		let (session, store, _) = build_test_session(transport.clone());

		store
			.save(CredentialKey::Access, &unsigned_jwt(Duration::minutes(10)))
			.expect("Memory save should succeed.");

		session.schedule_refresh();

		let first = session.scheduled_plan();

		session.schedule_refresh();
		session.schedule_refresh();

		assert!(session.is_refresh_scheduled());
		assert_eq!(session.scheduled_plan(), first);
		assert!(matches!(first, Some(RefreshPlan::After(d)) if d > StdDuration::from_secs(8 * 60)));
		assert!(transport.requests().is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn timer_fires_refresh_and_rearms() {
		let next = unsigned_jwt(Duration::hours(2));
		let reply = next.clone();
		let transport = ScriptedTransport::new(move |_, _| {
			Ok(json_response(200, serde_json::json!({ "access": reply })))
		});
		let (session, _, _) = build_test_session(transport.clone());

		session.set_refresh(Some("R1"));
		session.set_access(Some(unsigned_jwt(Duration::minutes(2)).as_str()));

		assert!(matches!(
			session.scheduled_plan(),
			Some(RefreshPlan::After(d)) if d <= StdDuration::from_secs(60)
		));

		tokio::time::sleep(StdDuration::from_secs(61)).await;

		assert_eq!(transport.requests_to("/auth/token/refresh/").len(), 1);
		assert_eq!(session.access_token().as_ref().map(|t| t.expose()), Some(next.as_str()));
		assert_eq!(
			session.scheduled_plan(),
			Some(RefreshPlan::After(StdDuration::from_secs(30 * 60))),
		);
	}

	#[tokio::test(start_paused = true)]
	async fn token_inside_lead_window_refreshes_immediately() {
		let transport = ScriptedTransport::new(|_, _| {
			Ok(json_response(200, serde_json::json!({ "access": "A2" })))
		});
		let (session, _, _) = build_test_session(transport.clone());

		session.set_refresh(Some("R1"));
		session.set_access(Some(unsigned_jwt(Duration::seconds(30)).as_str()));

		assert!(!session.is_refresh_scheduled());

		tokio::time::sleep(StdDuration::from_millis(10)).await;

		assert_eq!(transport.requests_to("/auth/token/refresh/").len(), 1);
		assert_eq!(session.access_token().as_ref().map(|t| t.expose()), Some("A2"));
	}

	#[tokio::test(start_paused = true)]
	async fn tokens_without_expiry_are_not_scheduled() {
		let (session, _, _) = build_test_session(idle_transport());

		session.set_access(Some("opaque-token"));

		assert_eq!(session.ms_until_expiry(), None);
		assert!(!session.is_refresh_scheduled());
	}

	#[tokio::test(start_paused = true)]
	async fn clear_schedule_cancels_pending_timer() {
		let transport = idle_transport();
		let (session, _, _) = build_test_session(transport.clone());

		session.set_refresh(Some("R1"));
		session.set_access(Some(unsigned_jwt(Duration::minutes(5)).as_str()));
		session.clear_schedule();

		assert!(!session.is_refresh_scheduled());

		tokio::time::sleep(StdDuration::from_secs(10 * 60)).await;

		assert!(transport.requests().is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn triggers_are_debounced_and_filtered() {
		let (session, store, _) = build_test_session(idle_transport());

		store
			.save(CredentialKey::Access, &unsigned_jwt(Duration::minutes(10)))
			.expect("Memory save should succeed.");

		session.notify(Trigger::Hidden);
		session.notify(Trigger::StorageChanged { key: "theme".into() });
		tokio::time::sleep(StdDuration::from_millis(400)).await;

		assert!(!session.is_refresh_scheduled());

		session.notify(Trigger::Visible);
		session.notify(Trigger::Focus);
		tokio::time::sleep(StdDuration::from_millis(200)).await;

		assert!(!session.is_refresh_scheduled());

		tokio::time::sleep(StdDuration::from_millis(200)).await;

		assert!(session.is_refresh_scheduled());
	}

	#[tokio::test(start_paused = true)]
	async fn storage_change_forces_reschedule() {
		let (session, store, _) = build_test_session(idle_transport());

		session.set_access(Some(unsigned_jwt(Duration::minutes(10)).as_str()));

		let before = session.scheduled_plan();

		store
			.save(CredentialKey::Access, &unsigned_jwt(Duration::hours(3)))
			.expect("Memory save should succeed.");
		session.notify(Trigger::StorageChanged { key: "access".into() });
		tokio::time::sleep(StdDuration::from_millis(400)).await;

		assert_ne!(session.scheduled_plan(), before);
		assert_eq!(
			session.scheduled_plan(),
			Some(RefreshPlan::After(StdDuration::from_secs(30 * 60))),
		);
	}
}
