//! Cancellable task primitives with a single authoritative handle.
//!
//! [`TaskSlot`] owns at most one spawned task; arming it again aborts the previous task
//! first. The proactive refresh timer and the trigger [`Debouncer`] are both built on it,
//! which keeps "at most one pending" true on any tokio runtime flavor.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use tokio::{runtime::Handle, task::JoinHandle};
// self
use crate::_prelude::*;

/// Identifier handed to a task armed in a [`TaskSlot`].
pub type TaskId = u64;

/// Holder for at most one spawned task.
#[derive(Debug, Default)]
pub struct TaskSlot {
	current: Mutex<Option<(TaskId, JoinHandle<()>)>>,
	next_id: AtomicU64,
}
impl TaskSlot {
	/// Aborts any armed task and spawns the future built by `make`.
	///
	/// Returns `false` without spawning when called outside a tokio runtime.
	pub fn arm<F>(&self, make: impl FnOnce(TaskId) -> F) -> bool
	where
		F: 'static + Send + Future<Output = ()>,
	{
		let Ok(runtime) = Handle::try_current() else {
			return false;
		};
		let mut current = self.current.lock();

		if let Some((_, handle)) = current.take() {
			handle.abort();
		}

		let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;

		// Spawned while the lock is held so the task can never observe a stale id.
		*current = Some((id, runtime.spawn(make(id))));

		true
	}

	/// Aborts the armed task, if any. Returns `true` when something was armed.
	pub fn cancel(&self) -> bool {
		match self.current.lock().take() {
			Some((_, handle)) => {
				let pending = !handle.is_finished();

				handle.abort();

				pending
			},
			None => false,
		}
	}

	/// Detaches the task `id` from the slot without aborting it.
	///
	/// A firing task calls this first so that work it triggers may re-arm the slot
	/// without cancelling the task itself.
	pub fn release(&self, id: TaskId) -> bool {
		let mut current = self.current.lock();

		if current.as_ref().is_some_and(|(armed, _)| *armed == id) {
			*current = None;

			true
		} else {
			false
		}
	}

	/// Returns `true` while an armed task has not finished.
	pub fn is_armed(&self) -> bool {
		self.current.lock().as_ref().is_some_and(|(_, handle)| !handle.is_finished())
	}
}
impl Drop for TaskSlot {
	fn drop(&mut self) {
		if let Some((_, handle)) = self.current.get_mut().take() {
			handle.abort();
		}
	}
}

/// Collapses bursts of triggers into one action run after a quiet window.
#[derive(Debug)]
pub struct Debouncer {
	window: std::time::Duration,
	slot: TaskSlot,
}
impl Debouncer {
	/// Creates a debouncer with the given quiet window.
	pub fn new(window: std::time::Duration) -> Self {
		Self { window, slot: TaskSlot::default() }
	}

	/// Restarts the window; `action` runs once it elapses without another trigger.
	pub fn trigger(&self, action: impl 'static + Send + FnOnce()) -> bool {
		let window = self.window;

		self.slot.arm(move |_| async move {
			tokio::time::sleep(window).await;
			action();
		})
	}

	/// Drops a pending action.
	pub fn cancel(&self) -> bool {
		self.slot.cancel()
	}

	/// Returns `true` while an action is waiting for its window to elapse.
	pub fn is_pending(&self) -> bool {
		self.slot.is_armed()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{sync::atomic::AtomicUsize, time::Duration as StdDuration};
	// self
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn arming_again_aborts_previous_task() {
		let slot = TaskSlot::default();
		let fired = Arc::new(AtomicUsize::new(0));

		for _ in 0..3 {
			let fired = fired.clone();

			assert!(slot.arm(move |_| async move {
				tokio::time::sleep(StdDuration::from_secs(10)).await;
				fired.fetch_add(1, Ordering::SeqCst);
			}));
		}

		assert!(slot.is_armed());

		tokio::time::sleep(StdDuration::from_secs(11)).await;

		assert_eq!(fired.load(Ordering::SeqCst), 1);
		assert!(!slot.is_armed());
	}

	#[tokio::test(start_paused = true)]
	async fn release_only_matches_current_task() {
		let slot = TaskSlot::default();
		let mut first = 0;

		slot.arm(|id| {
			first = id;

			std::future::pending()
		});
		slot.arm(|_| std::future::pending());

		assert!(!slot.release(first));
		assert!(slot.cancel());
		assert!(!slot.cancel());
	}

	#[test]
	fn arming_outside_runtime_is_a_no_op() {
		let slot = TaskSlot::default();

		assert!(!slot.arm(|_| async {}));
		assert!(!slot.is_armed());
	}

	#[tokio::test(start_paused = true)]
	async fn debouncer_collapses_bursts() {
		let debouncer = Debouncer::new(StdDuration::from_millis(300));
		let fired = Arc::new(AtomicUsize::new(0));

		for _ in 0..5 {
			let fired = fired.clone();

			debouncer.trigger(move || {
				fired.fetch_add(1, Ordering::SeqCst);
			});
			tokio::time::sleep(StdDuration::from_millis(100)).await;
		}

		assert!(debouncer.is_pending());

		tokio::time::sleep(StdDuration::from_millis(300)).await;

		assert_eq!(fired.load(Ordering::SeqCst), 1);
	}
}
