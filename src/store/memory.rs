//! Thread-safe in-memory [`CredentialStore`] shared by sessions through `Arc`.

// self
use crate::{
	_prelude::*,
	auth::CredentialKey,
	store::{CredentialStore, StoreError},
};

/// In-process backend; clones share the same slots.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<HashMap<CredentialKey, String>>>);
impl MemoryStore {
	/// Returns a snapshot of every stored slot.
	pub fn snapshot(&self) -> HashMap<CredentialKey, String> {
		self.0.read().clone()
	}
}
impl CredentialStore for MemoryStore {
	fn load(&self, key: CredentialKey) -> Result<Option<String>, StoreError> {
		Ok(self.0.read().get(&key).cloned())
	}

	fn save(&self, key: CredentialKey, value: &str) -> Result<(), StoreError> {
		self.0.write().insert(key, value.to_owned());

		Ok(())
	}

	fn remove(&self, key: CredentialKey) -> Result<(), StoreError> {
		self.0.write().remove(&key);

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn clones_share_slots() {
		let store = MemoryStore::default();
		let other_tab = store.clone();

		store.save(CredentialKey::Access, "A1").expect("Memory save should succeed.");

		assert_eq!(
			other_tab.load(CredentialKey::Access).expect("Memory load should succeed."),
			Some("A1".into()),
		);

		other_tab.remove(CredentialKey::Access).expect("Memory remove should succeed.");

		assert!(store.snapshot().is_empty());
	}
}
