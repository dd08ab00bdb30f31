//! Storage contracts and built-in backends for the credential pair.
//!
//! Stores are synchronous key-value slots. The session wraps every call and treats
//! failures as "no token", so backends report errors honestly instead of hiding them.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::CredentialKey};

/// Durable key-value backend holding the credential pair.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`.
	fn load(&self, key: CredentialKey) -> Result<Option<String>, StoreError>;

	/// Persists `value` under `key`, replacing any previous value.
	fn save(&self, key: CredentialKey, value: &str) -> Result<(), StoreError>;

	/// Removes the value stored under `key`; removing a missing key succeeds.
	fn remove(&self, key: CredentialKey) -> Result<(), StoreError>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
