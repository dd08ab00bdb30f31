//! File-backed [`CredentialStore`] that survives restarts and is shared across processes.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::CredentialKey,
	store::{CredentialStore, StoreError},
};

type Slots = HashMap<CredentialKey, String>;

/// Persists the credential pair to a JSON file after each mutation.
///
/// Reads always go to disk so separate processes sharing the file observe each other's
/// writes, the same way browser tabs share one profile's storage.
#[derive(Debug)]
pub struct FileStore {
	path: PathBuf,
	write_lock: Mutex<()>,
}
impl FileStore {
	/// Opens (or prepares) a store at the provided path.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;
		// Surface a corrupt snapshot at open time rather than on the first read.
		Self::load_snapshot(&path)?;

		Ok(Self { path, write_lock: Mutex::new(()) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<Slots, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(HashMap::new());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn mutate(&self, apply: impl FnOnce(&mut Slots)) -> Result<(), StoreError> {
		let _guard = self.write_lock.lock();
		let mut slots = Self::load_snapshot(&self.path)?;

		apply(&mut slots);
		self.persist(&slots)
	}

	fn persist(&self, slots: &Slots) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized = serde_json::to_vec_pretty(slots).map_err(|e| {
			StoreError::Serialization { message: format!("Failed to serialize credentials: {e}") }
		})?;
		let tmp_path = Self::tmp_path_for(&self.path);

		Self::write_synced(&tmp_path, &serialized)
			.and_then(|()| {
				fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
					message: format!("Failed to replace {}: {e}", self.path.display()),
				})
			})
			.inspect_err(|_| {
				let _ = fs::remove_file(&tmp_path);
			})
	}

	fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
		let mut file = File::create_new(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to create {}: {e}", path.display()),
		})?;

		file.write_all(bytes).map_err(|e| StoreError::Backend {
			message: format!("Failed to write {}: {e}", path.display()),
		})?;
		file.sync_all().map_err(|e| StoreError::Backend {
			message: format!("Failed to sync {}: {e}", path.display()),
		})
	}

	/// Per-write sibling of `path`, so concurrent writers never share a temporary file.
	fn tmp_path_for(path: &Path) -> PathBuf {
		let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();

		path.with_file_name(format!(".{name}.{:016x}.tmp", rand::random::<u64>()))
	}
}
impl CredentialStore for FileStore {
	fn load(&self, key: CredentialKey) -> Result<Option<String>, StoreError> {
		Ok(Self::load_snapshot(&self.path)?.remove(&key))
	}

	fn save(&self, key: CredentialKey, value: &str) -> Result<(), StoreError> {
		self.mutate(|slots| {
			slots.insert(key, value.to_owned());
		})
	}

	fn remove(&self, key: CredentialKey) -> Result<(), StoreError> {
		self.mutate(|slots| {
			slots.remove(&key);
		})
	}
}
