//! File-backed [`CacheStore`] keeping one JSON document per fingerprint.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
	process,
};
// self
use crate::{
	_prelude::*,
	cache::{CacheEntry, CacheFuture, CacheStore},
	error::CacheError,
};

/// Persists cache entries under a directory, one file per key.
///
/// Writes go to a uniquely named temporary file first and are renamed into
/// place, so concurrent writers on one key leave a winner's intact entry.
#[derive(Clone, Debug)]
pub struct FileCacheStore {
	dir: PathBuf,
}
impl FileCacheStore {
	/// Opens (or creates) a store rooted at `dir`.
	pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
		let dir = dir.into();

		fs::create_dir_all(&dir).map_err(|e| CacheError::Backend {
			message: format!("Failed to create cache directory {}: {e}", dir.display()),
		})?;

		Ok(Self { dir })
	}

	fn entry_path(&self, key: &str) -> PathBuf {
		self.dir.join(format!("{key}.json"))
	}

	fn read_entry(path: &Path) -> Result<Option<CacheEntry>, CacheError> {
		if !path.exists() {
			return Ok(None);
		}

		let bytes = fs::read(path).map_err(|e| CacheError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;
		let entry = serde_json::from_slice(&bytes).map_err(|e| CacheError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})?;

		Ok(Some(entry))
	}

	fn write_entry(&self, path: &Path, entry: &CacheEntry) -> Result<(), CacheError> {
		let serialized = serde_json::to_vec(entry).map_err(|e| CacheError::Serialization {
			message: format!("Failed to serialize cache entry: {e}"),
		})?;
		let tmp_path = self.dir.join(format!(
			".{}.{}.{}.tmp",
			path.file_name().and_then(|name| name.to_str()).unwrap_or("entry"),
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		));

		{
			let mut file = File::create(&tmp_path).map_err(|e| CacheError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| CacheError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| CacheError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, path).map_err(|e| CacheError::Backend {
			message: format!("Failed to replace {}: {e}", path.display()),
		})
	}
}
impl CacheStore for FileCacheStore {
	fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<CacheEntry>> {
		Box::pin(async move { Self::read_entry(&self.entry_path(key)) })
	}

	fn put<'a>(&'a self, key: &'a str, entry: CacheEntry) -> CacheFuture<'a, ()> {
		Box::pin(async move { self.write_entry(&self.entry_path(key), &entry) })
	}

	fn delete<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
		Box::pin(async move {
			let path = self.entry_path(key);

			match fs::remove_file(&path) {
				Ok(()) => Ok(()),
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
				Err(e) => Err(CacheError::Backend {
					message: format!("Failed to remove {}: {e}", path.display()),
				}),
			}
		})
	}

	fn clear(&self) -> CacheFuture<'_, ()> {
		Box::pin(async move {
			let entries = fs::read_dir(&self.dir).map_err(|e| CacheError::Backend {
				message: format!("Failed to list {}: {e}", self.dir.display()),
			})?;

			for entry in entries {
				let entry = entry.map_err(|e| CacheError::Backend {
					message: format!("Failed to list {}: {e}", self.dir.display()),
				})?;
				let path = entry.path();

				if path.extension().is_some_and(|ext| ext == "json") {
					fs::remove_file(&path).map_err(|e| CacheError::Backend {
						message: format!("Failed to remove {}: {e}", path.display()),
					})?;
				}
			}

			Ok(())
		})
	}
}
