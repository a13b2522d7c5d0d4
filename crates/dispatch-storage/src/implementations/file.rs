//! File-based storage backend.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

/// File-based storage implementation.
///
/// Stores each value as a JSON document on the filesystem, providing
/// simple persistence without external dependencies. Individual writes
/// go to a temp file and are renamed into place, so a document is never
/// observed half-written. Batches are staged to temp files first and
/// then renamed in the order given, so the window in which a reader
/// can observe a partially applied batch spans only the renames;
/// callers sequence entries so a torn batch stays consistent.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
}

impl FileStorage {
	/// Creates a new FileStorage instance with the specified base path.
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	/// Converts a storage key to a filesystem-safe file path.
	fn get_file_path(&self, key: &str) -> PathBuf {
		self.base_path.join(format!("{}.json", sanitize(key)))
	}
}

/// Sanitizes a key to be filesystem-safe.
fn sanitize(key: &str) -> String {
	key.replace(['/', ':'], "_")
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);

		match fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		// Create parent directory if it doesn't exist
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		// Write atomically by writing to temp file then renaming
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(())
	}

	async fn set_batch(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), StorageError> {
		// Stage every entry before the first rename; a reader can still
		// catch the gap between renames.
		let mut staged = Vec::with_capacity(entries.len());
		for (key, value) in entries {
			let path = self.get_file_path(&key);

			if let Some(parent) = path.parent() {
				fs::create_dir_all(parent)
					.await
					.map_err(|e| StorageError::Backend(e.to_string()))?;
			}

			let temp_path = path.with_extension("tmp");
			fs::write(&temp_path, value)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;

			staged.push((temp_path, path));
		}

		for (temp_path, path) in staged {
			fs::rename(&temp_path, &path)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		match fs::remove_file(&path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let path = self.get_file_path(key);
		Ok(path.exists())
	}

	async fn list(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StorageError> {
		let safe_prefix = sanitize(prefix);

		let mut dir = match fs::read_dir(&self.base_path).await {
			Ok(dir) => dir,
			// A base directory nothing has been written to yet is empty
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut values = Vec::new();
		while let Some(entry) = dir
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let name = entry.file_name();
			let name = name.to_string_lossy();
			if !name.starts_with(safe_prefix.as_str()) || !name.ends_with(".json") {
				continue;
			}

			let data = fs::read(entry.path())
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
			values.push(data);
		}

		Ok(values)
	}
}
