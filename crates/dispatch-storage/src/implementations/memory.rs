//! In-memory storage backend.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory storage implementation.
///
/// Backs tests and single-process development deployments. All keys
/// live in one map behind an async `RwLock`; `set_batch` applies every
/// entry under a single write guard, so readers observe either none or
/// all of a batch.
#[derive(Default)]
pub struct MemoryStorage {
	data: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
	/// Creates a new in-memory storage instance.
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.data
			.read()
			.await
			.get(key)
			.cloned()
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.data.write().await.insert(key.to_string(), value);
		Ok(())
	}

	async fn set_batch(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), StorageError> {
		let mut data = self.data.write().await;
		for (key, value) in entries {
			data.insert(key, value);
		}
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.data.write().await.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.data.read().await.contains_key(key))
	}

	async fn list(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StorageError> {
		Ok(self
			.data
			.read()
			.await
			.iter()
			.filter(|(key, _)| key.starts_with(prefix))
			.map(|(_, value)| value.clone())
			.collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_set_and_get() {
		let storage = MemoryStorage::new();
		storage.set_bytes("a:1", b"one".to_vec()).await.unwrap();

		let value = storage.get_bytes("a:1").await.unwrap();
		assert_eq!(value, b"one");
	}

	#[tokio::test]
	async fn test_get_missing_key() {
		let storage = MemoryStorage::new();
		assert!(matches!(
			storage.get_bytes("absent").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_batch_is_visible_as_a_whole() {
		let storage = MemoryStorage::new();
		storage
			.set_batch(vec![
				("a:1".to_string(), b"one".to_vec()),
				("a:2".to_string(), b"two".to_vec()),
			])
			.await
			.unwrap();

		assert_eq!(storage.get_bytes("a:1").await.unwrap(), b"one");
		assert_eq!(storage.get_bytes("a:2").await.unwrap(), b"two");
	}

	#[tokio::test]
	async fn test_list_filters_by_prefix() {
		let storage = MemoryStorage::new();
		storage.set_bytes("a:1", b"one".to_vec()).await.unwrap();
		storage.set_bytes("a:2", b"two".to_vec()).await.unwrap();
		storage.set_bytes("b:1", b"other".to_vec()).await.unwrap();

		let values = storage.list("a:").await.unwrap();
		assert_eq!(values.len(), 2);
	}

	#[tokio::test]
	async fn test_delete_is_idempotent() {
		let storage = MemoryStorage::new();
		storage.set_bytes("a:1", b"one".to_vec()).await.unwrap();

		storage.delete("a:1").await.unwrap();
		storage.delete("a:1").await.unwrap();
		assert!(!storage.exists("a:1").await.unwrap());
	}
}
