//! Storage layer for the dispatch system.
//!
//! This crate provides persistent storage for bookings, providers, and
//! audit history. The low-level `StorageInterface` is a key-value store
//! over raw bytes; the `StorageService` layers typed JSON documents on
//! top of it under `namespace:id` keys. Writes that must land together,
//! such as a status change and its history entry, go through a
//! `WriteBatch` so readers never observe one without the other.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Requested key does not exist.
	#[error("Not found")]
	NotFound,
	/// Serialization/deserialization failure.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Failure in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
}

/// Low-level interface implemented by storage backends.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes under the given key.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Stores several key/value pairs as one commit.
	///
	/// Backends that cannot commit atomically must apply the entries in
	/// the order given, so callers can sequence them to stay consistent
	/// under a torn write.
	async fn set_batch(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks whether a key exists.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Returns the values of every key starting with `prefix`.
	async fn list(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StorageError>;
}

/// A multi-key write applied as one commit by `StorageService::commit`.
///
/// Entries are applied in insertion order.
#[derive(Default)]
pub struct WriteBatch {
	entries: Vec<(String, Vec<u8>)>,
}

impl WriteBatch {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a serialized value to the batch under `namespace:id`.
	pub fn put<T: Serialize>(
		mut self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<Self, StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.entries.push((format!("{}:{}", namespace, id), bytes));
		Ok(self)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// High-level storage service providing typed operations.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new storage service with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a serializable value under `namespace:id` as JSON.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = format!("{}:{}", namespace, id);
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key, bytes).await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let key = format!("{}:{}", namespace, id);
		let bytes = self.backend.get_bytes(&key).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Retrieves every value stored in a namespace. Order is unspecified.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: &str,
	) -> Result<Vec<T>, StorageError> {
		let prefix = format!("{}:", namespace);
		let raw = self.backend.list(&prefix).await?;
		raw.into_iter()
			.map(|bytes| {
				serde_json::from_slice(&bytes)
					.map_err(|e| StorageError::Serialization(e.to_string()))
			})
			.collect()
	}

	/// Commits a write batch.
	pub async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
		self.backend.set_batch(batch.entries).await
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		let key = format!("{}:{}", namespace, id);
		self.backend.delete(&key).await
	}

	/// Checks whether a value exists.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		let key = format!("{}:{}", namespace, id);
		self.backend.exists(&key).await
	}
}
