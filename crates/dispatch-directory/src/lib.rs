//! Provider directory for the dispatch system.
//!
//! A read-mostly registry of service providers: who they are, which
//! service types they take, whether they are currently accepting work,
//! and their rating. Assignment eligibility is gated solely on the
//! availability flag; the rating only orders candidates.

use chrono::Utc;
use dispatch_storage::{StorageError, StorageService};
use dispatch_types::{NewProvider, Provider, ProviderId};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

/// Storage namespace for provider records.
const PROVIDERS_NAMESPACE: &str = "providers";

/// Errors that can occur during directory operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
	/// Provider id is unknown.
	#[error("Provider not found")]
	NotFound,
	/// A provider with this email is already registered.
	#[error("Provider email already registered: {0}")]
	DuplicateEmail(String),
	/// Underlying storage failure.
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

/// Directory of service providers backed by storage.
pub struct ProviderDirectory {
	storage: Arc<StorageService>,
	/// Serializes registrations so the duplicate-email check cannot race.
	registration: Mutex<()>,
}

impl ProviderDirectory {
	/// Creates a new directory over the given storage service.
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			registration: Mutex::new(()),
		}
	}

	/// Registers a new provider, rejecting duplicate emails.
	///
	/// New providers start available.
	pub async fn register(&self, new: NewProvider) -> Result<Provider, DirectoryError> {
		let _guard = self.registration.lock().await;

		let existing = self.all().await?;
		if existing
			.iter()
			.any(|p| p.email.eq_ignore_ascii_case(&new.email))
		{
			return Err(DirectoryError::DuplicateEmail(new.email));
		}

		let provider = Provider {
			id: ProviderId::new(),
			name: new.name,
			email: new.email,
			phone: new.phone,
			capabilities: new.capabilities,
			available: true,
			rating: new.rating,
			created_at: Utc::now(),
		};

		self.storage
			.store(PROVIDERS_NAMESPACE, &provider.id.to_string(), &provider)
			.await?;

		info!("Registered provider {} ({})", provider.name, provider.id);
		Ok(provider)
	}

	/// Looks up a single provider.
	pub async fn provider(&self, id: ProviderId) -> Result<Provider, DirectoryError> {
		self.storage
			.retrieve(PROVIDERS_NAMESPACE, &id.to_string())
			.await
			.map_err(|e| match e {
				StorageError::NotFound => DirectoryError::NotFound,
				other => DirectoryError::Storage(other),
			})
	}

	/// Returns every registered provider, best-rated first.
	pub async fn providers(&self) -> Result<Vec<Provider>, DirectoryError> {
		let mut providers = self.all().await?;
		sort_ranked(&mut providers);
		Ok(providers)
	}

	/// Returns the providers eligible for the given service type.
	///
	/// Eligible means available and offering the service. Ordered by
	/// rating descending with provider id as the deterministic
	/// tie-break, so the first entry is the auto-assignment candidate.
	pub async fn available_for(&self, service_type: &str) -> Result<Vec<Provider>, DirectoryError> {
		let mut providers: Vec<Provider> = self
			.all()
			.await?
			.into_iter()
			.filter(|p| p.available && p.offers(service_type))
			.collect();
		sort_ranked(&mut providers);
		Ok(providers)
	}

	/// Sets a provider's availability flag.
	pub async fn set_availability(
		&self,
		id: ProviderId,
		available: bool,
	) -> Result<Provider, DirectoryError> {
		let mut provider = self.provider(id).await?;
		provider.available = available;

		self.storage
			.store(PROVIDERS_NAMESPACE, &id.to_string(), &provider)
			.await?;

		info!("Provider {} availability set to {}", id, available);
		Ok(provider)
	}

	/// Number of registered providers.
	pub async fn count(&self) -> Result<usize, DirectoryError> {
		Ok(self.all().await?.len())
	}

	async fn all(&self) -> Result<Vec<Provider>, DirectoryError> {
		Ok(self.storage.retrieve_all(PROVIDERS_NAMESPACE).await?)
	}
}

fn sort_ranked(providers: &mut [Provider]) {
	providers.sort_by(|a, b| {
		b.rating
			.total_cmp(&a.rating)
			.then_with(|| a.id.cmp(&b.id))
	});
}

#[cfg(test)]
mod tests {
	use super::*;
	use dispatch_storage::implementations::memory::MemoryStorage;

	fn directory() -> ProviderDirectory {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		ProviderDirectory::new(storage)
	}

	fn new_provider(name: &str, email: &str, capabilities: &[&str], rating: f64) -> NewProvider {
		NewProvider {
			name: name.to_string(),
			email: email.to_string(),
			phone: "+1-555-0000".to_string(),
			capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
			rating,
		}
	}

	#[tokio::test]
	async fn test_register_and_lookup() {
		let directory = directory();
		let registered = directory
			.register(new_provider("John", "john@example.com", &["plumbing"], 4.8))
			.await
			.unwrap();

		assert!(registered.available);
		let loaded = directory.provider(registered.id).await.unwrap();
		assert_eq!(loaded.email, "john@example.com");
		assert_eq!(loaded.rating, 4.8);
	}

	#[tokio::test]
	async fn test_register_rejects_duplicate_email() {
		let directory = directory();
		directory
			.register(new_provider("John", "john@example.com", &["plumbing"], 4.8))
			.await
			.unwrap();

		let result = directory
			.register(new_provider("Johnny", "John@Example.com", &["hvac"], 4.0))
			.await;
		assert!(matches!(result, Err(DirectoryError::DuplicateEmail(_))));
		assert_eq!(directory.count().await.unwrap(), 1);
	}

	#[tokio::test]
	async fn test_lookup_unknown_provider() {
		let directory = directory();
		assert!(matches!(
			directory.provider(ProviderId::new()).await,
			Err(DirectoryError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_available_for_filters_and_ranks() {
		let directory = directory();
		directory
			.register(new_provider("Low", "low@example.com", &["plumbing"], 4.5))
			.await
			.unwrap();
		directory
			.register(new_provider("High", "high@example.com", &["plumbing"], 4.9))
			.await
			.unwrap();
		directory
			.register(new_provider("Wrong trade", "hvac@example.com", &["hvac"], 5.0))
			.await
			.unwrap();
		let off_duty = directory
			.register(new_provider("Off duty", "off@example.com", &["plumbing"], 5.0))
			.await
			.unwrap();
		directory
			.set_availability(off_duty.id, false)
			.await
			.unwrap();

		let candidates = directory.available_for("plumbing").await.unwrap();
		assert_eq!(candidates.len(), 2);
		assert_eq!(candidates[0].name, "High");
		assert_eq!(candidates[1].name, "Low");
	}

	#[tokio::test]
	async fn test_equal_ratings_break_ties_deterministically() {
		let directory = directory();
		directory
			.register(new_provider("A", "a@example.com", &["plumbing"], 4.5))
			.await
			.unwrap();
		directory
			.register(new_provider("B", "b@example.com", &["plumbing"], 4.5))
			.await
			.unwrap();

		let first = directory.available_for("plumbing").await.unwrap();
		let second = directory.available_for("plumbing").await.unwrap();
		assert_eq!(first[0].id, second[0].id);
		assert_eq!(first[1].id, second[1].id);
	}

	#[tokio::test]
	async fn test_set_availability_round_trip() {
		let directory = directory();
		let provider = directory
			.register(new_provider("John", "john@example.com", &["plumbing"], 4.8))
			.await
			.unwrap();

		let updated = directory.set_availability(provider.id, false).await.unwrap();
		assert!(!updated.available);

		let candidates = directory.available_for("plumbing").await.unwrap();
		assert!(candidates.is_empty());

		directory.set_availability(provider.id, true).await.unwrap();
		let candidates = directory.available_for("plumbing").await.unwrap();
		assert_eq!(candidates.len(), 1);
	}

	#[tokio::test]
	async fn test_set_availability_unknown_provider() {
		let directory = directory();
		assert!(matches!(
			directory.set_availability(ProviderId::new(), false).await,
			Err(DirectoryError::NotFound)
		));
	}
}
