//! Core engine wiring the dispatch services together.
//!
//! `DispatchEngine` owns the storage service, the provider directory,
//! the lifecycle engine, and the assignment coordinator, plus the event
//! bus they share. Its `run` loop turns booking events into background
//! assignment work: a created booking gets an assignment dispatch, and
//! a rejection gets a re-assignment dispatch. `DispatchBuilder`
//! constructs the whole stack from configuration.

use dispatch_assignment::{AssignmentCoordinator, AssignmentPolicy};
use dispatch_config::{Config, StorageConfig};
use dispatch_directory::ProviderDirectory;
use dispatch_lifecycle::LifecycleEngine;
use dispatch_storage::{
	implementations::{file::FileStorage, memory::MemoryStorage},
	StorageInterface, StorageService,
};
use dispatch_types::{BookingEvent, BookingStatus, DispatchEvent, EventBus, NewProvider};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

/// Errors that can occur while building or running the engine.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

/// Top-level engine owning every dispatch service.
pub struct DispatchEngine {
	config: Config,
	directory: Arc<ProviderDirectory>,
	lifecycle: Arc<LifecycleEngine>,
	coordinator: Arc<AssignmentCoordinator>,
	event_bus: EventBus,
	/// Subscribed at build time so no event published between build and
	/// `run` is missed.
	events: Mutex<broadcast::Receiver<DispatchEvent>>,
	shutdown: broadcast::Sender<()>,
}

impl DispatchEngine {
	/// Runs the engine event loop until shutdown.
	///
	/// Seeds the provider directory on first start, then reacts to
	/// events published by the lifecycle engine. A receiver that falls
	/// behind drops its oldest events and keeps going.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.seed_providers().await?;

		let mut events = self.events.lock().await;
		let mut shutdown = self.shutdown.subscribe();

		info!("Dispatch engine running");

		loop {
			tokio::select! {
				event = events.recv() => match event {
					Ok(event) => {
						if let Err(e) = self.handle_event(event).await {
							warn!("Error handling event: {}", e);
						}
					}
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						warn!("Event receiver lagged, dropped {} events", skipped);
					}
					Err(broadcast::error::RecvError::Closed) => break,
				},
				_ = shutdown.recv() => {
					info!("Dispatch engine received shutdown signal");
					break;
				}
			}
		}

		Ok(())
	}

	async fn handle_event(&self, event: DispatchEvent) -> Result<(), EngineError> {
		match event {
			DispatchEvent::Booking(BookingEvent::Created {
				booking_id,
				service_type,
			}) => {
				self.coordinator.dispatch(booking_id, service_type);
				Ok(())
			}
			DispatchEvent::Booking(BookingEvent::Changed {
				booking_id,
				new_status: BookingStatus::Rejected,
				..
			}) => {
				// A rejection puts the booking back on the assignment queue
				let booking = self
					.lifecycle
					.booking(booking_id)
					.await
					.map_err(|e| EngineError::Service(e.to_string()))?;
				self.coordinator.dispatch(booking_id, booking.service_type);
				Ok(())
			}
			_ => Ok(()),
		}
	}

	/// Provisions the configured seed providers when the directory is
	/// empty. Returns how many were registered.
	pub async fn seed_providers(&self) -> Result<usize, EngineError> {
		if self.config.seed_providers.is_empty() {
			return Ok(0);
		}

		let count = self
			.directory
			.count()
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		if count > 0 {
			return Ok(0);
		}

		let mut seeded = 0;
		for seed in &self.config.seed_providers {
			self.directory
				.register(NewProvider {
					name: seed.name.clone(),
					email: seed.email.clone(),
					phone: seed.phone.clone(),
					capabilities: seed.capabilities.clone(),
					rating: seed.rating,
				})
				.await
				.map_err(|e| EngineError::Service(e.to_string()))?;
			seeded += 1;
		}

		info!("Seeded {} providers into an empty directory", seeded);
		Ok(seeded)
	}

	/// Signals the engine loop to stop.
	pub fn shutdown(&self) {
		let _ = self.shutdown.send(());
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn directory(&self) -> &Arc<ProviderDirectory> {
		&self.directory
	}

	pub fn lifecycle(&self) -> &Arc<LifecycleEngine> {
		&self.lifecycle
	}

	pub fn coordinator(&self) -> &Arc<AssignmentCoordinator> {
		&self.coordinator
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}
}

/// Factory producing a storage backend from configuration.
pub type StorageFactory =
	Box<dyn Fn(&StorageConfig) -> Result<Box<dyn StorageInterface>, EngineError> + Send>;

/// Builder for constructing a `DispatchEngine` from configuration.
pub struct DispatchBuilder {
	config: Config,
	storage_factory: StorageFactory,
}

impl DispatchBuilder {
	/// Creates a builder with the default storage factory.
	pub fn new(config: Config) -> Self {
		Self {
			config,
			storage_factory: Box::new(default_storage_factory),
		}
	}

	/// Overrides how the storage backend is constructed.
	pub fn with_storage_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&StorageConfig) -> Result<Box<dyn StorageInterface>, EngineError> + Send + 'static,
	{
		self.storage_factory = Box::new(factory);
		self
	}

	/// Wires every service and returns the engine.
	pub fn build(self) -> Result<DispatchEngine, EngineError> {
		let factory = self.storage_factory;
		let backend = factory(&self.config.storage)?;
		let storage = Arc::new(StorageService::new(backend));
		let event_bus = EventBus::new(self.config.assignment.event_capacity);

		let directory = Arc::new(ProviderDirectory::new(storage.clone()));
		let lifecycle = Arc::new(LifecycleEngine::new(
			storage,
			directory.clone(),
			event_bus.clone(),
		));
		let coordinator = Arc::new(AssignmentCoordinator::new(
			lifecycle.clone(),
			directory.clone(),
			event_bus.clone(),
			AssignmentPolicy {
				max_attempts: self.config.assignment.max_attempts,
				base_delay: Duration::from_millis(self.config.assignment.base_delay_ms),
			},
		));

		let events = Mutex::new(event_bus.subscribe());
		let (shutdown, _) = broadcast::channel(16);

		Ok(DispatchEngine {
			config: self.config,
			directory,
			lifecycle,
			coordinator,
			event_bus,
			events,
			shutdown,
		})
	}
}

fn default_storage_factory(
	config: &StorageConfig,
) -> Result<Box<dyn StorageInterface>, EngineError> {
	match config.backend.as_str() {
		"memory" => Ok(Box::new(MemoryStorage::new())),
		"file" => {
			let path = config.path.clone().ok_or_else(|| {
				EngineError::Config("storage.path is required for the file backend".to_string())
			})?;
			Ok(Box::new(FileStorage::new(path)))
		}
		other => Err(EngineError::Config(format!(
			"Unknown storage backend: {}",
			other
		))),
	}
}
