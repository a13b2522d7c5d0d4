//! Booking lifecycle engine.
//!
//! The state machine at the center of the dispatch system. Every
//! booking mutation flows through this crate: creation stamps the
//! booking `pending` and writes the first audit entry, while
//! `transition` and `assign` validate the requested change against the
//! transition table, apply it, and append the matching history entry in
//! the same storage commit. Non-admin actors are bound by the table;
//! the admin role bypasses it as the designed escape hatch, with the
//! bypass itself still recorded in the ledger.

use chrono::Utc;
use dashmap::DashMap;
use dispatch_directory::ProviderDirectory;
use dispatch_storage::{StorageError, StorageService, WriteBatch};
use dispatch_types::{
	Actor, ActorRole, Booking, BookingEvent, BookingId, BookingStatus, BookingView, DispatchEvent,
	EventBus, HistoryEntry, NewBooking, ProviderId,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Storage namespace for booking records.
const BOOKINGS_NAMESPACE: &str = "bookings";
/// Storage namespace for per-booking history ledgers.
const HISTORY_NAMESPACE: &str = "history";

/// Errors that can occur during lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
	/// Booking id is unknown.
	#[error("Booking not found")]
	NotFound,
	/// The requested change is not in the transition table.
	#[error("Invalid status transition from {from} to {to}")]
	InvalidTransition {
		from: BookingStatus,
		to: BookingStatus,
	},
	/// Underlying storage failure.
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

/// A status change that was applied and recorded.
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
	pub booking_id: BookingId,
	pub previous: BookingStatus,
	pub new_status: BookingStatus,
}

/// Validates and applies booking status changes.
pub struct LifecycleEngine {
	storage: Arc<StorageService>,
	directory: Arc<ProviderDirectory>,
	event_bus: EventBus,
	/// Per-booking mutexes. The read-modify-write of status plus ledger
	/// runs under the booking's mutex so concurrent transitions cannot
	/// interleave.
	locks: DashMap<BookingId, Arc<Mutex<()>>>,
}

impl LifecycleEngine {
	/// Creates a new lifecycle engine.
	pub fn new(
		storage: Arc<StorageService>,
		directory: Arc<ProviderDirectory>,
		event_bus: EventBus,
	) -> Self {
		Self {
			storage,
			directory,
			event_bus,
			locks: DashMap::new(),
		}
	}

	/// Creates a booking in `pending` and records the creation entry.
	///
	/// The booking row and the first ledger entry commit together, and
	/// a `Created` event is published for the assignment coordinator.
	pub async fn create(&self, new: NewBooking) -> Result<Booking, LifecycleError> {
		let now = Utc::now();
		let booking = Booking {
			id: BookingId::new(),
			customer_name: new.customer_name,
			customer_phone: new.customer_phone,
			customer_email: new.customer_email,
			service_type: new.service_type,
			address: new.address,
			scheduled_at: new.scheduled_at,
			notes: new.notes,
			status: BookingStatus::Pending,
			provider_id: None,
			created_at: now,
			updated_at: now,
		};

		let ledger = vec![HistoryEntry {
			booking_id: booking.id,
			previous_status: None,
			new_status: BookingStatus::Pending,
			actor: "customer".to_string(),
			actor_role: ActorRole::Customer,
			reason: "Booking created".to_string(),
			recorded_at: now,
		}];

		let id = booking.id.to_string();
		let batch = WriteBatch::new()
			.put(HISTORY_NAMESPACE, &id, &ledger)?
			.put(BOOKINGS_NAMESPACE, &id, &booking)?;
		self.storage.commit(batch).await?;

		info!(
			"Created booking {} for service type {}",
			booking.id, booking.service_type
		);
		self.event_bus
			.publish(DispatchEvent::Booking(BookingEvent::Created {
				booking_id: booking.id,
				service_type: booking.service_type.clone(),
			}))
			.ok();

		Ok(booking)
	}

	/// Applies a status change on behalf of the given actor.
	///
	/// Non-admin actors are validated against the transition table; the
	/// admin role is applied unconditionally. On success the booking row
	/// and the new ledger entry commit together and a `Changed` event is
	/// published.
	pub async fn transition(
		&self,
		booking_id: BookingId,
		new_status: BookingStatus,
		actor: Actor,
		reason: impl Into<String>,
	) -> Result<Transition, LifecycleError> {
		let lock = self.lock_for(booking_id);
		let _guard = lock.lock().await;

		let mut booking = self.load(booking_id).await?;
		let previous = booking.status;

		if actor.role != ActorRole::Admin && !previous.can_transition_to(new_status) {
			return Err(LifecycleError::InvalidTransition {
				from: previous,
				to: new_status,
			});
		}

		booking.status = new_status;
		booking.updated_at = Utc::now();

		self.apply(&booking, previous, &actor, reason.into()).await?;

		Ok(Transition {
			booking_id,
			previous,
			new_status,
		})
	}

	/// Assigns a provider: sets `provider_id` and moves the booking to
	/// `assigned` in one commit, so the two fields are never observable
	/// out of sync.
	///
	/// Table rules apply as in `transition`. Re-assignment rides the
	/// `assigned -> assigned` edge, and the admin role may assign from
	/// any state.
	pub async fn assign(
		&self,
		booking_id: BookingId,
		provider_id: ProviderId,
		actor: Actor,
		reason: impl Into<String>,
	) -> Result<Transition, LifecycleError> {
		let lock = self.lock_for(booking_id);
		let _guard = lock.lock().await;

		let mut booking = self.load(booking_id).await?;
		let previous = booking.status;

		if actor.role != ActorRole::Admin && !previous.can_transition_to(BookingStatus::Assigned) {
			return Err(LifecycleError::InvalidTransition {
				from: previous,
				to: BookingStatus::Assigned,
			});
		}

		booking.provider_id = Some(provider_id);
		booking.status = BookingStatus::Assigned;
		booking.updated_at = Utc::now();

		self.apply(&booking, previous, &actor, reason.into()).await?;

		Ok(Transition {
			booking_id,
			previous,
			new_status: BookingStatus::Assigned,
		})
	}

	/// Looks up a single booking.
	pub async fn booking(&self, id: BookingId) -> Result<Booking, LifecycleError> {
		self.load(id).await
	}

	/// Returns all bookings, newest first.
	pub async fn bookings(&self) -> Result<Vec<Booking>, LifecycleError> {
		let mut bookings: Vec<Booking> = self.storage.retrieve_all(BOOKINGS_NAMESPACE).await?;
		bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
		Ok(bookings)
	}

	/// Returns the bookings currently held by a provider, newest first.
	///
	/// Matches on the current `provider_id` only, so a booking that was
	/// re-assigned elsewhere no longer appears in the superseded
	/// provider's list.
	pub async fn bookings_for_provider(
		&self,
		provider_id: ProviderId,
	) -> Result<Vec<Booking>, LifecycleError> {
		Ok(self
			.bookings()
			.await?
			.into_iter()
			.filter(|b| b.provider_id == Some(provider_id))
			.collect())
	}

	/// Returns a booking's audit ledger, oldest first.
	pub async fn history(&self, booking_id: BookingId) -> Result<Vec<HistoryEntry>, LifecycleError> {
		// Unknown ids are an error, not an empty ledger
		self.load(booking_id).await?;
		Ok(self.ledger(booking_id).await?)
	}

	/// Returns a booking joined with its provider's contact details.
	pub async fn booking_view(&self, id: BookingId) -> Result<BookingView, LifecycleError> {
		let booking = self.load(id).await?;
		Ok(self.join_provider(booking).await)
	}

	/// Returns every booking as a display view, newest first.
	pub async fn booking_views(&self) -> Result<Vec<BookingView>, LifecycleError> {
		let bookings = self.bookings().await?;
		let mut views = Vec::with_capacity(bookings.len());
		for booking in bookings {
			views.push(self.join_provider(booking).await);
		}
		Ok(views)
	}

	/// Commits an updated booking together with its new ledger entry,
	/// then publishes the change.
	async fn apply(
		&self,
		booking: &Booking,
		previous: BookingStatus,
		actor: &Actor,
		reason: String,
	) -> Result<(), LifecycleError> {
		let mut ledger = self.ledger(booking.id).await?;
		ledger.push(HistoryEntry {
			booking_id: booking.id,
			previous_status: Some(previous),
			new_status: booking.status,
			actor: actor.name.clone(),
			actor_role: actor.role,
			reason,
			recorded_at: booking.updated_at,
		});

		// The ledger lands before the booking row, so a torn batch can
		// leave an extra ledger entry but never a status change without
		// its audit record.
		let id = booking.id.to_string();
		let batch = WriteBatch::new()
			.put(HISTORY_NAMESPACE, &id, &ledger)?
			.put(BOOKINGS_NAMESPACE, &id, booking)?;
		self.storage.commit(batch).await?;

		debug!(
			"Booking {} moved {} -> {} by {}",
			booking.id, previous, booking.status, actor.name
		);
		self.event_bus
			.publish(DispatchEvent::Booking(BookingEvent::Changed {
				booking_id: booking.id,
				previous,
				new_status: booking.status,
			}))
			.ok();

		Ok(())
	}

	fn lock_for(&self, id: BookingId) -> Arc<Mutex<()>> {
		self.locks
			.entry(id)
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.value()
			.clone()
	}

	async fn load(&self, id: BookingId) -> Result<Booking, LifecycleError> {
		self.storage
			.retrieve(BOOKINGS_NAMESPACE, &id.to_string())
			.await
			.map_err(|e| match e {
				StorageError::NotFound => LifecycleError::NotFound,
				other => LifecycleError::Storage(other),
			})
	}

	async fn ledger(&self, id: BookingId) -> Result<Vec<HistoryEntry>, StorageError> {
		match self
			.storage
			.retrieve(HISTORY_NAMESPACE, &id.to_string())
			.await
		{
			Ok(entries) => Ok(entries),
			Err(StorageError::NotFound) => Ok(Vec::new()),
			Err(e) => Err(e),
		}
	}

	async fn join_provider(&self, booking: Booking) -> BookingView {
		let provider = match booking.provider_id {
			Some(id) => self.directory.provider(id).await.ok(),
			None => None,
		};

		match provider {
			Some(p) => BookingView {
				booking,
				provider_name: Some(p.name),
				provider_phone: Some(p.phone),
				provider_email: Some(p.email),
			},
			None => BookingView {
				booking,
				provider_name: None,
				provider_phone: None,
				provider_email: None,
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use dispatch_storage::implementations::memory::MemoryStorage;
	use dispatch_types::NewProvider;

	fn engine() -> (Arc<LifecycleEngine>, Arc<ProviderDirectory>) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let directory = Arc::new(ProviderDirectory::new(storage.clone()));
		let engine = Arc::new(LifecycleEngine::new(
			storage,
			directory.clone(),
			EventBus::new(64),
		));
		(engine, directory)
	}

	fn new_booking(service_type: &str) -> NewBooking {
		NewBooking {
			customer_name: "Jane Doe".to_string(),
			customer_phone: "+1-555-0199".to_string(),
			customer_email: Some("jane@example.com".to_string()),
			service_type: service_type.to_string(),
			address: "12 Main St".to_string(),
			scheduled_at: Utc.with_ymd_and_hms(2026, 9, 1, 10, 0, 0).unwrap(),
			notes: None,
		}
	}

	async fn register_provider(directory: &ProviderDirectory, email: &str) -> ProviderId {
		directory
			.register(NewProvider {
				name: "Pro".to_string(),
				email: email.to_string(),
				phone: "+1-555-0101".to_string(),
				capabilities: vec!["plumbing".to_string()],
				rating: 4.8,
			})
			.await
			.unwrap()
			.id
	}

	#[tokio::test]
	async fn test_create_starts_pending_with_creation_entry() {
		let (engine, _) = engine();
		let booking = engine.create(new_booking("plumbing")).await.unwrap();

		assert_eq!(booking.status, BookingStatus::Pending);
		assert!(booking.provider_id.is_none());

		let history = engine.history(booking.id).await.unwrap();
		assert_eq!(history.len(), 1);
		assert_eq!(history[0].previous_status, None);
		assert_eq!(history[0].new_status, BookingStatus::Pending);
		assert_eq!(history[0].actor, "customer");
		assert_eq!(history[0].reason, "Booking created");
	}

	#[tokio::test]
	async fn test_legal_transition_appends_history() {
		let (engine, directory) = engine();
		let provider_id = register_provider(&directory, "pro@example.com").await;
		let booking = engine.create(new_booking("plumbing")).await.unwrap();

		engine
			.assign(booking.id, provider_id, Actor::system(), "Auto-assigned (attempt 1)")
			.await
			.unwrap();
		engine
			.transition(
				booking.id,
				BookingStatus::Accepted,
				Actor::provider(provider_id),
				"Provider accepted the booking",
			)
			.await
			.unwrap();

		let loaded = engine.booking(booking.id).await.unwrap();
		assert_eq!(loaded.status, BookingStatus::Accepted);

		let history = engine.history(booking.id).await.unwrap();
		assert_eq!(history.len(), 3);
		assert_eq!(history[1].previous_status, Some(BookingStatus::Pending));
		assert_eq!(history[1].new_status, BookingStatus::Assigned);
		assert_eq!(history[2].previous_status, Some(BookingStatus::Assigned));
		assert_eq!(history[2].new_status, BookingStatus::Accepted);
		assert_eq!(history[2].actor, format!("provider_{}", provider_id));
	}

	#[tokio::test]
	async fn test_illegal_transition_leaves_booking_untouched() {
		let (engine, _) = engine();
		let booking = engine.create(new_booking("plumbing")).await.unwrap();

		let result = engine
			.transition(
				booking.id,
				BookingStatus::Completed,
				Actor::customer("customer"),
				"skip ahead",
			)
			.await;

		assert!(matches!(
			result,
			Err(LifecycleError::InvalidTransition {
				from: BookingStatus::Pending,
				to: BookingStatus::Completed,
			})
		));

		let loaded = engine.booking(booking.id).await.unwrap();
		assert_eq!(loaded.status, BookingStatus::Pending);
		assert_eq!(engine.history(booking.id).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_admin_bypasses_transition_table() {
		let (engine, _) = engine();
		let booking = engine.create(new_booking("plumbing")).await.unwrap();

		engine
			.transition(
				booking.id,
				BookingStatus::Completed,
				Actor::admin("admin"),
				"Manual override by admin",
			)
			.await
			.unwrap();

		let loaded = engine.booking(booking.id).await.unwrap();
		assert_eq!(loaded.status, BookingStatus::Completed);

		let history = engine.history(booking.id).await.unwrap();
		assert_eq!(history.last().unwrap().actor_role, ActorRole::Admin);
		assert_eq!(
			history.last().unwrap().previous_status,
			Some(BookingStatus::Pending)
		);
	}

	#[tokio::test]
	async fn test_terminal_states_reject_all_non_admin_changes() {
		let (engine, _) = engine();
		let booking = engine.create(new_booking("plumbing")).await.unwrap();
		engine
			.transition(
				booking.id,
				BookingStatus::Cancelled,
				Actor::customer("customer"),
				"Cancelled by user",
			)
			.await
			.unwrap();

		for target in [
			BookingStatus::Pending,
			BookingStatus::Assigned,
			BookingStatus::Completed,
		] {
			let result = engine
				.transition(booking.id, target, Actor::customer("customer"), "again")
				.await;
			assert!(matches!(
				result,
				Err(LifecycleError::InvalidTransition { .. })
			));
		}
	}

	#[tokio::test]
	async fn test_assign_writes_provider_and_status_together() {
		let (engine, directory) = engine();
		let provider_id = register_provider(&directory, "pro@example.com").await;
		let booking = engine.create(new_booking("plumbing")).await.unwrap();

		let transition = engine
			.assign(booking.id, provider_id, Actor::system(), "Auto-assigned (attempt 1)")
			.await
			.unwrap();
		assert_eq!(transition.previous, BookingStatus::Pending);
		assert_eq!(transition.new_status, BookingStatus::Assigned);

		let loaded = engine.booking(booking.id).await.unwrap();
		assert_eq!(loaded.status, BookingStatus::Assigned);
		assert_eq!(loaded.provider_id, Some(provider_id));
	}

	#[tokio::test]
	async fn test_reassignment_supersedes_previous_provider() {
		let (engine, directory) = engine();
		let first = register_provider(&directory, "first@example.com").await;
		let second = register_provider(&directory, "second@example.com").await;
		let booking = engine.create(new_booking("plumbing")).await.unwrap();

		engine
			.assign(booking.id, first, Actor::system(), "Auto-assigned (attempt 1)")
			.await
			.unwrap();
		engine
			.assign(booking.id, second, Actor::admin("admin"), "Manual assignment")
			.await
			.unwrap();

		let loaded = engine.booking(booking.id).await.unwrap();
		assert_eq!(loaded.provider_id, Some(second));

		assert!(engine
			.bookings_for_provider(first)
			.await
			.unwrap()
			.is_empty());
		assert_eq!(engine.bookings_for_provider(second).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_cancellation_retains_provider_for_audit() {
		let (engine, directory) = engine();
		let provider_id = register_provider(&directory, "pro@example.com").await;
		let booking = engine.create(new_booking("plumbing")).await.unwrap();

		engine
			.assign(booking.id, provider_id, Actor::system(), "Auto-assigned (attempt 1)")
			.await
			.unwrap();
		engine
			.transition(
				booking.id,
				BookingStatus::Cancelled,
				Actor::customer("customer"),
				"Cancelled by user",
			)
			.await
			.unwrap();

		let loaded = engine.booking(booking.id).await.unwrap();
		assert_eq!(loaded.status, BookingStatus::Cancelled);
		assert_eq!(loaded.provider_id, Some(provider_id));
	}

	#[tokio::test]
	async fn test_history_chains_without_gaps() {
		let (engine, directory) = engine();
		let provider_id = register_provider(&directory, "pro@example.com").await;
		let booking = engine.create(new_booking("plumbing")).await.unwrap();

		engine
			.assign(booking.id, provider_id, Actor::system(), "Auto-assigned (attempt 1)")
			.await
			.unwrap();
		engine
			.transition(
				booking.id,
				BookingStatus::Rejected,
				Actor::provider(provider_id),
				"Provider rejected the booking",
			)
			.await
			.unwrap();
		engine
			.assign(booking.id, provider_id, Actor::system(), "Auto-assigned (attempt 1)")
			.await
			.unwrap();

		let history = engine.history(booking.id).await.unwrap();
		assert_eq!(history[0].previous_status, None);
		for pair in history.windows(2) {
			assert_eq!(pair[1].previous_status, Some(pair[0].new_status));
		}
	}

	#[tokio::test]
	async fn test_unknown_booking_is_not_found() {
		let (engine, _) = engine();
		let ghost = BookingId::new();

		assert!(matches!(
			engine.booking(ghost).await,
			Err(LifecycleError::NotFound)
		));
		assert!(matches!(
			engine.history(ghost).await,
			Err(LifecycleError::NotFound)
		));
		assert!(matches!(
			engine
				.transition(ghost, BookingStatus::Cancelled, Actor::admin("admin"), "x")
				.await,
			Err(LifecycleError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_bookings_list_newest_first() {
		let (engine, _) = engine();
		let first = engine.create(new_booking("plumbing")).await.unwrap();
		let second = engine.create(new_booking("hvac")).await.unwrap();

		let bookings = engine.bookings().await.unwrap();
		assert_eq!(bookings.len(), 2);
		let first_pos = bookings.iter().position(|b| b.id == first.id).unwrap();
		let second_pos = bookings.iter().position(|b| b.id == second.id).unwrap();
		assert!(second_pos <= first_pos);
	}

	#[tokio::test]
	async fn test_view_joins_provider_contact_details() {
		let (engine, directory) = engine();
		let provider_id = register_provider(&directory, "pro@example.com").await;
		let booking = engine.create(new_booking("plumbing")).await.unwrap();

		let unassigned = engine.booking_view(booking.id).await.unwrap();
		assert!(unassigned.provider_name.is_none());

		engine
			.assign(booking.id, provider_id, Actor::system(), "Auto-assigned (attempt 1)")
			.await
			.unwrap();

		let assigned = engine.booking_view(booking.id).await.unwrap();
		assert_eq!(assigned.provider_name.as_deref(), Some("Pro"));
		assert_eq!(assigned.provider_email.as_deref(), Some("pro@example.com"));
	}

	#[tokio::test]
	async fn test_concurrent_transitions_serialize() {
		let (engine, directory) = engine();
		let provider_id = register_provider(&directory, "pro@example.com").await;
		let booking = engine.create(new_booking("plumbing")).await.unwrap();
		engine
			.assign(booking.id, provider_id, Actor::system(), "Auto-assigned (attempt 1)")
			.await
			.unwrap();

		// Race accept against cancel: exactly one must win.
		let accept = {
			let engine = engine.clone();
			let id = booking.id;
			tokio::spawn(async move {
				engine
					.transition(
						id,
						BookingStatus::Accepted,
						Actor::provider(provider_id),
						"Provider accepted the booking",
					)
					.await
			})
		};
		let cancel = {
			let engine = engine.clone();
			let id = booking.id;
			tokio::spawn(async move {
				engine
					.transition(
						id,
						BookingStatus::Cancelled,
						Actor::customer("customer"),
						"Cancelled by user",
					)
					.await
			})
		};

		let accept = accept.await.unwrap();
		let cancel = cancel.await.unwrap();
		assert!(accept.is_ok() || cancel.is_ok());

		let history = engine.history(booking.id).await.unwrap();
		for pair in history.windows(2) {
			assert_eq!(pair[1].previous_status, Some(pair[0].new_status));
		}
	}
}
