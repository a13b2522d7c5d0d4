//! Auto-assignment coordinator.
//!
//! Matches bookings that are waiting for a provider with the best
//! available candidate. Each dispatch runs as an independent background
//! task driving a bounded attempt loop: pick the highest-rated eligible
//! provider and assign it, backing off exponentially between attempts.
//! Before every attempt the task re-reads the booking and stops once it
//! no longer needs a provider, or once a newer dispatch for the same
//! booking has started. When every attempt fails the booking is left
//! untouched for manual intervention and an `Exhausted` event is
//! published.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use dashmap::DashMap;
use dispatch_directory::{DirectoryError, ProviderDirectory};
use dispatch_lifecycle::{LifecycleEngine, LifecycleError};
use dispatch_types::{Actor, AssignmentEvent, BookingId, DispatchEvent, EventBus, ProviderId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during assignment.
#[derive(Debug, Error)]
pub enum AssignmentError {
	/// No provider could be assigned within the attempt limit.
	#[error("No provider assigned to booking {booking_id} after {attempts} attempts")]
	Exhausted {
		booking_id: BookingId,
		attempts: u32,
	},
	/// Lifecycle failure outside the retryable attempt path.
	#[error(transparent)]
	Lifecycle(#[from] LifecycleError),
	/// Directory failure while querying candidates.
	#[error(transparent)]
	Directory(#[from] DirectoryError),
}

/// Retry policy for auto-assignment.
#[derive(Debug, Clone)]
pub struct AssignmentPolicy {
	/// Maximum attempts per dispatch.
	pub max_attempts: u32,
	/// Delay before the first retry. Doubles on each further attempt.
	pub base_delay: Duration,
}

impl Default for AssignmentPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_secs(2),
		}
	}
}

/// How an assignment sequence ended when it did not exhaust.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentOutcome {
	/// A provider was assigned on the given attempt.
	Assigned {
		provider_id: ProviderId,
		attempt: u32,
	},
	/// The sequence stood down: the booking no longer needed a provider
	/// or a newer dispatch superseded this one.
	Abandoned,
}

/// Drives background auto-assignment of bookings to providers.
pub struct AssignmentCoordinator {
	lifecycle: Arc<LifecycleEngine>,
	directory: Arc<ProviderDirectory>,
	event_bus: EventBus,
	policy: AssignmentPolicy,
	/// Dispatch generation per booking. A new dispatch bumps it; an
	/// older in-flight sequence observes the bump and stops.
	generations: DashMap<BookingId, u64>,
}

impl AssignmentCoordinator {
	/// Creates a new assignment coordinator.
	pub fn new(
		lifecycle: Arc<LifecycleEngine>,
		directory: Arc<ProviderDirectory>,
		event_bus: EventBus,
		policy: AssignmentPolicy,
	) -> Self {
		Self {
			lifecycle,
			directory,
			event_bus,
			policy,
			generations: DashMap::new(),
		}
	}

	/// Starts a background assignment sequence for a booking.
	///
	/// Returns immediately; the sequence runs as a detached task and
	/// supersedes any in-flight sequence for the same booking.
	pub fn dispatch(self: &Arc<Self>, booking_id: BookingId, service_type: String) {
		let generation = self.bump_generation(booking_id);
		let coordinator = self.clone();

		tokio::spawn(async move {
			match coordinator
				.auto_assign(booking_id, &service_type, generation)
				.await
			{
				Ok(AssignmentOutcome::Assigned {
					provider_id,
					attempt,
				}) => {
					info!(
						"Assigned provider {} to booking {} on attempt {}",
						provider_id, booking_id, attempt
					);
				}
				Ok(AssignmentOutcome::Abandoned) => {
					debug!("Assignment sequence for booking {} stood down", booking_id);
				}
				// Exhaustion is logged and published inside auto_assign
				Err(AssignmentError::Exhausted { .. }) => {}
				Err(e) => {
					warn!("Assignment sequence for booking {} aborted: {}", booking_id, e);
				}
			}
		});
	}

	/// Runs one bounded assignment sequence.
	///
	/// Callers that want to await the outcome use this directly; the
	/// engine goes through `dispatch`. `generation` must come from
	/// `bump_generation` for supersession to work.
	pub async fn auto_assign(
		&self,
		booking_id: BookingId,
		service_type: &str,
		generation: u64,
	) -> Result<AssignmentOutcome, AssignmentError> {
		let mut backoff = self.backoff();

		for attempt in 1..=self.policy.max_attempts {
			if self.superseded(booking_id, generation) {
				debug!("Dispatch for booking {} superseded, stopping", booking_id);
				return Ok(AssignmentOutcome::Abandoned);
			}

			// Staleness check: act only while the booking still needs a
			// provider. A cancelled or accepted booking must never be
			// re-assigned from here.
			let booking = self.lifecycle.booking(booking_id).await?;
			if !booking.status.needs_assignment() {
				debug!(
					"Booking {} is {}, no assignment needed",
					booking_id, booking.status
				);
				return Ok(AssignmentOutcome::Abandoned);
			}

			let candidates = self.directory.available_for(service_type).await?;
			match candidates.first() {
				Some(provider) => {
					let result = self
						.lifecycle
						.assign(
							booking_id,
							provider.id,
							Actor::system(),
							format!("Auto-assigned (attempt {})", attempt),
						)
						.await;

					match result {
						Ok(_) => {
							self.event_bus
								.publish(DispatchEvent::Assignment(AssignmentEvent::Assigned {
									booking_id,
									provider_id: provider.id,
									attempt,
								}))
								.ok();
							return Ok(AssignmentOutcome::Assigned {
								provider_id: provider.id,
								attempt,
							});
						}
						Err(e) => {
							warn!(
								"Assignment attempt {}/{} for booking {} failed: {}",
								attempt, self.policy.max_attempts, booking_id, e
							);
						}
					}
				}
				None => {
					debug!(
						"No eligible provider for booking {} (attempt {}/{})",
						booking_id, attempt, self.policy.max_attempts
					);
				}
			}

			if attempt < self.policy.max_attempts {
				if let Some(delay) = backoff.next_backoff() {
					debug!(
						"Retrying assignment for booking {} in {:?}",
						booking_id, delay
					);
					tokio::time::sleep(delay).await;
				}
			}
		}

		let attempts = self.policy.max_attempts;
		warn!(
			"No provider assigned to booking {} after {} attempts, leaving for manual intervention",
			booking_id, attempts
		);
		self.event_bus
			.publish(DispatchEvent::Assignment(AssignmentEvent::Exhausted {
				booking_id,
				attempts,
			}))
			.ok();

		Err(AssignmentError::Exhausted {
			booking_id,
			attempts,
		})
	}

	/// Bumps and returns the dispatch generation for a booking.
	pub fn bump_generation(&self, booking_id: BookingId) -> u64 {
		let mut generation = self.generations.entry(booking_id).or_insert(0);
		*generation += 1;
		*generation
	}

	fn superseded(&self, booking_id: BookingId, generation: u64) -> bool {
		self.generations.get(&booking_id).map(|g| *g) != Some(generation)
	}

	fn backoff(&self) -> ExponentialBackoff {
		ExponentialBackoff {
			initial_interval: self.policy.base_delay,
			randomization_factor: 0.0,
			multiplier: 2.0,
			max_elapsed_time: None,
			..Default::default()
		}
	}
}
