//! Event types for the dispatch system.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{BookingId, BookingStatus, ProviderId};

/// Events published on the dispatch event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DispatchEvent {
	/// Booking lifecycle events
	Booking(BookingEvent),
	/// Auto-assignment events
	Assignment(AssignmentEvent),
}

/// Events emitted by the booking lifecycle engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BookingEvent {
	/// A booking was created and is awaiting a provider.
	Created {
		booking_id: BookingId,
		service_type: String,
	},
	/// A booking moved to a new status.
	Changed {
		booking_id: BookingId,
		previous: BookingStatus,
		new_status: BookingStatus,
	},
}

/// Events emitted by the assignment coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssignmentEvent {
	/// A provider was assigned to a booking.
	Assigned {
		booking_id: BookingId,
		provider_id: ProviderId,
		attempt: u32,
	},
	/// Every attempt failed and the booking was left for manual handling.
	Exhausted { booking_id: BookingId, attempts: u32 },
}

/// Event bus for publishing and subscribing to dispatch events.
pub struct EventBus {
	sender: broadcast::Sender<DispatchEvent>,
}

impl EventBus {
	/// Creates a new event bus with the specified channel capacity.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Subscribes to receive all events published on this bus.
	pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all subscribers.
	pub fn publish(
		&self,
		event: DispatchEvent,
	) -> Result<usize, broadcast::error::SendError<DispatchEvent>> {
		self.sender.send(event)
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}
