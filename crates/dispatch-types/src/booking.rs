//! Booking types for the dispatch system.
//!
//! A booking is a customer's request for a home service visit. Its
//! `status` field walks a fixed state machine, and every step of that
//! walk is recorded as an append-only `HistoryEntry`. The transition
//! table lives here, next to the states it governs, so every crate
//! validates against the same rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::ProviderId;

/// Unique identifier for a booking.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BookingId(pub Uuid);

impl BookingId {
	/// Generates a fresh random identifier.
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for BookingId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for BookingId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Lifecycle states of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
	/// Awaiting a provider.
	Pending,
	/// A provider has been selected but has not yet responded.
	Assigned,
	/// The assigned provider committed to the job.
	Accepted,
	/// The assigned provider declined the job.
	Rejected,
	/// The provider is on site.
	InProgress,
	/// The customer was not there for the appointment.
	NoShow,
	/// The service was performed. Terminal.
	Completed,
	/// The booking was called off. Terminal.
	Cancelled,
}

impl BookingStatus {
	/// States this one may legally move to.
	///
	/// The `Assigned -> Assigned` edge permits re-assignment to a
	/// different provider without an intermediate state.
	pub fn allowed_targets(&self) -> &'static [BookingStatus] {
		use BookingStatus::*;
		match self {
			Pending => &[Assigned, Cancelled],
			Assigned => &[Assigned, Accepted, Rejected, Cancelled],
			Accepted => &[InProgress, Cancelled],
			Rejected => &[Assigned, Cancelled],
			InProgress => &[Completed, Cancelled, NoShow],
			NoShow => &[Assigned, Cancelled],
			Completed | Cancelled => &[],
		}
	}

	/// Whether `target` is a legal next state for a non-admin actor.
	pub fn can_transition_to(&self, target: BookingStatus) -> bool {
		self.allowed_targets().contains(&target)
	}

	/// Terminal states admit no further transitions.
	pub fn is_terminal(&self) -> bool {
		self.allowed_targets().is_empty()
	}

	/// States in which auto-assignment is allowed to act on a booking.
	pub fn needs_assignment(&self) -> bool {
		matches!(
			self,
			BookingStatus::Pending | BookingStatus::Rejected | BookingStatus::NoShow
		)
	}
}

impl fmt::Display for BookingStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			BookingStatus::Pending => "pending",
			BookingStatus::Assigned => "assigned",
			BookingStatus::Accepted => "accepted",
			BookingStatus::Rejected => "rejected",
			BookingStatus::InProgress => "in_progress",
			BookingStatus::NoShow => "no_show",
			BookingStatus::Completed => "completed",
			BookingStatus::Cancelled => "cancelled",
		};
		f.write_str(s)
	}
}

/// Role under which an actor requested a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
	Customer,
	Provider,
	System,
	Admin,
}

impl fmt::Display for ActorRole {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ActorRole::Customer => "customer",
			ActorRole::Provider => "provider",
			ActorRole::System => "system",
			ActorRole::Admin => "admin",
		};
		f.write_str(s)
	}
}

/// Who requested a transition, recorded verbatim in the audit ledger.
///
/// Only the `Admin` role changes behavior: admins bypass the transition
/// table. Every other role is bound by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
	/// Free-form actor name, e.g. "customer" or "provider_<id>".
	pub name: String,
	pub role: ActorRole,
}

impl Actor {
	pub fn customer(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			role: ActorRole::Customer,
		}
	}

	pub fn provider(id: ProviderId) -> Self {
		Self {
			name: format!("provider_{}", id),
			role: ActorRole::Provider,
		}
	}

	pub fn system() -> Self {
		Self {
			name: "system".to_string(),
			role: ActorRole::System,
		}
	}

	pub fn admin(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			role: ActorRole::Admin,
		}
	}
}

/// A customer booking and its current lifecycle position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
	pub id: BookingId,
	pub customer_name: String,
	pub customer_phone: String,
	pub customer_email: Option<String>,
	/// Requested service, e.g. "plumbing".
	pub service_type: String,
	pub address: String,
	/// When the customer wants the visit.
	pub scheduled_at: DateTime<Utc>,
	pub notes: Option<String>,
	pub status: BookingStatus,
	/// The most recently assigned provider. Retained after cancellation
	/// or no-show so the record shows who held the job last.
	pub provider_id: Option<ProviderId>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the customer when creating a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBooking {
	pub customer_name: String,
	pub customer_phone: String,
	pub customer_email: Option<String>,
	pub service_type: String,
	pub address: String,
	pub scheduled_at: DateTime<Utc>,
	pub notes: Option<String>,
}

/// One append-only audit record of a status change.
///
/// The first entry for a booking always has `previous_status: None` and
/// `new_status: Pending`. Entries are never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
	pub booking_id: BookingId,
	pub previous_status: Option<BookingStatus>,
	pub new_status: BookingStatus,
	/// Actor name as submitted, e.g. "customer", "provider_<id>", "system".
	pub actor: String,
	pub actor_role: ActorRole,
	/// Human-readable explanation of the change.
	pub reason: String,
	pub recorded_at: DateTime<Utc>,
}

/// A booking joined with the assigned provider's contact details.
///
/// Serializes flat so API consumers see the provider fields alongside
/// the booking fields, all `null` when no provider is assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingView {
	#[serde(flatten)]
	pub booking: Booking,
	pub provider_name: Option<String>,
	pub provider_phone: Option<String>,
	pub provider_email: Option<String>,
}
