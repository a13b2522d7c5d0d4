//! Request and response bodies for the dispatch HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{ActorRole, BookingStatus, NewBooking, ProviderId};

/// Body of `POST /api/bookings`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBookingRequest {
	#[validate(length(min = 1, message = "customer_name is required"))]
	pub customer_name: String,
	#[validate(length(min = 1, message = "customer_phone is required"))]
	pub customer_phone: String,
	#[validate(email(message = "customer_email must be a valid email"))]
	pub customer_email: Option<String>,
	#[validate(length(min = 1, message = "service_type is required"))]
	pub service_type: String,
	#[validate(length(min = 1, message = "address is required"))]
	pub address: String,
	pub scheduled_at: DateTime<Utc>,
	pub notes: Option<String>,
}

impl From<CreateBookingRequest> for NewBooking {
	fn from(req: CreateBookingRequest) -> Self {
		Self {
			customer_name: req.customer_name,
			customer_phone: req.customer_phone,
			customer_email: req.customer_email,
			service_type: req.service_type,
			address: req.address,
			scheduled_at: req.scheduled_at,
			notes: req.notes,
		}
	}
}

/// Body of `PATCH /api/bookings/{id}/cancel`.
///
/// All fields are optional; a bare `{}` cancels as the customer.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelBookingRequest {
	pub cancelled_by: Option<String>,
	pub role: Option<ActorRole>,
	pub reason: Option<String>,
}

/// Body of `PATCH /api/bookings/{id}/assign`.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignProviderRequest {
	pub provider_id: ProviderId,
}

/// Body of the provider workflow endpoints (accept, reject, no-show).
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderActionRequest {
	pub provider_id: ProviderId,
	pub reason: Option<String>,
}

/// Body of `PATCH /api/bookings/{id}/start`.
#[derive(Debug, Clone, Deserialize)]
pub struct StartServiceRequest {
	pub provider_id: ProviderId,
}

/// Body of `PATCH /api/bookings/{id}/complete`.
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteServiceRequest {
	pub provider_id: ProviderId,
	pub notes: Option<String>,
}

/// Body of `PATCH /api/bookings/{id}/override`.
#[derive(Debug, Clone, Deserialize)]
pub struct OverrideStatusRequest {
	pub new_status: BookingStatus,
	pub admin_name: Option<String>,
	pub reason: Option<String>,
}

/// Body of `PATCH /api/providers/{id}/availability`.
#[derive(Debug, Clone, Deserialize)]
pub struct SetAvailabilityRequest {
	pub available: bool,
}

/// Standard error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub error: String,
}
