//! HTTP API for the dispatch service.
//!
//! Exposes the booking lifecycle and the provider directory over REST.
//! Handlers translate requests into lifecycle and directory calls; all
//! state changes, validation, and audit recording happen behind those
//! services. Lifecycle errors map onto status codes: unknown ids are
//! 404, transitions outside the table are 409, invalid payloads are
//! 400, and storage failures are 500.

use axum::{
	extract::{rejection::JsonRejection, FromRequest, Path, Request, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, patch, post},
	Json, Router,
};
use dispatch_core::DispatchEngine;
use dispatch_directory::DirectoryError;
use dispatch_lifecycle::{LifecycleError, Transition};
use dispatch_types::{
	Actor, ActorRole, AssignProviderRequest, BookingId, BookingStatus, CancelBookingRequest,
	CompleteServiceRequest, CreateBookingRequest, ErrorResponse, NewBooking,
	OverrideStatusRequest, ProviderActionRequest, ProviderId, SetAvailabilityRequest,
	StartServiceRequest,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

/// Starts the HTTP server on the configured interface.
pub async fn start_http_server(
	engine: Arc<DispatchEngine>,
	host: &str,
	port: u16,
) -> anyhow::Result<()> {
	let app = router(engine);

	let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;

	info!("HTTP API listening on {}:{}", host, port);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Builds the API router.
pub fn router(engine: Arc<DispatchEngine>) -> Router {
	let state = AppState { engine };

	Router::new()
		.route("/health", get(health_check))
		.route("/api/bookings", post(create_booking).get(get_all_bookings))
		.route("/api/bookings/{id}", get(get_booking))
		.route("/api/bookings/{id}/history", get(get_booking_history))
		.route("/api/bookings/{id}/cancel", patch(cancel_booking))
		.route("/api/bookings/{id}/assign", patch(assign_provider))
		.route("/api/bookings/{id}/accept", patch(accept_booking))
		.route("/api/bookings/{id}/reject", patch(reject_booking))
		.route("/api/bookings/{id}/start", patch(start_service))
		.route("/api/bookings/{id}/complete", patch(complete_service))
		.route("/api/bookings/{id}/no-show", patch(mark_no_show))
		.route("/api/bookings/{id}/override", patch(override_status))
		.route("/api/providers", get(get_all_providers))
		.route("/api/providers/{id}", get(get_provider))
		.route("/api/providers/{id}/availability", patch(update_availability))
		.with_state(state)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

#[derive(Clone)]
struct AppState {
	engine: Arc<DispatchEngine>,
}

/// Error surfaced to HTTP clients with a mapped status code.
enum ApiError {
	Validation(String),
	Lifecycle(LifecycleError),
	Directory(DirectoryError),
}

impl From<LifecycleError> for ApiError {
	fn from(e: LifecycleError) -> Self {
		ApiError::Lifecycle(e)
	}
}

impl From<DirectoryError> for ApiError {
	fn from(e: DirectoryError) -> Self {
		ApiError::Directory(e)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, message) = match self {
			ApiError::Validation(message) => (StatusCode::BAD_REQUEST, message),
			ApiError::Lifecycle(LifecycleError::NotFound) => {
				(StatusCode::NOT_FOUND, "Booking not found".to_string())
			}
			ApiError::Lifecycle(e @ LifecycleError::InvalidTransition { .. }) => {
				(StatusCode::CONFLICT, e.to_string())
			}
			ApiError::Lifecycle(LifecycleError::Storage(e)) => {
				(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
			}
			ApiError::Directory(DirectoryError::NotFound) => {
				(StatusCode::NOT_FOUND, "Provider not found".to_string())
			}
			ApiError::Directory(e @ DirectoryError::DuplicateEmail(_)) => {
				(StatusCode::CONFLICT, e.to_string())
			}
			ApiError::Directory(DirectoryError::Storage(e)) => {
				(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
			}
		};

		(status, Json(ErrorResponse { error: message })).into_response()
	}
}

/// Request-body extractor. A payload that is missing, malformed, or
/// short a required field is a validation failure, so it surfaces as
/// 400 with the standard error body rather than axum's default 422.
struct ApiJson<T>(T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
	Json<T>: FromRequest<S, Rejection = JsonRejection>,
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
		let Json(payload) = Json::<T>::from_request(req, state)
			.await
			.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
		Ok(Self(payload))
	}
}

/// Basic health check
async fn health_check() -> Json<serde_json::Value> {
	Json(serde_json::json!({
		"status": "healthy",
		"timestamp": chrono::Utc::now().to_rfc3339(),
	}))
}

/// POST /api/bookings
async fn create_booking(
	State(state): State<AppState>,
	ApiJson(payload): ApiJson<CreateBookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
	payload
		.validate()
		.map_err(|e| ApiError::Validation(e.to_string()))?;

	let booking = state
		.engine
		.lifecycle()
		.create(NewBooking::from(payload))
		.await?;
	let view = state.engine.lifecycle().booking_view(booking.id).await?;

	Ok((
		StatusCode::CREATED,
		Json(serde_json::json!({
			"message": "Booking created successfully",
			"booking": view,
		})),
	))
}

/// GET /api/bookings
async fn get_all_bookings(
	State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let bookings = state.engine.lifecycle().booking_views().await?;
	Ok(Json(serde_json::json!({ "bookings": bookings })))
}

/// GET /api/bookings/{id}
async fn get_booking(
	State(state): State<AppState>,
	Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let view = state.engine.lifecycle().booking_view(BookingId(id)).await?;
	Ok(Json(serde_json::json!({ "booking": view })))
}

/// GET /api/bookings/{id}/history
async fn get_booking_history(
	State(state): State<AppState>,
	Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let history = state.engine.lifecycle().history(BookingId(id)).await?;
	Ok(Json(serde_json::json!({ "history": history })))
}

/// PATCH /api/bookings/{id}/cancel
async fn cancel_booking(
	State(state): State<AppState>,
	Path(id): Path<Uuid>,
	ApiJson(payload): ApiJson<CancelBookingRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let actor = Actor {
		name: payload.cancelled_by.unwrap_or_else(|| "customer".to_string()),
		role: payload.role.unwrap_or(ActorRole::Customer),
	};
	let reason = payload
		.reason
		.unwrap_or_else(|| "Cancelled by user".to_string());

	let transition = state
		.engine
		.lifecycle()
		.transition(BookingId(id), BookingStatus::Cancelled, actor, reason)
		.await?;

	Ok(applied("Booking cancelled successfully", &transition))
}

/// PATCH /api/bookings/{id}/assign
///
/// Manual assignment is the admin escape hatch: the provider must
/// exist, but availability and capability are deliberately not
/// checked.
async fn assign_provider(
	State(state): State<AppState>,
	Path(id): Path<Uuid>,
	ApiJson(payload): ApiJson<AssignProviderRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
	state.engine.directory().provider(payload.provider_id).await?;

	let transition = state
		.engine
		.lifecycle()
		.assign(
			BookingId(id),
			payload.provider_id,
			Actor::admin("admin"),
			"Manual assignment",
		)
		.await?;

	Ok(applied("Provider assigned successfully", &transition))
}

/// PATCH /api/bookings/{id}/accept
async fn accept_booking(
	State(state): State<AppState>,
	Path(id): Path<Uuid>,
	ApiJson(payload): ApiJson<ProviderActionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let transition = state
		.engine
		.lifecycle()
		.transition(
			BookingId(id),
			BookingStatus::Accepted,
			Actor::provider(payload.provider_id),
			"Provider accepted the booking",
		)
		.await?;

	Ok(applied("Booking accepted successfully", &transition))
}

/// PATCH /api/bookings/{id}/reject
///
/// Re-assignment itself happens in the engine loop reacting to the
/// rejection event.
async fn reject_booking(
	State(state): State<AppState>,
	Path(id): Path<Uuid>,
	ApiJson(payload): ApiJson<ProviderActionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let reason = payload
		.reason
		.unwrap_or_else(|| "Provider rejected the booking".to_string());

	let transition = state
		.engine
		.lifecycle()
		.transition(
			BookingId(id),
			BookingStatus::Rejected,
			Actor::provider(payload.provider_id),
			reason,
		)
		.await?;

	Ok(applied(
		"Booking rejected, reassigning to another provider",
		&transition,
	))
}

/// PATCH /api/bookings/{id}/start
async fn start_service(
	State(state): State<AppState>,
	Path(id): Path<Uuid>,
	ApiJson(payload): ApiJson<StartServiceRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let transition = state
		.engine
		.lifecycle()
		.transition(
			BookingId(id),
			BookingStatus::InProgress,
			Actor::provider(payload.provider_id),
			"Service started",
		)
		.await?;

	Ok(applied("Service started successfully", &transition))
}

/// PATCH /api/bookings/{id}/complete
async fn complete_service(
	State(state): State<AppState>,
	Path(id): Path<Uuid>,
	ApiJson(payload): ApiJson<CompleteServiceRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let reason = payload
		.notes
		.unwrap_or_else(|| "Service completed successfully".to_string());

	let transition = state
		.engine
		.lifecycle()
		.transition(
			BookingId(id),
			BookingStatus::Completed,
			Actor::provider(payload.provider_id),
			reason,
		)
		.await?;

	Ok(applied("Service completed successfully", &transition))
}

/// PATCH /api/bookings/{id}/no-show
async fn mark_no_show(
	State(state): State<AppState>,
	Path(id): Path<Uuid>,
	ApiJson(payload): ApiJson<ProviderActionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let reason = payload
		.reason
		.unwrap_or_else(|| "Customer no-show".to_string());

	let transition = state
		.engine
		.lifecycle()
		.transition(
			BookingId(id),
			BookingStatus::NoShow,
			Actor::provider(payload.provider_id),
			reason,
		)
		.await?;

	Ok(applied("Marked as no-show", &transition))
}

/// PATCH /api/bookings/{id}/override
async fn override_status(
	State(state): State<AppState>,
	Path(id): Path<Uuid>,
	ApiJson(payload): ApiJson<OverrideStatusRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let actor = Actor::admin(payload.admin_name.unwrap_or_else(|| "admin".to_string()));
	let reason = payload
		.reason
		.unwrap_or_else(|| "Manual override by admin".to_string());

	let transition = state
		.engine
		.lifecycle()
		.transition(BookingId(id), payload.new_status, actor, reason)
		.await?;

	Ok(applied("Status overridden successfully", &transition))
}

/// GET /api/providers
async fn get_all_providers(
	State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let providers = state.engine.directory().providers().await?;
	Ok(Json(serde_json::json!({ "providers": providers })))
}

/// GET /api/providers/{id}
async fn get_provider(
	State(state): State<AppState>,
	Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let provider = state.engine.directory().provider(ProviderId(id)).await?;
	Ok(Json(serde_json::json!({ "provider": provider })))
}

/// PATCH /api/providers/{id}/availability
async fn update_availability(
	State(state): State<AppState>,
	Path(id): Path<Uuid>,
	ApiJson(payload): ApiJson<SetAvailabilityRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let provider = state
		.engine
		.directory()
		.set_availability(ProviderId(id), payload.available)
		.await?;

	Ok(Json(serde_json::json!({
		"message": "Availability updated successfully",
		"provider": provider,
	})))
}

fn applied(message: &str, transition: &Transition) -> Json<serde_json::Value> {
	Json(serde_json::json!({
		"message": message,
		"booking_id": transition.booking_id,
		"previous": transition.previous,
		"new_status": transition.new_status,
	}))
}
