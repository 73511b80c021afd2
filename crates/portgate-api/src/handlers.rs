//! API request handlers for authentication, client and operator routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use portgate_common::{Appointment, Container, Error, NewContainer, Slot, Ticket, UserProfile, Zone};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::models::{
    AllocateRequest, Allocation, AppointmentStatusRequest, BookAppointmentRequest, Booking,
    ChangesQuery, ListResponse, LoginRequest, LoginResponse, OperatorStats, ScanResult, Session,
    TicketChanges, TicketDetails, TicketFilter, TicketRequest, TransitionRequest,
};
use crate::storage::Storage;

/// Shared application state
pub struct AppState {
    pub storage: Storage,

    /// Lifetime of login sessions
    pub session_ttl_secs: u64,
}

impl AppState {
    pub fn new(storage: Storage, session_ttl_secs: u64) -> Self {
        Self {
            storage,
            session_ttl_secs,
        }
    }
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::AlreadyProcessed { .. }
            | Error::SlotUnavailable { .. }
            | Error::InvalidTransition { .. }
            | Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::InvalidCredentials | Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Redis(_) | Error::JsonSerialization(_) | Error::Other(_) => {
                error!("Internal error: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Health check endpoint
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.storage.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "service": "portgate-api"
            })),
        ),
        Err(err) => {
            warn!("Storage health check failed: {}", err);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unhealthy",
                    "service": "portgate-api",
                    "error": err.to_string()
                })),
            )
        }
    }
}

// Authentication

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let user = state
        .storage
        .authenticate(&payload.email, &payload.password)
        .await
        .map_err(|err| {
            if matches!(err, Error::InvalidCredentials) {
                info!("Rejected login attempt");
            }
            err
        })?;

    let session = state
        .storage
        .create_session(&user, state.session_ttl_secs)
        .await?;

    info!("User {} logged in as {}", user.id, user.role);
    Ok(Json(LoginResponse {
        token: session.token,
        user: UserProfile::from(&user),
    }))
}

pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> ApiResult<StatusCode> {
    state.storage.delete_session(&session.token).await?;
    info!("User {} logged out", session.user_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<UserProfile>> {
    let user = state.storage.get_user(session.user_id).await?;
    Ok(Json(UserProfile::from(&user)))
}

// Client routes

pub async fn my_containers_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<ListResponse<Container>>> {
    let containers = state
        .storage
        .list_containers(Some(session.user_id))
        .await?;
    Ok(Json(containers.into()))
}

/// Register a container owned by the caller
pub async fn create_my_container_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(mut payload): Json<NewContainer>,
) -> ApiResult<(StatusCode, Json<Container>)> {
    payload.owner_id = Some(session.user_id);
    let container = state.storage.register_container(payload).await?;
    Ok((StatusCode::CREATED, Json(container)))
}

pub async fn my_appointments_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<ListResponse<Appointment>>> {
    let appointments = state
        .storage
        .list_appointments(Some(session.user_id))
        .await?;
    Ok(Json(appointments.into()))
}

pub async fn book_appointment_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(payload): Json<BookAppointmentRequest>,
) -> ApiResult<(StatusCode, Json<Booking>)> {
    info!(
        "User {} booking container {} from {} to {}",
        session.user_id, payload.container_id, payload.send_date, payload.pickup_date
    );
    let booking = state.storage.book_appointment(&session, payload).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn cancel_appointment_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Appointment>> {
    let appointment = state.storage.cancel_appointment(id, &session).await?;
    Ok(Json(appointment))
}

pub async fn my_tickets_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<ListResponse<Ticket>>> {
    let tickets = state.storage.list_client_tickets(session.user_id).await?;
    Ok(Json(tickets.into()))
}

pub async fn request_ticket_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(payload): Json<TicketRequest>,
) -> ApiResult<(StatusCode, Json<Ticket>)> {
    let ticket = state
        .storage
        .request_ticket(payload.container_id, &session)
        .await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

// Operator routes

/// Resolve a scanned container code
pub async fn scan_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(code): Path<String>,
) -> ApiResult<Json<ScanResult>> {
    info!("Operator {} scanned {}", session.user_id, code);
    let result = state.storage.scan(&code).await?;
    Ok(Json(result))
}

pub async fn zones_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ListResponse<Zone>>> {
    Ok(Json(state.storage.list_zones().await?.into()))
}

pub async fn available_slots_handler(
    State(state): State<Arc<AppState>>,
    Path(zone_id): Path<u64>,
) -> ApiResult<Json<ListResponse<Slot>>> {
    Ok(Json(state.storage.available_slots(zone_id).await?.into()))
}

/// Bind a slot to a container; the caller becomes the assigned operator
pub async fn allocate_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(payload): Json<AllocateRequest>,
) -> ApiResult<(StatusCode, Json<Allocation>)> {
    let allocation = state
        .storage
        .allocate(payload.container_id, payload.slot_id, session.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(allocation)))
}

pub async fn list_tickets_handler(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<TicketFilter>,
) -> ApiResult<Json<ListResponse<Ticket>>> {
    Ok(Json(state.storage.list_tickets(&filter).await?.into()))
}

pub async fn ticket_board_handler(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<TicketFilter>,
) -> ApiResult<Json<ListResponse<TicketDetails>>> {
    Ok(Json(state.storage.ticket_board(&filter).await?.into()))
}

/// Tickets changed since a cursor
pub async fn ticket_changes_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChangesQuery>,
) -> ApiResult<Json<TicketChanges>> {
    Ok(Json(state.storage.ticket_changes(query.since).await?))
}

pub async fn get_ticket_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(state.storage.get_ticket(id).await?))
}

pub async fn transition_ticket_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<u64>,
    Json(payload): Json<TransitionRequest>,
) -> ApiResult<Json<Ticket>> {
    info!(
        "User {} moving ticket #{} to {}",
        session.user_id, id, payload.status
    );
    let ticket = state.storage.transition(id, payload.status).await?;
    Ok(Json(ticket))
}

pub async fn list_containers_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ListResponse<Container>>> {
    Ok(Json(state.storage.list_containers(None).await?.into()))
}

pub async fn get_container_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Container>> {
    Ok(Json(state.storage.get_container(id).await?))
}

pub async fn list_appointments_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ListResponse<Appointment>>> {
    Ok(Json(state.storage.list_appointments(None).await?.into()))
}

pub async fn appointment_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(payload): Json<AppointmentStatusRequest>,
) -> ApiResult<Json<Appointment>> {
    let appointment = state
        .storage
        .set_appointment_status(id, payload.status)
        .await?;
    Ok(Json(appointment))
}

pub async fn operator_stats_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<OperatorStats>> {
    let today = Utc::now().date_naive();
    Ok(Json(
        state.storage.operator_stats(session.user_id, today).await?,
    ))
}
