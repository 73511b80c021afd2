//! Administrator handlers: users, vessels, zones, slots, containers and billing

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use portgate_common::{
    Container, ContainerPatch, Invoice, NewContainer, NewUser, Payment, Slot, UserPatch,
    UserProfile, Vessel, Zone,
};
use std::sync::Arc;
use tracing::info;

use crate::handlers::{ApiResult, AppState};
use crate::models::{
    AdminStats, IssueInvoiceRequest, ListResponse, NewSlot, NewVessel, NewZone, PaymentReceipt,
    PaymentRequest, SlotStateRequest, UsersQuery,
};

pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UsersQuery>,
) -> ApiResult<Json<ListResponse<UserProfile>>> {
    let users = state.storage.list_users(query.role).await?;
    let profiles: Vec<UserProfile> = users.iter().map(UserProfile::from).collect();
    Ok(Json(profiles.into()))
}

pub async fn create_user_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    let user = state.storage.create_user(payload).await?;
    Ok((StatusCode::CREATED, Json(UserProfile::from(&user))))
}

pub async fn get_user_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<UserProfile>> {
    let user = state.storage.get_user(id).await?;
    Ok(Json(UserProfile::from(&user)))
}

pub async fn update_user_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(payload): Json<UserPatch>,
) -> ApiResult<Json<UserProfile>> {
    let user = state.storage.update_user(id, payload).await?;
    Ok(Json(UserProfile::from(&user)))
}

pub async fn list_vessels_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ListResponse<Vessel>>> {
    Ok(Json(state.storage.list_vessels().await?.into()))
}

pub async fn create_vessel_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewVessel>,
) -> ApiResult<(StatusCode, Json<Vessel>)> {
    let vessel = state.storage.create_vessel(payload).await?;
    Ok((StatusCode::CREATED, Json(vessel)))
}

pub async fn create_zone_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewZone>,
) -> ApiResult<(StatusCode, Json<Zone>)> {
    let zone = state.storage.create_zone(payload).await?;
    Ok((StatusCode::CREATED, Json(zone)))
}

/// Every slot of a zone, whatever its state
pub async fn zone_slots_handler(
    State(state): State<Arc<AppState>>,
    Path(zone_id): Path<u64>,
) -> ApiResult<Json<ListResponse<Slot>>> {
    Ok(Json(state.storage.list_zone_slots(zone_id).await?.into()))
}

pub async fn create_slot_handler(
    State(state): State<Arc<AppState>>,
    Path(zone_id): Path<u64>,
    Json(payload): Json<NewSlot>,
) -> ApiResult<(StatusCode, Json<Slot>)> {
    let slot = state.storage.create_slot(zone_id, payload).await?;
    Ok((StatusCode::CREATED, Json(slot)))
}

pub async fn slot_state_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(payload): Json<SlotStateRequest>,
) -> ApiResult<Json<Slot>> {
    let slot = state.storage.set_slot_state(id, payload.state).await?;
    Ok(Json(slot))
}

/// Register a container on behalf of a client (`owner_id` in the body)
pub async fn create_container_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewContainer>,
) -> ApiResult<(StatusCode, Json<Container>)> {
    let container = state.storage.register_container(payload).await?;
    Ok((StatusCode::CREATED, Json(container)))
}

pub async fn update_container_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(payload): Json<ContainerPatch>,
) -> ApiResult<Json<Container>> {
    let container = state.storage.update_container(id, payload).await?;
    Ok(Json(container))
}

pub async fn list_invoices_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ListResponse<Invoice>>> {
    Ok(Json(state.storage.list_invoices().await?.into()))
}

pub async fn issue_invoice_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IssueInvoiceRequest>,
) -> ApiResult<(StatusCode, Json<Invoice>)> {
    let invoice = state
        .storage
        .issue_invoice(payload.ticket_id, payload.amount_cents)
        .await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn get_invoice_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Invoice>> {
    Ok(Json(state.storage.get_invoice(id).await?))
}

pub async fn list_payments_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<ListResponse<Payment>>> {
    Ok(Json(state.storage.list_payments(id).await?.into()))
}

pub async fn record_payment_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(payload): Json<PaymentRequest>,
) -> ApiResult<(StatusCode, Json<PaymentReceipt>)> {
    let receipt = state.storage.record_payment(id, payload).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn void_invoice_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Invoice>> {
    let invoice = state.storage.void_invoice(id).await?;
    info!("Invoice #{} voided by administrator", id);
    Ok(Json(invoice))
}

pub async fn admin_stats_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<AdminStats>> {
    Ok(Json(state.storage.admin_stats().await?))
}
