//! Portgate REST API
//!
//! Port terminal ticketing: containers are scanned at the gate, bound to a
//! yard slot by an operator and followed through entry and exit.
//!
//! ## Architecture
//!
//! - `storage`: records over a key-value [`backend`] (Redis or in-memory);
//!   every multi-record change is one guarded, all-or-nothing batch
//! - `session`: bearer-token middleware applied per role group
//! - `handlers` / `admin`: thin axum handlers over storage
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `POST /api/auth/login`, `POST /api/auth/logout`, `GET /api/auth/me`
//! - `/api/my/*` - Client containers, appointments and ticket requests
//! - `GET /api/scan/{code}`, `POST /api/allocations`, `/api/tickets/*` - Operator workflow
//! - `GET /api/tickets/changes?since=` - Tickets changed after a cursor
//! - `/api/admin/*` - Users, vessels, zones, slots, containers and invoices

pub mod admin;
pub mod backend;
pub mod config;
pub mod handlers;
pub mod models;
pub mod session;
pub mod storage;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use handlers::AppState;
pub use storage::Storage;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let public = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/auth/login", post(handlers::login_handler));

    let authenticated = Router::new()
        .route("/api/auth/logout", post(handlers::logout_handler))
        .route("/api/auth/me", get(handlers::me_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_session,
        ));

    let client = Router::new()
        .route(
            "/api/my/containers",
            get(handlers::my_containers_handler).post(handlers::create_my_container_handler),
        )
        .route(
            "/api/my/appointments",
            get(handlers::my_appointments_handler).post(handlers::book_appointment_handler),
        )
        .route(
            "/api/my/appointments/{id}/cancel",
            post(handlers::cancel_appointment_handler),
        )
        .route(
            "/api/my/tickets",
            get(handlers::my_tickets_handler).post(handlers::request_ticket_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_client,
        ));

    let operator = Router::new()
        // Gate workflow
        .route("/api/scan/{code}", get(handlers::scan_handler))
        .route("/api/zones", get(handlers::zones_handler))
        .route(
            "/api/zones/{id}/slots/available",
            get(handlers::available_slots_handler),
        )
        .route("/api/allocations", post(handlers::allocate_handler))
        // Tickets
        .route("/api/tickets", get(handlers::list_tickets_handler))
        .route("/api/tickets/board", get(handlers::ticket_board_handler))
        .route("/api/tickets/changes", get(handlers::ticket_changes_handler))
        .route("/api/tickets/{id}", get(handlers::get_ticket_handler))
        .route(
            "/api/tickets/{id}/transition",
            post(handlers::transition_ticket_handler),
        )
        // Containers and appointments
        .route("/api/containers", get(handlers::list_containers_handler))
        .route("/api/containers/{id}", get(handlers::get_container_handler))
        .route("/api/appointments", get(handlers::list_appointments_handler))
        .route(
            "/api/appointments/{id}/status",
            post(handlers::appointment_status_handler),
        )
        .route("/api/stats/operator", get(handlers::operator_stats_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_operator,
        ));

    let admin = Router::new()
        .route(
            "/api/admin/users",
            get(admin::list_users_handler).post(admin::create_user_handler),
        )
        .route(
            "/api/admin/users/{id}",
            get(admin::get_user_handler).patch(admin::update_user_handler),
        )
        .route(
            "/api/admin/vessels",
            get(admin::list_vessels_handler).post(admin::create_vessel_handler),
        )
        .route("/api/admin/zones", post(admin::create_zone_handler))
        .route(
            "/api/admin/zones/{id}/slots",
            get(admin::zone_slots_handler).post(admin::create_slot_handler),
        )
        .route("/api/admin/slots/{id}", patch(admin::slot_state_handler))
        .route("/api/admin/containers", post(admin::create_container_handler))
        .route(
            "/api/admin/containers/{id}",
            patch(admin::update_container_handler),
        )
        .route(
            "/api/admin/invoices",
            get(admin::list_invoices_handler).post(admin::issue_invoice_handler),
        )
        .route("/api/admin/invoices/{id}", get(admin::get_invoice_handler))
        .route(
            "/api/admin/invoices/{id}/payments",
            get(admin::list_payments_handler).post(admin::record_payment_handler),
        )
        .route(
            "/api/admin/invoices/{id}/void",
            post(admin::void_invoice_handler),
        )
        .route("/api/stats/admin", get(admin::admin_stats_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_admin,
        ));

    Router::new()
        .merge(public)
        .merge(authenticated)
        .merge(client)
        .merge(operator)
        .merge(admin)
        // Middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
