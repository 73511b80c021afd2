//! Session middleware for role-gated route groups
//!
//! Each protected group is wrapped once with one of the `require_*`
//! functions. The middleware resolves the bearer token to a [`Session`],
//! checks the group's roles and makes the session available to handlers as
//! `Extension<Session>`.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use portgate_common::{Error, Role};
use std::sync::Arc;
use tracing::debug;

use crate::handlers::{ApiError, AppState};

const ANY_ROLE: &[Role] = &[Role::Client, Role::Operator, Role::Admin];
const CLIENT_ROLES: &[Role] = &[Role::Client, Role::Admin];
const OPERATOR_ROLES: &[Role] = &[Role::Operator, Role::Admin];
const ADMIN_ROLES: &[Role] = &[Role::Admin];

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

async fn authorize(
    state: &AppState,
    mut request: Request,
    next: Next,
    roles: &[Role],
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers()).ok_or(Error::Unauthorized)?;
    let session = state
        .storage
        .get_session(&token)
        .await?
        .ok_or(Error::Unauthorized)?;

    if !roles.contains(&session.role) {
        debug!(
            "User {} ({}) denied {}",
            session.user_id,
            session.role,
            request.uri().path()
        );
        return Err(Error::Forbidden(format!(
            "{} accounts cannot access this resource",
            session.role
        ))
        .into());
    }

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

/// Any signed-in user
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authorize(&state, request, next, ANY_ROLE).await
}

pub async fn require_client(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authorize(&state, request, next, CLIENT_ROLES).await
}

pub async fn require_operator(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authorize(&state, request, next, OPERATOR_ROLES).await
}

pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authorize(&state, request, next, ADMIN_ROLES).await
}
