//! Integration tests for the Portgate API

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use portgate_api::{create_router, AppState, Storage};
use serde_json::{json, Value};
use tower::ServiceExt; // for `oneshot`

const ADMIN_EMAIL: &str = "admin@portgate.test";
const ADMIN_PASSWORD: &str = "admin-pass";

/// Helper to create a test app over in-memory storage with one administrator
async fn create_test_app() -> Router {
    let storage = Storage::in_memory();
    storage
        .ensure_admin(ADMIN_EMAIL, ADMIN_PASSWORD, "Administrator")
        .await
        .unwrap();

    create_router(AppState::new(storage, 3600))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["token"].as_str().unwrap().to_string()
}

async fn create_user(app: &Router, admin: &str, email: &str, role: &str) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/admin/users",
        Some(admin),
        Some(json!({
            "name": email,
            "email": email,
            "password": "secret-1",
            "role": role
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create user failed: {}", body);
    body
}

/// Zone "B" with slots B-01 (maintenance), B-02 (reserved) and B-03 (empty)
async fn seed_yard(app: &Router, admin: &str) -> (u64, u64, Vec<u64>) {
    let (status, vessel) = send(
        app,
        Method::POST,
        "/api/admin/vessels",
        Some(admin),
        Some(json!({ "name": "Callao Express", "shipping_line": "Hapag-Lloyd" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, zone) = send(
        app,
        Method::POST,
        "/api/admin/zones",
        Some(admin),
        Some(json!({ "name": "B", "capacity": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let zone_id = zone["id"].as_u64().unwrap();

    let mut slots = Vec::new();
    for (row, state) in [(1, Some("maintenance")), (2, Some("reserved")), (3, None)] {
        let (status, slot) = send(
            app,
            Method::POST,
            &format!("/api/admin/zones/{}/slots", zone_id),
            Some(admin),
            Some(json!({ "label": format!("B-0{}", row), "row": row, "column": 1, "level": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let slot_id = slot["id"].as_u64().unwrap();

        if let Some(state) = state {
            let (status, _) = send(
                app,
                Method::PATCH,
                &format!("/api/admin/slots/{}", slot_id),
                Some(admin),
                Some(json!({ "state": state })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
        slots.push(slot_id);
    }

    (vessel["id"].as_u64().unwrap(), zone_id, slots)
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app().await;

    let (status, json) = send(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "portgate-api");
}

#[tokio::test]
async fn test_gate_to_exit_scenario() {
    let app = create_test_app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    create_user(&app, &admin, "client@portgate.test", "client").await;
    let operator_user = create_user(&app, &admin, "operator@portgate.test", "operator").await;
    let (vessel_id, zone_id, slots) = seed_yard(&app, &admin).await;
    let b03 = slots[2];

    // client registers a container and books a pickup window
    let client = login(&app, "client@portgate.test", "secret-1").await;
    let (status, container) = send(
        &app,
        Method::POST,
        "/api/my/containers",
        Some(&client),
        Some(json!({
            "code": "mscu1234567",
            "dimensions": "40ft",
            "kind": "dry",
            "weight_kg": 12500.0,
            "vessel_id": vessel_id
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(container["code"], "MSCU1234567");
    let container_id = container["id"].as_u64().unwrap();

    let (status, booking) = send(
        &app,
        Method::POST,
        "/api/my/appointments",
        Some(&client),
        Some(json!({
            "container_id": container_id,
            "vessel_id": vessel_id,
            "send_date": "2024-02-01",
            "pickup_date": "2024-02-10"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["appointment"]["duration_days"], 9);
    assert_eq!(booking["appointment"]["status"], "scheduled");
    assert_eq!(
        booking["container"]["appointment_id"],
        booking["appointment"]["id"]
    );

    // operator scans and picks a slot
    let operator = login(&app, "operator@portgate.test", "secret-1").await;
    let (status, scanned) = send(
        &app,
        Method::GET,
        "/api/scan/MSCU1234567",
        Some(&operator),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scanned["container"]["id"], container_id);

    let (status, available) = send(
        &app,
        Method::GET,
        &format!("/api/zones/{}/slots/available", zone_id),
        Some(&operator),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(available["total"], 1);
    assert_eq!(available["items"][0]["label"], "B-03");

    let (status, allocation) = send(
        &app,
        Method::POST,
        "/api/allocations",
        Some(&operator),
        Some(json!({ "container_id": container_id, "slot_id": b03 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(allocation["slot"]["state"], "occupied");
    assert_eq!(allocation["ticket"]["status"], "validated");
    assert_eq!(allocation["ticket"]["slot_id"], b03);
    assert_eq!(allocation["ticket"]["assigned_user_id"], operator_user["id"]);
    let ticket_id = allocation["ticket"]["id"].as_u64().unwrap();

    // a second scan of the same container is rejected
    let (status, body) = send(
        &app,
        Method::GET,
        "/api/scan/mscu1234567",
        Some(&operator),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already processed"));

    // the slot is no longer offered
    let (_, available) = send(
        &app,
        Method::GET,
        &format!("/api/zones/{}/slots/available", zone_id),
        Some(&operator),
        None,
    )
    .await;
    assert_eq!(available["total"], 0);

    // entry then exit
    for status_name in ["active", "finalized"] {
        let (status, ticket) = send(
            &app,
            Method::POST,
            &format!("/api/tickets/{}/transition", ticket_id),
            Some(&operator),
            Some(json!({ "status": status_name })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ticket["status"], status_name);
    }

    let (_, ticket) = send(
        &app,
        Method::GET,
        &format!("/api/tickets/{}", ticket_id),
        Some(&operator),
        None,
    )
    .await;
    assert!(ticket["exited_at"].is_string());

    // finalization released the slot
    let (_, available) = send(
        &app,
        Method::GET,
        &format!("/api/zones/{}/slots/available", zone_id),
        Some(&operator),
        None,
    )
    .await;
    assert_eq!(available["items"][0]["id"], b03);

    // terminal tickets do not move
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/tickets/{}/transition", ticket_id),
        Some(&operator),
        Some(json!({ "status": "cancelled" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // the client sees its ticket
    let (status, mine) = send(&app, Method::GET, "/api/my/tickets", Some(&client), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["total"], 1);
    assert_eq!(mine["items"][0]["status"], "finalized");
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = create_test_app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let user = create_user(&app, &admin, "inactive@portgate.test", "client").await;

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/api/admin/users/{}", user["id"]),
        Some(&admin),
        Some(json!({ "active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let attempts = [
        (ADMIN_EMAIL, "wrong-password"),
        ("nobody@portgate.test", ADMIN_PASSWORD),
        ("inactive@portgate.test", "secret-1"),
    ];

    let mut bodies = Vec::new();
    for (email, password) in attempts {
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        bodies.push(body);
    }

    assert_eq!(bodies[0], json!({ "error": "invalid credentials" }));
    assert!(bodies.iter().all(|body| *body == bodies[0]));
}

#[tokio::test]
async fn test_login_response_hides_password_hash() {
    let app = create_test_app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "ADMIN@portgate.test", "password": ADMIN_PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "admin");
    assert!(body["user"].get("password_hash").is_none());

    let token = body["token"].as_str().unwrap();
    let (status, me) = send(&app, Method::GET, "/api/auth/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], ADMIN_EMAIL);

    let (status, _) = send(&app, Method::POST, "/api/auth/logout", Some(token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, "/api/auth/me", Some(token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_role_groups() {
    let app = create_test_app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    create_user(&app, &admin, "client@portgate.test", "client").await;
    create_user(&app, &admin, "operator@portgate.test", "operator").await;
    let client = login(&app, "client@portgate.test", "secret-1").await;
    let operator = login(&app, "operator@portgate.test", "secret-1").await;

    let (status, _) = send(&app, Method::GET, "/api/tickets", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/api/tickets", Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/api/tickets", Some(&client), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::GET, "/api/my/tickets", Some(&operator), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::GET, "/api/admin/users", Some(&operator), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // admins reach every group
    for uri in ["/api/tickets", "/api/my/tickets", "/api/admin/users", "/api/stats/admin"] {
        let (status, _) = send(&app, Method::GET, uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
    }

    let (status, _) = send(&app, Method::GET, "/api/tickets", Some(&operator), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_deactivated_user_loses_sessions() {
    let app = create_test_app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let user = create_user(&app, &admin, "operator@portgate.test", "operator").await;
    let operator = login(&app, "operator@portgate.test", "secret-1").await;

    let (status, _) = send(&app, Method::GET, "/api/tickets", Some(&operator), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/api/admin/users/{}", user["id"]),
        Some(&admin),
        Some(json!({ "active": false, "role": "client" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    for uri in ["/api/tickets", "/api/my/tickets", "/api/auth/me"] {
        let (status, _) = send(&app, Method::GET, uri, Some(&operator), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
    }
}

#[tokio::test]
async fn test_allocation_errors() {
    let app = create_test_app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (vessel_id, _, slots) = seed_yard(&app, &admin).await;

    let mut containers = Vec::new();
    for code in ["TGHU0000001", "TGHU0000002"] {
        let (status, container) = send(
            &app,
            Method::POST,
            "/api/admin/containers",
            Some(&admin),
            Some(json!({
                "code": code,
                "dimensions": "20ft",
                "kind": "reefer",
                "weight_kg": 9000.0,
                "vessel_id": vessel_id
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        containers.push(container["id"].as_u64().unwrap());
    }

    // maintenance slot
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/allocations",
        Some(&admin),
        Some(json!({ "container_id": containers[0], "slot_id": slots[0] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("not available"));

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/allocations",
        Some(&admin),
        Some(json!({ "container_id": containers[0], "slot_id": slots[2] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // occupied slot
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/allocations",
        Some(&admin),
        Some(json!({ "container_id": containers[1], "slot_id": slots[2] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // occupied slots cannot be changed by hand
    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/api/admin/slots/{}", slots[2]),
        Some(&admin),
        Some(json!({ "state": "empty" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, Method::GET, "/api/scan/UNKNOWN1", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/allocations",
        Some(&admin),
        Some(json!({ "container_id": 999, "slot_id": slots[2] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_appointment_window() {
    let app = create_test_app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (vessel_id, _, _) = seed_yard(&app, &admin).await;

    let (_, container) = send(
        &app,
        Method::POST,
        "/api/my/containers",
        Some(&admin),
        Some(json!({
            "code": "CMAU7777777",
            "dimensions": "40ft",
            "kind": "dry",
            "weight_kg": 10000.0,
            "vessel_id": vessel_id
        })),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/my/appointments",
        Some(&admin),
        Some(json!({
            "container_id": container["id"],
            "vessel_id": vessel_id,
            "send_date": "2024-02-10",
            "pickup_date": "2024-02-01"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("pickup date"));

    let (_, appointments) = send(&app, Method::GET, "/api/appointments", Some(&admin), None).await;
    assert_eq!(appointments["total"], 0);
}

#[tokio::test]
async fn test_ticket_changes_feed() {
    let app = create_test_app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (vessel_id, _, slots) = seed_yard(&app, &admin).await;

    let (status, start) = send(
        &app,
        Method::GET,
        "/api/tickets/changes",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(start["tickets"], json!([]));
    assert_eq!(start["cursor"], 0);

    let (_, container) = send(
        &app,
        Method::POST,
        "/api/admin/containers",
        Some(&admin),
        Some(json!({
            "code": "HLCU1111111",
            "dimensions": "20ft",
            "kind": "dry",
            "weight_kg": 7000.0,
            "vessel_id": vessel_id
        })),
    )
    .await;
    let (_, allocation) = send(
        &app,
        Method::POST,
        "/api/allocations",
        Some(&admin),
        Some(json!({ "container_id": container["id"], "slot_id": slots[2] })),
    )
    .await;
    let ticket_id = allocation["ticket"]["id"].clone();

    let (_, first) = send(
        &app,
        Method::GET,
        "/api/tickets/changes?since=0",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(first["tickets"][0]["id"], ticket_id);
    let cursor = first["cursor"].as_u64().unwrap();
    assert!(cursor > 0);

    let (_, idle) = send(
        &app,
        Method::GET,
        &format!("/api/tickets/changes?since={}", cursor),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(idle["tickets"], json!([]));
    assert_eq!(idle["cursor"], cursor);

    send(
        &app,
        Method::POST,
        &format!("/api/tickets/{}/transition", ticket_id),
        Some(&admin),
        Some(json!({ "status": "active" })),
    )
    .await;

    let (_, next) = send(
        &app,
        Method::GET,
        &format!("/api/tickets/changes?since={}", cursor),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(next["tickets"][0]["status"], "active");
    assert!(next["cursor"].as_u64().unwrap() > cursor);
}

#[tokio::test]
async fn test_ticket_board_details() {
    let app = create_test_app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (vessel_id, _, slots) = seed_yard(&app, &admin).await;

    let (_, container) = send(
        &app,
        Method::POST,
        "/api/admin/containers",
        Some(&admin),
        Some(json!({
            "code": "MAEU2222222",
            "dimensions": "40ft",
            "kind": "dry",
            "weight_kg": 11000.0,
            "vessel_id": vessel_id
        })),
    )
    .await;
    send(
        &app,
        Method::POST,
        "/api/allocations",
        Some(&admin),
        Some(json!({ "container_id": container["id"], "slot_id": slots[2] })),
    )
    .await;

    let (status, board) = send(
        &app,
        Method::GET,
        "/api/tickets/board?status=validated",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["total"], 1);
    assert_eq!(board["items"][0]["container_code"], "MAEU2222222");
    assert_eq!(board["items"][0]["slot_label"], "B-03");
    assert_eq!(board["items"][0]["zone_name"], "B");

    let (_, none) = send(
        &app,
        Method::GET,
        "/api/tickets/board?status=active",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(none["total"], 0);
}
