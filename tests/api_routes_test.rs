mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use common::TestApp;
use serde_json::{json, Value};

async fn create_pen(app: &TestApp, number: &str, capacity: i32) -> String {
    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/pens",
            Some(json!({
                "pen_number": number,
                "capacity": capacity,
                "pen_type": "FATTENING",
                "location": "Sector 2"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_str().expect("pen id").to_string()
}

async fn create_lot(app: &TestApp, head: i32) -> String {
    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/cattle-lots",
            Some(json!({
                "entry_quantity": head,
                "entry_weight": (head * 300).to_string(),
                "acquisition_cost": "150000.00",
                "vendor_name": "Fazenda Santa Rita"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["success"], Value::Bool(true));
    assert_eq!(body["data"]["status"], "PENDING");
    body["data"]["id"].as_str().expect("lot id").to_string()
}

async fn receive(app: &TestApp, lot_id: &str, head: i32) {
    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/cattle-lots/{lot_id}/reception"),
            Some(json!({
                "received_quantity": head,
                "received_weight": (head * 300).to_string()
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["lot"]["status"], "ACTIVE");
}

#[tokio::test]
async fn health_and_openapi_are_served() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "healthy");

    let (status, body) = app.request(Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], Value::Bool(true));

    let (status, body) = app
        .request(Method::GET, "/api-docs/openapi.json", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]
        .as_object()
        .expect("paths")
        .contains_key("/api/v1/cattle-purchases/:id/pens"));
}

#[tokio::test]
async fn allocation_over_capacity_returns_conflict() {
    let app = TestApp::new().await;
    let pen_id = create_pen(&app, "P-10", 80).await;
    let lot_id = create_lot(&app, 100).await;
    receive(&app, &lot_id, 100).await;

    let uri = format!("/api/v1/cattle-purchases/{lot_id}/pens");
    let (status, body) = app
        .request(
            Method::POST,
            &uri,
            Some(json!({ "allocations": [{ "pen_id": pen_id, "quantity": 60 }] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"][0]["quantity"], 60);
    assert_eq!(body["data"][0]["pen_id"], Value::String(pen_id.clone()));

    let (status, body) = app
        .request(
            Method::POST,
            &uri,
            Some(json!({ "allocations": [{ "pen_id": pen_id, "quantity": 25 }] })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");
    assert!(body["message"].as_str().expect("message").contains("capacity for 20 head"));

    let (status, body) = app
        .request(Method::GET, &format!("/api/v1/pens/{pen_id}/occupancy"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["occupied"], 60);
    assert_eq!(body["data"]["available"], 20);
}

#[tokio::test]
async fn allocating_more_than_the_lot_holds_is_unprocessable() {
    let app = TestApp::new().await;
    let first = create_pen(&app, "Q-01", 40).await;
    let second = create_pen(&app, "Q-02", 40).await;
    let lot_id = create_lot(&app, 50).await;
    receive(&app, &lot_id, 50).await;

    let (status, _) = app
        .request(
            Method::POST,
            &format!("/api/v1/cattle-purchases/{lot_id}/pens"),
            Some(json!({ "allocations": [
                { "pen_id": first, "quantity": 30 },
                { "pen_id": second, "quantity": 30 }
            ] })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = app
        .request(
            Method::GET,
            &format!("/api/v1/cattle-lots/{lot_id}/allocations"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().expect("allocations").len(), 0);
}

#[tokio::test]
async fn costs_and_metrics_flow_through_the_api() {
    let app = TestApp::new().await;
    let pen_id = create_pen(&app, "R-01", 60).await;
    let lot_id = create_lot(&app, 50).await;
    receive(&app, &lot_id, 50).await;
    let (status, _) = app
        .request(
            Method::POST,
            &format!("/api/v1/cattle-purchases/{lot_id}/pens"),
            Some(json!({ "allocations": [{ "pen_id": pen_id, "quantity": 50 }] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .request(
            Method::PATCH,
            &format!("/api/v1/cattle-lots/{lot_id}/costs"),
            Some(json!({ "category": "FEED", "amount": "5000.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/pens/{pen_id}/costs"),
            Some(json!({ "category": "HEALTH", "amount": "500.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = app
        .request(
            Method::GET,
            &format!("/api/v1/cattle-lots/{lot_id}/metrics"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["remaining_animals"], 50);
    let per_head: f64 = body["data"]["cost_per_head"]
        .as_str()
        .expect("decimal as string")
        .parse()
        .expect("number");
    assert!((per_head - 3110.0).abs() < 0.01, "{per_head}");

    let (status, body) = app
        .request(
            Method::GET,
            &format!("/api/v1/cattle-lots/{lot_id}/movements?limit=10"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["movement_type"], "ALLOCATION");
}

#[tokio::test]
async fn invalid_input_and_unknown_ids() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/cattle-lots",
            Some(json!({
                "entry_quantity": 0,
                "entry_weight": "1000",
                "acquisition_cost": "1000"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bad Request");

    let missing = uuid::Uuid::new_v4();
    let (status, body) = app
        .request(Method::GET, &format!("/api/v1/cattle-lots/{missing}"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not Found");

    let (status, _) = app
        .request(Method::GET, &format!("/api/v1/pens/{missing}"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn request_id_is_echoed() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .uri("/api/v1/pens")
        .header("x-request-id", "req-feedlot-42")
        .body(Body::empty())
        .expect("request");

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("req-feedlot-42")
    );
}

#[tokio::test]
async fn oversized_amounts_are_rejected_not_panicked() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/cattle-lots",
            Some(json!({
                "entry_quantity": 10,
                "entry_weight": "100000000000000000000",
                "price_per_arroba": "1000000000000"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    // Inputs within column limits whose product is not
    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/cattle-lots",
            Some(json!({
                "entry_quantity": 10,
                "entry_weight": "9999999999999",
                "price_per_arroba": "99999999999999"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let lot_id = create_lot(&app, 10).await;
    receive(&app, &lot_id, 10).await;
    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/cattle-lots/{lot_id}/sales"),
            Some(json!({
                "quantity": 1,
                "total_weight": "9999999999999",
                "price_per_arroba": "99999999999999"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = app
        .request(Method::GET, &format!("/api/v1/cattle-lots/{lot_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["current_quantity"], 10);
}
