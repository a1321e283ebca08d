//! Control-plane router tests: authentication, CRUD flows, and the DB
//! error mapping.

mod test_utils;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use tranche::config::AppConfig;
use tranche::server::{create_app, AppState};

async fn app_with_admin(admin_token: &str) -> (axum::Router, sea_orm::DatabaseConnection, i64) {
    let db = test_utils::setup_test_db().await.unwrap();
    let customer = test_utils::create_customer(&db, "acme").await.unwrap();
    test_utils::create_token(&db, customer.id, "valid-token").await.unwrap();

    let config = AppConfig {
        control_plane_admin_token: admin_token.to_string(),
        ..AppConfig::default()
    };
    let state = AppState {
        db: db.clone(),
        config: Arc::new(config),
    };
    (create_app(state), db, customer.id)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_endpoints_respond() {
    let (app, _db, _customer) = app_with_admin("").await;

    let response = app.clone().oneshot(get("/healthz", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/readyz", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let (app, _db, _customer) = app_with_admin("").await;
    let response = app.oneshot(get("/v1/services", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_token_is_unauthorized() {
    let (app, _db, _customer) = app_with_admin("").await;
    let response = app
        .oneshot(get("/v1/services", Some("wrong-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn x_api_key_header_authenticates() {
    let (app, _db, _customer) = app_with_admin("").await;
    let request = Request::builder()
        .uri("/v1/services")
        .header("X-API-Key", "valid-token")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn revoked_tokens_stop_working() {
    let (app, db, customer_id) = app_with_admin("").await;
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
    use tranche::models::customer_token;

    let token = customer_token::Entity::find()
        .filter(customer_token::Column::CustomerId.eq(customer_id))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    let mut active: customer_token::ActiveModel = token.into();
    active.revoked_at = Set(Some(Utc::now().fixed_offset()));
    active.update(&db).await.unwrap();

    let response = app
        .oneshot(get("/v1/services", Some("valid-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_token_requires_customer_scope() {
    let (app, _db, customer_id) = app_with_admin("admin-secret").await;

    let response = app
        .clone()
        .oneshot(get("/v1/services", Some("admin-secret")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .uri("/v1/services")
        .header("Authorization", "Bearer admin-secret")
        .header("X-Customer-ID", customer_id.to_string())
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Query-parameter scope works too.
    let response = app
        .oneshot(get(
            &format!("/v1/services?customer_id={customer_id}"),
            Some("admin-secret"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn service_crud_round_trip() {
    let (app, _db, _customer) = app_with_admin("").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/services",
            "valid-token",
            serde_json::json!({
                "name": "app",
                "primary_cdn": "cdn-a.example.net",
                "backup_cdn": "cdn-b.example.net"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let service_id = created["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(get(&format!("/v1/services/{service_id}"), Some("valid-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let detail = body_json(response).await;
    assert_eq!(detail["service"]["name"], "app");
    assert_eq!(detail["domains"], serde_json::json!([]));

    let patch = Request::builder()
        .method("PATCH")
        .uri(format!("/v1/services/{service_id}"))
        .header("Authorization", "Bearer valid-token")
        .header("Content-Type", "application/json")
        .body(Body::from(
            serde_json::json!({ "backup_cdn": "cdn-c.example.net" }).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(patch).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["backup_cdn"], "cdn-c.example.net");
    assert_eq!(updated["name"], "app");

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/v1/services/{service_id}"))
        .header("Authorization", "Bearer valid-token")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Soft-deleted services disappear from reads.
    let response = app
        .oneshot(get(&format!("/v1/services/{service_id}"), Some("valid-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_payloads_are_rejected() {
    let (app, _db, _customer) = app_with_admin("").await;

    // Unknown fields are rejected.
    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/services",
            "valid-token",
            serde_json::json!({
                "name": "app",
                "primary_cdn": "a",
                "backup_cdn": "b",
                "surprise": true
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Blank required fields are rejected with a field map.
    let response = app
        .oneshot(post_json(
            "/v1/services",
            "valid-token",
            serde_json::json!({ "name": " ", "primary_cdn": "a", "backup_cdn": "b" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["details"]["name"], "cannot be blank");
}

#[tokio::test]
async fn duplicate_domain_maps_to_conflict() {
    let (app, db, customer_id) = app_with_admin("").await;
    let service = test_utils::create_service(&db, customer_id, "app").await.unwrap();

    let uri = format!("/v1/services/{}/domains", service.id);
    let body = serde_json::json!({ "name": "app.example.com" });

    let response = app
        .clone()
        .oneshot(post_json(&uri, "valid-token", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.oneshot(post_json(&uri, "valid-token", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn foreign_service_is_not_found() {
    let (app, db, _customer) = app_with_admin("").await;
    let other = test_utils::create_customer(&db, "globex").await.unwrap();
    let foreign = test_utils::create_service(&db, other.id, "their-app").await.unwrap();

    let response = app
        .oneshot(get(&format!("/v1/services/{}", foreign.id), Some("valid-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn storm_policy_crud_round_trip() {
    let (app, db, customer_id) = app_with_admin("").await;
    let service = test_utils::create_service(&db, customer_id, "app").await.unwrap();
    let base = format!("/v1/services/{}/storm-policies", service.id);

    let response = app
        .clone()
        .oneshot(post_json(
            &base,
            "valid-token",
            serde_json::json!({
                "kind": "http_availability",
                "threshold_avail": 0.9,
                "window_seconds": 60,
                "cooldown_seconds": 300,
                "max_coverage_factor": 1.5
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let policy_id = created["id"].as_i64().unwrap();

    // Out-of-range threshold is a validation error.
    let response = app
        .clone()
        .oneshot(post_json(
            &base,
            "valid-token",
            serde_json::json!({
                "kind": "x",
                "threshold_avail": 1.5,
                "window_seconds": 60,
                "max_coverage_factor": 1.0
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let patch = Request::builder()
        .method("PATCH")
        .uri(format!("{base}/{policy_id}"))
        .header("Authorization", "Bearer valid-token")
        .header("Content-Type", "application/json")
        .body(Body::from(
            serde_json::json!({ "cooldown_seconds": 600 }).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(patch).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["cooldown_seconds"], 600);
    assert_eq!(updated["kind"], "http_availability");

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("{base}/{policy_id}"))
        .header("Authorization", "Bearer valid-token")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(get(&base, Some("valid-token")))
        .await
        .unwrap();
    let listed = body_json(response).await;
    assert_eq!(listed, serde_json::json!([]));
}
