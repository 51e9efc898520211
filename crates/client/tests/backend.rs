use std::time::Duration;

use api_types::forms::{LeadNew, PartnerNew};
use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};
use backend_client::{BackendClient, ClientError};
use engine::{RecordKind, RowView};
use serde_json::{Value, json};

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

async fn leads(headers: HeaderMap) -> impl IntoResponse {
    match bearer(&headers) {
        Some("good") => (
            StatusCode::OK,
            Json(json!({ "data": [{ "id": "p1", "Name": "Alice", "Leads": [] }] })),
        ),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "token rejected" })),
        ),
    }
}

async fn create_lead(Json(body): Json<Value>) -> impl IntoResponse {
    if body["name"] == "dup" {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "message": "already exists" })),
        );
    }
    (
        StatusCode::CREATED,
        Json(json!({ "data": [{ "details": { "id": "l-77" } }] })),
    )
}

async fn spawn_backend() -> String {
    let app = Router::new()
        .route("/api/leads", get(leads).post(create_lead))
        .route(
            "/api/partners",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }).post(|| async {
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "error": "name required" })),
                )
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn hierarchy_forwards_the_bearer_token() {
    let base = spawn_backend().await;
    let client = BackendClient::new(&base, Duration::from_secs(5)).unwrap();

    let body = client
        .hierarchy("good", RowView::Records(RecordKind::Lead))
        .await
        .unwrap();
    let normalized = engine::normalize(&body);
    assert_eq!(normalized.forest[0].name, "Alice");

    let err = client
        .hierarchy("bad", RowView::Records(RecordKind::Lead))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized));

    let err = client.hierarchy("good", RowView::Partners).await.unwrap_err();
    assert!(matches!(err, ClientError::Server(_)));

    let err = client
        .hierarchy("good", RowView::Records(RecordKind::Contact))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotFound));
}

#[tokio::test]
async fn create_maps_status_codes() {
    let base = spawn_backend().await;
    let client = BackendClient::new(&base, Duration::from_secs(5)).unwrap();

    let created = client
        .create_lead(
            "good",
            &LeadNew {
                name: "Ann".to_string(),
                partner_id: "p1".to_string(),
                ..LeadNew::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(created.id, "l-77");

    let err = client
        .create_lead(
            "good",
            &LeadNew {
                name: "dup".to_string(),
                partner_id: "p1".to_string(),
                ..LeadNew::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Conflict(msg) if msg == "already exists"));

    let err = client
        .create_partner("good", &PartnerNew::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation(msg) if msg == "name required"));
}
