mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{test_app, ADMIN_PASSWORD, BLUE_SHEET, OWNERS_WITH_A};
use vehicle_registry::create_router;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn post_csv(uri: &str, token: &str, csv: &'static str) -> Request<Body> {
    Request::post(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "text/csv")
        .body(Body::from(csv))
        .unwrap()
}

async fn login(app: &Router) -> String {
    let (status, body) = send_json(
        app,
        post_json("/admin/login", None, json!({ "username": "admin", "password": ADMIN_PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let app = create_router(test_app().state);
    let (status, body) = send_json(&app, get("/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "memory");
}

#[tokio::test]
async fn test_lookup_before_activation_is_not_ready() {
    let app = create_router(test_app().state);
    let (status, body) = send_json(&app, get("/api/lookup?plate=51A-123.45", None)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_NOT_READY");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn test_invalid_plate_is_rejected() {
    let app = create_router(test_app().state);
    let (status, _) = send_json(&app, get("/api/lookup?plate=--", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_routes_require_token() {
    let app = create_router(test_app().state);

    let (status, _) = send_json(&app, get("/admin/batches", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_json(&app, get("/admin/batches", Some("not-a-jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_json(
        &app,
        post_json("/admin/login", None, json!({ "username": "admin", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_tracking_code_is_not_found() {
    let app = create_router(test_app().state);
    let (status, _) = send_json(&app, get("/api/requests/REQ-20240101-ABCDEFGH", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(&app, get("/api/requests/garbage", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_full_flow_from_import_to_export() {
    let app = create_router(test_app().state);
    let token = login(&app).await;

    let (status, body) = send_json(
        &app,
        post_json("/admin/batches", Some(&token), json!({ "label": "2024-03" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let batch_id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(body["data"]["status"], "draft");

    let (status, body) = send_json(
        &app,
        post_csv(
            &format!("/admin/batches/{}/import?kind=blue_vehicles&filename=xanh.csv", batch_id),
            &token,
            BLUE_SHEET,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["record_count"], 2);
    assert_eq!(body["data"]["original_filename"], "xanh.csv");

    let (status, _) = send_json(
        &app,
        post_csv(
            &format!("/admin/batches/{}/import?kind=owner_register", batch_id),
            &token,
            OWNERS_WITH_A,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send_json(
        &app,
        post_json(&format!("/admin/batches/{}/activate", batch_id), Some(&token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "active");

    let (status, body) = send_json(&app, get("/api/lookup?plate=51a-123.45", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["plate"], "51A12345");
    assert_eq!(body["data"]["category"], "blue");
    assert_eq!(body["data"]["state"], "matched");
    assert_eq!(body["data"]["form_number"], 1);
    assert_eq!(body["data"]["batch_id"], batch_id);

    let (status, body) = send_json(
        &app,
        post_json(
            "/api/requests",
            None,
            json!({
                "plate": "51A-123.45",
                "form_number": 1,
                "fields": { "owner_name": "Nguyen Van A", "owner_phone": "0909000111" }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let first_code = body["data"]["tracking_code"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        &app,
        post_json(
            "/api/requests/lookup-and-submit",
            None,
            json!({ "plate": "51B67890", "fields": { "notes": "xe đã bán" } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["classification"]["form_number"], 3);
    assert_eq!(body["data"]["request"]["form_number"], 3);

    let (status, body) = send_json(&app, get(&format!("/api/requests/{}", first_code), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "received");
    assert!(body["data"].get("fields").is_none());

    let (status, body) = send_json(
        &app,
        post_json(&format!("/admin/requests/{}/review", first_code), Some(&token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reviewed_by"], "admin");

    let response = app
        .clone()
        .oneshot(post_json("/admin/export/1", Some(&token), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/csv"));
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.contains("Mau_1_Export_"));
    let csv = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let csv = String::from_utf8(csv.to_vec()).unwrap();
    assert!(csv.contains(&first_code));
    assert!(csv.contains("0909000111"));

    let (status, body) = send_json(&app, get(&format!("/api/requests/{}", first_code), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "exported");

    let (status, body) = send_json(&app, get("/admin/requests/stats", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);
}

#[tokio::test]
async fn test_invalid_import_reports_rows() {
    let app = create_router(test_app().state);
    let token = login(&app).await;

    let (_, body) = send_json(
        &app,
        post_json("/admin/batches", Some(&token), json!({ "label": "draft" })),
    )
    .await;
    let batch_id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send_json(
        &app,
        post_csv(
            &format!("/admin/batches/{}/import?kind=blue_vehicles", batch_id),
            &token,
            "BIEN_SO,TEN\n51A11111,A\n51A11111,B\n",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["details"]["rows"][0]["row"], 2);

    let (_, body) = send_json(&app, get(&format!("/admin/batches/{}/files", batch_id), Some(&token))).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_submit_is_bound_to_the_active_batch() {
    let app = create_router(test_app().state);
    let token = login(&app).await;

    let (status, body) = send_json(
        &app,
        post_json("/api/requests", None, json!({ "plate": "51A12345", "form_number": 5, "batch_id": 999 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let early_code = body["data"]["tracking_code"].as_str().unwrap().to_string();

    let (_, body) = send_json(&app, get(&format!("/admin/requests/{}", early_code), Some(&token))).await;
    assert_eq!(body["data"]["batch_id"], Value::Null);

    let (_, body) = send_json(
        &app,
        post_json("/admin/batches", Some(&token), json!({ "label": "2024-04" })),
    )
    .await;
    let batch_id = body["data"]["id"].as_i64().unwrap();
    let (status, _) = send_json(
        &app,
        post_json(&format!("/admin/batches/{}/activate", batch_id), Some(&token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_json(
        &app,
        post_json("/api/requests", None, json!({ "plate": "51A12345", "form_number": 5, "batch_id": 999 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let code = body["data"]["tracking_code"].as_str().unwrap().to_string();

    let (_, body) = send_json(&app, get(&format!("/admin/requests/{}", code), Some(&token))).await;
    assert_eq!(body["data"]["batch_id"], batch_id);
}

#[tokio::test]
async fn test_wrong_sheet_can_be_removed_from_draft_batch() {
    let app = create_router(test_app().state);
    let token = login(&app).await;

    let (_, body) = send_json(
        &app,
        post_json("/admin/batches", Some(&token), json!({ "label": "draft" })),
    )
    .await;
    let batch_id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send_json(
        &app,
        post_csv(
            &format!("/admin/batches/{}/import?kind=blue_vehicles", batch_id),
            &token,
            BLUE_SHEET,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let file_id = body["data"]["id"].as_i64().unwrap();

    let delete = |uri: String| {
        Request::delete(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    };

    let (status, body) = send_json(&app, delete(format!("/admin/files/{}", file_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["record_count"], 2);

    let (_, body) = send_json(&app, get(&format!("/admin/batches/{}/files", batch_id), Some(&token))).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
    let (_, body) = send_json(&app, get(&format!("/admin/batches/{}/records", batch_id), Some(&token))).await;
    assert_eq!(body["data"]["total"], 0);

    let (status, _) = send_json(&app, delete(format!("/admin/files/{}", file_id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Un lote activo ya no admite bajas de archivos
    let (_, body) = send_json(
        &app,
        post_csv(
            &format!("/admin/batches/{}/import?kind=blue_vehicles", batch_id),
            &token,
            BLUE_SHEET,
        ),
    )
    .await;
    let file_id = body["data"]["id"].as_i64().unwrap();
    send_json(&app, post_json(&format!("/admin/batches/{}/activate", batch_id), Some(&token), json!({}))).await;
    let (status, _) = send_json(&app, delete(format!("/admin/files/{}", file_id))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}
