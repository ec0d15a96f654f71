use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use famledger_server::{
    admission::AdmissionController,
    app_router,
    auth::TokenGate,
    config::AdmissionConfig,
    db::{DEFAULT_USERS, LedgerRepo, init_database},
    handlers::AppState,
};
use rusqlite::Connection;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::util::ServiceExt;

const TOKEN: &str = "family_secret_token";

fn setup() -> Router {
    let conn = Connection::open_in_memory().expect("in-memory sqlite");
    init_database(&conn).expect("init db");
    let state = AppState {
        repo: Arc::new(LedgerRepo::new(conn)),
        admission: Arc::new(AdmissionController::new(AdmissionConfig::default())),
    };
    app_router(state, TokenGate::new(TOKEN), true)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-token", TOKEN)
        .header("x-forwarded-for", "192.168.1.50");
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let request = builder.body(body).expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

fn expense(date: &str, category: &str, amount: f64, currency: &str, user: &str) -> Value {
    json!({
        "date": date,
        "category": category,
        "amount": amount,
        "currency": currency,
        "user": user
    })
}

#[tokio::test]
async fn health_needs_no_token() {
    let app = setup();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_routes_reject_missing_or_wrong_token() {
    let app = setup();

    let missing = Request::builder()
        .uri("/expenses")
        .header("x-forwarded-for", "192.168.1.51")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(missing).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri("/admin/stats")
        .header("x-token", "guess")
        .header("x-forwarded-for", "192.168.1.51")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(wrong).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json: Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(json["detail"], "Unauthorized");
}

#[tokio::test]
async fn expense_crud_round() {
    let app = setup();

    let (status, created) = send(
        &app,
        "POST",
        "/expenses",
        Some(expense("2024-05-02", "Food", 42.5, "eur", "Dad")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = created["id"].as_i64().expect("id");

    let (status, list) = send(&app, "GET", "/expenses", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["currency"], "EUR");
    assert_eq!(list[0]["amount"], 42.5);

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/expenses/{id}"),
        Some(expense("2024-05-03", "Health", 10.0, "USD", "Mom")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = send(&app, "GET", "/expenses", None).await;
    assert_eq!(list[0]["user"], "Mom");
    assert_eq!(list[0]["date"], "2024-05-03");

    let (status, _) = send(&app, "DELETE", &format!("/admin/expenses/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/expenses/{id}"),
        Some(expense("2024-05-03", "Health", 10.0, "USD", "Mom")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Expense not found");
}

#[tokio::test]
async fn incomes_are_separate_from_expenses() {
    let app = setup();
    let (status, created) = send(
        &app,
        "POST",
        "/incomes",
        Some(expense("2024-05-01", "Salary", 2000.0, "EUR", "Mom")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = created["id"].as_i64().expect("id");

    let (_, expenses) = send(&app, "GET", "/expenses", None).await;
    assert_eq!(expenses.as_array().map(Vec::len), Some(0));

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/admin/incomes/{id}"),
        Some(expense("2024-05-01", "Salary", 2100.0, "EUR", "Mom")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, incomes) = send(&app, "GET", "/incomes", None).await;
    assert_eq!(incomes[0]["amount"], 2100.0);

    let (status, _) = send(&app, "DELETE", &format!("/incomes/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "DELETE", &format!("/incomes/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_payloads_are_validation_failures() {
    let app = setup();

    let (status, body) = send(
        &app,
        "POST",
        "/expenses",
        Some(expense("2024-13-01", "Food", 1.0, "EUR", "Dad")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().is_some());

    let (status, _) = send(
        &app,
        "POST",
        "/expenses",
        Some(json!({ "date": "2024-01-01", "category": "Food" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "PUT",
        "/expenses/not-a-number",
        Some(expense("2024-01-01", "Food", 1.0, "EUR", "Dad")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_category_is_conflict() {
    let app = setup();
    let (status, created) = send(&app, "POST", "/categories", Some(json!({ "name": "Pets" }))).await;
    assert_eq!(status, StatusCode::OK);
    let id = created["id"].as_i64().expect("id");

    let (status, body) =
        send(&app, "POST", "/categories", Some(json!({ "name": " Pets " }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["detail"], "Category already exists");

    let (status, _) = send(&app, "DELETE", &format!("/categories/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, categories) = send(&app, "GET", "/categories", None).await;
    assert!(
        categories
            .as_array()
            .expect("array")
            .iter()
            .all(|c| c["name"] != "Pets")
    );
}

#[tokio::test]
async fn user_rename_cascades_and_delete_respects_expenses() {
    let app = setup();

    let (status, _) = send(&app, "POST", "/admin/users", Some(json!({ "name": "Grandma" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "POST", "/admin/users", Some(json!({ "name": "Grandma" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    for amount in [5.0, 6.0] {
        let (status, _) = send(
            &app,
            "POST",
            "/expenses",
            Some(expense("2024-02-01", "Food", amount, "EUR", "Grandma")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app, "DELETE", "/admin/users/Grandma", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["detail"].as_str().expect("detail").contains("in use"));

    let (status, body) = send(
        &app,
        "PUT",
        "/admin/users/Grandma",
        Some(json!({ "name": "Nonna" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expenses_updated"], 2);

    let (_, expenses) = send(&app, "GET", "/expenses", None).await;
    assert!(
        expenses
            .as_array()
            .expect("array")
            .iter()
            .all(|e| e["user"] == "Nonna")
    );

    let (status, _) = send(&app, "PUT", "/admin/users/Nobody", Some(json!({ "name": "X" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Kid2 has no expenses and can go.
    let (status, _) = send(&app, "DELETE", "/admin/users/Kid2", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, users) = send(&app, "GET", "/users", None).await;
    let users: Vec<&str> = users
        .as_array()
        .expect("array")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(users.contains(&"Nonna"));
    assert!(!users.contains(&"Kid2"));
}

#[tokio::test]
async fn monthly_report_keeps_currencies_apart() {
    let app = setup();
    for body in [
        expense("2024-12-03", "A", 10.0, "USD", "Dad"),
        expense("2024-12-04", "A", 5.0, "EUR", "Dad"),
        expense("2025-01-01", "A", 99.0, "USD", "Dad"),
    ] {
        let (status, _) = send(&app, "POST", "/expenses", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, report) = send(&app, "GET", "/reports/monthly?year=2024&month=12", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["start"], "2024-12-01");
    assert_eq!(report["end"], "2025-01-01");

    let by_category = report["by_category"].as_array().expect("array");
    assert_eq!(by_category.len(), 2);
    assert!(by_category.contains(&json!({ "category": "A", "currency": "EUR", "total": 5.0 })));
    assert!(by_category.contains(&json!({ "category": "A", "currency": "USD", "total": 10.0 })));
    assert_eq!(report["by_user"].as_array().map(Vec::len), Some(2));
    assert_eq!(report["by_date"].as_array().map(Vec::len), Some(2));

    let (status, empty) = send(&app, "GET", "/reports/monthly?year=2023&month=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(empty["by_category"], json!([]));
    assert_eq!(empty["by_user"], json!([]));
    assert_eq!(empty["by_date"], json!([]));
}

#[tokio::test]
async fn monthly_report_rejects_invalid_month() {
    let app = setup();
    let (status, body) = send(&app, "GET", "/reports/monthly?year=2024&month=13", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().expect("detail").contains("month"));

    let (status, _) = send(&app, "GET", "/reports/monthly?year=2024", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_reset_reseeds_defaults() {
    let app = setup();
    send(
        &app,
        "POST",
        "/expenses",
        Some(expense("2024-02-01", "Food", 5.0, "EUR", "Dad")),
    )
    .await;
    send(&app, "POST", "/admin/users", Some(json!({ "name": "Guest" }))).await;

    let (status, stats) = send(&app, "GET", "/admin/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["expense_count"], 1);
    assert_eq!(stats["currency_totals"]["EUR"], 5.0);

    let (status, _) = send(&app, "POST", "/admin/reset", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, stats) = send(&app, "GET", "/admin/stats", None).await;
    assert_eq!(stats["expense_count"], 0);
    assert_eq!(stats["user_count"], DEFAULT_USERS.len());

    let (_, users) = send(&app, "GET", "/users", None).await;
    assert_eq!(users, json!(DEFAULT_USERS));
}

#[tokio::test]
async fn unknown_route_is_not_found_after_auth() {
    let app = setup();
    let (status, body) = send(&app, "GET", "/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Not found");
}
