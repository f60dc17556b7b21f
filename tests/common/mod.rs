#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, StatusCode, header},
};
use expense_tracker_server::config::BudgetCategoryScope;
use expense_tracker_server::database::init_db;
use expense_tracker_server::token::TokenKeys;
use expense_tracker_server::{AppState, app};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::{TempDir, tempdir};
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-secret-at-least-32-bytes";
pub const TEST_PASSWORD: &str = "password123";

/// A router over a throwaway database and upload directory.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    // Dropping the TempDir removes the database, so it lives as long as the app.
    pub dir: TempDir,
}

pub async fn setup_app() -> TestApp {
    setup_app_with_scope(BudgetCategoryScope::Global).await
}

pub async fn setup_app_with_scope(scope: BudgetCategoryScope) -> TestApp {
    let dir = tempdir().expect("Failed to create temporary directory");
    let data_path = dir
        .path()
        .join("data")
        .to_str()
        .expect("Failed to convert path to string")
        .to_string();

    let db = init_db(&data_path, scope)
        .await
        .unwrap_or_else(|e| panic!("Failed to initialize database at {}: {}", data_path, e));
    let state = AppState::new(db, TokenKeys::new(TEST_SECRET), dir.path().join("uploads"));

    TestApp {
        router: app(state.clone()),
        state,
        dir,
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed to respond")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self.send(request).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PATCH, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, Some(token), None).await
    }

    /// Registers an account and returns its token and user JSON.
    pub async fn register(&self, display_name: &str, email: &str) -> (String, Value) {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "displayName": display_name,
                    "email": email,
                    "password": TEST_PASSWORD,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);

        let token = body["token"]
            .as_str()
            .expect("register response carries a token")
            .to_string();
        (token, body["user"].clone())
    }

    pub async fn create_expense(
        &self,
        token: &str,
        amount: f64,
        category: &str,
        date: &str,
    ) -> Value {
        let (status, body) = self
            .post(
                "/api/expenses",
                token,
                json!({
                    "amount": amount,
                    "category": category,
                    "description": format!("{} expense", category),
                    "date": date,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create expense failed: {}", body);
        body
    }

    pub async fn count_where(&self, table: &str, column: &str, value: &str) -> i64 {
        let conn = self.state.db.read().await;
        let mut rows = conn
            .query(
                &format!("SELECT COUNT(*) FROM {} WHERE {} = ?", table, column),
                [value],
            )
            .await
            .unwrap_or_else(|e| panic!("Failed to count rows in {}: {}", table, e));

        let row = rows
            .next()
            .await
            .expect("Failed to read count row")
            .expect("COUNT(*) returns a row");
        row.get(0).expect("Failed to get count value")
    }
}
