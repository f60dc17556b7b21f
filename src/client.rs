//! Typed HTTP client for the API.
//!
//! Expense, budget, subscription and profile requests are retried on transport
//! failure. Auth calls, category edits, password changes and deletes are sent
//! once.

use reqwest::{
    RequestBuilder, Response, Url,
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use thiserror::Error;

use crate::models::{
    AuthResponse, Budget, BudgetPayload, Category, CategoryPayload, Expense, ExpensePayload,
    ExpenseQuery, LoginPayload, MessageResponse, PasswordChange, ProfileUpdate, RegisterPayload,
    Subscription, SubscriptionPayload, User,
};
use crate::reports::ReportSummary;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
    token: Option<String>,
    retry: RetryPolicy,
}

impl ApiClient {
    /// `base_url` is the API root, e.g. `http://localhost:3001/api`.
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url =
            Url::parse(&base).map_err(|err| ClientError::InvalidUrl(format!("{base_url}: {err}")))?;

        Ok(Self {
            base_url,
            http: reqwest::Client::new(),
            token: None,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn logout(&mut self) {
        self.token = None;
    }

    fn endpoint(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path)
            .map_err(|err| ClientError::InvalidUrl(format!("{path}: {err}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends the request built by `build`, rebuilding it for each retry.
    async fn send<F>(&self, retry: bool, build: F) -> ClientResult<Response>
    where
        F: Fn() -> ClientResult<RequestBuilder>,
    {
        let attempts = if retry { self.retry.retries + 1 } else { 1 };
        let mut attempt = 1;

        let res = loop {
            match self.authorize(build()?).send().await {
                Ok(res) => break res,
                Err(err) if attempt < attempts => {
                    tracing::warn!(attempt, "request failed, retrying: {err}");
                    attempt += 1;
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(err) => return Err(ClientError::Transport(err)),
            }
        };

        if res.status().is_success() {
            return Ok(res);
        }

        let status = res.status();
        let message = res
            .json::<ErrorResponse>()
            .await
            .map(|err| err.message)
            .unwrap_or_else(|_| "unknown error".to_string());

        let err = match status.as_u16() {
            400 => ClientError::BadRequest(message),
            401 => ClientError::Unauthorized(message),
            404 => ClientError::NotFound(message),
            code => ClientError::Server {
                status: code,
                message,
            },
        };
        Err(err)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, retry: bool) -> ClientResult<T> {
        let url = self.endpoint(path)?;
        let res = self.send(retry, || Ok(self.http.get(url.clone()))).await?;
        Ok(res.json().await?)
    }

    async fn send_json<B, T>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
        retry: bool,
    ) -> ClientResult<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let res = self
            .send(retry, || {
                Ok(self.http.request(method.clone(), url.clone()).json(body))
            })
            .await?;
        Ok(res.json().await?)
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let url = self.endpoint(path)?;
        let res = self.send(false, || Ok(self.http.delete(url.clone()))).await?;
        Ok(res.json().await?)
    }

    pub async fn register(
        &mut self,
        display_name: &str,
        email: &str,
        password: &str,
    ) -> ClientResult<AuthResponse> {
        let payload = RegisterPayload {
            display_name: Some(display_name.to_string()),
            email: Some(email.to_string()),
            password: Some(password.to_string()),
        };
        let auth: AuthResponse = self
            .send_json(reqwest::Method::POST, "auth/register", &payload, false)
            .await?;
        self.token = Some(auth.token.clone());
        Ok(auth)
    }

    pub async fn login(&mut self, email: &str, password: &str) -> ClientResult<AuthResponse> {
        let payload = LoginPayload {
            email: email.to_string(),
            password: password.to_string(),
        };
        let auth: AuthResponse = self
            .send_json(reqwest::Method::POST, "auth/login", &payload, false)
            .await?;
        self.token = Some(auth.token.clone());
        Ok(auth)
    }

    pub async fn me(&self) -> ClientResult<User> {
        self.get("auth/me", false).await
    }

    pub async fn list_expenses(&self, query: &ExpenseQuery) -> ClientResult<Vec<Expense>> {
        let url = self.endpoint("expenses")?;
        let res = self
            .send(true, || Ok(self.http.get(url.clone()).query(query)))
            .await?;
        Ok(res.json().await?)
    }

    pub async fn create_expense(&self, expense: &ExpensePayload) -> ClientResult<Expense> {
        self.send_json(reqwest::Method::POST, "expenses", expense, true)
            .await
    }

    /// Creates an expense as a multipart form with `receipt` attached.
    pub async fn create_expense_with_receipt(
        &self,
        expense: &ExpensePayload,
        file_name: &str,
        receipt: Vec<u8>,
    ) -> ClientResult<Expense> {
        let url = self.endpoint("expenses")?;
        let res = self
            .send(true, || {
                let mut form = Form::new();
                if let Some(amount) = expense.amount {
                    form = form.text("amount", amount.to_string());
                }
                if let Some(category) = &expense.category {
                    form = form.text("category", category.clone());
                }
                if let Some(description) = &expense.description {
                    form = form.text("description", description.clone());
                }
                if let Some(date) = &expense.date {
                    form = form.text("date", date.clone());
                }
                let part = Part::bytes(receipt.clone()).file_name(file_name.to_string());
                Ok(self.http.post(url.clone()).multipart(form.part("receipt", part)))
            })
            .await?;
        Ok(res.json().await?)
    }

    pub async fn delete_expense(&self, id: &str) -> ClientResult<MessageResponse> {
        self.delete(&format!("expenses/{id}")).await
    }

    pub async fn list_budgets(&self) -> ClientResult<Vec<Budget>> {
        self.get("budgets", true).await
    }

    pub async fn create_budget(&self, budget: &BudgetPayload) -> ClientResult<Budget> {
        self.send_json(reqwest::Method::POST, "budgets", budget, true)
            .await
    }

    pub async fn update_budget(&self, id: &str, budget: &BudgetPayload) -> ClientResult<Budget> {
        self.send_json(reqwest::Method::PUT, &format!("budgets/{id}"), budget, true)
            .await
    }

    pub async fn delete_budget(&self, id: &str) -> ClientResult<MessageResponse> {
        self.delete(&format!("budgets/{id}")).await
    }

    pub async fn list_subscriptions(&self) -> ClientResult<Vec<Subscription>> {
        self.get("subscriptions", true).await
    }

    pub async fn create_subscription(
        &self,
        subscription: &SubscriptionPayload,
    ) -> ClientResult<Subscription> {
        self.send_json(reqwest::Method::POST, "subscriptions", subscription, true)
            .await
    }

    pub async fn update_subscription(
        &self,
        id: &str,
        patch: &SubscriptionPayload,
    ) -> ClientResult<Subscription> {
        self.send_json(
            reqwest::Method::PATCH,
            &format!("subscriptions/{id}"),
            patch,
            true,
        )
        .await
    }

    pub async fn delete_subscription(&self, id: &str) -> ClientResult<Subscription> {
        self.delete(&format!("subscriptions/{id}")).await
    }

    pub async fn profile(&self) -> ClientResult<User> {
        self.get("user", true).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> ClientResult<User> {
        self.send_json(reqwest::Method::PUT, "user", update, true)
            .await
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> ClientResult<MessageResponse> {
        let payload = PasswordChange {
            current_password: Some(current_password.to_string()),
            new_password: Some(new_password.to_string()),
        };
        self.send_json(reqwest::Method::PATCH, "user/security", &payload, false)
            .await
    }

    /// Deletes the account and forgets the token.
    pub async fn delete_account(&mut self) -> ClientResult<MessageResponse> {
        let message = self.delete("user").await?;
        self.token = None;
        Ok(message)
    }

    pub async fn add_category(&self, category: &CategoryPayload) -> ClientResult<Vec<Category>> {
        self.send_json(reqwest::Method::POST, "user/categories", category, false)
            .await
    }

    pub async fn update_category(
        &self,
        id: &str,
        patch: &CategoryPayload,
    ) -> ClientResult<Vec<Category>> {
        self.send_json(
            reqwest::Method::PATCH,
            &format!("user/categories/{id}"),
            patch,
            false,
        )
        .await
    }

    pub async fn delete_category(&self, id: &str) -> ClientResult<Vec<Category>> {
        self.delete(&format!("user/categories/{id}")).await
    }

    pub async fn report_summary(&self) -> ClientResult<ReportSummary> {
        self.get("reports/summary", true).await
    }
}
