use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post, put},
};
use std::{path::PathBuf, sync::Arc};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub mod auth;
pub mod budgets;
pub mod categories;
pub mod client;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod expenses;
pub mod models;
pub mod reports;
pub mod subscriptions;
pub mod token;
pub mod user;
pub mod utils;

use crate::config::Config;
use crate::constants::{API_PREFIX, MAX_RECEIPT_BYTES, UPLOADS_ROUTE};
use crate::database::Db;
use crate::token::TokenKeys;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub tokens: TokenKeys,
    pub upload_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(db: Db, tokens: TokenKeys, upload_dir: PathBuf) -> Self {
        Self {
            db,
            tokens,
            upload_dir: Arc::new(upload_dir),
        }
    }

    /// Opens the database and prepares the upload directory described by `config`.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let db = database::init_db(&config.data_path, config.budget_scope).await?;
        tokio::fs::create_dir_all(&config.upload_dir).await?;

        Ok(Self::new(
            db,
            TokenKeys::new(&config.jwt_secret),
            config.upload_dir.clone(),
        ))
    }
}

pub fn app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(auth::me))
        .route(
            "/expenses",
            get(expenses::list_expenses).post(expenses::create_expense),
        )
        .route(
            "/expenses/{id}",
            axum::routing::delete(expenses::delete_expense),
        )
        .route(
            "/budgets",
            get(budgets::list_budgets).post(budgets::create_budget),
        )
        .route(
            "/budgets/{id}",
            put(budgets::update_budget).delete(budgets::delete_budget),
        )
        .route(
            "/subscriptions",
            get(subscriptions::list_subscriptions).post(subscriptions::create_subscription),
        )
        .route(
            "/subscriptions/{id}",
            patch(subscriptions::update_subscription).delete(subscriptions::delete_subscription),
        )
        .route(
            "/user",
            get(user::get_profile)
                .put(user::update_profile)
                .delete(user::delete_account),
        )
        .route("/user/security", patch(user::change_password))
        .route("/user/categories", post(categories::add_category))
        .route(
            "/user/categories/{id}",
            patch(categories::update_category).delete(categories::delete_category),
        )
        .route("/reports/summary", get(reports::summary))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let api = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .merge(protected)
        .layer(DefaultBodyLimit::max(MAX_RECEIPT_BYTES));

    // Receipts are public to anyone who knows the path.
    let receipts = ServeDir::new(state.upload_dir.as_path());

    Router::new()
        .route("/", get(root))
        .nest(API_PREFIX, api)
        .nest_service(UPLOADS_ROUTE, receipts)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> &'static str {
    "Expense Tracker API is running"
}
