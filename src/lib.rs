//! Parish Finance: income, expense and donor bookkeeping behind a bearer-token API.
//!
//! Every authenticated request resolves its token to a [`db::models::User`]
//! ([`auth::AuthenticatedUser`]), asks [`policy::authorize`] whether the
//! action is allowed, then reads or writes through the [`db::Store`] port.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod policy;
pub mod routes;

use auth::TokenService;
use config::{AllowedOrigins, Config};
use db::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub tokens: TokenService,
    pub config: Arc<Config>,
}

impl AppState {
    /// Seeded in-memory store plus token settings taken from `config`.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db = db::init_pool(&config.seed_admin).await?;
        Ok(Self::with_store(config, db))
    }

    /// Use an already-built store, e.g. a database-backed implementation.
    pub fn with_store(config: Config, db: DbPool) -> Self {
        Self {
            db,
            tokens: TokenService::new(&config),
            config: Arc::new(config),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);
    let cors = match &state.config.allowed_origins {
        AllowedOrigins::Any => cors.allow_origin(AllowOrigin::any()),
        AllowedOrigins::List(origins) => cors
            .allow_origin(AllowOrigin::list(origins.iter().cloned()))
            .allow_credentials(true),
    };

    Router::new()
        .route("/", get(routes::welcome))
        .route("/health", get(routes::health_check))
        .route("/token", post(auth::login))
        .route("/users/me", get(auth::me))
        .route("/users/", get(routes::users::list_users).post(routes::users::create_user))
        .route("/categories/", get(routes::categories::get_categories))
        .route("/incomes/", get(routes::incomes::list_incomes).post(routes::incomes::create_income))
        .route("/expenses/", get(routes::expenses::list_expenses).post(routes::expenses::create_expense))
        .route("/donors/", get(routes::donors::list_donors).post(routes::donors::create_donor))
        .route("/reports/summary", get(routes::reports::summary))
        .route("/reports/export", get(routes::reports::export_csv))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .with_state(state)
}
