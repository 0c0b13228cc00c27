use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_cookies::{CookieManagerLayer, Key};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::{decode_cookie_key, AppConfig};
use crate::limits::{NoLimits, RateLimiter};
use crate::repos::{sqlite::SqliteStore, Store};
use crate::web::handlers;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub cookie_key: Key,
    pub store: Arc<dyn Store>,
    pub limiter: Arc<dyn RateLimiter>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/session", post(handlers::session::login))
        .route(
            "/api/wallet",
            post(handlers::wallet::create_wallet).get(handlers::wallet::get_wallet),
        )
        .route("/api/wallet/transactions", get(handlers::wallet::list_transactions))
        .route("/api/wallet/transfer", post(handlers::wallet::transfer))
        .route(
            "/oauth/authorize",
            get(handlers::oauth::authorize_get).post(handlers::oauth::authorize_post),
        )
        .with_state(state)
        .layer(CookieManagerLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

pub async fn run() -> anyhow::Result<()> {
    // logging
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let config = AppConfig::load()?;
    let key_bytes = decode_cookie_key(&config.server.cookie_key_base64)?;
    let cookie_key = Key::from(&key_bytes);

    let pool = crate::db::make_pool(&config.db.url)?;
    {
        let mut conn = pool.get()?;
        crate::db::migrations::run_migrations(&mut conn)?;
    }

    let store: Arc<dyn Store> = SqliteStore::new(pool);
    let state = AppState {
        config: config.clone(),
        cookie_key,
        store,
        limiter: Arc::new(NoLimits),
    };

    let app = build_router(state);
    let addr: std::net::SocketAddr = config.server.bind_addr.parse()?;
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
