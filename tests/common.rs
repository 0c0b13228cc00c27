use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header::CONTENT_TYPE, header::SET_COOKIE, Request, Response, StatusCode};
use axum::Router;
use diesel::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use tower::ServiceExt; // for oneshot
use tower_cookies::Key;

use catalystwells::app::{build_router, AppState};
use catalystwells::config::{AppConfig, DbCfg, ServerCfg};
use catalystwells::db::{self, SqlitePool};
use catalystwells::limits::{NoLimits, RateLimiter};
use catalystwells::repos::{sqlite::SqliteStore, Store};

/// Default transaction password used by seeded wallets.
pub const PASSWORD: &str = "gems4ever";

pub struct TestApp {
    pub _dir: TempDir,
    pub pool: SqlitePool,
    pub router: Router,
}

pub fn spawn_app() -> anyhow::Result<TestApp> {
    spawn_app_with_limiter(Arc::new(NoLimits))
}

pub fn spawn_app_with_limiter(limiter: Arc<dyn RateLimiter>) -> anyhow::Result<TestApp> {
    let dir = TempDir::new()?;
    let db_path = dir.path().join("test.sqlite").display().to_string();

    let pool = db::make_pool(&db_path)?;
    {
        let mut conn = pool.get()?;
        db::migrations::run_migrations(&mut conn)?;
    }

    let config = AppConfig {
        server: ServerCfg {
            bind_addr: "127.0.0.1:0".into(),
            public_url: "http://127.0.0.1:0".into(),
            cookie_key_base64: String::new(),
        },
        db: DbCfg { url: db_path },
    };
    let key_bytes = [7u8; 64];
    let store: Arc<dyn Store> = SqliteStore::new(pool.clone());
    let state = AppState {
        config,
        cookie_key: Key::from(&key_bytes),
        store,
        limiter,
    };

    Ok(TestApp {
        _dir: dir,
        pool,
        router: build_router(state),
    })
}

/// Log a user in through the dev session endpoint and return the cookie
/// header value to replay on subsequent requests.
pub async fn login(router: &Router, user_id: &str) -> String {
    let res = router
        .clone()
        .oneshot(
            Request::post("/api/session")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "user_id": user_id }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

pub async fn body_json(res: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(res.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub struct WalletOptions {
    pub gem_daily_spent: i64,
    pub gem_daily_limit: i64,
    pub fluxon_daily_limit: f64,
    pub locked: bool,
    /// Defaults to the adaptive hash of [`PASSWORD`] when `None`.
    pub password_hash: Option<String>,
    pub password_salt: Option<String>,
}

impl Default for WalletOptions {
    fn default() -> Self {
        WalletOptions {
            gem_daily_spent: 0,
            gem_daily_limit: 500,
            fluxon_daily_limit: 100.0,
            locked: false,
            password_hash: None,
            password_salt: None,
        }
    }
}

/// Insert a wallet row directly; returns (wallet id, address).
pub fn seed_wallet(
    pool: &SqlitePool,
    user_id: &str,
    tag: &str,
    gems: i64,
    fluxon: f64,
    opts: WalletOptions,
) -> (String, String) {
    use catalystwells::schema::wallets::dsl as w;
    let id = uuid::Uuid::new_v4().to_string();
    let address = format!("cww_{}", catalystwells::security::random_hex(16));
    let hash = opts
        .password_hash
        .unwrap_or_else(|| catalystwells::security::hash_password(PASSWORD).unwrap());
    let now = "2026-06-01T00:00:00Z".to_string();
    let mut conn = pool.get().unwrap();
    diesel::insert_into(w::wallets)
        .values((
            w::id.eq(&id),
            w::user_id.eq(user_id),
            w::address.eq(&address),
            w::tag.eq(tag),
            w::gem_balance.eq(gems),
            w::fluxon_balance.eq(fluxon),
            w::password_hash.eq(&hash),
            w::password_salt.eq(opts.password_salt.as_deref()),
            w::gem_daily_spent.eq(opts.gem_daily_spent),
            w::gem_daily_limit.eq(opts.gem_daily_limit),
            w::fluxon_daily_spent.eq(0.0),
            w::fluxon_daily_limit.eq(opts.fluxon_daily_limit),
            w::is_locked.eq(if opts.locked { 1 } else { 0 }),
            w::failed_password_attempts.eq(0),
            w::created_at.eq(&now),
            w::updated_at.eq(&now),
        ))
        .execute(&mut conn)
        .unwrap();
    (id, address)
}

pub fn gem_balance_of(pool: &SqlitePool, wallet_id: &str) -> i64 {
    use catalystwells::schema::wallets::dsl as w;
    let mut conn = pool.get().unwrap();
    w::wallets
        .find(wallet_id)
        .select(w::gem_balance)
        .first::<i64>(&mut conn)
        .unwrap()
}

pub struct AppSeed<'a> {
    pub id: &'a str,
    pub allowed_scopes: &'a str,
    pub requested_scopes: &'a str,
    pub environment: &'a str,
    pub approved: bool,
    pub redirect_uris: &'a [&'a str],
}

pub fn seed_application(pool: &SqlitePool, seed: AppSeed<'_>) {
    use catalystwells::schema::application_redirect_uris::dsl as ru;
    use catalystwells::schema::applications::dsl as a;
    let now = "2026-06-01T00:00:00Z".to_string();
    let mut conn = pool.get().unwrap();
    diesel::insert_into(a::applications)
        .values((
            a::id.eq(seed.id),
            a::owner_user_id.eq("dev-owner"),
            a::name.eq(format!("{} app", seed.id)),
            a::description.eq(Some("integration test application")),
            a::allowed_scopes.eq(seed.allowed_scopes),
            a::requested_scopes.eq(seed.requested_scopes),
            a::environment.eq(seed.environment),
            a::is_approved.eq(if seed.approved { 1 } else { 0 }),
            a::created_at.eq(&now),
            a::updated_at.eq(&now),
        ))
        .execute(&mut conn)
        .unwrap();
    for (i, uri) in seed.redirect_uris.iter().enumerate() {
        diesel::insert_into(ru::application_redirect_uris)
            .values((
                ru::id.eq(format!("{}-uri-{i}", seed.id)),
                ru::application_id.eq(seed.id),
                ru::redirect_uri.eq(*uri),
                ru::created_at.eq(format!("2026-06-01T00:00:0{i}Z")),
            ))
            .execute(&mut conn)
            .unwrap();
    }
}

pub fn seed_grant(pool: &SqlitePool, user_id: &str, application_id: &str, scopes: &str) {
    use catalystwells::schema::user_authorizations::dsl as ua;
    let now = "2026-06-01T00:00:00Z".to_string();
    let mut conn = pool.get().unwrap();
    diesel::insert_into(ua::user_authorizations)
        .values((
            ua::id.eq(uuid::Uuid::new_v4().to_string()),
            ua::user_id.eq(user_id),
            ua::application_id.eq(application_id),
            ua::scopes.eq(scopes),
            ua::created_at.eq(&now),
            ua::updated_at.eq(&now),
        ))
        .execute(&mut conn)
        .unwrap();
}

/// Build a GET request for /oauth/authorize with url-encoded query params.
pub fn authorize_uri(params: &[(&str, &str)]) -> String {
    let mut url = url::Url::parse("http://test.local/oauth/authorize").unwrap();
    {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in params {
            pairs.append_pair(k, v);
        }
    }
    match url.query() {
        Some(q) => format!("/oauth/authorize?{q}"),
        None => "/oauth/authorize".to_string(),
    }
}

pub async fn get_with_cookie(router: &Router, uri: &str, cookie: &str) -> Response<Body> {
    router
        .clone()
        .oneshot(
            Request::get(uri)
                .header("cookie", cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn post_json_with_cookie(
    router: &Router,
    uri: &str,
    cookie: &str,
    body: serde_json::Value,
) -> Response<Body> {
    router
        .clone()
        .oneshot(
            Request::post(uri)
                .header(CONTENT_TYPE, "application/json")
                .header("cookie", cookie)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}
