use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use tower_cookies::Cookies;

use crate::app::AppState;
use crate::auth::session;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
}

/// Dev/test login. Real identity lives in the platform's SSO; this endpoint
/// only binds a user id to the session cookie so the flows are drivable.
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(body): Json<LoginRequest>,
) -> impl IntoResponse {
    if body.user_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "user_id is required" })),
        );
    }
    session::set_session(
        &cookies,
        &state.cookie_key,
        &body.user_id,
        session::SESSION_TTL_MINUTES,
    );
    let return_to = session::take_login_return_to(&cookies);
    (
        StatusCode::OK,
        Json(json!({ "user_id": body.user_id, "return_to": return_to })),
    )
}
