use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::future::Future;
use tower_cookies::Cookies;

use crate::app::AppState;
use crate::auth::session;

/// Extractor that requires an authenticated session cookie.
///
/// Usage:
/// ```ignore
/// async fn handler(SessionUser { user_id }: SessionUser) -> impl IntoResponse {
///     format!("User: {}", user_id)
/// }
/// ```
pub struct SessionUser {
    pub user_id: String,
}

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = Response;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let cookies = Cookies::from_request_parts(parts, state).await.map_err(|e| {
                tracing::error!(error = ?e, "failed to extract cookies");
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": "Not authenticated"})),
                )
                    .into_response()
            })?;

            if let Some(session_data) = session::get_session(&cookies, &state.cookie_key) {
                Ok(SessionUser {
                    user_id: session_data.user_id,
                })
            } else {
                Err((
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": "Not authenticated"})),
                )
                    .into_response())
            }
        }
    }
}
