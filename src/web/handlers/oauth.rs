use axum::{
    extract::{OriginalUri, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tower_cookies::Cookies;

use crate::app::AppState;
use crate::auth::session;
use crate::effects::fire_and_forget;
use crate::models::audit::AuditEvent;
use crate::oauth::{self, AuthorizeError, AuthorizeParams, ValidatedAuthorize};

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    #[serde(flatten)]
    pub params: AuthorizeParams,
    pub decision: String,
}

/// GET /oauth/authorize — validates the request, then either redirects with
/// a fresh code (prior grant covers the requested scopes) or returns the
/// consent payload for the caller to render.
pub async fn authorize_get(
    State(state): State<AppState>,
    cookies: Cookies,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    let Some(sess) = session::get_session(&cookies, &state.cookie_key) else {
        // The flow suspends here; the user re-invokes the same URL after login.
        let return_to = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/oauth/authorize".to_string());
        session::set_login_return_to(&cookies, &return_to);
        return Redirect::temporary("/login").into_response();
    };

    let validated = match oauth::validate(state.store.as_ref(), &params).await {
        Ok(v) => v,
        Err(e) => return error_response(e),
    };

    let grant = match state
        .store
        .get_user_authorization(&sess.user_id, &validated.application.id)
        .await
    {
        Ok(g) => g,
        Err(error) => return error_response(AuthorizeError::ServerError(error)),
    };

    if let Some(grant) = grant {
        if oauth::grant_covers(&grant.scopes, &validated.scopes) {
            return match issue_and_redirect(&state, &sess.user_id, &validated, "oauth.code.auto_issued").await {
                Ok(url) => Redirect::temporary(&url).into_response(),
                Err(e) => error_response(e),
            };
        }
    }

    let user = match state.store.get_profile(&sess.user_id).await {
        Ok(profile) => json!({
            "id": sess.user_id,
            "display_name": profile.and_then(|p| p.display_name),
        }),
        Err(error) => return error_response(AuthorizeError::ServerError(error)),
    };

    let app = &validated.application;
    Json(json!({
        "app": {
            "id": app.id,
            "name": app.name,
            "description": app.description,
            "environment": app.environment,
        },
        "scopes": oauth::describe_scopes(&validated.scopes),
        "user": user,
        "params": params,
    }))
    .into_response()
}

/// POST /oauth/authorize — the explicit consent decision.
pub async fn authorize_post(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(body): Json<DecisionBody>,
) -> Response {
    let Some(sess) = session::get_session(&cookies, &state.cookie_key) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "access_denied",
                "error_description": "no active session",
            })),
        )
            .into_response();
    };

    let validated = match oauth::validate(state.store.as_ref(), &body.params).await {
        Ok(v) => v,
        Err(e) => return error_response(e),
    };

    if body.decision != "approve" {
        return match oauth::build_redirect_url(
            &validated.redirect_uri,
            &[
                ("error", "access_denied"),
                ("state", validated.state.as_deref().unwrap_or("")),
            ],
        ) {
            Ok(url) => Json(json!({ "redirect_url": url })).into_response(),
            Err(e) => error_response(e),
        };
    }

    // Code first, then the durable grant; either failing aborts the request.
    let code = match oauth::issue_code(state.store.as_ref(), &sess.user_id, &validated).await {
        Ok(code) => code,
        Err(e) => return error_response(e),
    };

    if let Err(error) = state
        .store
        .upsert_user_authorization(&sess.user_id, &validated.application.id, &validated.scopes)
        .await
    {
        return error_response(AuthorizeError::ServerError(error));
    }

    audit_approval(&state, &sess.user_id, &validated, "oauth.consent.approved");

    match oauth::build_redirect_url(
        &validated.redirect_uri,
        &[
            ("code", &code),
            ("state", validated.state.as_deref().unwrap_or("")),
        ],
    ) {
        Ok(url) => Json(json!({ "redirect_url": url })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn issue_and_redirect(
    state: &AppState,
    user_id: &str,
    validated: &ValidatedAuthorize,
    audit_type: &'static str,
) -> Result<String, AuthorizeError> {
    let code = oauth::issue_code(state.store.as_ref(), user_id, validated).await?;
    audit_approval(state, user_id, validated, audit_type);
    oauth::build_redirect_url(
        &validated.redirect_uri,
        &[
            ("code", &code),
            ("state", validated.state.as_deref().unwrap_or("")),
        ],
    )
}

fn audit_approval(
    state: &AppState,
    user_id: &str,
    validated: &ValidatedAuthorize,
    event_type: &str,
) {
    let event = AuditEvent::new(
        Some(user_id),
        event_type,
        json!({
            "application_id": validated.application.id,
            "scopes": validated.scopes,
        }),
    );
    let store = state.store.clone();
    fire_and_forget("oauth.audit", async move { store.append_audit(event).await });
}

fn error_response(err: AuthorizeError) -> Response {
    if let AuthorizeError::ServerError(ref error) = err {
        tracing::error!(error = ?error, "authorization flow failed");
    }
    let status = match &err {
        AuthorizeError::UnauthorizedClient => StatusCode::FORBIDDEN,
        AuthorizeError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(json!({
            "error": err.error(),
            "error_description": err.to_string(),
        })),
    )
        .into_response()
}
