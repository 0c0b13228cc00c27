use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

use crate::models::application::{ApplicationRedirectUri, DeveloperApplication};
use crate::repos::{NewAuthorizationCodeParams, Store};
use crate::security::random_hex;

pub const CODE_PREFIX: &str = "cw_ac_";
pub const CODE_TTL_MINUTES: i64 = 10;
pub const DEFAULT_SCOPE: &str = "profile.read";

/// `openid` is implicitly grantable to every client.
const IMPLICIT_SCOPE: &str = "openid";

/// Parameters of an authorization attempt, shared by the GET query and the
/// POST decision body. Everything is optional at the wire level; `validate`
/// decides what is actually required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizeParams {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthorizeError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("unknown client_id")]
    InvalidClient,
    #[error("only response_type=code is supported")]
    UnsupportedResponseType,
    #[error("this application is not approved for authorization")]
    UnauthorizedClient,
    #[error("redirect_uri does not match any registered redirect URI")]
    InvalidRedirectUri,
    #[error("scopes not permitted for this application: {}", .0.join(" "))]
    InvalidScope(Vec<String>),
    #[error("internal error")]
    ServerError(anyhow::Error),
}

impl AuthorizeError {
    /// RFC 6749 error vocabulary, plus the locally invented
    /// `invalid_redirect_uri`.
    pub fn error(&self) -> &'static str {
        match self {
            AuthorizeError::InvalidRequest(_) => "invalid_request",
            AuthorizeError::InvalidClient => "invalid_client",
            AuthorizeError::UnsupportedResponseType => "unsupported_response_type",
            AuthorizeError::UnauthorizedClient => "unauthorized_client",
            AuthorizeError::InvalidRedirectUri => "invalid_redirect_uri",
            AuthorizeError::InvalidScope(_) => "invalid_scope",
            AuthorizeError::ServerError(_) => "server_error",
        }
    }
}

/// A fully validated authorization request: known client, resolved redirect
/// URI, permitted scope set.
#[derive(Debug, Clone)]
pub struct ValidatedAuthorize {
    pub application: DeveloperApplication,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

impl ValidatedAuthorize {
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

/// START → VALIDATED. Checks run in the order the protocol names them:
/// client, response type, approval, redirect URI, scopes.
pub async fn validate(
    store: &dyn Store,
    params: &AuthorizeParams,
) -> Result<ValidatedAuthorize, AuthorizeError> {
    let client_id = params
        .client_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthorizeError::InvalidRequest("client_id is required".to_string()))?;

    let application = store
        .get_application(client_id)
        .await
        .map_err(AuthorizeError::ServerError)?
        .ok_or(AuthorizeError::InvalidClient)?;

    match params.response_type.as_deref() {
        Some("code") => {}
        Some(_) => return Err(AuthorizeError::UnsupportedResponseType),
        None => {
            return Err(AuthorizeError::InvalidRequest(
                "response_type is required".to_string(),
            ))
        }
    }

    if !application.may_authorize() {
        return Err(AuthorizeError::UnauthorizedClient);
    }

    let registered = store
        .list_redirect_uris(&application.id)
        .await
        .map_err(AuthorizeError::ServerError)?;
    let redirect_uri = resolve_redirect_uri(&registered, params.redirect_uri.as_deref())?;

    let requested = parse_scopes(params.scope.as_deref());
    let allowed = allowed_scopes(&application);
    let offending: Vec<String> = requested
        .iter()
        .filter(|s| s.as_str() != IMPLICIT_SCOPE && !allowed.contains(*s))
        .cloned()
        .collect();
    if !offending.is_empty() {
        return Err(AuthorizeError::InvalidScope(offending));
    }

    Ok(ValidatedAuthorize {
        application,
        redirect_uri,
        scopes: requested,
        state: params.state.clone(),
        code_challenge: params.code_challenge.clone(),
        // Stored verbatim; the exchange step owns method validation.
        code_challenge_method: params.code_challenge_method.clone(),
    })
}

/// Issue a fresh authorization code for a validated request and persist it
/// with its 10-minute expiry. Grant upsert and audit are the caller's next
/// steps; code persistence failing aborts before either runs.
pub async fn issue_code(
    store: &dyn Store,
    user_id: &str,
    validated: &ValidatedAuthorize,
) -> Result<String, AuthorizeError> {
    let code = generate_code();
    store
        .create_authorization_code(NewAuthorizationCodeParams {
            code: code.clone(),
            application_id: validated.application.id.clone(),
            user_id: user_id.to_string(),
            redirect_uri: validated.redirect_uri.clone(),
            scopes: validated.scope_string(),
            code_challenge: validated.code_challenge.clone(),
            code_challenge_method: validated.code_challenge_method.clone(),
            expires_at: code_expiry(),
        })
        .await
        .map_err(AuthorizeError::ServerError)?;
    Ok(code)
}

pub fn generate_code() -> String {
    format!("{CODE_PREFIX}{}", random_hex(32))
}

fn code_expiry() -> String {
    let expires = time::OffsetDateTime::now_utc() + time::Duration::minutes(CODE_TTL_MINUTES);
    expires
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| expires.to_string())
}

/// True when a previously granted scope set covers every requested scope.
pub fn grant_covers(granted: &str, requested: &[String]) -> bool {
    let granted: std::collections::HashSet<&str> = granted.split_whitespace().collect();
    requested.iter().all(|s| granted.contains(s.as_str()))
}

pub fn parse_scopes(scope: Option<&str>) -> Vec<String> {
    let mut set = std::collections::BTreeSet::new();
    for item in scope.unwrap_or(DEFAULT_SCOPE).split_whitespace() {
        if !item.is_empty() {
            set.insert(item.to_string());
        }
    }
    if set.is_empty() {
        set.insert(DEFAULT_SCOPE.to_string());
    }
    set.into_iter().collect()
}

fn allowed_scopes(application: &DeveloperApplication) -> Vec<String> {
    // An empty allow-list falls back to what the app originally requested.
    let source = if application.allowed_scopes.trim().is_empty() {
        &application.requested_scopes
    } else {
        &application.allowed_scopes
    };
    source.split_whitespace().map(|s| s.to_string()).collect()
}

fn resolve_redirect_uri(
    registered: &[ApplicationRedirectUri],
    requested: Option<&str>,
) -> Result<String, AuthorizeError> {
    match requested.filter(|s| !s.is_empty()) {
        Some(uri) => {
            if registered
                .iter()
                .any(|r| redirect_uri_matches(&r.redirect_uri, uri))
            {
                Ok(uri.to_string())
            } else {
                Err(AuthorizeError::InvalidRedirectUri)
            }
        }
        None => registered
            .first()
            .map(|r| r.redirect_uri.clone())
            .ok_or(AuthorizeError::InvalidRedirectUri),
    }
}

/// Three rules, tried in order: exact match, `*` wildcard (development
/// convenience), same-origin path prefix.
pub fn redirect_uri_matches(registered: &str, requested: &str) -> bool {
    if registered == requested {
        return true;
    }
    if registered.contains('*') && wildcard_match(registered, requested) {
        return true;
    }
    same_origin_prefix(registered, requested)
}

fn wildcard_match(pattern: &str, value: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let v: Vec<char> = value.chars().collect();
    let (mut pi, mut vi) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;
    while vi < v.len() {
        if pi < p.len() && (p[pi] == v[vi] && p[pi] != '*') {
            pi += 1;
            vi += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = vi;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            vi = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

fn same_origin_prefix(registered: &str, requested: &str) -> bool {
    let (Ok(reg), Ok(req)) = (Url::parse(registered), Url::parse(requested)) else {
        return false;
    };
    reg.scheme() == req.scheme()
        && reg.host_str() == req.host_str()
        && reg.port_or_known_default() == req.port_or_known_default()
        && req.path().starts_with(reg.path())
}

/// Append query parameters to a redirect URI. Empty values are dropped so
/// an absent `state` never produces a dangling parameter.
pub fn build_redirect_url(
    redirect_uri: &str,
    params: &[(&str, &str)],
) -> Result<String, AuthorizeError> {
    let mut url = Url::parse(redirect_uri).map_err(|_| AuthorizeError::InvalidRedirectUri)?;
    {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in params {
            if !v.is_empty() {
                pairs.append_pair(k, v);
            }
        }
    }
    Ok(url.to_string())
}

/// PKCE challenge derivation (RFC 7636 §4.2). Used by the token-exchange
/// step; colocated here because the verifier hashing belongs to this flow.
/// `plain` passes the verifier through; everything else is treated as S256.
pub fn pkce_challenge(verifier: &str, method: Option<&str>) -> String {
    match method {
        Some("plain") => verifier.to_string(),
        _ => {
            let digest = Sha256::digest(verifier.as_bytes());
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeDescription {
    pub scope: String,
    pub description: String,
}

/// Human-readable scope descriptions for the consent screen.
pub fn describe_scopes(scopes: &[String]) -> Vec<ScopeDescription> {
    scopes
        .iter()
        .map(|scope| ScopeDescription {
            scope: scope.clone(),
            description: scope_description(scope),
        })
        .collect()
}

fn scope_description(scope: &str) -> String {
    match scope {
        "openid" => "Confirm your identity".to_string(),
        "profile.read" => "Read your basic profile".to_string(),
        "student.profile.read" => "Read your student profile".to_string(),
        "attendance.read" => "View your attendance records".to_string(),
        "grades.read" => "View your grades".to_string(),
        "wellbeing.read" => "View your wellbeing check-ins".to_string(),
        "wallet.read" => "View your wallet balances".to_string(),
        other => format!("Access: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(uri: &str) -> ApplicationRedirectUri {
        ApplicationRedirectUri {
            id: "r1".to_string(),
            application_id: "app".to_string(),
            redirect_uri: uri.to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn exact_redirect_match() {
        assert!(redirect_uri_matches(
            "https://app.example.com/cb",
            "https://app.example.com/cb"
        ));
    }

    #[test]
    fn wildcard_matches_query_suffix() {
        assert!(redirect_uri_matches(
            "https://app.example.com/cb*",
            "https://app.example.com/cb?x=1"
        ));
    }

    #[test]
    fn wildcard_in_the_middle() {
        assert!(redirect_uri_matches(
            "https://*.example.com/cb",
            "https://dev.example.com/cb"
        ));
        assert!(!redirect_uri_matches(
            "https://*.example.com/cb",
            "https://dev.example.org/cb"
        ));
    }

    #[test]
    fn different_host_never_matches() {
        assert!(!redirect_uri_matches(
            "https://app.example.com/cb",
            "https://evil.com/cb"
        ));
    }

    #[test]
    fn same_origin_path_prefix_matches() {
        assert!(redirect_uri_matches(
            "https://app.example.com/cb",
            "https://app.example.com/cb/deep?x=1"
        ));
        assert!(!redirect_uri_matches(
            "https://app.example.com/cb",
            "http://app.example.com/cb/deep"
        ));
        assert!(!redirect_uri_matches(
            "https://app.example.com:8443/cb",
            "https://app.example.com/cb/deep"
        ));
    }

    #[test]
    fn omitted_redirect_uri_defaults_to_first_registered() {
        let uris = vec![
            registered("https://app.example.com/cb"),
            registered("https://app.example.com/other"),
        ];
        let resolved = resolve_redirect_uri(&uris, None).unwrap();
        assert_eq!(resolved, "https://app.example.com/cb");
    }

    #[test]
    fn unmatched_redirect_uri_is_rejected() {
        let uris = vec![registered("https://app.example.com/cb")];
        let err = resolve_redirect_uri(&uris, Some("https://evil.com/cb")).unwrap_err();
        assert!(matches!(err, AuthorizeError::InvalidRedirectUri));
    }

    #[test]
    fn scope_default_applies_when_omitted() {
        assert_eq!(parse_scopes(None), vec![DEFAULT_SCOPE.to_string()]);
        assert_eq!(parse_scopes(Some("   ")), vec![DEFAULT_SCOPE.to_string()]);
    }

    #[test]
    fn scopes_are_deduplicated() {
        assert_eq!(
            parse_scopes(Some("profile.read profile.read grades.read")),
            vec!["grades.read".to_string(), "profile.read".to_string()]
        );
    }

    #[test]
    fn grant_coverage_is_a_superset_check() {
        assert!(grant_covers(
            "profile.read student.profile.read",
            &["profile.read".to_string()]
        ));
        assert!(!grant_covers(
            "profile.read",
            &["profile.read".to_string(), "grades.read".to_string()]
        ));
    }

    #[test]
    fn pkce_s256_matches_rfc_7636_vector() {
        let challenge = pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk", Some("S256"));
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn pkce_plain_passes_verifier_through() {
        assert_eq!(pkce_challenge("verifier-value", Some("plain")), "verifier-value");
    }

    #[test]
    fn code_format_is_prefixed_hex() {
        let code = generate_code();
        let hex = code.strip_prefix(CODE_PREFIX).expect("prefix");
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    }

    #[test]
    fn redirect_url_echoes_code_and_state() {
        let url = build_redirect_url(
            "https://app.example.com/cb",
            &[("code", "cw_ac_abc"), ("state", "xyz")],
        )
        .unwrap();
        assert_eq!(url, "https://app.example.com/cb?code=cw_ac_abc&state=xyz");
    }

    #[test]
    fn redirect_url_drops_empty_state() {
        let url = build_redirect_url("https://app.example.com/cb", &[("code", "c"), ("state", "")])
            .unwrap();
        assert_eq!(url, "https://app.example.com/cb?code=c");
    }
}
