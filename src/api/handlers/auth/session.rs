//! Session cookie handling, the request guard, and the logout/verify endpoints.

use axum::{
    extract::{Extension, Request},
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, error};

use super::{
    state::{AuthConfig, AuthState},
    types::{MessageResponse, VerifyResponse},
};
use crate::api::handlers::{error_response, ErrorResponse};
use crate::directory::DirectoryError;
use crate::now_unix_seconds;

pub const SESSION_COOKIE_NAME: &str = "jwt";

const UNAUTHORIZED: &str = "Unauthorized";

/// Principal id attached to requests that passed [`require_session`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthenticatedPrincipal(pub i64);

/// Reject the request with 401 unless it carries a valid session token.
///
/// Every rejection reason (missing, malformed, bad signature, expired) yields
/// the same response.
pub async fn require_session(
    auth_state: Extension<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_session_token(request.headers()) else {
        return error_response(StatusCode::UNAUTHORIZED, UNAUTHORIZED);
    };

    match auth_state.tokens().validate(&token, now_unix_seconds()) {
        Ok(principal_id) => {
            request
                .extensions_mut()
                .insert(AuthenticatedPrincipal(principal_id));
            next.run(request).await
        }
        Err(err) => {
            debug!("Session rejected: {err}");
            error_response(StatusCode::UNAUTHORIZED, UNAUTHORIZED)
        }
    }
}

#[utoipa::path(
    get,
    path = "/auth/verify",
    responses(
        (status = 200, description = "Session is valid", body = VerifyResponse),
        (status = 401, description = "Missing, invalid, or expired session", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify(
    Extension(AuthenticatedPrincipal(principal_id)): Extension<AuthenticatedPrincipal>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match auth_state.directory().find_by_id(principal_id).await {
        Ok(user) => (StatusCode::OK, Json(VerifyResponse { user })).into_response(),
        // the token outlived its principal
        Err(DirectoryError::NotFound) => error_response(StatusCode::UNAUTHORIZED, UNAUTHORIZED),
        Err(err) => {
            error!("Failed to lookup principal: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to lookup user")
        }
    }
}

#[utoipa::path(
    get,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Session cookie cleared", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn logout(auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Always clear the cookie, whether or not a session was presented.
    let mut headers = HeaderMap::new();
    match clear_session_cookie(auth_state.config()) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }
    (
        StatusCode::OK,
        headers,
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    )
}

/// Build the `HttpOnly` cookie carrying the session token.
pub(super) fn session_cookie(
    auth_config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = auth_config.session_ttl_seconds();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if auth_config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(auth_config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT"
    );
    if auth_config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Session token from the `jwt` cookie, falling back to a bearer header.
fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    extract_cookie_token(headers).or_else(|| extract_bearer_token(headers))
}

fn extract_cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn header_map(name: axum::http::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn session_cookie_attributes() {
        let config = AuthConfig::default();
        let cookie = session_cookie(&config, "abc").unwrap();
        assert_eq!(
            cookie.to_str().unwrap(),
            "jwt=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=86400"
        );

        let secure = AuthConfig::default().with_session_cookie_secure(true);
        let cookie = session_cookie(&secure, "abc").unwrap();
        assert!(cookie.to_str().unwrap().ends_with("; Secure"));
    }

    #[test]
    fn clear_cookie_is_empty_and_expired() {
        let cookie = clear_session_cookie(&AuthConfig::default()).unwrap();
        let value = cookie.to_str().unwrap();
        assert!(value.starts_with("jwt=;"));
        assert!(value.contains("Max-Age=0"));
        assert!(value.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
        assert!(value.contains("HttpOnly"));
    }

    #[test]
    fn token_from_cookie_among_others() {
        let headers = header_map(COOKIE, "theme=dark; jwt=tok.en.value; lang=en");
        assert_eq!(
            extract_session_token(&headers),
            Some("tok.en.value".to_string())
        );
    }

    #[test]
    fn malformed_cookie_pairs_are_skipped() {
        let headers = header_map(COOKIE, "garbage; jwt=abc");
        assert_eq!(extract_session_token(&headers), Some("abc".to_string()));
    }

    #[test]
    fn empty_cookie_is_no_token() {
        let headers = header_map(COOKIE, "jwt=");
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn bearer_fallback() {
        let headers = header_map(AUTHORIZATION, "Bearer abc.def.ghi");
        assert_eq!(
            extract_session_token(&headers),
            Some("abc.def.ghi".to_string())
        );
        let headers = header_map(AUTHORIZATION, "Bearer   ");
        assert_eq!(extract_session_token(&headers), None);
    }
}
