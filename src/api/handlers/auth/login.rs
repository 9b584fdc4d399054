use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{debug, error, instrument};

use super::{
    session::session_cookie,
    state::AuthState,
    types::{LoginRequest, MessageResponse},
};
use crate::api::handlers::{error_response, ErrorResponse};
use crate::directory::DirectoryError;
use crate::now_unix_seconds;

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful; session cookie set", body = MessageResponse),
        (status = 400, description = "Invalid password", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip(auth_state, payload))]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Missing payload");
    };

    let principal = match auth_state
        .directory()
        .verify_login(&request.email, &request.password)
        .await
    {
        Ok(principal) => principal,
        Err(DirectoryError::NotFound) => {
            return error_response(StatusCode::NOT_FOUND, "user not found");
        }
        Err(DirectoryError::BadPassword) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid password");
        }
        Err(err) => {
            error!("Failed to verify login: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to login");
        }
    };

    let issued = match auth_state.tokens().issue(principal.id, now_unix_seconds()) {
        Ok(issued) => issued,
        Err(err) => {
            error!("Failed to issue session token: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to login");
        }
    };

    let cookie = match session_cookie(auth_state.config(), &issued.token) {
        Ok(cookie) => cookie,
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to login");
        }
    };

    debug!(
        principal_id = principal.id,
        expires_at = issued.expires_at,
        "session issued"
    );

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    (
        StatusCode::OK,
        headers,
        Json(MessageResponse {
            message: "Login successful".to_string(),
        }),
    )
        .into_response()
}
