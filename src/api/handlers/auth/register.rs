use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::{error, instrument};

use super::{state::AuthState, types::RegisterRequest};
use crate::api::handlers::{error_response, ErrorResponse};
use crate::directory::{normalize_email, valid_email, DirectoryError, Principal};

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Principal created", body = Principal),
        (status = 400, description = "Invalid input or user already exists", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip(auth_state, payload))]
pub async fn register(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Missing payload");
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid email");
    }
    if request.username.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Username is required");
    }
    if request.password.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Password is required");
    }

    match auth_state
        .directory()
        .register(&email, request.username.trim(), &request.password)
        .await
    {
        Ok(principal) => (StatusCode::OK, Json(principal)).into_response(),
        Err(DirectoryError::AlreadyExists) => {
            error_response(StatusCode::BAD_REQUEST, "User already exists")
        }
        Err(err) => {
            error!("Failed to register user: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to register user")
        }
    }
}
