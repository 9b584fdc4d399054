use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::{
    state::AuthState,
    types::{MailcheckQuery, MailcheckResponse},
};
use crate::api::handlers::{error_response, ErrorResponse};

#[utoipa::path(
    get,
    path = "/auth/mailcheck",
    params(MailcheckQuery),
    responses(
        (status = 200, description = "Whether the email is registered", body = MailcheckResponse),
        (status = 400, description = "Missing email", body = ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn mailcheck(
    auth_state: Extension<Arc<AuthState>>,
    Query(query): Query<MailcheckQuery>,
) -> impl IntoResponse {
    let Some(email) = query.email.filter(|email| !email.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing email");
    };

    match auth_state.directory().email_exists(&email).await {
        Ok(exists) => (StatusCode::OK, Json(MailcheckResponse { exists })).into_response(),
        Err(err) => {
            error!("Failed to check email: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to check email")
        }
    }
}
