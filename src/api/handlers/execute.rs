//! `POST /execute`: run one command on a remote host for the session principal.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use secrecy::SecretString;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};
use utoipa::ToSchema;

use super::auth::AuthenticatedPrincipal;
use super::{error_response, ErrorResponse};
use crate::broker::{ExecutionError, ExecutionRequest, RemoteExecutionBroker};

#[derive(ToSchema, Deserialize)]
pub struct ExecuteRequest {
    pub username: String,
    pub password: String,
    pub host: String,
    /// Accepted as a JSON number or a numeric string (`22` or `"22"`).
    #[serde(deserialize_with = "port_from_number_or_string")]
    #[schema(value_type = u16, example = 22)]
    pub port: u16,
    pub command: String,
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text
            .trim()
            .parse::<u16>()
            .map_err(|_| de::Error::custom(format!("invalid port: {text:?}"))),
    }
}

impl ExecuteRequest {
    fn validate(&self) -> Result<(), &'static str> {
        if self.username.trim().is_empty() {
            return Err("Username is required");
        }
        if self.password.is_empty() {
            return Err("Password is required");
        }
        if self.host.trim().is_empty() {
            return Err("Host is required");
        }
        if self.port == 0 {
            return Err("Invalid port");
        }
        if self.command.is_empty() {
            return Err("Command is required");
        }
        Ok(())
    }
}

impl From<ExecuteRequest> for ExecutionRequest {
    fn from(request: ExecuteRequest) -> Self {
        Self {
            username: request.username,
            password: SecretString::from(request.password),
            host: request.host.trim().to_string(),
            port: request.port,
            command: request.command,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ExecuteResponse {
    /// Combined stdout and stderr, lossily decoded as UTF-8.
    pub output: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ExecuteErrorResponse {
    pub error: String,
    /// One of `ConnectionFailed`, `AuthenticationFailed`, `CommandFailed`,
    /// `StorageFailed`, `Cancelled`.
    pub kind: String,
}

impl From<&ExecutionError> for ExecuteErrorResponse {
    fn from(err: &ExecutionError) -> Self {
        Self {
            error: err.public_message(),
            kind: err.kind().to_string(),
        }
    }
}

#[utoipa::path(
    post,
    path = "/execute",
    request_body = ExecuteRequest,
    responses(
        (status = 200, description = "Command ran and exited successfully", body = ExecuteResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 401, description = "Missing, invalid, or expired session", body = ErrorResponse),
        (status = 500, description = "Execution failed", body = ExecuteErrorResponse),
    ),
    tag = "execute"
)]
#[instrument(skip_all, fields(principal_id = principal_id))]
pub async fn execute(
    Extension(AuthenticatedPrincipal(principal_id)): Extension<AuthenticatedPrincipal>,
    Extension(broker): Extension<Arc<RemoteExecutionBroker>>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(JsonRejection::JsonDataError(err)) => {
            debug!("Rejected execute payload: {err}");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request payload");
        }
        Err(JsonRejection::JsonSyntaxError(err)) => {
            debug!("Rejected execute payload: {err}");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request payload");
        }
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };
    if let Err(message) = request.validate() {
        return error_response(StatusCode::BAD_REQUEST, message);
    }

    // Dropping this handler (client went away) cancels the execution task.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let task = tokio::spawn(async move {
        broker
            .execute(ExecutionRequest::from(request), principal_id, cancel)
            .await
    });

    match task.await {
        Ok(Ok(output)) => (
            StatusCode::OK,
            Json(ExecuteResponse {
                output: String::from_utf8_lossy(&output.output).into_owned(),
            }),
        )
            .into_response(),
        Ok(Err(err)) => {
            warn!(kind = err.kind(), "Execution failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ExecuteErrorResponse::from(&err)),
            )
                .into_response()
        }
        Err(err) => {
            error!("Execution task failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Execution task failed")
        }
    }
}
