//! Remote execution broker.
//!
//! One request maps to one audit row, one connection, one command, and one
//! response. The audit row is written before any connection attempt, so failed
//! executions still leave a trace; if it cannot be written nothing is executed.

use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::now_unix_seconds;
use crate::storage::{AuditLog, ExecutionRecord};

pub mod ssh;

pub use ssh::{HostKeyPolicy, SshConfig, SshShell};

/// Connection parameters and command for a single execution.
#[derive(Clone, Debug)]
pub struct ExecutionRequest {
    pub username: String,
    pub password: SecretString,
    pub host: String,
    pub port: u16,
    pub command: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// stdout and stderr interleaved in the order the remote side sent them.
    pub output: Vec<u8>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("failed to connect: {0}")]
    ConnectionFailed(String),
    #[error("remote authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("failed to open remote session: {0}")]
    SessionFailed(String),
    #[error("failed to run command: {0}")]
    CommandFailed(String),
    #[error("failed to store execution record: {0}")]
    StorageFailed(String),
    #[error("execution cancelled")]
    Cancelled,
}

impl ExecutionError {
    /// Category reported to callers. Authentication and session failures share
    /// one category so the response does not reveal which remote check failed.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionFailed(_) => "ConnectionFailed",
            Self::AuthenticationFailed(_) | Self::SessionFailed(_) => "AuthenticationFailed",
            Self::CommandFailed(_) => "CommandFailed",
            Self::StorageFailed(_) => "StorageFailed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Human-readable message safe to return to callers.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::AuthenticationFailed(_) | Self::SessionFailed(_) => {
                "Error executing command: remote authentication failed".to_string()
            }
            Self::StorageFailed(_) => "Failed to store execution record".to_string(),
            other => format!("Error executing command: {other}"),
        }
    }
}

/// Runs one command on one remote host over a fresh connection.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Connect, authenticate, run `request.command`, and tear everything down.
    ///
    /// Implementations stop and clean up as soon as `cancel` fires.
    async fn run(
        &self,
        request: &ExecutionRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<u8>, ExecutionError>;
}

#[derive(Clone)]
pub struct RemoteExecutionBroker {
    shell: Arc<dyn RemoteShell>,
    audit: Arc<dyn AuditLog>,
}

impl RemoteExecutionBroker {
    #[must_use]
    pub fn new(shell: Arc<dyn RemoteShell>, audit: Arc<dyn AuditLog>) -> Self {
        Self { shell, audit }
    }

    /// Record the attempt, then run the command on behalf of `principal_id`.
    ///
    /// # Errors
    /// Any [`ExecutionError`]; nothing is retried.
    #[instrument(skip(self, request, cancel), fields(host = %request.host, port = request.port, username = %request.username))]
    pub async fn execute(
        &self,
        request: ExecutionRequest,
        principal_id: i64,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let record = ExecutionRecord {
            principal_id,
            username: request.username.clone(),
            host: request.host.clone(),
            port: request.port,
            created_at_unix: now_unix_seconds(),
        };

        self.audit.record(&record).await.map_err(|err| {
            error!("Failed to store execution record: {err}");
            ExecutionError::StorageFailed(err.to_string())
        })?;

        let output = self.shell.run(&request, cancel).await?;

        info!(bytes = output.len(), "command executed");

        Ok(ExecutionOutput { output })
    }
}
