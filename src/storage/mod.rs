//! Persistence seams for principals and execution audit records.
//!
//! Production uses Postgres through `sqlx`; the in-memory implementations back
//! tests and local runs without a database.

use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod postgres;

pub use memory::{MemoryAccountStore, MemoryAuditLog};
pub use postgres::{apply_schema, PgAccountStore, PgAuditLog};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    UniqueViolation,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A principal row as stored, including the password hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrincipalRow {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub password_hash: String,
}

#[derive(Clone, Debug)]
pub struct NewPrincipal {
    pub email: String,
    pub username: String,
    pub password_hash: String,
}

/// One audit row per execution attempt. Never carries the remote password.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionRecord {
    pub principal_id: i64,
    pub username: String,
    pub host: String,
    pub port: u16,
    pub created_at_unix: i64,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a principal; a duplicate email is [`StoreError::UniqueViolation`].
    async fn insert(&self, principal: NewPrincipal) -> Result<PrincipalRow, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<PrincipalRow>, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<PrincipalRow>, StoreError>;

    /// Liveness check used by the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, record: &ExecutionRecord) -> Result<(), StoreError>;
}
