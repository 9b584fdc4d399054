use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    AccountStore, AuditLog, ExecutionRecord, NewPrincipal, PrincipalRow, StoreError,
};

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    rows: RwLock<Vec<PrincipalRow>>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn insert(&self, principal: NewPrincipal) -> Result<PrincipalRow, StoreError> {
        let mut rows = self.rows.write().await;
        if rows.iter().any(|row| row.email == principal.email) {
            return Err(StoreError::UniqueViolation);
        }
        let id = rows.last().map_or(1, |row| row.id + 1);
        let row = PrincipalRow {
            id,
            email: principal.email,
            username: principal.username,
            password_hash: principal.password_hash,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<PrincipalRow>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().find(|row| row.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PrincipalRow>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().find(|row| row.id == id).cloned())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Append-only in-memory audit trail.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: RwLock<Vec<ExecutionRecord>>,
}

impl MemoryAuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<ExecutionRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn record(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }
}
