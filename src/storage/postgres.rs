use async_trait::async_trait;
use sqlx::{Connection, PgPool, Row};
use tracing::{debug, Instrument, info_span};

use super::{
    AccountStore, AuditLog, ExecutionRecord, NewPrincipal, PrincipalRow, StoreError,
};

// Seconds stay integral end to end; Postgres converts them.
const INSERT_EXECUTION_RECORD: &str = r"
    INSERT INTO execution_records (principal_id, username, host, port, created_at)
    VALUES ($1, $2, $3, $4, to_timestamp($5::bigint))
";

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

/// Create the tables if they are missing. Safe to run on every startup.
///
/// # Errors
/// Returns an error if any schema statement fails.
pub async fn apply_schema(pool: &PgPool) -> Result<(), StoreError> {
    for statement in split_sql_statements(SCHEMA_SQL) {
        sqlx::query(&statement).execute(pool).await?;
    }
    debug!("schema applied");
    Ok(())
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn principal_from_row(row: &sqlx::postgres::PgRow) -> Result<PrincipalRow, sqlx::Error> {
    Ok(PrincipalRow {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
    })
}

#[derive(Clone, Debug)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn insert(&self, principal: NewPrincipal) -> Result<PrincipalRow, StoreError> {
        let query = r"
            INSERT INTO principals (email, username, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, username, password_hash
        ";
        let span = info_span!("db.insert", db.system = "postgresql", db.table = "principals");
        let row = sqlx::query(query)
            .bind(&principal.email)
            .bind(&principal.username)
            .bind(&principal.password_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    StoreError::UniqueViolation
                } else {
                    StoreError::Database(err)
                }
            })?;
        Ok(principal_from_row(&row)?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<PrincipalRow>, StoreError> {
        let row = sqlx::query(
            "SELECT id, email, username, password_hash FROM principals WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(principal_from_row).transpose()?)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PrincipalRow>, StoreError> {
        let row = sqlx::query(
            "SELECT id, email, username, password_hash FROM principals WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(principal_from_row).transpose()?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        conn.ping().await?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PgAuditLog {
    async fn record(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        let span = info_span!(
            "db.insert",
            db.system = "postgresql",
            db.table = "execution_records"
        );
        sqlx::query(INSERT_EXECUTION_RECORD)
            .bind(record.principal_id)
            .bind(&record.username)
            .bind(&record.host)
            .bind(i32::from(record.port))
            .bind(record.created_at_unix)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }
}
