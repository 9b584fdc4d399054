//! Account directory: registration, lookup, and login verification.

use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};
use utoipa::ToSchema;

use crate::hasher::{CredentialHasher, HashError};
use crate::storage::{AccountStore, NewPrincipal, PrincipalRow, StoreError};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user already exists")]
    AlreadyExists,
    #[error("user not found")]
    NotFound,
    #[error("invalid password")]
    BadPassword,
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    Store(StoreError),
    #[error("password hashing task failed")]
    Task(#[from] tokio::task::JoinError),
}

impl From<StoreError> for DirectoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation => Self::AlreadyExists,
            other => Self::Store(other),
        }
    }
}

/// A registered identity as exposed outside the directory. No password hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub email: String,
}

impl From<PrincipalRow> for Principal {
    fn from(row: PrincipalRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
        }
    }
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

#[derive(Clone)]
pub struct AccountDirectory {
    store: Arc<dyn AccountStore>,
    hasher: CredentialHasher,
}

impl AccountDirectory {
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>, hasher: CredentialHasher) -> Self {
        Self { store, hasher }
    }

    /// Hash the password and persist a new principal.
    ///
    /// # Errors
    /// [`DirectoryError::AlreadyExists`] when the email is taken.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<Principal, DirectoryError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        // argon2 is deliberately slow; keep it off the async workers
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password)).await??;

        let row = self
            .store
            .insert(NewPrincipal {
                email: normalize_email(email),
                username: username.to_string(),
                password_hash,
            })
            .await?;

        debug!(principal_id = row.id, "principal registered");

        Ok(row.into())
    }

    /// # Errors
    /// [`DirectoryError::NotFound`] when no principal has this email.
    pub async fn find_by_email(&self, email: &str) -> Result<Principal, DirectoryError> {
        self.store
            .find_by_email(&normalize_email(email))
            .await?
            .map(Principal::from)
            .ok_or(DirectoryError::NotFound)
    }

    /// # Errors
    /// [`DirectoryError::NotFound`] when the id is unknown.
    pub async fn find_by_id(&self, id: i64) -> Result<Principal, DirectoryError> {
        self.store
            .find_by_id(id)
            .await?
            .map(Principal::from)
            .ok_or(DirectoryError::NotFound)
    }

    /// Whether a principal is registered under this email.
    ///
    /// # Errors
    /// Returns an error only if the store fails.
    pub async fn email_exists(&self, email: &str) -> Result<bool, DirectoryError> {
        match self.find_by_email(email).await {
            Ok(_) => Ok(true),
            Err(DirectoryError::NotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Look up the principal and check the password against the stored hash.
    ///
    /// # Errors
    /// [`DirectoryError::NotFound`] or [`DirectoryError::BadPassword`].
    #[instrument(skip(self, password))]
    pub async fn verify_login(&self, email: &str, password: &str) -> Result<Principal, DirectoryError> {
        let row = self
            .store
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or(DirectoryError::NotFound)?;

        let hasher = self.hasher.clone();
        let password = password.to_string();
        let stored = row.password_hash.clone();
        let matches =
            tokio::task::spawn_blocking(move || hasher.verify(&password, &stored)).await?;

        if matches {
            Ok(row.into())
        } else {
            Err(DirectoryError::BadPassword)
        }
    }

    /// # Errors
    /// Returns an error if the backing store is unreachable.
    pub async fn ping(&self) -> Result<(), DirectoryError> {
        Ok(self.store.ping().await?)
    }
}
