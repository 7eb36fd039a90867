//! User records and the store they live in.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub email_verified: bool,
    /// Outstanding verification token. Cleared once the address is verified.
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl User {
    /// A user who has registered but not yet verified their address.
    pub fn unverified(
        id: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
        verification_token: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: name.into(),
            email_verified: false,
            verification_token: Some(verification_token.into()),
            verified_at: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user `{0}` not found")]
    NotFound(String),

    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

/// The narrow slice of user persistence the auth routes need.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// The unverified user holding `token`, if any.
    async fn find_unverified_by_token(&self, token: &str) -> Result<Option<User>, StoreError>;

    async fn find_unverified_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Sets `email_verified`, stamps `verified_at` and clears the token, but
    /// only while the user is still unverified and still holds `token`.
    /// Returns `None` when that condition no longer holds. The check and the
    /// update must be one atomic step.
    async fn mark_verified(&self, user_id: &str, token: &str) -> Result<Option<User>, StoreError>;

    async fn set_verification_token(&self, user_id: &str, token: &str) -> Result<(), StoreError>;
}

/// [`UserStore`] over a map keyed by user id.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn insert(&self, user: User) {
        self.write().insert(user.id.clone(), user);
    }

    pub fn get(&self, user_id: &str) -> Option<User> {
        self.read().get(user_id).cloned()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, User>> {
        self.users.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, User>> {
        self.users.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_unverified_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .read()
            .values()
            .find(|u| !u.email_verified && u.verification_token.as_deref() == Some(token))
            .cloned())
    }

    async fn find_unverified_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .read()
            .values()
            .find(|u| !u.email_verified && u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn mark_verified(&self, user_id: &str, token: &str) -> Result<Option<User>, StoreError> {
        let mut users = self.write();
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(user_id.to_owned()))?;
        if user.email_verified || user.verification_token.as_deref() != Some(token) {
            return Ok(None);
        }
        user.email_verified = true;
        user.verification_token = None;
        user.verified_at = Some(Utc::now());
        Ok(Some(user.clone()))
    }

    async fn set_verification_token(&self, user_id: &str, token: &str) -> Result<(), StoreError> {
        let mut users = self.write();
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(user_id.to_owned()))?;
        user.verification_token = Some(token.to_owned());
        Ok(())
    }
}
