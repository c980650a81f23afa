use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyRecord {
    pub key: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("User with this email already exists")]
    DuplicateEmail,
    #[error("User not found")]
    UnknownUser,
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Users and API keys backing the demo auth endpoints.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn create_user(&self, name: &str, email: &str, password: &str)
    -> Result<User, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Option<User>;
    async fn find_user_by_id(&self, id: &str) -> Option<User>;
    /// Returns the user only when the password matches.
    async fn verify_credentials(&self, email: &str, password: &str) -> Option<User>;
    async fn create_api_key(&self, user_id: &str) -> Result<ApiKeyRecord, StoreError>;
    async fn find_api_key(&self, key: &str) -> Option<ApiKeyRecord>;
    async fn first_key_for_user(&self, user_id: &str) -> Option<ApiKeyRecord>;
}

#[derive(Clone, Default)]
pub struct MemoryIdentityStore {
    users: Arc<DashMap<String, User>>,
    emails: Arc<DashMap<String, String>>,
    keys: Arc<DashMap<String, ApiKeyRecord>>,
    user_keys: Arc<DashMap<String, Vec<String>>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, StoreError> {
        let password_hash = hash_password(password)?;
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash,
            created_at: Utc::now(),
        };
        match self.emails.entry(email.to_string()) {
            Entry::Occupied(_) => return Err(StoreError::DuplicateEmail),
            Entry::Vacant(slot) => {
                slot.insert(user.id.clone());
            }
        }
        self.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Option<User> {
        let id = self.emails.get(email)?.value().clone();
        self.users.get(&id).map(|u| u.value().clone())
    }

    async fn find_user_by_id(&self, id: &str) -> Option<User> {
        self.users.get(id).map(|u| u.value().clone())
    }

    async fn verify_credentials(&self, email: &str, password: &str) -> Option<User> {
        let user = self.find_user_by_email(email).await?;
        match verify_password(password, &user.password_hash) {
            Ok(true) => Some(user),
            Ok(false) => None,
            Err(err) => {
                tracing::warn!(user_id = %user.id, "stored password hash unreadable: {err}");
                None
            }
        }
    }

    async fn create_api_key(&self, user_id: &str) -> Result<ApiKeyRecord, StoreError> {
        if !self.users.contains_key(user_id) {
            return Err(StoreError::UnknownUser);
        }
        let record = ApiKeyRecord {
            key: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
        };
        self.keys.insert(record.key.clone(), record.clone());
        self.user_keys
            .entry(user_id.to_string())
            .or_default()
            .push(record.key.clone());
        Ok(record)
    }

    async fn find_api_key(&self, key: &str) -> Option<ApiKeyRecord> {
        self.keys.get(key).map(|k| k.value().clone())
    }

    async fn first_key_for_user(&self, user_id: &str) -> Option<ApiKeyRecord> {
        let first = self.user_keys.get(user_id)?.value().first()?.clone();
        self.find_api_key(&first).await
    }
}

fn hash_password(password: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| StoreError::Hash(e.to_string()))
}

fn verify_password(password: &str, hash: &str) -> Result<bool, String> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| e.to_string())?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
