//! Session resolution. Maps the session cookie issued by the auth service to
//! the user it authenticates.
pub mod store;
use std::collections::HashMap;

use async_trait::async_trait;
use axum_extra::extract::CookieJar;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::constants::sessions::SESSION_COOKIE;

/// Resolves session tokens to user IDs.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The user authenticated by `token`, or `None` for unknown or expired tokens.
    async fn user_id(&self, token: &str) -> Result<Option<Uuid>, errors::SessionStorageError>;
}

/// A session belonging to a signed-in customer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CustomerSession {
    user_id: Uuid,
}

impl CustomerSession {
    /// Get the ID of the user authenticated by this session.
    pub const fn user_id(&self) -> Uuid {
        self.user_id
    }
    /// Resolve the session cookie in `cookie_jar`, if there is one.
    pub async fn from_cookies(
        cookie_jar: &CookieJar,
        session_store: &dyn SessionStore,
    ) -> Result<Option<Self>, errors::SessionStorageError> {
        let Some(cookie) = cookie_jar.get(SESSION_COOKIE) else {
            return Ok(None);
        };
        Ok(session_store
            .user_id(cookie.value())
            .await?
            .map(|user_id| Self { user_id }))
    }
}

/// Session store kept in memory, used with the in-memory `Store` and in tests.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Uuid>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
    pub async fn insert(&self, token: &str, user_id: Uuid) {
        self.sessions.write().await.insert(token.to_owned(), user_id);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn user_id(&self, token: &str) -> Result<Option<Uuid>, errors::SessionStorageError> {
        Ok(self.sessions.read().await.get(token).copied())
    }
}

/// Errors returned by functions in this module.
pub mod errors {
    use redis::RedisError;
    use thiserror::Error;

    /// An error returned by the underlying storage layer.
    #[derive(Error, Debug)]
    #[error(transparent)]
    pub struct SessionStorageError(#[from] RedisError);
}
