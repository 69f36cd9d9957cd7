use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::SessionToken;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// The persisted credential and when it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredToken {
    pub token: SessionToken,
    pub stored_at: DateTime<Utc>,
}

/// Durable slot for the single session token of this client.
///
/// There is one slot: saving replaces whatever was there.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read the persisted token, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be read.
    async fn load(&self) -> Result<Option<StoredToken>, StorageError>;

    /// Persist `token`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the token cannot be written.
    async fn save(&self, token: &SessionToken) -> Result<(), StorageError>;

    /// Remove the persisted token. Clearing an empty slot is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be written.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// Simple in-memory token slot for testing and ephemeral sessions.
#[derive(Clone, Default)]
pub struct InMemoryTokenStore {
    slot: Arc<Mutex<Option<StoredToken>>>,
}

impl InMemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a token already persisted, as if left by a previous run.
    #[must_use]
    pub fn with_token(token: SessionToken) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(StoredToken {
                token,
                stored_at: Utc::now(),
            }))),
        }
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self) -> Result<Option<StoredToken>, StorageError> {
        let guard = self
            .slot
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.clone())
    }

    async fn save(&self, token: &SessionToken) -> Result<(), StorageError> {
        let mut guard = self
            .slot
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = Some(StoredToken {
            token: token.clone(),
            stored_at: Utc::now(),
        });
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut guard = self
            .slot
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = None;
        Ok(())
    }
}

/// Aggregates client-side persistence behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub tokens: Arc<dyn TokenStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let tokens: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
        Self { tokens }
    }
}
