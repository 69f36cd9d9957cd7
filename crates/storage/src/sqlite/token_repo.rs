use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::repository::{StorageError, StoredToken, TokenStore};
use course_core::model::SessionToken;

use super::SqliteRepository;

#[async_trait]
impl TokenStore for SqliteRepository {
    async fn load(&self) -> Result<Option<StoredToken>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT token, stored_at
            FROM session_token
            WHERE id = 1
            ",
        )
        .fetch_optional(self.pool())
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let token: String = row
            .try_get("token")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let stored_at: DateTime<Utc> = row
            .try_get("stored_at")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        Ok(Some(StoredToken {
            token: SessionToken::new(token),
            stored_at,
        }))
    }

    async fn save(&self, token: &SessionToken) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO session_token (id, token, stored_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                token = excluded.token,
                stored_at = excluded.stored_at
            ",
        )
        .bind(1_i64)
        .bind(token.expose())
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM session_token WHERE id = 1")
            .execute(self.pool())
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;
        Ok(())
    }
}
