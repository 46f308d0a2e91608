//! Models mapping to the user_progress table.
use sqlx::query;
use uuid::Uuid;

use crate::db::{errors::DatabaseError, ConnectionPool};

/// Bulk INSERT model seeding progress rows for a set of chapters.
pub struct UserProgressInsert {
    user_id: Uuid,
    chapter_ids: Vec<Uuid>,
}

impl UserProgressInsert {
    pub const fn new(user_id: Uuid, chapter_ids: Vec<Uuid>) -> Self {
        Self {
            user_id,
            chapter_ids,
        }
    }
    pub const fn user_id(&self) -> Uuid {
        self.user_id
    }
    pub fn chapter_ids(&self) -> &[Uuid] {
        &self.chapter_ids
    }
    /// Store one incomplete progress row per chapter, skipping chapters the
    /// user already has a row for. Returns the number of rows written.
    pub async fn store(self, db_client: &ConnectionPool) -> Result<u64, DatabaseError> {
        if self.chapter_ids.is_empty() {
            return Ok(0);
        }
        let row_ids: Vec<Uuid> = self.chapter_ids.iter().map(|_| Uuid::new_v4()).collect();
        Ok(query(
            "INSERT INTO user_progress (id, user_id, chapter_id, is_completed)
            SELECT row_id, $1, chapter_id, FALSE FROM UNNEST($2::uuid[], $3::uuid[]) AS t(row_id, chapter_id)
            ON CONFLICT (user_id, chapter_id) DO NOTHING",
        )
        .bind(self.user_id)
        .bind(&row_ids)
        .bind(&self.chapter_ids)
        .execute(db_client)
        .await?
        .rows_affected())
    }
}
