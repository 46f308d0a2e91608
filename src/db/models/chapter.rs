//! Models mapping to the chapter table.
use sqlx::{query_as, FromRow};
use uuid::Uuid;

use crate::db::{errors::DatabaseError, ConnectionPool};

/// A chapter of a course. Read-only from checkout's point of view.
#[derive(FromRow, Clone, Debug, PartialEq, Eq)]
pub struct Chapter {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub position: i32,
    pub is_published: bool,
    /// Free preview chapters still get a progress row once purchased.
    pub is_free: bool,
}

impl Chapter {
    /// Select the published chapters of a course in display order.
    pub async fn select_published(
        course_id: Uuid,
        db_client: &ConnectionPool,
    ) -> Result<Vec<Self>, DatabaseError> {
        Ok(query_as::<_, Self>(
            "SELECT * FROM chapter WHERE course_id = $1 AND is_published ORDER BY position",
        )
        .bind(course_id)
        .fetch_all(db_client)
        .await?)
    }
}
