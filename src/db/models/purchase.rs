//! Models mapping to the purchase table. A purchase grants a user access to
//! a course and is never updated once written.
use serde::Serialize;
use sqlx::{query_as, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::{errors::DatabaseError, ConnectionPool};

/// INSERT model for a `Purchase`.
pub struct PurchaseInsert {
    pub user_id: Uuid,
    pub course_id: Uuid,
}

/// A `Purchase` stored in the database. (user_id, course_id) is unique.
#[derive(FromRow, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl PurchaseInsert {
    /// Construct a new purchase INSERT model.
    pub const fn new(user_id: Uuid, course_id: Uuid) -> Self {
        Self { user_id, course_id }
    }
    /// Attempt to store the purchase. Returns `None` when the user already
    /// owns the course, so concurrent or replayed finalizations are no-ops.
    pub async fn store(self, db_client: &ConnectionPool) -> Result<Option<Purchase>, DatabaseError> {
        let result = query_as::<_, Purchase>(
            "INSERT INTO purchase (id, user_id, course_id) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(self.user_id)
        .bind(self.course_id)
        .fetch_one(db_client)
        .await
        .map_err(DatabaseError::from);
        match result {
            Ok(purchase) => Ok(Some(purchase)),
            Err(err) if err.is_unique_violation() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl Purchase {
    /// Select the purchase of `course_id` by `user_id`, if any.
    pub async fn select_one(
        user_id: Uuid,
        course_id: Uuid,
        db_client: &ConnectionPool,
    ) -> Result<Option<Self>, DatabaseError> {
        Ok(query_as::<_, Self>(
            "SELECT * FROM purchase WHERE user_id = $1 AND course_id = $2",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(db_client)
        .await?)
    }
}
