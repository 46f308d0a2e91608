//! Models mapping to the course table. Courses are owned by the catalog
//! service; checkout only reads them.
use serde::Serialize;
use sqlx::{query_as, FromRow};
use uuid::Uuid;

use crate::db::{errors::DatabaseError, ConnectionPool};

/// A course as stored in the database.
#[derive(FromRow, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    /// The course's ID primary key.
    pub id: Uuid,
    pub title: String,
    /// Display name of the teaching user.
    pub instructor: String,
    pub image_url: Option<String>,
    /// The price in KES minor units. `None` or zero marks a free course.
    pub price: Option<i64>,
    pub is_published: bool,
}

impl Course {
    /// Whether the course can be enrolled in without payment.
    pub fn is_free(&self) -> bool {
        self.price.is_none_or(|price| price <= 0)
    }
    /// The price in KES minor units, zero for free courses.
    pub fn price_or_zero(&self) -> i64 {
        self.price.unwrap_or(0).max(0)
    }
    /// Select a `Course` by its ID.
    pub async fn select_one(
        id: Uuid,
        db_client: &ConnectionPool,
    ) -> Result<Option<Self>, DatabaseError> {
        Ok(query_as::<_, Self>("SELECT * FROM course WHERE id = $1")
            .bind(id)
            .fetch_optional(db_client)
            .await?)
    }
    /// Select every course whose ID is in `ids`. Order is unspecified.
    pub async fn select_many(
        ids: &[Uuid],
        db_client: &ConnectionPool,
    ) -> Result<Vec<Self>, DatabaseError> {
        Ok(query_as::<_, Self>("SELECT * FROM course WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(db_client)
            .await?)
    }
}
