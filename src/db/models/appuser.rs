//! Models mapping to the appuser table. Users are created by the auth
//! service; checkout only needs their contact details.
use sqlx::{query_as, FromRow};
use uuid::Uuid;

use crate::{
    db::{errors::DatabaseError, ConnectionPool},
    utils::email::EmailAddress,
};

/// An `AppUser` which is stored in the database.
#[derive(FromRow, Clone, Debug)]
pub struct AppUser {
    /// The user's ID primary key.
    pub id: Uuid,
    /// The user's email address. Private so it is only handed out validated.
    email: String,
    pub name: Option<String>,
}

impl AppUser {
    /// Construct a user record outside of the database.
    pub fn new(id: Uuid, email: &str, name: Option<&str>) -> Self {
        Self {
            id,
            email: email.to_owned(),
            name: name.map(str::to_owned),
        }
    }
    /// The user's email address, or `None` if what is stored is not a valid address.
    pub fn email(&self) -> Option<EmailAddress> {
        EmailAddress::try_from(self.email.as_str()).ok()
    }
    /// Select an `AppUser` from the database by their ID.
    pub async fn select_one(
        id: Uuid,
        db_client: &ConnectionPool,
    ) -> Result<Option<Self>, DatabaseError> {
        Ok(
            query_as::<_, Self>("SELECT id, email, name FROM appuser WHERE id = $1")
                .bind(id)
                .fetch_optional(db_client)
                .await?,
        )
    }
}
