//! The storage interface the checkout services run against, and its
//! Postgres implementation on top of the row models.
use async_trait::async_trait;
use uuid::Uuid;

use super::{
    errors::DatabaseError,
    models::{
        appuser::AppUser,
        chapter::Chapter,
        course::Course,
        payment::{PaymentInsert, PaymentProvider, PaymentRecord},
        purchase::{Purchase, PurchaseInsert},
        user_progress::UserProgressInsert,
    },
    ConnectionPool,
};

/// Persistent state touched by checkout. Every write is scoped to one
/// (user, course) pair and relies on the store's unique constraints for
/// idempotency.
#[async_trait]
pub trait Store: Send + Sync {
    async fn course(&self, course_id: Uuid) -> Result<Option<Course>, DatabaseError>;
    async fn courses(&self, course_ids: &[Uuid]) -> Result<Vec<Course>, DatabaseError>;
    /// Published chapters of a course in display order.
    async fn published_chapters(&self, course_id: Uuid) -> Result<Vec<Chapter>, DatabaseError>;
    async fn user(&self, user_id: Uuid) -> Result<Option<AppUser>, DatabaseError>;
    async fn purchase(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Purchase>, DatabaseError>;
    /// Insert a purchase. `None` means the pair already existed.
    async fn insert_purchase(
        &self,
        purchase: PurchaseInsert,
    ) -> Result<Option<Purchase>, DatabaseError>;
    /// Insert missing progress rows. Returns how many were written.
    async fn insert_progress(&self, progress: UserProgressInsert) -> Result<u64, DatabaseError>;
    async fn insert_payment(&self, payment: PaymentInsert) -> Result<PaymentRecord, DatabaseError>;
    async fn payment(&self, payment_id: Uuid) -> Result<Option<PaymentRecord>, DatabaseError>;
    async fn payment_by_reference(
        &self,
        provider: PaymentProvider,
        reference: &str,
    ) -> Result<Option<PaymentRecord>, DatabaseError>;
    /// Persist a payment's status and metadata unless the stored copy has
    /// already settled. Returns whether it was written.
    async fn update_payment(&self, payment: &mut PaymentRecord) -> Result<bool, DatabaseError>;
}

/// `Store` backed by the Postgres connection pool.
#[derive(Clone)]
pub struct PgStore {
    db_conn: ConnectionPool,
}

impl PgStore {
    pub const fn new(db_conn: ConnectionPool) -> Self {
        Self { db_conn }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn course(&self, course_id: Uuid) -> Result<Option<Course>, DatabaseError> {
        Course::select_one(course_id, &self.db_conn).await
    }
    async fn courses(&self, course_ids: &[Uuid]) -> Result<Vec<Course>, DatabaseError> {
        Course::select_many(course_ids, &self.db_conn).await
    }
    async fn published_chapters(&self, course_id: Uuid) -> Result<Vec<Chapter>, DatabaseError> {
        Chapter::select_published(course_id, &self.db_conn).await
    }
    async fn user(&self, user_id: Uuid) -> Result<Option<AppUser>, DatabaseError> {
        AppUser::select_one(user_id, &self.db_conn).await
    }
    async fn purchase(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Purchase>, DatabaseError> {
        Purchase::select_one(user_id, course_id, &self.db_conn).await
    }
    async fn insert_purchase(
        &self,
        purchase: PurchaseInsert,
    ) -> Result<Option<Purchase>, DatabaseError> {
        purchase.store(&self.db_conn).await
    }
    async fn insert_progress(&self, progress: UserProgressInsert) -> Result<u64, DatabaseError> {
        progress.store(&self.db_conn).await
    }
    async fn insert_payment(&self, payment: PaymentInsert) -> Result<PaymentRecord, DatabaseError> {
        payment.store(&self.db_conn).await
    }
    async fn payment(&self, payment_id: Uuid) -> Result<Option<PaymentRecord>, DatabaseError> {
        PaymentRecord::select_one(payment_id, &self.db_conn).await
    }
    async fn payment_by_reference(
        &self,
        provider: PaymentProvider,
        reference: &str,
    ) -> Result<Option<PaymentRecord>, DatabaseError> {
        PaymentRecord::select_by_reference(provider, reference, &self.db_conn).await
    }
    async fn update_payment(&self, payment: &mut PaymentRecord) -> Result<bool, DatabaseError> {
        payment.update(&self.db_conn).await
    }
}
