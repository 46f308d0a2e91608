//! An in-process `Store`, selected with `LEARNHUB_STORE=memory` for local
//! development and used by the test suites.
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
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
    store::Store,
};

#[derive(Default)]
struct Tables {
    courses: HashMap<Uuid, Course>,
    chapters: Vec<Chapter>,
    users: HashMap<Uuid, AppUser>,
    purchases: HashMap<(Uuid, Uuid), Purchase>,
    progress: HashSet<(Uuid, Uuid)>,
    payments: Vec<PaymentRecord>,
}

/// A `Store` holding everything in memory behind a single lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
    pub async fn add_course(&self, course: Course) {
        self.tables.lock().await.courses.insert(course.id, course);
    }
    pub async fn add_chapter(&self, chapter: Chapter) {
        self.tables.lock().await.chapters.push(chapter);
    }
    pub async fn add_user(&self, user: AppUser) {
        self.tables.lock().await.users.insert(user.id, user);
    }
    /// Every purchase held by `user_id`.
    pub async fn purchases_of(&self, user_id: Uuid) -> Vec<Purchase> {
        self.tables
            .lock()
            .await
            .purchases
            .values()
            .filter(|purchase| purchase.user_id == user_id)
            .cloned()
            .collect()
    }
    /// Chapter IDs `user_id` has a progress row for.
    pub async fn progress_of(&self, user_id: Uuid) -> Vec<Uuid> {
        self.tables
            .lock()
            .await
            .progress
            .iter()
            .filter(|&&(user, _)| user == user_id)
            .map(|&(_, chapter)| chapter)
            .collect()
    }
    /// Every payment, in insertion order.
    pub async fn payments(&self) -> Vec<PaymentRecord> {
        self.tables.lock().await.payments.clone()
    }
}

fn matches_reference(payment: &PaymentRecord, provider: PaymentProvider, reference: &str) -> bool {
    if payment.provider != provider {
        return false;
    }
    let metadata = payment.metadata();
    match provider {
        PaymentProvider::Mpesa => metadata
            .mpesa()
            .and_then(|details| details.merchant_request_id.as_deref())
            == Some(reference),
        PaymentProvider::PayPal | PaymentProvider::Stripe => {
            payment.transaction_id == reference
                || metadata.paypal().is_some_and(|details| {
                    details.order_id.as_deref() == Some(reference)
                        || details.capture_id.as_deref() == Some(reference)
                })
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn course(&self, course_id: Uuid) -> Result<Option<Course>, DatabaseError> {
        Ok(self.tables.lock().await.courses.get(&course_id).cloned())
    }
    async fn courses(&self, course_ids: &[Uuid]) -> Result<Vec<Course>, DatabaseError> {
        let tables = self.tables.lock().await;
        Ok(course_ids
            .iter()
            .filter_map(|id| tables.courses.get(id).cloned())
            .collect())
    }
    async fn published_chapters(&self, course_id: Uuid) -> Result<Vec<Chapter>, DatabaseError> {
        let mut chapters: Vec<Chapter> = self
            .tables
            .lock()
            .await
            .chapters
            .iter()
            .filter(|chapter| chapter.course_id == course_id && chapter.is_published)
            .cloned()
            .collect();
        chapters.sort_by_key(|chapter| chapter.position);
        Ok(chapters)
    }
    async fn user(&self, user_id: Uuid) -> Result<Option<AppUser>, DatabaseError> {
        Ok(self.tables.lock().await.users.get(&user_id).cloned())
    }
    async fn purchase(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Purchase>, DatabaseError> {
        Ok(self
            .tables
            .lock()
            .await
            .purchases
            .get(&(user_id, course_id))
            .cloned())
    }
    async fn insert_purchase(
        &self,
        purchase: PurchaseInsert,
    ) -> Result<Option<Purchase>, DatabaseError> {
        let mut tables = self.tables.lock().await;
        let key = (purchase.user_id, purchase.course_id);
        if tables.purchases.contains_key(&key) {
            return Ok(None);
        }
        let stored = Purchase {
            id: Uuid::new_v4(),
            user_id: purchase.user_id,
            course_id: purchase.course_id,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.purchases.insert(key, stored.clone());
        Ok(Some(stored))
    }
    async fn insert_progress(&self, progress: UserProgressInsert) -> Result<u64, DatabaseError> {
        let mut tables = self.tables.lock().await;
        let user_id = progress.user_id();
        let mut written = 0;
        for &chapter_id in progress.chapter_ids() {
            if tables.progress.insert((user_id, chapter_id)) {
                written += 1;
            }
        }
        Ok(written)
    }
    async fn insert_payment(&self, payment: PaymentInsert) -> Result<PaymentRecord, DatabaseError> {
        let record = payment.into_record();
        self.tables.lock().await.payments.push(record.clone());
        Ok(record)
    }
    async fn payment(&self, payment_id: Uuid) -> Result<Option<PaymentRecord>, DatabaseError> {
        Ok(self
            .tables
            .lock()
            .await
            .payments
            .iter()
            .find(|payment| payment.id == payment_id)
            .cloned())
    }
    async fn payment_by_reference(
        &self,
        provider: PaymentProvider,
        reference: &str,
    ) -> Result<Option<PaymentRecord>, DatabaseError> {
        Ok(self
            .tables
            .lock()
            .await
            .payments
            .iter()
            .find(|payment| matches_reference(payment, provider, reference))
            .cloned())
    }
    async fn update_payment(&self, payment: &mut PaymentRecord) -> Result<bool, DatabaseError> {
        let mut tables = self.tables.lock().await;
        let Some(stored) = tables
            .payments
            .iter_mut()
            .find(|stored| stored.id == payment.id)
        else {
            return Ok(false);
        };
        if stored.status().is_terminal() {
            return Ok(false);
        }
        payment.updated_at = OffsetDateTime::now_utc();
        *stored = payment.clone();
        Ok(true)
    }
}
