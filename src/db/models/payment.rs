//! Models mapping to the payment table: the ledger of checkout attempts.
use serde::{Deserialize, Serialize};
use sqlx::{query_as, types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    constants::checkout::COURSE_CURRENCY,
    db::{errors::DatabaseError, ConnectionPool},
};

/// Payment networks a checkout can be routed to.
#[derive(sqlx::Type, Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[sqlx(type_name = "payment_provider", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    PayPal,
    Mpesa,
    /// Reserved. Never initiated.
    Stripe,
}

impl PaymentProvider {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PayPal => "paypal",
            Self::Mpesa => "mpesa",
            Self::Stripe => "stripe",
        }
    }
}

impl core::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for PaymentProvider {
    type Err = ();
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "paypal" => Ok(Self::PayPal),
            "mpesa" => Ok(Self::Mpesa),
            "stripe" => Ok(Self::Stripe),
            _ => Err(()),
        }
    }
}

/// Lifecycle of a payment attempt. `Completed` and `Failed` are terminal.
#[derive(sqlx::Type, Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Created, no provider contacted yet.
    Pending,
    /// The provider has been (or is being) asked to collect the payment.
    Initiated,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// PayPal specific context of a payment.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PayPalDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_id: Option<String>,
    /// The charged amount in USD, formatted with two decimals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usd_amount: Option<String>,
    /// KES per USD used for the conversion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_rate: Option<f64>,
}

/// M-PESA specific context of a payment.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MpesaDetails {
    /// Payer MSISDN in `254XXXXXXXXX` form.
    pub phone_number: String,
    /// Echoed back by the STK callback; the only way to match it to a record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_number: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderDetails {
    /// No provider has been contacted yet.
    #[default]
    None,
    PayPal(PayPalDetails),
    Mpesa(MpesaDetails),
}

/// Where a provider sends the buyer back to.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReturnUrls {
    pub success_url: String,
    pub cancel_url: String,
}

/// Context stored alongside a payment, persisted as JSON.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PaymentMetadata {
    /// Title of the course at the time of checkout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_urls: Option<ReturnUrls>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub details: ProviderDetails,
}

impl PaymentMetadata {
    pub fn paypal_mut(&mut self) -> Option<&mut PayPalDetails> {
        match self.details {
            ProviderDetails::PayPal(ref mut details) => Some(details),
            ProviderDetails::None | ProviderDetails::Mpesa(_) => None,
        }
    }
    pub const fn paypal(&self) -> Option<&PayPalDetails> {
        match self.details {
            ProviderDetails::PayPal(ref details) => Some(details),
            ProviderDetails::None | ProviderDetails::Mpesa(_) => None,
        }
    }
    pub const fn mpesa(&self) -> Option<&MpesaDetails> {
        match self.details {
            ProviderDetails::Mpesa(ref details) => Some(details),
            ProviderDetails::None | ProviderDetails::PayPal(_) => None,
        }
    }
    pub fn mpesa_mut(&mut self) -> Option<&mut MpesaDetails> {
        match self.details {
            ProviderDetails::Mpesa(ref mut details) => Some(details),
            ProviderDetails::None | ProviderDetails::PayPal(_) => None,
        }
    }
}

/// INSERT model for a `PaymentRecord`. The ID is assigned up front so
/// redirect URLs can reference it before the row exists.
pub struct PaymentInsert {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub provider: PaymentProvider,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub metadata: PaymentMetadata,
}

/// Outcome of moving a payment to a terminal status.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Settlement {
    /// The status changed.
    Applied,
    /// The payment was already in the requested status.
    Unchanged,
    /// The payment had already settled the other way; nothing changed.
    Conflicting(PaymentStatus),
}

/// A payment attempt stored in the database.
#[derive(FromRow, Clone, Debug)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub provider: PaymentProvider,
    /// Amount in minor units of `currency`.
    pub amount: i64,
    pub currency: String,
    status: PaymentStatus,
    /// External correlation ID, unique and fixed for the life of the attempt.
    pub transaction_id: String,
    metadata: Json<PaymentMetadata>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl PaymentInsert {
    /// A payment for `amount` KES minor units with empty metadata.
    pub fn new(
        user_id: Uuid,
        course_id: Uuid,
        provider: PaymentProvider,
        amount: i64,
        status: PaymentStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            course_id,
            provider,
            amount,
            currency: COURSE_CURRENCY.to_owned(),
            status,
            metadata: PaymentMetadata::default(),
        }
    }
    /// Build the record this insert would produce, deriving its transaction ID.
    pub fn into_record(self) -> PaymentRecord {
        let id = self.id;
        let now = OffsetDateTime::now_utc();
        PaymentRecord {
            id,
            user_id: self.user_id,
            course_id: self.course_id,
            provider: self.provider,
            amount: self.amount,
            currency: self.currency,
            status: self.status,
            transaction_id: format!("lh_{}", id.simple()),
            metadata: Json(self.metadata),
            created_at: now,
            updated_at: now,
        }
    }
    /// Store this INSERT model and return the complete record.
    pub async fn store(self, db_client: &ConnectionPool) -> Result<PaymentRecord, DatabaseError> {
        let record = self.into_record();
        Ok(query_as::<_, PaymentRecord>(
            "INSERT INTO payment
            (id, user_id, course_id, provider, amount, currency, status, transaction_id, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING *",
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.course_id)
        .bind(record.provider)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.status)
        .bind(&record.transaction_id)
        .bind(&record.metadata)
        .bind(record.created_at)
        .fetch_one(db_client)
        .await?)
    }
}

impl PaymentRecord {
    pub const fn status(&self) -> PaymentStatus {
        self.status
    }
    pub fn metadata(&self) -> &PaymentMetadata {
        &self.metadata.0
    }
    /// Mutable access to the metadata. Changes are only persisted by `update`.
    pub fn metadata_mut(&mut self) -> &mut PaymentMetadata {
        &mut self.metadata.0
    }
    /// Mark a pending payment as handed over to its provider. Has no effect
    /// once the payment has settled.
    pub fn mark_initiated(&mut self) {
        if self.status == PaymentStatus::Pending {
            self.status = PaymentStatus::Initiated;
        }
    }
    /// Move the payment to a terminal status. Settled payments never change.
    pub fn settle(&mut self, status: PaymentStatus, failure_reason: Option<&str>) -> Settlement {
        debug_assert!(status.is_terminal(), "settle called with a non-terminal status");
        if self.status == status {
            return Settlement::Unchanged;
        }
        if self.status.is_terminal() {
            return Settlement::Conflicting(self.status);
        }
        self.status = status;
        if let Some(reason) = failure_reason {
            self.metadata.0.failure_reason = Some(reason.to_owned());
        }
        Settlement::Applied
    }

    /// Select a `PaymentRecord` by its ID.
    pub async fn select_one(
        id: Uuid,
        db_client: &ConnectionPool,
    ) -> Result<Option<Self>, DatabaseError> {
        Ok(query_as::<_, Self>("SELECT * FROM payment WHERE id = $1")
            .bind(id)
            .fetch_optional(db_client)
            .await?)
    }
    /// Select the payment a provider-issued reference belongs to. PayPal
    /// references match the transaction ID, order ID or capture ID; M-PESA
    /// references match the merchant request ID.
    pub async fn select_by_reference(
        provider: PaymentProvider,
        reference: &str,
        db_client: &ConnectionPool,
    ) -> Result<Option<Self>, DatabaseError> {
        let sql = match provider {
            PaymentProvider::Mpesa => {
                "SELECT * FROM payment WHERE provider = $1
                AND metadata -> 'details' ->> 'merchant_request_id' = $2"
            }
            PaymentProvider::PayPal | PaymentProvider::Stripe => {
                "SELECT * FROM payment WHERE provider = $1
                AND (transaction_id = $2
                    OR metadata -> 'details' ->> 'order_id' = $2
                    OR metadata -> 'details' ->> 'capture_id' = $2)"
            }
        };
        Ok(query_as::<_, Self>(sql)
            .bind(provider)
            .bind(reference)
            .fetch_optional(db_client)
            .await?)
    }
    /// Persist status and metadata, provided the stored row has not settled
    /// in the meantime. Returns whether the row was written.
    pub async fn update(&mut self, db_client: &ConnectionPool) -> Result<bool, DatabaseError> {
        let now = OffsetDateTime::now_utc();
        let result = sqlx::query(
            "UPDATE payment SET status = $1, metadata = $2, updated_at = $3
            WHERE id = $4 AND status IN ('pending', 'initiated')",
        )
        .bind(self.status)
        .bind(&self.metadata)
        .bind(now)
        .bind(self.id)
        .execute(db_client)
        .await?;
        self.updated_at = now;
        Ok(result.rows_affected() == 1)
    }
}
