//! Provider notifications: PayPal webhook events and M-PESA STK callbacks.
//! Each notification is matched to exactly one payment, settles it, and
//! finalizes the purchase when the payment completed.
use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    db::{
        models::payment::{PaymentProvider, PaymentRecord, PaymentStatus, Settlement},
        store::Store,
    },
    services::{
        finalization::finalize_purchase, notifications::Notifier,
        providers::paypal::parse_custom_id,
    },
};

/// Headers PayPal signs every webhook delivery with.
pub const PAYPAL_SIGNATURE_HEADERS: [&str; 4] = [
    "paypal-transmission-id",
    "paypal-transmission-time",
    "paypal-transmission-sig",
    "paypal-cert-url",
];

/// Header naming the provider on the shared webhook endpoint.
pub const PROVIDER_HEADER: &str = "x-payment-provider";

/// Decides whether a delivery really came from the provider.
#[async_trait]
pub trait WebhookVerifier: Send + Sync {
    async fn verify(
        &self,
        provider: PaymentProvider,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(), errors::WebhookError>;
}

/// Accepts every delivery without checking signatures. Not safe for
/// production; deployments must supply a real verifier.
pub struct AcceptAllVerifier(());

impl AcceptAllVerifier {
    pub fn new() -> Self {
        tracing::warn!(
            "Webhook signature verification is disabled, all provider notifications will be trusted"
        );
        Self(())
    }
}

#[async_trait]
impl WebhookVerifier for AcceptAllVerifier {
    async fn verify(
        &self,
        _provider: PaymentProvider,
        _headers: &HeaderMap,
        _body: &[u8],
    ) -> Result<(), errors::WebhookError> {
        Ok(())
    }
}

/// Resolve the provider named on the shared webhook endpoint.
pub fn provider_from_headers(headers: &HeaderMap) -> Result<PaymentProvider, errors::WebhookError> {
    let value = headers
        .get(PROVIDER_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(errors::WebhookError::MissingHeader(PROVIDER_HEADER))?;
    match value.parse() {
        Ok(provider @ (PaymentProvider::PayPal | PaymentProvider::Mpesa)) => Ok(provider),
        Ok(PaymentProvider::Stripe) | Err(()) => {
            Err(errors::WebhookError::UnknownProvider(value.to_owned()))
        }
    }
}

/// What a notification did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The payment is completed and the purchase finalized.
    Completed { payment_id: Uuid, newly_enrolled: bool },
    /// The payment is in a terminal status other than the one the
    /// notification asked for, or was failed by it.
    Settled { payment_id: Uuid, status: PaymentStatus },
    /// No payment matches the notification.
    Unmatched,
    /// The notification needs no action.
    Ignored,
}

/// Move `payment` to `status` and finalize when it ends up completed.
/// Replays and late notifications for settled payments change nothing.
async fn settle_payment(
    store: &dyn Store,
    notifier: &dyn Notifier,
    mut payment: PaymentRecord,
    status: PaymentStatus,
    failure_reason: Option<&str>,
) -> Result<WebhookOutcome, errors::WebhookError> {
    let settled = match payment.settle(status, failure_reason) {
        Settlement::Applied => {
            if store.update_payment(&mut payment).await? {
                tracing::info!("Payment {} is now {status:?}", payment.id);
                status
            } else {
                // settled by a concurrent notification
                store
                    .payment(payment.id)
                    .await?
                    .map_or(status, |stored| stored.status())
            }
        }
        Settlement::Unchanged => {
            tracing::debug!("Payment {} already {status:?}, replay ignored", payment.id);
            status
        }
        Settlement::Conflicting(current) => {
            tracing::warn!(
                "Ignoring {status:?} notification for payment {}, already {current:?}",
                payment.id
            );
            current
        }
    };

    if settled != PaymentStatus::Completed {
        return Ok(WebhookOutcome::Settled {
            payment_id: payment.id,
            status: settled,
        });
    }
    let finalized = finalize_purchase(store, notifier, payment.user_id, payment.course_id).await?;
    Ok(WebhookOutcome::Completed {
        payment_id: payment.id,
        newly_enrolled: finalized.newly_created,
    })
}

/// A PayPal webhook event. Only the fields used for matching are read.
#[derive(Deserialize, Debug)]
pub struct PayPalEvent {
    pub id: Option<String>,
    pub event_type: String,
    #[serde(default)]
    pub resource: PayPalResource,
}

#[derive(Deserialize, Debug, Default)]
pub struct PayPalResource {
    /// The capture ID for `PAYMENT.CAPTURE.*` events.
    pub id: Option<String>,
    pub status: Option<String>,
    /// `{course_id}:{kes_amount}` written when the order was created.
    pub custom_id: Option<String>,
    pub supplementary_data: Option<SupplementaryData>,
    pub status_details: Option<StatusDetails>,
}

#[derive(Deserialize, Debug, Default)]
pub struct SupplementaryData {
    #[serde(default)]
    pub related_ids: RelatedIds,
}

#[derive(Deserialize, Debug, Default)]
pub struct RelatedIds {
    pub order_id: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct StatusDetails {
    pub reason: Option<String>,
}

impl PayPalResource {
    fn related_order_id(&self) -> Option<&str> {
        self.supplementary_data
            .as_ref()
            .and_then(|data| data.related_ids.order_id.as_deref())
    }
}

/// Find the payment a capture event refers to: by capture ID first, then by
/// the order the capture belongs to.
async fn paypal_payment(
    store: &dyn Store,
    resource: &PayPalResource,
) -> Result<Option<PaymentRecord>, errors::WebhookError> {
    for reference in [resource.id.as_deref(), resource.related_order_id()]
        .into_iter()
        .flatten()
    {
        if let Some(payment) = store
            .payment_by_reference(PaymentProvider::PayPal, reference)
            .await?
        {
            return Ok(Some(payment));
        }
    }
    Ok(None)
}

/// Reject a capture whose `custom_id` names another course or amount than
/// the payment it matched.
fn check_capture_context(
    payment: &PaymentRecord,
    resource: &PayPalResource,
) -> Result<(), errors::WebhookError> {
    let Some(custom_id) = resource.custom_id.as_deref() else {
        return Ok(());
    };
    if parse_custom_id(custom_id) == Some((payment.course_id, payment.amount)) {
        return Ok(());
    }
    tracing::error!(
        "PayPal capture {:?} carries custom_id {custom_id} but matched payment {} for course {} of {}",
        resource.id,
        payment.id,
        payment.course_id,
        payment.amount
    );
    Err(errors::WebhookError::ContextMismatch {
        payment_id: payment.id,
        custom_id: custom_id.to_owned(),
    })
}

/// Apply a parsed PayPal event.
pub async fn handle_paypal_event(
    store: &dyn Store,
    notifier: &dyn Notifier,
    event: PayPalEvent,
) -> Result<WebhookOutcome, errors::WebhookError> {
    let event_id = event.id.as_deref().unwrap_or("<none>");
    match event.event_type.as_str() {
        "PAYMENT.CAPTURE.COMPLETED" => {
            let Some(mut payment) = paypal_payment(store, &event.resource).await? else {
                tracing::warn!(
                    "PayPal event {event_id} completed capture {:?} matching no payment",
                    event.resource.id
                );
                return Ok(WebhookOutcome::Unmatched);
            };
            check_capture_context(&payment, &event.resource)?;
            if let Some(details) = payment.metadata_mut().paypal_mut() {
                if details.capture_id.is_none() {
                    details.capture_id.clone_from(&event.resource.id);
                }
            }
            settle_payment(store, notifier, payment, PaymentStatus::Completed, None).await
        }
        "PAYMENT.CAPTURE.DENIED" => {
            let Some(payment) = paypal_payment(store, &event.resource).await? else {
                tracing::warn!(
                    "PayPal event {event_id} denied capture {:?} matching no payment",
                    event.resource.id
                );
                return Ok(WebhookOutcome::Unmatched);
            };
            let reason = event
                .resource
                .status_details
                .as_ref()
                .and_then(|details| details.reason.as_deref())
                .unwrap_or("PayPal denied the capture");
            settle_payment(store, notifier, payment, PaymentStatus::Failed, Some(reason)).await
        }
        "PAYMENT.CAPTURE.REFUNDED" => {
            tracing::info!(
                "PayPal refund event {event_id} for capture {:?}, purchase left in place",
                event.resource.id
            );
            Ok(WebhookOutcome::Ignored)
        }
        other => {
            tracing::debug!("Ignoring PayPal event {event_id} of type {other}");
            Ok(WebhookOutcome::Ignored)
        }
    }
}

/// Check, verify, parse and apply a raw PayPal webhook delivery.
pub async fn handle_paypal_webhook(
    store: &dyn Store,
    notifier: &dyn Notifier,
    verifier: &dyn WebhookVerifier,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<WebhookOutcome, errors::WebhookError> {
    for name in PAYPAL_SIGNATURE_HEADERS {
        if !headers.contains_key(name) {
            return Err(errors::WebhookError::MissingHeader(name));
        }
    }
    verifier
        .verify(PaymentProvider::PayPal, headers, body)
        .await?;
    let event: PayPalEvent = serde_json::from_slice(body)?;
    handle_paypal_event(store, notifier, event).await
}

/// The STK callback Daraja posts once the buyer answers the prompt.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct MpesaCallback {
    pub body: MpesaCallbackBody,
}

#[derive(Deserialize, Debug)]
pub struct MpesaCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: Option<String>,
    pub result_code: i64,
    pub result_desc: String,
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Deserialize, Debug)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

#[derive(Deserialize, Debug)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: Option<Value>,
}

impl StkCallback {
    /// The M-PESA receipt number of a successful payment.
    pub fn receipt_number(&self) -> Option<String> {
        self.callback_metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == "MpesaReceiptNumber")?
            .value
            .as_ref()
            .map(|value| match *value {
                Value::String(ref receipt) => receipt.clone(),
                ref other => other.to_string(),
            })
    }
}

/// Apply a parsed STK callback.
pub async fn handle_mpesa_callback(
    store: &dyn Store,
    notifier: &dyn Notifier,
    callback: MpesaCallback,
) -> Result<WebhookOutcome, errors::WebhookError> {
    let stk = callback.body.stk_callback;
    let Some(mut payment) = store
        .payment_by_reference(PaymentProvider::Mpesa, &stk.merchant_request_id)
        .await?
    else {
        tracing::warn!(
            "M-PESA callback for merchant request {} matches no payment",
            stk.merchant_request_id
        );
        return Ok(WebhookOutcome::Unmatched);
    };

    if stk.result_code == 0 {
        if let Some(details) = payment.metadata_mut().mpesa_mut() {
            if let Some(receipt) = stk.receipt_number() {
                details.receipt_number = Some(receipt);
            }
            if details.checkout_request_id.is_none() {
                details.checkout_request_id.clone_from(&stk.checkout_request_id);
            }
        }
        settle_payment(store, notifier, payment, PaymentStatus::Completed, None).await
    } else {
        tracing::info!(
            "M-PESA payment {} failed with code {}: {}",
            payment.id,
            stk.result_code,
            stk.result_desc
        );
        settle_payment(
            store,
            notifier,
            payment,
            PaymentStatus::Failed,
            Some(&stk.result_desc),
        )
        .await
    }
}

/// Verify, parse and apply a raw M-PESA callback delivery.
pub async fn handle_mpesa_webhook(
    store: &dyn Store,
    notifier: &dyn Notifier,
    verifier: &dyn WebhookVerifier,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<WebhookOutcome, errors::WebhookError> {
    verifier.verify(PaymentProvider::Mpesa, headers, body).await?;
    let callback: MpesaCallback = serde_json::from_slice(body)?;
    handle_mpesa_callback(store, notifier, callback).await
}

/// Errors returned by webhook handling.
pub mod errors {
    use thiserror::Error;
    use uuid::Uuid;

    use crate::{db::errors::DatabaseError, services::finalization::errors::FinalizationError};

    #[derive(Debug, Error)]
    pub enum WebhookError {
        #[error(transparent)]
        DatabaseError(#[from] DatabaseError),
        #[error(transparent)]
        FinalizationError(#[from] FinalizationError),
        #[error("Malformed webhook payload: {0}")]
        Payload(#[from] serde_json::Error),
        #[error("Missing required header {0}")]
        MissingHeader(&'static str),
        #[error("Unknown payment provider '{0}'")]
        UnknownProvider(String),
        #[error("Webhook signature rejected: {0}")]
        Unverified(String),
        #[error("Capture custom_id {custom_id} does not match payment {payment_id}")]
        ContextMismatch { payment_id: Uuid, custom_id: String },
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};
    use serde_json::json;
    use uuid::Uuid;

    use super::{
        errors::WebhookError, handle_mpesa_callback, handle_paypal_event, provider_from_headers,
        MpesaCallback, PayPalEvent, WebhookOutcome, PROVIDER_HEADER,
    };
    use crate::{
        db::{
            memory::MemoryStore,
            models::{
                course::Course,
                payment::{
                    MpesaDetails, PayPalDetails, PaymentInsert, PaymentProvider, PaymentStatus,
                    ProviderDetails,
                },
            },
            store::Store,
        },
        services::notifications::LogNotifier,
    };

    async fn store_with_course() -> (MemoryStore, Uuid, Uuid) {
        let store = MemoryStore::new();
        let course_id = Uuid::new_v4();
        store
            .add_course(Course {
                id: course_id,
                title: String::from("Mobile Money APIs"),
                instructor: String::from("Njeri"),
                image_url: None,
                price: Some(150_000),
                is_published: true,
            })
            .await;
        (store, Uuid::new_v4(), course_id)
    }

    async fn mpesa_payment(store: &MemoryStore, user_id: Uuid, course_id: Uuid) -> Uuid {
        let mut insert = PaymentInsert::new(
            user_id,
            course_id,
            PaymentProvider::Mpesa,
            150_000,
            PaymentStatus::Initiated,
        );
        insert.metadata.details = ProviderDetails::Mpesa(MpesaDetails {
            phone_number: String::from("254712345678"),
            merchant_request_id: Some(String::from("29115-34620561-1")),
            ..MpesaDetails::default()
        });
        store.insert_payment(insert).await.expect("insert payment").id
    }

    fn callback(result_code: i64, result_desc: &str) -> MpesaCallback {
        serde_json::from_value(json!({
            "Body": { "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResultCode": result_code,
                "ResultDesc": result_desc,
                "CallbackMetadata": { "Item": [
                    { "Name": "Amount", "Value": 1500 },
                    { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                ] },
            } }
        }))
        .expect("valid callback")
    }

    #[tokio::test]
    async fn successful_callback_completes_and_finalizes_once() {
        let (store, user_id, course_id) = store_with_course().await;
        let payment_id = mpesa_payment(&store, user_id, course_id).await;

        let first = handle_mpesa_callback(&store, &LogNotifier, callback(0, "Success"))
            .await
            .expect("callback handled");
        let replay = handle_mpesa_callback(&store, &LogNotifier, callback(0, "Success"))
            .await
            .expect("replay handled");

        assert_eq!(
            first,
            WebhookOutcome::Completed {
                payment_id,
                newly_enrolled: true
            }
        );
        assert_eq!(
            replay,
            WebhookOutcome::Completed {
                payment_id,
                newly_enrolled: false
            }
        );
        let payment = store.payment(payment_id).await.expect("lookup").expect("exists");
        assert_eq!(payment.status(), PaymentStatus::Completed);
        assert_eq!(
            payment
                .metadata()
                .mpesa()
                .and_then(|details| details.receipt_number.as_deref()),
            Some("NLJ7RT61SV")
        );
        assert_eq!(store.purchases_of(user_id).await.len(), 1);
    }

    #[tokio::test]
    async fn failed_callback_records_reason_and_cannot_be_reversed() {
        let (store, user_id, course_id) = store_with_course().await;
        let payment_id = mpesa_payment(&store, user_id, course_id).await;

        handle_mpesa_callback(&store, &LogNotifier, callback(1, "The balance is insufficient"))
            .await
            .expect("callback handled");
        let late_success = handle_mpesa_callback(&store, &LogNotifier, callback(0, "Success"))
            .await
            .expect("late callback handled");

        assert_eq!(
            late_success,
            WebhookOutcome::Settled {
                payment_id,
                status: PaymentStatus::Failed
            }
        );
        let payment = store.payment(payment_id).await.expect("lookup").expect("exists");
        assert_eq!(payment.status(), PaymentStatus::Failed);
        assert_eq!(
            payment.metadata().failure_reason.as_deref(),
            Some("The balance is insufficient")
        );
        assert!(store.purchases_of(user_id).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_merchant_request_is_unmatched() {
        let (store, _, _) = store_with_course().await;
        let outcome = handle_mpesa_callback(&store, &LogNotifier, callback(0, "Success"))
            .await
            .expect("callback handled");
        assert_eq!(outcome, WebhookOutcome::Unmatched);
    }

    #[tokio::test]
    async fn paypal_capture_matches_by_related_order() {
        let (store, user_id, course_id) = store_with_course().await;
        let mut insert = PaymentInsert::new(
            user_id,
            course_id,
            PaymentProvider::PayPal,
            150_000,
            PaymentStatus::Initiated,
        );
        insert.metadata.details = ProviderDetails::PayPal(PayPalDetails {
            order_id: Some(String::from("5O190127TN364715T")),
            ..PayPalDetails::default()
        });
        let payment_id = store.insert_payment(insert).await.expect("insert").id;

        let event: PayPalEvent = serde_json::from_value(json!({
            "id": "WH-1",
            "event_type": "PAYMENT.CAPTURE.COMPLETED",
            "resource": {
                "id": "3C679366HH908993F",
                "status": "COMPLETED",
                "custom_id": format!("{course_id}:150000"),
                "supplementary_data": { "related_ids": { "order_id": "5O190127TN364715T" } },
            },
        }))
        .expect("valid event");
        let outcome = handle_paypal_event(&store, &LogNotifier, event)
            .await
            .expect("event handled");

        assert_eq!(
            outcome,
            WebhookOutcome::Completed {
                payment_id,
                newly_enrolled: true
            }
        );
        let payment = store.payment(payment_id).await.expect("lookup").expect("exists");
        assert_eq!(
            payment
                .metadata()
                .paypal()
                .and_then(|details| details.capture_id.as_deref()),
            Some("3C679366HH908993F")
        );
    }

    #[tokio::test]
    async fn paypal_capture_for_another_price_is_rejected() {
        let (store, user_id, course_id) = store_with_course().await;
        let mut insert = PaymentInsert::new(
            user_id,
            course_id,
            PaymentProvider::PayPal,
            150_000,
            PaymentStatus::Initiated,
        );
        insert.metadata.details = ProviderDetails::PayPal(PayPalDetails {
            order_id: Some(String::from("5O190127TN364715T")),
            ..PayPalDetails::default()
        });
        let payment_id = store.insert_payment(insert).await.expect("insert").id;

        let event: PayPalEvent = serde_json::from_value(json!({
            "event_type": "PAYMENT.CAPTURE.COMPLETED",
            "resource": {
                "id": "3C679366HH908993F",
                "status": "COMPLETED",
                "custom_id": format!("{course_id}:100"),
                "supplementary_data": { "related_ids": { "order_id": "5O190127TN364715T" } },
            },
        }))
        .expect("valid event");
        let result = handle_paypal_event(&store, &LogNotifier, event).await;

        assert!(matches!(
            result,
            Err(WebhookError::ContextMismatch { payment_id: rejected, .. }) if rejected == payment_id
        ));
        let payment = store.payment(payment_id).await.expect("lookup").expect("exists");
        assert_eq!(payment.status(), PaymentStatus::Initiated);
        assert!(store.purchases_of(user_id).await.is_empty());
    }

    #[tokio::test]
    async fn paypal_refund_is_only_logged() {
        let (store, _, _) = store_with_course().await;
        let event: PayPalEvent = serde_json::from_value(json!({
            "event_type": "PAYMENT.CAPTURE.REFUNDED",
            "resource": { "id": "3C679366HH908993F" },
        }))
        .expect("valid event");
        assert_eq!(
            handle_paypal_event(&store, &LogNotifier, event)
                .await
                .expect("event handled"),
            WebhookOutcome::Ignored
        );
    }

    #[test]
    fn provider_header_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(PROVIDER_HEADER, HeaderValue::from_static("M-PESA"));
        assert!(matches!(
            provider_from_headers(&headers),
            Err(WebhookError::UnknownProvider(_))
        ));
        headers.insert(PROVIDER_HEADER, HeaderValue::from_static("MPesa"));
        assert_eq!(provider_from_headers(&headers).ok(), Some(PaymentProvider::Mpesa));
        headers.insert(PROVIDER_HEADER, HeaderValue::from_static("stripe"));
        assert!(provider_from_headers(&headers).is_err());
    }
}
