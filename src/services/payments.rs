//! Provider-specific payment steps driven by the buyer: creating and
//! capturing PayPal orders, and sending M-PESA STK prompts.
use uuid::Uuid;

use crate::{
    db::{
        models::{
            payment::{
                MpesaDetails, PayPalDetails, PaymentInsert, PaymentProvider, PaymentRecord,
                PaymentStatus, ProviderDetails, Settlement,
            },
            purchase::Purchase,
        },
        store::Store,
    },
    services::{
        checkout::{
            course_dashboard_url, errors::CheckoutError, owned_payment, purchasable_course,
            success_url,
        },
        finalization::finalize_purchase,
        notifications::Notifier,
        providers::{
            errors::ProviderError,
            mpesa::MpesaClient,
            paypal::{OrderRequest, PayPalClient},
        },
    },
    utils::phone::PhoneNumber,
};

/// Daraja caps `AccountReference` at 12 characters.
const ACCOUNT_REFERENCE_LEN: usize = 12;
/// Daraja caps `TransactionDesc` at 13 characters.
const TRANSACTION_DESC: &str = "Course fee";

/// Record a provider failure on a payment. The payment is failed before the
/// error is handed back so it never stays open after a known failure.
async fn fail_payment(
    store: &dyn Store,
    payment: &mut PaymentRecord,
    error: ProviderError,
) -> CheckoutError {
    tracing::error!("Payment {} failed at {}: {error}", payment.id, payment.provider);
    let reason = error.to_string();
    if payment.settle(PaymentStatus::Failed, Some(&reason)) == Settlement::Applied {
        if let Err(db_err) = store.update_payment(payment).await {
            return db_err.into();
        }
    }
    error.into()
}

/// Create the PayPal order for a pending PayPal payment. Returns the URL the
/// buyer approves the payment at.
pub async fn start_paypal(
    store: &dyn Store,
    paypal: &PayPalClient,
    user_id: Uuid,
    payment_id: Uuid,
    origin: &str,
) -> Result<String, CheckoutError> {
    let mut payment = owned_payment(store, user_id, payment_id).await?;
    if payment.provider != PaymentProvider::PayPal {
        return Err(CheckoutError::Validation {
            field: "paymentId",
            message: format!("Payment uses {}, not PayPal", payment.provider),
        });
    }
    if payment.status().is_terminal() {
        return Err(CheckoutError::Validation {
            field: "paymentId",
            message: String::from("Payment has already been settled"),
        });
    }
    let course = purchasable_course(store, user_id, payment.course_id).await?;

    let metadata = payment.metadata();
    let (success, cancel) = metadata.return_urls.as_ref().map_or_else(
        || {
            (
                success_url(origin, payment.course_id, payment.id),
                format!("{origin}/courses/{}", payment.course_id),
            )
        },
        |urls| (urls.success_url.clone(), urls.cancel_url.clone()),
    );
    let order = match paypal
        .create_order(OrderRequest {
            course_id: course.id,
            title: &course.title,
            price_kes: payment.amount,
            return_url: &success,
            cancel_url: &cancel,
        })
        .await
    {
        Ok(order) => order,
        Err(err) => return Err(fail_payment(store, &mut payment, err).await),
    };

    payment.metadata_mut().details = ProviderDetails::PayPal(PayPalDetails {
        order_id: Some(order.id),
        capture_id: None,
        usd_amount: Some(order.usd_amount),
        exchange_rate: Some(order.kes_per_usd),
    });
    payment.mark_initiated();
    if !store.update_payment(&mut payment).await? {
        tracing::warn!("Payment {} settled while its PayPal order was created", payment.id);
    }
    Ok(order.approval_url)
}

/// Capture an order the buyer approved, complete its payment and finalize
/// the purchase.
pub async fn capture_paypal(
    store: &dyn Store,
    notifier: &dyn Notifier,
    paypal: &PayPalClient,
    user_id: Uuid,
    order_id: &str,
) -> Result<Purchase, CheckoutError> {
    let mut payment = store
        .payment_by_reference(PaymentProvider::PayPal, order_id)
        .await?
        .filter(|payment| payment.user_id == user_id)
        .ok_or_else(|| CheckoutError::ReferenceNotFound(order_id.to_owned()))?;

    match payment.status() {
        PaymentStatus::Completed => {
            return Ok(finalize_purchase(store, notifier, user_id, payment.course_id)
                .await?
                .purchase);
        }
        PaymentStatus::Failed => {
            return Err(CheckoutError::PaymentNotApproved(
                payment
                    .metadata()
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| String::from("Payment failed")),
            ));
        }
        PaymentStatus::Pending | PaymentStatus::Initiated => {}
    }

    let capture = match paypal.capture_order(order_id).await {
        Ok(capture) => capture,
        Err(err) => return Err(fail_payment(store, &mut payment, err).await),
    };
    if capture.status != "COMPLETED" {
        tracing::warn!(
            "PayPal capture of order {order_id} returned status {}, leaving payment {} open",
            capture.status,
            payment.id
        );
        return Err(CheckoutError::PaymentNotApproved(format!(
            "PayPal reported the capture as {}",
            capture.status
        )));
    }

    if let Some(details) = payment.metadata_mut().paypal_mut() {
        details.capture_id.clone_from(&capture.capture_id);
    }
    if payment.settle(PaymentStatus::Completed, None) == Settlement::Applied
        && !store.update_payment(&mut payment).await?
    {
        tracing::warn!("Payment {} was settled concurrently with its capture", payment.id);
    }
    tracing::info!("Captured PayPal order {order_id} for payment {}", payment.id);
    Ok(finalize_purchase(store, notifier, user_id, payment.course_id)
        .await?
        .purchase)
}

/// An STK prompt request from the buyer.
#[derive(Clone, Debug)]
pub struct StkRequest {
    pub course_id: Uuid,
    pub phone_number: String,
    /// Amount the client displayed. The course price is what gets charged.
    pub amount: Option<i64>,
    /// The pending M-PESA payment opened by checkout, if any. Without one a
    /// new payment is recorded.
    pub payment_id: Option<Uuid>,
}

/// An STK prompt that reached the buyer's phone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StkInitiated {
    pub payment_id: Uuid,
    pub checkout_request_id: String,
    pub message: String,
}

/// Take over the M-PESA payment checkout opened for this course, moving it
/// to `initiated` before Daraja is called.
async fn reuse_stk_payment(
    store: &dyn Store,
    user_id: Uuid,
    payment_id: Uuid,
    course_id: Uuid,
    phone: &PhoneNumber,
) -> Result<PaymentRecord, CheckoutError> {
    let mut payment = owned_payment(store, user_id, payment_id).await?;
    if payment.course_id != course_id {
        return Err(CheckoutError::PaymentNotFound(payment_id));
    }
    if payment.provider != PaymentProvider::Mpesa {
        return Err(CheckoutError::Validation {
            field: "paymentId",
            message: format!("Payment uses {}, not M-PESA", payment.provider),
        });
    }
    if payment.status() != PaymentStatus::Pending {
        return Err(CheckoutError::Validation {
            field: "paymentId",
            message: String::from("An M-PESA prompt was already sent for this payment"),
        });
    }
    payment.metadata_mut().details = ProviderDetails::Mpesa(MpesaDetails {
        phone_number: phone.as_str().to_owned(),
        ..MpesaDetails::default()
    });
    payment.mark_initiated();
    if !store.update_payment(&mut payment).await? {
        return Err(CheckoutError::Validation {
            field: "paymentId",
            message: String::from("Payment has already been settled"),
        });
    }
    Ok(payment)
}

/// Send an M-PESA payment prompt for a course. The payment is recorded as
/// `initiated` before Daraja is called and failed if the call fails.
pub async fn initiate_stk(
    store: &dyn Store,
    mpesa: &MpesaClient,
    user_id: Uuid,
    request: StkRequest,
) -> Result<StkInitiated, CheckoutError> {
    let phone =
        PhoneNumber::normalize(&request.phone_number).ok_or_else(|| CheckoutError::Validation {
            field: "phoneNumber",
            message: String::from("Enter a Safaricom number such as 0712345678"),
        })?;
    let course = purchasable_course(store, user_id, request.course_id).await?;
    if course.is_free() {
        return Err(CheckoutError::Validation {
            field: "courseId",
            message: format!(
                "Course is free, enroll at {}",
                course_dashboard_url(course.id)
            ),
        });
    }
    let price = course.price_or_zero();
    if let Some(amount) = request.amount.filter(|&amount| amount != price) {
        tracing::debug!(
            "Client sent amount {amount} for course {} priced {price}, charging the price",
            course.id
        );
    }

    let mut payment = match request.payment_id {
        Some(payment_id) => reuse_stk_payment(store, user_id, payment_id, course.id, &phone).await?,
        None => {
            let mut insert = PaymentInsert::new(
                user_id,
                course.id,
                PaymentProvider::Mpesa,
                price,
                PaymentStatus::Initiated,
            );
            insert.metadata.course_title = Some(course.title);
            insert.metadata.details = ProviderDetails::Mpesa(MpesaDetails {
                phone_number: phone.as_str().to_owned(),
                ..MpesaDetails::default()
            });
            store.insert_payment(insert).await?
        }
    };

    let account_reference: String = course
        .id
        .simple()
        .to_string()
        .chars()
        .take(ACCOUNT_REFERENCE_LEN)
        .collect();
    let push = match mpesa
        .stk_push(&phone, payment.amount, &account_reference, TRANSACTION_DESC)
        .await
    {
        Ok(push) => push,
        Err(err) => return Err(fail_payment(store, &mut payment, err).await),
    };

    if let Some(details) = payment.metadata_mut().mpesa_mut() {
        details.merchant_request_id = Some(push.merchant_request_id.clone());
        details.checkout_request_id = Some(push.checkout_request_id.clone());
    }
    if !store.update_payment(&mut payment).await? {
        tracing::warn!("Payment {} settled before its STK request IDs were stored", payment.id);
    }
    tracing::info!(
        "Sent STK prompt {} for payment {} to {}",
        push.checkout_request_id,
        payment.id,
        phone.as_str()
    );
    Ok(StkInitiated {
        payment_id: payment.id,
        checkout_request_id: push.checkout_request_id,
        message: push
            .customer_message
            .unwrap_or_else(|| String::from("Check your phone to complete the payment")),
    })
}

/// Look up one of the caller's payments.
pub async fn payment_status(
    store: &dyn Store,
    user_id: Uuid,
    payment_id: Uuid,
) -> Result<PaymentRecord, CheckoutError> {
    owned_payment(store, user_id, payment_id).await
}
