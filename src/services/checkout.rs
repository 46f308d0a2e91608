//! Checkout orchestration: entitlement checks, the free-course fast path,
//! and creation of the payment records paid checkouts are tracked by.
use uuid::Uuid;

use crate::{
    db::{
        models::{
            course::Course,
            payment::{
                MpesaDetails, PaymentInsert, PaymentProvider, PaymentRecord, PaymentStatus,
                ProviderDetails, ReturnUrls, Settlement,
            },
            purchase::Purchase,
        },
        store::Store,
    },
    services::{
        finalization::finalize_purchase, notifications::Notifier, providers::paypal::PayPalClient,
    },
    utils::phone::PhoneNumber,
};

/// Provider used when a checkout does not name one.
pub const DEFAULT_PROVIDER: PaymentProvider = PaymentProvider::PayPal;

/// A request to buy one course.
#[derive(Clone, Debug, Default)]
pub struct CheckoutRequest {
    pub course_id: Uuid,
    /// Where to send the buyer if they abandon payment.
    pub return_url: Option<String>,
    pub payment_method: Option<String>,
    pub phone_number: Option<String>,
}

/// Where the buyer goes next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// The course was free and the buyer is already enrolled.
    Free { url: String },
    /// A payment record was opened and the buyer must pay on the provider's page.
    Redirect { url: String, payment_id: Uuid },
}

/// Parse a requested payment method. Only providers that can actually be
/// initiated are accepted.
pub fn parse_provider(payment_method: Option<&str>) -> Result<PaymentProvider, errors::CheckoutError> {
    let Some(method) = payment_method else {
        return Ok(DEFAULT_PROVIDER);
    };
    match method.parse::<PaymentProvider>() {
        Ok(provider @ (PaymentProvider::PayPal | PaymentProvider::Mpesa)) => Ok(provider),
        Ok(PaymentProvider::Stripe) | Err(()) => Err(errors::CheckoutError::Validation {
            field: "paymentMethod",
            message: format!("Unsupported payment method '{method}'"),
        }),
    }
}

/// Where the buyer lands after abandoning payment. Only URLs on `origin`
/// (or paths relative to it) are accepted.
fn cancel_url(
    origin: &str,
    course_id: Uuid,
    return_url: Option<&str>,
) -> Result<String, errors::CheckoutError> {
    match return_url {
        None => Ok(format!("{origin}/courses/{course_id}")),
        Some(path) if path.starts_with('/') && !path.starts_with("//") => {
            Ok(format!("{origin}{path}"))
        }
        Some(url) if url == origin || url.starts_with(&format!("{origin}/")) => Ok(url.to_owned()),
        Some(_) => Err(errors::CheckoutError::Validation {
            field: "returnUrl",
            message: String::from("Return URL must point at this site"),
        }),
    }
}

/// The browser-redirect confirmation URL for a payment.
pub fn success_url(origin: &str, course_id: Uuid, payment_id: Uuid) -> String {
    format!("{origin}/api/checkout/confirm?courseId={course_id}&success=1&paymentId={payment_id}")
}

/// The dashboard page of an enrolled course.
pub fn course_dashboard_url(course_id: Uuid) -> String {
    format!("/dashboard/courses/{course_id}")
}

/// Load a course that can be bought by `user_id`, rejecting owned and
/// unavailable courses.
pub async fn purchasable_course(
    store: &dyn Store,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<Course, errors::CheckoutError> {
    if store.purchase(user_id, course_id).await?.is_some() {
        return Err(errors::CheckoutError::AlreadyOwned { user_id, course_id });
    }
    store
        .course(course_id)
        .await?
        .filter(|course| course.is_published)
        .ok_or(errors::CheckoutError::CourseNotFound(course_id))
}

/// Start a checkout for one course. Free courses are finalized on the spot;
/// paid courses get a pending payment record and a redirect to the
/// provider's payment page.
pub async fn initiate(
    store: &dyn Store,
    notifier: &dyn Notifier,
    user_id: Uuid,
    request: CheckoutRequest,
    origin: &str,
) -> Result<CheckoutOutcome, errors::CheckoutError> {
    let course = purchasable_course(store, user_id, request.course_id).await?;

    if course.is_free() {
        finalize_purchase(store, notifier, user_id, course.id).await?;
        tracing::info!("User {user_id} enrolled in free course {}", course.id);
        return Ok(CheckoutOutcome::Free {
            url: course_dashboard_url(course.id),
        });
    }

    let provider = parse_provider(request.payment_method.as_deref())?;
    let details = match provider {
        PaymentProvider::Mpesa => match request.phone_number.as_deref() {
            Some(raw) => ProviderDetails::Mpesa(MpesaDetails {
                phone_number: PhoneNumber::normalize(raw)
                    .ok_or_else(|| errors::CheckoutError::Validation {
                        field: "phoneNumber",
                        message: String::from("Enter a Safaricom number such as 0712345678"),
                    })?
                    .into(),
                ..MpesaDetails::default()
            }),
            None => ProviderDetails::None,
        },
        PaymentProvider::PayPal | PaymentProvider::Stripe => ProviderDetails::None,
    };

    let mut insert = PaymentInsert::new(
        user_id,
        course.id,
        provider,
        course.price_or_zero(),
        PaymentStatus::Pending,
    );
    insert.metadata.course_title = Some(course.title);
    insert.metadata.return_urls = Some(ReturnUrls {
        success_url: success_url(origin, course.id, insert.id),
        cancel_url: cancel_url(origin, course.id, request.return_url.as_deref())?,
    });
    insert.metadata.details = details;
    let payment = store.insert_payment(insert).await?;
    tracing::info!(
        "Opened {} payment {} for course {} by user {user_id}",
        payment.provider,
        payment.id,
        payment.course_id
    );

    Ok(CheckoutOutcome::Redirect {
        url: format!(
            "{origin}/checkout/{}?paymentId={}&courseId={}",
            payment.provider, payment.id, payment.course_id
        ),
        payment_id: payment.id,
    })
}

/// A browser returning from a provider's payment page.
#[derive(Clone, Debug)]
pub struct Confirmation {
    pub course_id: Uuid,
    pub success: bool,
    pub payment_id: Option<Uuid>,
}

/// Load a payment, hiding payments of other users and courses.
pub async fn owned_payment(
    store: &dyn Store,
    user_id: Uuid,
    payment_id: Uuid,
) -> Result<PaymentRecord, errors::CheckoutError> {
    store
        .payment(payment_id)
        .await?
        .filter(|payment| payment.user_id == user_id)
        .ok_or(errors::CheckoutError::PaymentNotFound(payment_id))
}

/// What a browser confirmation led to.
#[derive(Clone, Debug)]
pub enum ConfirmOutcome {
    /// The buyer is enrolled.
    Enrolled(Purchase),
    /// The payment settles through a provider callback, not the browser.
    Pending {
        payment_id: Uuid,
        status: PaymentStatus,
    },
}

/// Confirm a checkout after the provider redirected the buyer back. The
/// browser's success flag alone never completes a payment: PayPal orders
/// are checked with PayPal, M-PESA payments wait for their STK callback.
pub async fn confirm(
    store: &dyn Store,
    notifier: &dyn Notifier,
    paypal: &PayPalClient,
    user_id: Uuid,
    confirmation: Confirmation,
) -> Result<ConfirmOutcome, errors::CheckoutError> {
    let course_id = confirmation.course_id;
    if !confirmation.success {
        return Err(errors::CheckoutError::PaymentNotApproved(String::from(
            "Payment was not completed",
        )));
    }

    match confirmation.payment_id {
        Some(payment_id) => {
            let mut payment = owned_payment(store, user_id, payment_id).await?;
            if payment.course_id != course_id {
                return Err(errors::CheckoutError::PaymentNotFound(payment_id));
            }
            if let Some(status) = complete_confirmed_payment(store, paypal, &mut payment).await? {
                return Ok(ConfirmOutcome::Pending { payment_id, status });
            }
        }
        None => {
            let course = store
                .course(course_id)
                .await?
                .ok_or(errors::CheckoutError::CourseNotFound(course_id))?;
            if !course.is_free() && store.purchase(user_id, course_id).await?.is_none() {
                return Err(errors::CheckoutError::Validation {
                    field: "paymentId",
                    message: String::from("A payment is required to confirm a paid course"),
                });
            }
        }
    }

    let finalized = finalize_purchase(store, notifier, user_id, course_id).await?;
    Ok(ConfirmOutcome::Enrolled(finalized.purchase))
}

/// Complete a payment the buyer claims to have made, once its provider
/// vouches for it. Returns the open status when the payment can only be
/// settled by the provider's callback.
async fn complete_confirmed_payment(
    store: &dyn Store,
    paypal: &PayPalClient,
    payment: &mut PaymentRecord,
) -> Result<Option<PaymentStatus>, errors::CheckoutError> {
    match payment.status() {
        PaymentStatus::Completed => return Ok(None),
        PaymentStatus::Failed => {
            return Err(errors::CheckoutError::PaymentNotApproved(
                payment
                    .metadata()
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| String::from("Payment failed")),
            ));
        }
        PaymentStatus::Pending | PaymentStatus::Initiated => {}
    }

    match payment.provider {
        PaymentProvider::Mpesa => {
            tracing::info!(
                "Browser confirmation for M-PESA payment {} deferred to its STK callback",
                payment.id
            );
            return Ok(Some(payment.status()));
        }
        PaymentProvider::Stripe => {
            return Err(errors::CheckoutError::PaymentNotApproved(String::from(
                "Payment method is not supported",
            )));
        }
        PaymentProvider::PayPal => {}
    }

    let Some(order_id) = payment
        .metadata()
        .paypal()
        .and_then(|details| details.order_id.clone())
    else {
        tracing::warn!(
            "Refusing confirmation of payment {}, no PayPal order was created",
            payment.id
        );
        return Err(errors::CheckoutError::PaymentNotApproved(String::from(
            "No PayPal order exists for this payment",
        )));
    };
    if !paypal.validate_order(&order_id).await? {
        tracing::warn!(
            "PayPal order {order_id} of payment {} is not approved, refusing confirmation",
            payment.id
        );
        return Err(errors::CheckoutError::PaymentNotApproved(String::from(
            "PayPal has not approved this payment",
        )));
    }
    match payment.settle(PaymentStatus::Completed, None) {
        Settlement::Applied => {
            if !store.update_payment(payment).await? {
                tracing::warn!("Payment {} settled concurrently during confirmation", payment.id);
            }
        }
        Settlement::Unchanged => {}
        Settlement::Conflicting(status) => {
            return Err(errors::CheckoutError::PaymentNotApproved(format!(
                "Payment already {status:?}"
            )));
        }
    }
    tracing::info!("Payment {} confirmed by browser redirect", payment.id);
    Ok(None)
}

/// Errors returned by checkout operations.
pub mod errors {
    use thiserror::Error;
    use uuid::Uuid;

    use crate::{
        db::errors::DatabaseError,
        services::{finalization::errors::FinalizationError, providers::errors::ProviderError},
    };

    #[derive(Debug, Error)]
    pub enum CheckoutError {
        #[error(transparent)]
        DatabaseError(#[from] DatabaseError),
        #[error(transparent)]
        FinalizationError(#[from] FinalizationError),
        #[error(transparent)]
        ProviderError(#[from] ProviderError),
        #[error("User {user_id} already owns course {course_id}")]
        AlreadyOwned { user_id: Uuid, course_id: Uuid },
        #[error("Course {0} does not exist or is not published")]
        CourseNotFound(Uuid),
        #[error("Payment {0} not found")]
        PaymentNotFound(Uuid),
        #[error("No payment found for provider reference {0}")]
        ReferenceNotFound(String),
        #[error("Invalid {field}: {message}")]
        Validation {
            field: &'static str,
            message: String,
        },
        #[error("Payment not approved: {0}")]
        PaymentNotApproved(String),
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{cancel_url, errors::CheckoutError, parse_provider};
    use crate::db::models::payment::PaymentProvider;

    const ORIGIN: &str = "https://learnhub.test";

    #[test]
    fn missing_payment_method_defaults_to_paypal() {
        assert_eq!(parse_provider(None).ok(), Some(PaymentProvider::PayPal));
        assert_eq!(parse_provider(Some("MPESA")).ok(), Some(PaymentProvider::Mpesa));
    }

    #[test]
    fn stripe_and_unknown_methods_are_rejected() {
        for method in ["stripe", "bitcoin"] {
            assert!(matches!(
                parse_provider(Some(method)),
                Err(CheckoutError::Validation {
                    field: "paymentMethod",
                    ..
                })
            ));
        }
    }

    #[test]
    fn cancel_url_defaults_to_course_page() {
        let course_id = Uuid::nil();
        assert_eq!(
            cancel_url(ORIGIN, course_id, None).ok().as_deref(),
            Some("https://learnhub.test/courses/00000000-0000-0000-0000-000000000000")
        );
        assert_eq!(
            cancel_url(ORIGIN, course_id, Some("/cart")).ok().as_deref(),
            Some("https://learnhub.test/cart")
        );
    }

    #[test]
    fn cancel_url_must_stay_on_site() {
        let course_id = Uuid::nil();
        for url in [
            "https://evil.test/phish",
            "https://learnhub.test.evil.test/",
            "//evil.test",
        ] {
            assert!(cancel_url(ORIGIN, course_id, Some(url)).is_err(), "{url}");
        }
    }
}
