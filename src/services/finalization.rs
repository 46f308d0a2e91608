//! Purchase finalization: the one place a user is granted a course.
//!
//! Safe to run any number of times for the same (user, course). The purchase
//! insert treats a unique violation as "already done", progress rows are
//! insert-or-ignore, and the enrollment email only goes out for the call
//! that actually created the purchase.
use uuid::Uuid;

use crate::{
    db::{
        models::{
            purchase::{Purchase, PurchaseInsert},
            user_progress::UserProgressInsert,
        },
        store::Store,
    },
    services::notifications::{EnrollmentNotice, Notifier},
};

/// Result of a finalization.
#[derive(Clone, Debug)]
pub struct Finalized {
    pub purchase: Purchase,
    /// Whether this call created the purchase.
    pub newly_created: bool,
    /// Progress rows written by this call.
    pub progress_rows: u64,
}

/// Ensure `user_id` owns `course_id`, has a progress row for every published
/// chapter, and has been sent an enrollment email.
pub async fn finalize_purchase(
    store: &dyn Store,
    notifier: &dyn Notifier,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<Finalized, errors::FinalizationError> {
    let (purchase, newly_created) = match store.purchase(user_id, course_id).await? {
        Some(existing) => (existing, false),
        None => match store
            .insert_purchase(PurchaseInsert::new(user_id, course_id))
            .await?
        {
            Some(created) => (created, true),
            // lost a race against a concurrent finalization
            None => (
                store.purchase(user_id, course_id).await?.ok_or(
                    errors::FinalizationError::Inconsistent { user_id, course_id },
                )?,
                false,
            ),
        },
    };

    let chapter_ids = store
        .published_chapters(course_id)
        .await?
        .into_iter()
        .map(|chapter| chapter.id)
        .collect();
    let progress_rows = store
        .insert_progress(UserProgressInsert::new(user_id, chapter_ids))
        .await?;

    if newly_created {
        tracing::info!("User {user_id} enrolled in course {course_id}");
        notify_enrollment(store, notifier, user_id, course_id).await;
    } else {
        tracing::debug!("Purchase of {course_id} by {user_id} already finalized");
    }

    Ok(Finalized {
        purchase,
        newly_created,
        progress_rows,
    })
}

/// Send the enrollment email. Never fails the caller.
async fn notify_enrollment(
    store: &dyn Store,
    notifier: &dyn Notifier,
    user_id: Uuid,
    course_id: Uuid,
) {
    let user = match store.user(user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!("No contact details for user {user_id}, skipping enrollment email");
            return;
        }
        Err(err) => {
            tracing::error!("Failed to load user {user_id} for enrollment email: {err}");
            return;
        }
    };
    let Some(email) = user.email() else {
        tracing::warn!("User {user_id} has no valid email address, skipping enrollment email");
        return;
    };
    let course_title = match store.course(course_id).await {
        Ok(course) => course.map_or_else(|| String::from("your new course"), |course| course.title),
        Err(err) => {
            tracing::error!("Failed to load course {course_id} for enrollment email: {err}");
            return;
        }
    };
    let notice = EnrollmentNotice {
        email,
        name: user.name,
        course_id,
        course_title,
    };
    if let Err(err) = notifier.enrollment(&notice).await {
        tracing::error!("Failed to send enrollment email to user {user_id}: {err}");
    }
}

pub mod errors {
    use thiserror::Error;
    use uuid::Uuid;

    use crate::db::errors::DatabaseError;

    #[derive(Debug, Error)]
    pub enum FinalizationError {
        #[error(transparent)]
        DatabaseError(#[from] DatabaseError),
        /// The store reported a duplicate purchase it then could not find.
        #[error("Purchase of course {course_id} by user {user_id} is neither insertable nor present")]
        Inconsistent { user_id: Uuid, course_id: Uuid },
    }
}
