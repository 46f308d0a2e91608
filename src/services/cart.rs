//! The cookie-backed cart: a bounded, ordered set of course IDs owned by the
//! browser, plus checking out everything in it.
use axum_extra::extract::{
    cookie::{Cookie, SameSite},
    CookieJar,
};
use uuid::Uuid;

use crate::{
    constants::sessions::{
        ANONYMOUS_CART_COOKIE, ANONYMOUS_CART_TTL_DAYS, CART_CAPACITY, USER_CART_TTL_DAYS,
    },
    db::{models::course::Course, store::Store},
    services::{
        checkout::{self, errors::CheckoutError, CheckoutOutcome, CheckoutRequest},
        notifications::Notifier,
    },
};

/// Whose cart a cookie holds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CartScope {
    Anonymous,
    User(Uuid),
}

impl CartScope {
    pub fn cookie_name(self) -> String {
        match self {
            Self::Anonymous => ANONYMOUS_CART_COOKIE.to_owned(),
            Self::User(user_id) => format!("{ANONYMOUS_CART_COOKIE}_{user_id}"),
        }
    }
    pub const fn ttl(self) -> time::Duration {
        match self {
            Self::Anonymous => time::Duration::days(ANONYMOUS_CART_TTL_DAYS),
            Self::User(_) => time::Duration::days(USER_CART_TTL_DAYS),
        }
    }
}

/// The courses in a cart, in the order they were added.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartSelection {
    scope: CartScope,
    course_ids: Vec<Uuid>,
}

impl CartSelection {
    pub const fn empty(scope: CartScope) -> Self {
        Self {
            scope,
            course_ids: Vec::new(),
        }
    }
    /// Read the cart for `scope` from the request cookies. Entries that are
    /// not course IDs, repeats, and anything past the capacity are dropped.
    pub fn from_cookies(cookie_jar: &CookieJar, scope: CartScope) -> Self {
        let mut cart = Self::empty(scope);
        if let Some(cookie) = cookie_jar.get(&scope.cookie_name()) {
            for course_id in cookie
                .value()
                .split(',')
                .filter_map(|entry| entry.trim().parse::<Uuid>().ok())
            {
                if cart.course_ids.len() == CART_CAPACITY {
                    break;
                }
                if !cart.course_ids.contains(&course_id) {
                    cart.course_ids.push(course_id);
                }
            }
        }
        cart
    }
    pub const fn scope(&self) -> CartScope {
        self.scope
    }
    pub fn course_ids(&self) -> &[Uuid] {
        &self.course_ids
    }
    /// Add a course. Returns whether it was new to the cart.
    pub fn add(&mut self, course_id: Uuid) -> Result<bool, errors::CartError> {
        if self.course_ids.contains(&course_id) {
            return Ok(false);
        }
        if self.course_ids.len() >= CART_CAPACITY {
            return Err(errors::CartError::Full(CART_CAPACITY));
        }
        self.course_ids.push(course_id);
        Ok(true)
    }
    /// Remove a course. Returns whether it was in the cart.
    pub fn remove(&mut self, course_id: Uuid) -> bool {
        let before = self.course_ids.len();
        self.course_ids.retain(|&id| id != course_id);
        self.course_ids.len() != before
    }
    /// The cookie replacing whatever cart cookie the browser holds.
    pub fn to_cookie(&self) -> Cookie<'static> {
        let value = self
            .course_ids
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",");
        Cookie::build((self.scope.cookie_name(), value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(self.scope.ttl())
            .build()
    }
    /// Write the cart into `cookie_jar`.
    pub fn save(&self, cookie_jar: CookieJar) -> CookieJar {
        cookie_jar.add(self.to_cookie())
    }
}

/// The purchasable courses in a cart, in cart order. Courses that no longer
/// exist or are unpublished are left out.
pub async fn cart_courses(
    store: &dyn Store,
    cart: &CartSelection,
) -> Result<Vec<Course>, crate::db::errors::DatabaseError> {
    let mut courses = store.courses(cart.course_ids()).await?;
    courses.retain(|course| course.is_published);
    Ok(cart
        .course_ids()
        .iter()
        .filter_map(|id| courses.iter().position(|course| course.id == *id))
        .map(|index| courses[index].clone())
        .collect())
}

/// Result of checking out a cart.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CartCheckout {
    /// Free courses the user is now enrolled in.
    pub completed: Vec<Uuid>,
    /// Courses dropped because they are owned or unavailable.
    pub skipped: Vec<Uuid>,
    /// Payment page of the first paid course, if any.
    pub url: Option<String>,
}

/// Check out each course in the cart in order. Free courses are enrolled
/// and owned or unavailable ones dropped, both leaving the cart. Checkout
/// stops at the first paid course, which stays in the cart until paid.
pub async fn checkout_cart(
    store: &dyn Store,
    notifier: &dyn Notifier,
    user_id: Uuid,
    cart: &mut CartSelection,
    origin: &str,
) -> Result<CartCheckout, CheckoutError> {
    let mut result = CartCheckout::default();
    for course_id in cart.course_ids().to_vec() {
        let request = CheckoutRequest {
            course_id,
            ..CheckoutRequest::default()
        };
        match checkout::initiate(store, notifier, user_id, request, origin).await {
            Ok(CheckoutOutcome::Free { .. }) => {
                result.completed.push(course_id);
                cart.remove(course_id);
            }
            Ok(CheckoutOutcome::Redirect { url, .. }) => {
                result.url = Some(url);
                break;
            }
            Err(CheckoutError::AlreadyOwned { .. } | CheckoutError::CourseNotFound(_)) => {
                result.skipped.push(course_id);
                cart.remove(course_id);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(result)
}

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum CartError {
        #[error("Cart is full, it holds at most {0} courses")]
        Full(usize),
    }
}
