//! Constants related to session and cart cookies.

/// Name of the cookie carrying the session token issued by the auth service.
pub const SESSION_COOKIE: &str = "session";
/// Name of the cart cookie for visitors without a session.
pub const ANONYMOUS_CART_COOKIE: &str = "cart";
/// Cart retention for anonymous visitors, in days.
pub const ANONYMOUS_CART_TTL_DAYS: i64 = 7;
/// Cart retention for signed-in users, in days.
pub const USER_CART_TTL_DAYS: i64 = 30;
/// Upper bound on the number of courses held in one cart cookie.
pub const CART_CAPACITY: usize = 50;
