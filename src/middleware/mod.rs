//! Middleware used for identifying the signed-in customer.
pub mod session;
