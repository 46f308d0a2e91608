//! Services implementing the checkout logic behind the routes.
pub mod cart;
pub mod checkout;
pub mod finalization;
pub mod notifications;
pub mod payments;
pub mod providers;
pub mod sessions;
pub mod webhooks;
