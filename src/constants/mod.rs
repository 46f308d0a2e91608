//! Constants (primary environment variables/secrets) used across the application.
pub mod api;
pub mod checkout;
pub mod db;
pub mod mail;
pub mod mpesa;
pub mod paypal;
pub mod redis;
mod secrets;
pub mod sessions;
