//! Defines data models (structs) which map directly to rows in the database.
pub mod appuser;
pub mod chapter;
pub mod course;
pub mod payment;
pub mod purchase;
pub mod user_progress;
