//! Small helpers shared by routes and services.
pub mod email;
pub mod extract;
pub mod httperror;
pub mod phone;
