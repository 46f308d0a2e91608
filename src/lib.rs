//! Course checkout, payment confirmation and cart API for LearnHub.
pub mod constants;
pub mod db;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
