//! HTTP request handlers shared by every deployment of the service.

pub mod health;

pub use health::{health_check, readiness};
