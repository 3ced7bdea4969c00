//! HTTP handlers for the treatment service.

pub mod health;
pub mod metrics;
pub mod treatment;
