//! Request and response bodies for the treatment API.

pub mod treatment;

pub use treatment::{PlotRequest, StatusResponse, TreatmentResponse, HEALTH_STATUS};
