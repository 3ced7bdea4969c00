pub mod metrics;
pub mod providers;
pub mod treatment;

pub use metrics::{get_metrics, init_metrics};
pub use treatment::{init_provider, TreatmentError, TreatmentService};
