use serde::{Deserialize, Serialize};
use validator::Validate;

/// Body of `GET /`.
pub const HEALTH_STATUS: &str = "API is running";

/// Inbound plot. A missing `plot` deserializes to an empty string so it
/// fails validation like an explicit empty value.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PlotRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "plot must not be empty"))]
    pub plot: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatmentResponse {
    pub treatment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl Default for StatusResponse {
    fn default() -> Self {
        Self {
            status: HEALTH_STATUS.to_string(),
        }
    }
}
