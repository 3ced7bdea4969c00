use crate::models::{PlotRequest, TreatmentResponse};
use crate::startup::AppState;
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use service_core::error::AppError;
use validator::Validate;

/// `POST /generate-treatment`
pub async fn generate_treatment(
    State(state): State<AppState>,
    payload: Result<Json<PlotRequest>, JsonRejection>,
) -> Result<Json<TreatmentResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "Rejected treatment request body");
        AppError::from(rejection)
    })?;

    request.validate()?;

    let treatment = state.treatment.generate_treatment(&request.plot).await?;

    Ok(Json(TreatmentResponse { treatment }))
}
