//! Treatment generation: prompt construction, the single provider call, and
//! the mapping of its outcome onto [`TreatmentError`].

use crate::config::TreatmentConfig;
use crate::services::metrics;
use crate::services::providers::gemini::{GeminiConfig, GeminiTextProvider};
use crate::services::providers::{GenerationParams, ProviderError, TextProvider};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const EMPTY_PLOT_MESSAGE: &str = "plot must not be empty";
pub const UNAVAILABLE_MESSAGE: &str =
    "Treatment generation is unavailable: the model provider is not configured";
pub const EMPTY_GENERATION_MESSAGE: &str =
    "Failed to generate story treatment. The model returned an empty response.";
pub const GENERATION_FAILURE_MESSAGE: &str = "Failed to generate story treatment";

/// Failure modes of [`TreatmentService::generate_treatment`].
#[derive(Debug, Error)]
pub enum TreatmentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model provider is not configured")]
    ServiceUnavailable,

    #[error("Model returned an empty response")]
    EmptyGeneration,

    #[error("Generation failed: {0}")]
    GenerationFailure(#[source] ProviderError),
}

impl TreatmentError {
    /// Outcome label for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            TreatmentError::InvalidInput(_) => "invalid_input",
            TreatmentError::ServiceUnavailable => "unavailable",
            TreatmentError::EmptyGeneration => "empty_generation",
            TreatmentError::GenerationFailure(_) => "generation_failure",
        }
    }
}

impl From<TreatmentError> for AppError {
    fn from(err: TreatmentError) -> Self {
        match err {
            TreatmentError::InvalidInput(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            TreatmentError::ServiceUnavailable => {
                AppError::ServiceUnavailable(UNAVAILABLE_MESSAGE.to_string())
            }
            TreatmentError::EmptyGeneration => {
                AppError::ServerError(EMPTY_GENERATION_MESSAGE.to_string())
            }
            // The provider error was logged where it happened.
            TreatmentError::GenerationFailure(_) => {
                AppError::ServerError(GENERATION_FAILURE_MESSAGE.to_string())
            }
        }
    }
}

/// Wrap a plot in the fixed treatment prompt.
pub fn build_prompt(plot_text: &str) -> String {
    format!(
        "Expand the following story plot into a detailed story in just 250 words. \
         Focus on outlining key scenes, character arcs, and potential turning points.\n\n\
         Plot:\n{}\n\nTreatment:",
        plot_text
    )
}

/// Generates treatments through an optional provider handle.
///
/// The handle is fixed at construction; `None` means every generation fails
/// with [`TreatmentError::ServiceUnavailable`].
#[derive(Clone)]
pub struct TreatmentService {
    provider: Option<Arc<dyn TextProvider>>,
    params: GenerationParams,
}

impl TreatmentService {
    pub fn new(provider: Option<Arc<dyn TextProvider>>) -> Self {
        Self {
            provider,
            params: GenerationParams::default(),
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn generate_treatment(&self, plot_text: &str) -> Result<String, TreatmentError> {
        let result = self.generate(plot_text).await;
        match &result {
            Ok(_) => metrics::record_treatment_request("success"),
            Err(e) => metrics::record_treatment_request(e.outcome()),
        }
        result
    }

    async fn generate(&self, plot_text: &str) -> Result<String, TreatmentError> {
        if plot_text.trim().is_empty() {
            return Err(TreatmentError::InvalidInput(EMPTY_PLOT_MESSAGE.to_string()));
        }

        let provider = self
            .provider
            .as_ref()
            .ok_or(TreatmentError::ServiceUnavailable)?;

        let prompt = build_prompt(plot_text);

        tracing::info!(
            provider = provider.name(),
            model = provider.model(),
            plot_len = plot_text.len(),
            "Generating treatment"
        );

        let start = Instant::now();
        let response = provider.generate(&prompt, &self.params).await;
        metrics::record_provider_latency(
            provider.name(),
            provider.model(),
            start.elapsed().as_secs_f64(),
        );

        let response = response.map_err(|e| {
            tracing::error!(
                provider = provider.name(),
                model = provider.model(),
                error = %e,
                "Treatment generation failed"
            );
            metrics::record_provider_error(provider.name(), e.kind());
            TreatmentError::GenerationFailure(e)
        })?;

        metrics::record_tokens(
            provider.model(),
            response.input_tokens,
            response.output_tokens,
        );

        match response.text {
            Some(text) if !text.trim().is_empty() => {
                tracing::info!(
                    treatment_len = text.len(),
                    finish_reason = response.finish_reason.as_str(),
                    "Treatment generated"
                );
                Ok(text)
            }
            _ => {
                tracing::error!(
                    provider = provider.name(),
                    model = provider.model(),
                    "Model returned an empty response"
                );
                Err(TreatmentError::EmptyGeneration)
            }
        }
    }
}

/// Build the provider handle from configuration.
///
/// Never fails: a missing credential, a provider that cannot be built, or a
/// failed startup verification all leave the handle unset.
pub async fn init_provider(config: &TreatmentConfig) -> Option<Arc<dyn TextProvider>> {
    let Some(api_key) = config.google.api_key.clone() else {
        tracing::warn!(
            "GOOGLE_API_KEY not set; treatment generation will return 503 until it is configured"
        );
        return None;
    };

    if api_key.expose_secret().trim().is_empty() {
        tracing::warn!("GOOGLE_API_KEY is blank; treatment generation disabled");
        return None;
    }

    let gemini_config = GeminiConfig {
        api_key,
        model: config.models.text_model.clone(),
        base_url: config.google.api_base_url.clone(),
        timeout: Duration::from_secs(config.models.request_timeout_secs),
    };

    let provider = match GeminiTextProvider::new(gemini_config) {
        Ok(provider) => provider,
        Err(e) => {
            tracing::error!(error = %e, "Failed to configure Gemini provider");
            return None;
        }
    };

    if config.models.verify_on_startup {
        if let Err(e) = provider.health_check().await {
            tracing::error!(error = %e, "Gemini credential verification failed");
            return None;
        }
    }

    tracing::info!(
        model = %config.models.text_model,
        timeout_secs = config.models.request_timeout_secs,
        "Initialized Gemini text provider"
    );

    Some(Arc::new(provider))
}
