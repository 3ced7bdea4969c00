use service_core::observability::init_tracing;
use treatment_service::config::TreatmentConfig;
use treatment_service::startup::Application;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = TreatmentConfig::load()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.environment,
        model = %config.models.text_model,
        "Starting treatment service"
    );

    let app = Application::build(config).await?;
    tracing::info!(port = app.port(), "Listening");

    app.run_until_stopped().await?;
    Ok(())
}
