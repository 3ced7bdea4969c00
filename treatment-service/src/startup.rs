//! Application startup and lifecycle management.
//!
//! Builds the provider handle once, wires it into the router, and serves HTTP
//! until a shutdown signal arrives.

use crate::config::TreatmentConfig;
use crate::handlers;
use crate::services::providers::{GenerationParams, TextProvider};
use crate::services::{init_metrics, init_provider, TreatmentService};
use axum::http::HeaderValue;
use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{request_id_middleware, REQUEST_ID_HEADER};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state. Read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<TreatmentConfig>,
    pub treatment: TreatmentService,
}

impl AppState {
    pub fn new(config: TreatmentConfig, provider: Option<Arc<dyn TextProvider>>) -> Self {
        let params = GenerationParams {
            temperature: config.models.temperature,
            top_p: None,
            max_tokens: config.models.max_output_tokens,
        };

        Self {
            config: Arc::new(config),
            treatment: TreatmentService::new(provider).with_params(params),
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect();

    // Wildcards are not allowed alongside credentials, so methods and
    // headers are mirrored from the preflight instead.
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Build the HTTP router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.security.allowed_origins);

    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route(
            "/generate-treatment",
            post(handlers::treatment::generate_treatment),
        )
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(cors)
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    state: AppState,
}

impl Application {
    /// Build the application, configuring the Gemini provider from `config`.
    pub async fn build(config: TreatmentConfig) -> Result<Self, AppError> {
        let provider = init_provider(&config).await;
        Self::build_with_provider(config, provider).await
    }

    /// Build the application around an explicit provider handle.
    pub async fn build_with_provider(
        config: TreatmentConfig,
        provider: Option<Arc<dyn TextProvider>>,
    ) -> Result<Self, AppError> {
        init_metrics();

        if provider.is_none() {
            tracing::warn!("Starting in degraded mode: treatment generation unavailable");
        }

        let state = AppState::new(config, provider);

        // Port 0 = random port for testing
        let addr = SocketAddr::from(([0, 0, 0, 0], state.config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            service = %state.config.service_name,
            port,
            provider_configured = state.treatment.is_configured(),
            "Treatment service bound"
        );

        let router = build_router(state.clone());

        Ok(Self {
            port,
            listener,
            router,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the application until a shutdown signal is received.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Service shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
