use secrecy::Secret;
use service_core::config::{self as core_config, get_env, get_optional_env};
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

/// Gemini API base URL.
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used for every treatment; not selectable per request.
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.0-flash";

/// Upper bound on a single provider call.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Vue.js dev server.
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:5173";

#[derive(Debug, Clone)]
pub struct TreatmentConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub google: GoogleConfig,
    pub models: ModelConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Test,
    Prod,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "test" => Ok(Environment::Test),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(format!("Unknown environment: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// `None` leaves the service in degraded mode.
    pub api_key: Option<Secret<String>>,
    pub api_base_url: String,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub text_model: String,
    pub request_timeout_secs: u64,
    /// Verify the credential against the provider before serving.
    pub verify_on_startup: bool,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

impl TreatmentConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let environment: Environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "dev".to_string())
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        Ok(TreatmentConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("treatment-service"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            google: GoogleConfig {
                api_key: get_optional_env("GOOGLE_API_KEY").map(Secret::new),
                api_base_url: get_env(
                    "GENAI_API_BASE_URL",
                    Some(DEFAULT_GEMINI_API_BASE),
                    is_prod,
                )?,
            },
            models: ModelConfig {
                text_model: get_env("GENAI_TEXT_MODEL", Some(DEFAULT_TEXT_MODEL), is_prod)?,
                request_timeout_secs: parse_timeout_secs(
                    "GENAI_REQUEST_TIMEOUT_SECS",
                    get_optional_env("GENAI_REQUEST_TIMEOUT_SECS"),
                )?,
                verify_on_startup: parse_or(
                    "GENAI_VERIFY_ON_STARTUP",
                    get_optional_env("GENAI_VERIFY_ON_STARTUP"),
                    false,
                )?,
                temperature: parse_optional(
                    "GENAI_TEMPERATURE",
                    get_optional_env("GENAI_TEMPERATURE"),
                )?,
                max_output_tokens: parse_optional(
                    "GENAI_MAX_OUTPUT_TOKENS",
                    get_optional_env("GENAI_MAX_OUTPUT_TOKENS"),
                )?,
            },
            security: SecurityConfig {
                allowed_origins: parse_origins(&get_env(
                    "ALLOWED_ORIGINS",
                    Some(DEFAULT_ALLOWED_ORIGINS),
                    is_prod,
                )?),
            },
        })
    }

    /// Configuration for tests and local tooling: no credential, ephemeral port.
    pub fn for_tests() -> Self {
        TreatmentConfig {
            common: core_config::Config { port: 0 },
            environment: Environment::Test,
            service_name: "treatment-service".to_string(),
            log_level: "error".to_string(),
            otlp_endpoint: None,
            google: GoogleConfig {
                api_key: None,
                api_base_url: DEFAULT_GEMINI_API_BASE.to_string(),
            },
            models: ModelConfig {
                text_model: DEFAULT_TEXT_MODEL.to_string(),
                request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                verify_on_startup: false,
                temperature: None,
                max_output_tokens: None,
            },
            security: SecurityConfig {
                allowed_origins: parse_origins(DEFAULT_ALLOWED_ORIGINS),
            },
        }
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, AppError> {
    match raw {
        Some(value) => value.parse().map_err(|_| {
            AppError::ConfigError(anyhow::anyhow!("{} has an invalid value: {}", key, value))
        }),
        None => Ok(default),
    }
}

/// A zero timeout would fail every provider call, so it is rejected.
fn parse_timeout_secs(key: &str, raw: Option<String>) -> Result<u64, AppError> {
    match parse_or(key, raw, DEFAULT_REQUEST_TIMEOUT_SECS)? {
        0 => Err(AppError::ConfigError(anyhow::anyhow!(
            "{} must be greater than zero",
            key
        ))),
        secs => Ok(secs),
    }
}

fn parse_optional<T: FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>, AppError> {
    match raw {
        Some(value) => value.parse().map(Some).map_err(|_| {
            AppError::ConfigError(anyhow::anyhow!("{} has an invalid value: {}", key, value))
        }),
        None => Ok(None),
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_origins() {
        let origins = parse_origins("http://localhost:5173, https://plots.example.com ,,");
        assert_eq!(
            origins,
            vec!["http://localhost:5173", "https://plots.example.com"]
        );
    }

    #[test]
    fn parse_or_falls_back_to_default() {
        let timeout: u64 = parse_or("TIMEOUT", None, 60).unwrap();
        assert_eq!(timeout, 60);

        let timeout: u64 = parse_or("TIMEOUT", Some("15".to_string()), 60).unwrap();
        assert_eq!(timeout, 15);
    }

    #[test]
    fn parse_or_rejects_garbage() {
        let result: Result<u64, _> = parse_or("TIMEOUT", Some("soon".to_string()), 60);
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[test]
    fn timeout_must_be_positive() {
        assert_eq!(
            parse_timeout_secs("GENAI_REQUEST_TIMEOUT_SECS", None).unwrap(),
            DEFAULT_REQUEST_TIMEOUT_SECS
        );
        assert_eq!(
            parse_timeout_secs("GENAI_REQUEST_TIMEOUT_SECS", Some("30".to_string())).unwrap(),
            30
        );

        let result = parse_timeout_secs("GENAI_REQUEST_TIMEOUT_SECS", Some("0".to_string()));
        match result {
            Err(AppError::ConfigError(e)) => {
                assert!(e.to_string().contains("GENAI_REQUEST_TIMEOUT_SECS"))
            }
            other => panic!("expected config error, got {:?}", other),
        }

        assert!(parse_timeout_secs("GENAI_REQUEST_TIMEOUT_SECS", Some("-5".to_string())).is_err());
    }

    #[test]
    fn parse_optional_keeps_absence() {
        let temperature: Option<f32> = parse_optional("TEMP", None).unwrap();
        assert_eq!(temperature, None);

        let temperature: Option<f32> = parse_optional("TEMP", Some("0.7".to_string())).unwrap();
        assert_eq!(temperature, Some(0.7));

        assert!(parse_optional::<i32>("TOKENS", Some("lots".to_string())).is_err());
    }

    #[test]
    fn environment_from_str() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Prod);
        assert_eq!("Dev".parse::<Environment>().unwrap(), Environment::Dev);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_config_has_no_credential() {
        let config = TreatmentConfig::for_tests();
        assert!(config.google.api_key.is_none());
        assert_eq!(config.models.text_model, "gemini-2.0-flash");
        assert_eq!(config.common.port, 0);
    }
}
