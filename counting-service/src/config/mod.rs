use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_FLUX_API_BASE: &str = "https://api.bfl.ml";

#[derive(Debug, Clone, Deserialize)]
pub struct CountingConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub mongodb: MongoConfig,
    pub google: GoogleConfig,
    pub flux: FluxConfig,
    pub cors: CorsConfig,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    /// Collection holding one document per uid.
    pub collection: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub api_key: Secret<String>,
    pub api_base: String,
    /// Model that writes the counting sentence (e.g., gemini-1.5-pro)
    pub prompt_model: String,
    /// Multimodal model that counts objects in the stored image (e.g., gemini-1.5-flash)
    pub vision_model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FluxConfig {
    pub api_key: Secret<String>,
    pub api_base: String,
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
}

impl FluxConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// `*` allows any origin; otherwise an explicit list.
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == "*")
    }
}

impl CountingConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(CountingConfig {
            common: common_config,
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", None, is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("dyscalculia"), is_prod)?,
                collection: get_env("MONGODB_COLLECTION", Some("Generated"), is_prod)?,
            },
            google: GoogleConfig {
                api_key: Secret::new(get_env("GENAI_API_KEY", None, is_prod)?),
                api_base: get_env("GEMINI_API_BASE", Some(DEFAULT_GEMINI_API_BASE), is_prod)?,
                prompt_model: get_env("GENAI_PROMPT_MODEL", Some("gemini-1.5-pro"), is_prod)?,
                vision_model: get_env("GENAI_VISION_MODEL", Some("gemini-1.5-flash"), is_prod)?,
            },
            flux: FluxConfig {
                api_key: Secret::new(get_env("FLUX_API_KEY", None, is_prod)?),
                api_base: get_env("FLUX_API_BASE", Some(DEFAULT_FLUX_API_BASE), is_prod)?,
                model: get_env("FLUX_MODEL", Some("flux-pro-1.1"), is_prod)?,
                width: get_parsed_env("FLUX_IMAGE_WIDTH", 1024, is_prod)?,
                height: get_parsed_env("FLUX_IMAGE_HEIGHT", 768, is_prod)?,
                poll_interval_ms: get_parsed_env("FLUX_POLL_INTERVAL_MS", 500, is_prod)?,
                max_poll_attempts: get_parsed_env("FLUX_MAX_POLL_ATTEMPTS", 240, is_prod)?,
            },
            cors: CorsConfig {
                allowed_origins: parse_origins(&get_env(
                    "CORS_ALLOWED_ORIGINS",
                    Some("*"),
                    is_prod,
                )?),
            },
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
        })
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn get_parsed_env<T>(key: &str, default: T, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr + ToString,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(&default.to_string()), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_split_and_trimmed() {
        assert_eq!(
            parse_origins("http://a.test, http://b.test ,,"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn wildcard_or_empty_allows_any_origin() {
        let any = CorsConfig {
            allowed_origins: vec!["*".to_string()],
        };
        let empty = CorsConfig {
            allowed_origins: vec![],
        };
        let listed = CorsConfig {
            allowed_origins: vec!["http://a.test".to_string()],
        };

        assert!(any.allows_any_origin());
        assert!(empty.allows_any_origin());
        assert!(!listed.allows_any_origin());
    }

    #[test]
    fn unset_numeric_setting_uses_default() {
        let width: u32 =
            get_parsed_env("COUNTING_TEST_UNSET_WIDTH", 1024, false).expect("default width");
        assert_eq!(width, 1024);
    }

    #[test]
    fn missing_required_setting_is_a_config_error() {
        let err = get_env("COUNTING_TEST_UNSET_REQUIRED", None, false).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
