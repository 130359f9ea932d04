//! Application configuration management
//!
//! Values come from built-in defaults, an optional TOML file, the `.env`
//! file and the process environment, in increasing order of precedence.
//! Everything is validated once at startup and then shared read-only.

use crate::core::constants::{defaults, safety};
use crate::core::provider::ProviderType;
use crate::models::gemini::{GenerationConfig, SafetySetting};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Default request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT: u64 = 120;

/// Default server port
const DEFAULT_PORT: u16 = 8501;

/// Default upload cap (10 MiB)
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Default idle time before a UI session is dropped
const DEFAULT_SESSION_IDLE_TIMEOUT: u64 = 3600;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GeminiSection {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct VertexAISection {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GenerationSection {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub css_framework: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerSection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub open_browser: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RequestSection {
    #[serde(default)]
    pub request_timeout: Option<u64>,
    #[serde(default)]
    pub max_upload_bytes: Option<usize>,
    #[serde(default)]
    pub session_idle_timeout: Option<u64>,
}

/// Shape of the optional `config.toml`
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub gemini: GeminiSection,
    #[serde(default)]
    pub vertexai: VertexAISection,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub request: RequestSection,
}

/// Application configuration
///
/// Loaded once at startup so the process fails fast when misconfigured.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend serving the Gemini models
    pub provider: ProviderType,

    /// Gemini API key (required for the `gemini` provider)
    pub gemini_api_key: Option<String>,

    /// Gemini API base URL
    pub gemini_base_url: String,

    /// Vertex AI specific settings
    pub vertexai_project_id: Option<String>,
    pub vertexai_location: String,
    pub vertexai_access_token: Option<String>,

    /// Model used for every call
    pub model: String,

    /// CSS framework named in the HTML prompts
    pub css_framework: String,

    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,

    /// Server host address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Logging level
    pub log_level: String,

    /// Open the UI in a browser once the listener is bound
    pub open_browser: bool,

    /// Outbound request timeout in seconds
    pub request_timeout: u64,

    /// Largest accepted screenshot upload
    pub max_upload_bytes: usize,

    /// Seconds of inactivity before a UI session is evicted
    pub session_idle_timeout: u64,
}

impl Config {
    /// Load configuration from `config.toml`, `.env` and the environment
    ///
    /// `CONFIG_PATH` points at a different TOML file; when it is set the
    /// file must exist.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let process_env = |key: &str| std::env::var(key).ok();
        match std::env::var("CONFIG_PATH") {
            Ok(path) => Self::from_file(&path, process_env),
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(DEFAULT_CONFIG_PATH, process_env)
            }
            Err(_) => Self::from_sources(None, process_env),
        }
    }

    /// Load configuration from a TOML file overlaid with `env` lookups
    pub fn from_file<P, F>(path: P, env: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::from_sources(Some(&content), env)
    }

    /// Build configuration from TOML text overlaid with `env` lookups
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The TOML text cannot be parsed
    /// - An environment value cannot be parsed into its type
    /// - The provider name is unknown
    pub fn from_sources<F>(toml_content: Option<&str>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file: TomlConfig = match toml_content {
            Some(content) => {
                toml::from_str(content).context("Failed to parse TOML configuration")?
            }
            None => TomlConfig::default(),
        };

        let provider_name = pick_string(&env, "PROVIDER", file.provider)
            .unwrap_or_else(|| "gemini".to_string());
        let provider = ProviderType::from_str(&provider_name)
            .context("Invalid provider value. Must be one of: gemini, vertexai")?;

        let css_framework = pick_string(&env, "CSS_FRAMEWORK", file.generation.css_framework)
            .unwrap_or_else(|| defaults::CSS_FRAMEWORK.to_string());

        let config = Config {
            provider,
            gemini_api_key: pick_string(&env, "GEMINI_API_KEY", file.gemini.api_key),
            gemini_base_url: pick_string(&env, "GEMINI_BASE_URL", file.gemini.base_url)
                .unwrap_or_else(|| defaults::GEMINI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            vertexai_project_id: pick_string(
                &env,
                "VERTEXAI_PROJECT_ID",
                file.vertexai.project_id,
            ),
            vertexai_location: pick_string(&env, "VERTEXAI_LOCATION", file.vertexai.location)
                .unwrap_or_else(|| defaults::VERTEXAI_LOCATION.to_string()),
            vertexai_access_token: pick_string(
                &env,
                "VERTEXAI_ACCESS_TOKEN",
                file.vertexai.access_token,
            ),
            model: pick_string(&env, "GEMINI_MODEL", file.generation.model)
                .unwrap_or_else(|| defaults::MODEL.to_string()),
            css_framework,
            temperature: pick(&env, "TEMPERATURE", file.generation.temperature)?
                .unwrap_or(defaults::TEMPERATURE),
            top_p: pick(&env, "TOP_P", file.generation.top_p)?.unwrap_or(defaults::TOP_P),
            top_k: pick(&env, "TOP_K", file.generation.top_k)?.unwrap_or(defaults::TOP_K),
            max_output_tokens: pick(&env, "MAX_OUTPUT_TOKENS", file.generation.max_output_tokens)?
                .unwrap_or(defaults::MAX_OUTPUT_TOKENS),
            host: pick_string(&env, "HOST", file.server.host)
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: pick(&env, "PORT", file.server.port)?.unwrap_or(DEFAULT_PORT),
            log_level: pick_string(&env, "LOG_LEVEL", file.server.log_level)
                .unwrap_or_else(|| "info".to_string()),
            open_browser: match env("OPEN_BROWSER") {
                Some(value) => parse_bool(&value)
                    .with_context(|| format!("Invalid OPEN_BROWSER value: {}", value))?,
                None => file.server.open_browser.unwrap_or(true),
            },
            request_timeout: pick(&env, "REQUEST_TIMEOUT", file.request.request_timeout)?
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            max_upload_bytes: pick(&env, "MAX_UPLOAD_BYTES", file.request.max_upload_bytes)?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            session_idle_timeout: pick(
                &env,
                "SESSION_IDLE_TIMEOUT",
                file.request.session_idle_timeout,
            )?
            .unwrap_or(DEFAULT_SESSION_IDLE_TIMEOUT),
        };

        if config.session_idle_duration().is_none() {
            bail!(
                "Invalid SESSION_IDLE_TIMEOUT value: {} is out of range",
                config.session_idle_timeout
            );
        }

        Ok(config)
    }

    /// Idle timeout as a duration, `None` when it does not fit one
    pub fn session_idle_duration(&self) -> Option<chrono::Duration> {
        i64::try_from(self.session_idle_timeout)
            .ok()
            .and_then(chrono::Duration::try_seconds)
    }

    /// Check that the credential for the selected provider is present
    pub fn validate_api_key(&self) -> bool {
        match self.provider {
            ProviderType::Gemini => self.gemini_api_key.is_some(),
            ProviderType::VertexAI => {
                self.vertexai_access_token.is_some() && self.vertexai_project_id.is_some()
            }
        }
    }

    /// Generation settings sent with every request
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig::text(
            self.temperature,
            self.top_p,
            self.top_k,
            self.max_output_tokens,
        )
    }

    /// Safety settings sent with every request
    pub fn safety_settings(&self) -> Vec<SafetySetting> {
        safety::CATEGORIES
            .iter()
            .map(|category| SafetySetting::new(*category, safety::BLOCK_NONE))
            .collect()
    }

    /// Address the browser should open
    pub fn server_url(&self) -> String {
        let host = if self.host == "0.0.0.0" {
            "127.0.0.1"
        } else {
            self.host.as_str()
        };
        format!("http://{}:{}", host, self.port)
    }
}

/// Environment value if set and non-blank, else the file value if non-blank
fn pick_string<F>(env: &F, key: &str, file_value: Option<String>) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    env(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| file_value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
}

/// Parsed environment value if set, else the file value
fn pick<F, T>(env: &F, key: &str, file_value: Option<T>) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => match raw.parse::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(_) => bail!("Invalid {} value: {}", key, raw),
        },
        None => Ok(file_value),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
