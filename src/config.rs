use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_LLM_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const DEFAULT_LLM_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_LLM_TEMPERATURE: f32 = 0.7;
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;
const DEFAULT_SEARCH_API_URL: &str = "https://google.serper.dev/search";
const DEFAULT_SEARCH_RESULT_LIMIT: usize = 5;
const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SCRATCH_DIR: &str = "data";
const DEFAULT_SERVER_PORT: u16 = 8000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the analyzer server and CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Connection settings for the chat-completions backend.
    pub llm: LlmSettings,
    /// Connection settings for the web-search provider.
    pub search: SearchSettings,
    /// Directory holding uploaded documents while a pipeline run is in flight.
    pub scratch_dir: PathBuf,
    /// How the engine reacts to a rejected verification verdict.
    pub verification_gate: GateMode,
    /// Port the HTTP server binds to.
    pub server_port: u16,
    /// Largest accepted `POST /analyze` body.
    pub max_upload_bytes: usize,
}

/// Settings for the OpenAI-compatible chat-completions backend.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    /// Base URL up to (not including) `/chat/completions`.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub api_key: String,
    /// Model identifier passed through to the backend.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Settings for the Serper-compatible search provider.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    /// Endpoint accepting `POST {"q": ..., "num": ...}`.
    pub api_url: String,
    /// API key sent in the `X-API-KEY` header. Searches fail when absent.
    pub api_key: Option<String>,
    /// Maximum number of organic results returned to a step.
    pub result_limit: usize,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Behavior of the engine once the verification step has produced its verdict.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    /// A rejected document aborts the run before analysis starts.
    #[default]
    Enforce,
    /// The verdict is logged and every step still runs.
    Advisory,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let temperature = parse_optional::<f32>("LLM_TEMPERATURE")?
            .unwrap_or(DEFAULT_LLM_TEMPERATURE);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue("LLM_TEMPERATURE".into()));
        }

        let result_limit = parse_optional::<usize>("SEARCH_RESULT_LIMIT")?
            .unwrap_or(DEFAULT_SEARCH_RESULT_LIMIT);
        if result_limit == 0 {
            return Err(ConfigError::InvalidValue("SEARCH_RESULT_LIMIT".into()));
        }

        Ok(Self {
            llm: LlmSettings {
                base_url: load_env_optional("LLM_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
                api_key: load_env("LLM_API_KEY")?,
                model: load_env_optional("LLM_MODEL")
                    .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                temperature,
                timeout_secs: parse_optional("LLM_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_LLM_TIMEOUT_SECS),
            },
            search: SearchSettings {
                api_url: load_env_optional("SEARCH_API_URL")
                    .unwrap_or_else(|| DEFAULT_SEARCH_API_URL.to_string()),
                api_key: load_env_optional("SEARCH_API_KEY"),
                result_limit,
                timeout_secs: parse_optional("SEARCH_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_SEARCH_TIMEOUT_SECS),
            },
            scratch_dir: load_env_optional("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH_DIR)),
            verification_gate: load_env_optional("VERIFICATION_GATE")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("VERIFICATION_GATE".into()))
                })
                .transpose()?
                .unwrap_or_default(),
            server_port: parse_optional("SERVER_PORT")?.unwrap_or(DEFAULT_SERVER_PORT),
            max_upload_bytes: parse_optional("MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for GateMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "enforce" => Ok(Self::Enforce),
            "advisory" => Ok(Self::Advisory),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        llm_base_url = %config.llm.base_url,
        model = %config.llm.model,
        temperature = config.llm.temperature,
        search_configured = config.search.api_key.is_some(),
        scratch_dir = %config.scratch_dir.display(),
        gate = ?config.verification_gate,
        server_port = config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_mode_parses_case_insensitively() {
        assert_eq!("Enforce".parse::<GateMode>(), Ok(GateMode::Enforce));
        assert_eq!(" advisory ".parse::<GateMode>(), Ok(GateMode::Advisory));
        assert!("strict".parse::<GateMode>().is_err());
    }

    #[test]
    fn gate_mode_defaults_to_enforce() {
        assert_eq!(GateMode::default(), GateMode::Enforce);
    }
}
