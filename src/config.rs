//! Environment-driven configuration.
//!
//! Every setting has a default except the optional credentials. Values are
//! read once at startup by [`GatekeeperConfig::from_env`]; invalid values are
//! fatal before any pipeline stage runs.

use std::path::PathBuf;

use reqwest::Url;
use thiserror::Error;

use crate::agents::verifier::{default_checks, CheckDef, VerifierConfig};
use crate::sonar::token::{
    DEFAULT_PASSWORD, DEFAULT_SHARED_TOKEN_PATH, DEFAULT_TOKEN_CACHE_PATH, DEFAULT_USERNAME,
};
use crate::sonar::{BasicCredentials, TokenSources};
use crate::telemetry::Telemetry;

pub const DEFAULT_SONAR_URL: &str = "http://localhost:9000";
pub const DEFAULT_PROJECT_KEY: &str = "sonar-gatekeeper";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5-coder:1.5b";
pub const DEFAULT_LANGFUSE_HOST: &str = "http://localhost:3000";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Langfuse credentials; present only when both keys are set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LangfuseConfig {
    pub host: String,
    pub public_key: String,
    pub secret_key: String,
}

/// Process configuration.
#[derive(Debug, Clone)]
pub struct GatekeeperConfig {
    // Quality-gate service
    pub sonar_url: String,
    pub sonar_token: Option<String>,
    pub project_key: String,
    pub sonar_user: String,
    pub sonar_pass: String,
    pub shared_token_path: PathBuf,
    pub token_cache_path: PathBuf,

    // Reasoning service
    pub ollama_host: String,
    pub ollama_model: String,

    // Telemetry
    pub langfuse: Option<LangfuseConfig>,

    // Verification
    pub checks: Vec<CheckDef>,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            sonar_url: DEFAULT_SONAR_URL.to_string(),
            sonar_token: None,
            project_key: DEFAULT_PROJECT_KEY.to_string(),
            sonar_user: DEFAULT_USERNAME.to_string(),
            sonar_pass: DEFAULT_PASSWORD.to_string(),
            shared_token_path: PathBuf::from(DEFAULT_SHARED_TOKEN_PATH),
            token_cache_path: PathBuf::from(DEFAULT_TOKEN_CACHE_PATH),
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            langfuse: None,
            checks: default_checks(),
        }
    }
}

impl GatekeeperConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Blank values count as unset.
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(val) = var("SONAR_URL") {
            config.sonar_url = parse_url(&val, "SONAR_URL")?;
        }
        config.sonar_token = var("SONAR_TOKEN");
        if let Some(val) = var("SONAR_PROJECT_KEY") {
            config.project_key = val;
        }
        if let Some(val) = var("SONAR_USER") {
            config.sonar_user = val;
        }
        if let Some(val) = var("SONAR_PASS") {
            config.sonar_pass = val;
        }
        if let Some(val) = var("SONAR_SHARED_TOKEN_PATH") {
            config.shared_token_path = PathBuf::from(val);
        }
        if let Some(val) = var("SONAR_TOKEN_CACHE") {
            config.token_cache_path = PathBuf::from(val);
        }

        if let Some(val) = var("OLLAMA_HOST") {
            config.ollama_host = parse_url(&val, "OLLAMA_HOST")?;
        }
        if let Some(val) = var("OLLAMA_MODEL") {
            config.ollama_model = val;
        }

        if let (Some(public_key), Some(secret_key)) = (var("LANGFUSE_PUBLIC_KEY"), var("LANGFUSE_SECRET_KEY")) {
            let host = match var("LANGFUSE_HOST") {
                Some(val) => parse_url(&val, "LANGFUSE_HOST")?,
                None => DEFAULT_LANGFUSE_HOST.to_string(),
            };
            config.langfuse = Some(LangfuseConfig {
                host,
                public_key,
                secret_key,
            });
        }

        if let Some(val) = var("GATEKEEPER_CHECKS") {
            config.checks = parse_checks(&val, "GATEKEEPER_CHECKS")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_key.is_empty() {
            return Err(ConfigError::ValidationFailed("project_key cannot be empty".to_string()));
        }
        if self.ollama_model.is_empty() {
            return Err(ConfigError::ValidationFailed("ollama_model cannot be empty".to_string()));
        }
        if self.checks.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one verification check is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Inputs for the token resolution chain.
    pub fn token_sources(&self) -> TokenSources {
        TokenSources {
            explicit_token: self.sonar_token.clone(),
            shared_path: self.shared_token_path.clone(),
            cache_path: self.token_cache_path.clone(),
        }
    }

    pub fn credentials(&self) -> BasicCredentials {
        BasicCredentials {
            username: self.sonar_user.clone(),
            password: self.sonar_pass.clone(),
        }
    }

    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig::default().with_checks(self.checks.clone())
    }

    /// Langfuse telemetry when credentials are configured, otherwise tracing only.
    pub fn telemetry(&self) -> Telemetry {
        match &self.langfuse {
            Some(langfuse) => Telemetry::langfuse(&langfuse.host, &langfuse.public_key, &langfuse.secret_key),
            None => Telemetry::disabled(),
        }
    }
}

fn parse_url(value: &str, key: &str) -> Result<String, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{}' is not a valid URL: {}", value, e),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(value.trim_end_matches('/').to_string())
}

/// Parse `name=command args;name=command args`.
fn parse_checks(value: &str, key: &str) -> Result<Vec<CheckDef>, ConfigError> {
    value
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let invalid = |message: String| ConfigError::InvalidValue {
                key: key.to_string(),
                message,
            };
            let (name, command) = entry
                .split_once('=')
                .ok_or_else(|| invalid(format!("'{}' is not of the form name=command", entry)))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(invalid(format!("'{}' has an empty check name", entry)));
            }
            CheckDef::from_command_line(name, command)
                .ok_or_else(|| invalid(format!("check '{}' has an empty command", name)))
        })
        .collect()
}
