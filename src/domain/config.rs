//! Configuration models loaded from `capdeploy.toml`.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::AppError;

pub const CONFIG_FILE_NAME: &str = "capdeploy.toml";
pub const URL_ENV_VAR: &str = "CAPROVER_URL";
pub const PASSWORD_ENV_VAR: &str = "CAPROVER_PASSWORD";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
}

impl Config {
    pub fn parse_toml(content: &str) -> Result<Self, AppError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.controller.validate()?;
        self.deploy.validate()?;
        Ok(())
    }
}

/// Controller connection settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    /// Controller base URL; a bare host is accepted and served over https.
    pub url: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum attempts for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay between retries in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Value of the `x-namespace` header.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Supplied from the environment only.
    #[serde(skip)]
    pub password: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            namespace: default_namespace(),
            password: None,
        }
    }
}

impl fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("url", &self.url)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("max_delay_ms", &self.max_delay_ms)
            .field("namespace", &self.namespace)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.timeout_secs == 0 {
            return Err(AppError::InvalidConfig("timeout_secs must be greater than 0".to_string()));
        }
        if self.max_retries == 0 {
            return Err(AppError::InvalidConfig("max_retries must be greater than 0".to_string()));
        }
        if self.retry_delay_ms == 0 {
            return Err(AppError::InvalidConfig(
                "retry_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.namespace.trim().is_empty() {
            return Err(AppError::InvalidConfig("namespace must not be empty".to_string()));
        }
        if let Some(url) = &self.url {
            normalize_base_url(url)?;
        }
        Ok(())
    }

    /// The configured base URL, normalized. Fails when none is configured.
    pub fn base_url(&self) -> Result<Url, AppError> {
        let raw = self
            .url
            .as_deref()
            .ok_or_else(|| AppError::EnvironmentVariableMissing(URL_ENV_VAR.to_string()))?;
        normalize_base_url(raw)
    }

    pub fn password(&self) -> Result<&str, AppError> {
        self.password
            .as_deref()
            .ok_or_else(|| AppError::EnvironmentVariableMissing(PASSWORD_ENV_VAR.to_string()))
    }
}

/// Accept `captain.example.com`, `https://captain.example.com/` and the like.
pub fn normalize_base_url(raw: &str) -> Result<Url, AppError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AppError::InvalidConfig("controller url must not be empty".to_string()));
    }
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    Url::parse(&with_scheme)
        .map_err(|e| AppError::InvalidConfig(format!("Invalid controller url '{}': {}", raw, e)))
}

/// Deployment behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    /// Units processed concurrently; 1 keeps declaration order strictly sequential.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Running-state polls after a unit is deployed; 0 disables polling.
    #[serde(default)]
    pub poll_attempts: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Seeds `$$cap_root_domain`.
    pub root_domain: Option<String>,
    #[serde(default = "default_template_repository")]
    pub template_repository: Url,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            poll_attempts: 0,
            poll_interval_ms: default_poll_interval_ms(),
            root_domain: None,
            template_repository: default_template_repository(),
        }
    }
}

impl DeployConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_parallel == 0 {
            return Err(AppError::InvalidConfig("max_parallel must be greater than 0".to_string()));
        }
        if self.poll_attempts > 0 && self.poll_interval_ms == 0 {
            return Err(AppError::InvalidConfig(
                "poll_interval_ms must be greater than 0 when polling".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_namespace() -> String {
    "captain".to_string()
}

fn default_max_parallel() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_template_repository() -> Url {
    Url::parse("https://oneclickapps.caprover.com").expect("Default template repository must be valid")
}
