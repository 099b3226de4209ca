use serde::{Deserialize, Serialize};

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upstream request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8765
}
fn default_timeout() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout: default_timeout(),
        }
    }
}

/// Feature flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Redirect rate-limited requests to a fallback model.
    #[serde(default = "default_true")]
    pub auto_switch_models: bool,
}

fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            auto_switch_models: true,
        }
    }
}

/// Upstream authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Path to the cached OAuth credentials file (Gemini CLI layout).
    #[serde(default)]
    pub credentials_path: Option<String>,
    /// Explicit Cloud project id; overrides discovery but not the
    /// GOOGLE_CLOUD_PROJECT / GOOGLE_CLOUD_PROJECT_ID environment variables.
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Static fallback table consulted on rate limits: model -> fallback model.
    /// Empty by default, so rate limits surface to the client unchanged.
    #[serde(default)]
    pub fallback_models: std::collections::BTreeMap<String, String>,
}

/// Load and validate configuration from a YAML file.
///
/// A missing file yields the all-defaults configuration so the proxy can run
/// with zero setup beyond cached OAuth credentials.
///
/// # Errors
///
/// Returns `ConfigError` on unreadable or invalid YAML, or failed validation.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let config = match std::fs::read_to_string(path) {
        Ok(raw) => serde_yaml::from_str(&raw)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(err) => return Err(ConfigError::Io(err)),
    };
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.host.is_empty() {
        return Err(ConfigError::Validation(
            "server.host must not be empty".to_string(),
        ));
    }
    if config.server.timeout == 0 {
        return Err(ConfigError::Validation(
            "server.timeout must be greater than zero".to_string(),
        ));
    }
    let level = config.features.log_level.to_uppercase();
    const KNOWN: [&str; 7] = [
        "TRACE", "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "DISABLED",
    ];
    if !KNOWN.contains(&level.as_str()) {
        return Err(ConfigError::Validation(format!(
            "features.log_level '{}' is not one of {KNOWN:?}",
            config.features.log_level
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.server.port, 8765);
        assert!(config.features.auto_switch_models);
    }

    #[test]
    fn parses_partial_yaml_with_defaults() {
        let config: AppConfig = serde_yaml::from_str("server:\n  port: 9000\n").unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.features.log_level, "INFO");
    }

    #[test]
    fn rejects_unknown_log_level() {
        let config: AppConfig =
            serde_yaml::from_str("features:\n  log_level: chatty\n").unwrap();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn rejects_zero_timeout() {
        let config: AppConfig = serde_yaml::from_str("server:\n  timeout: 0\n").unwrap();
        assert!(validate_config(&config).is_err());
    }
}
