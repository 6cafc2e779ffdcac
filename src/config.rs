//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default per-call timeout for outbound provider requests.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for one external provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the provider API, without trailing slash.
    pub base_url: String,
    /// Bearer credential. `None` means the adapter refuses to make calls.
    pub api_key: Option<SecretString>,
    /// Hard timeout applied to every request.
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read `{prefix}_URL`, `{prefix}_API_KEY` and `{prefix}_TIMEOUT_SECS`.
    fn from_env(prefix: &str, default_url: &str) -> Result<Self, ConfigError> {
        let base_url =
            std::env::var(format!("{prefix}_URL")).unwrap_or_else(|_| default_url.to_string());
        let mut config = Self::new(base_url);

        if let Ok(key) = std::env::var(format!("{prefix}_API_KEY"))
            && !key.trim().is_empty()
        {
            config = config.with_api_key(key);
        }

        let timeout_key = format!("{prefix}_TIMEOUT_SECS");
        if let Ok(raw) = std::env::var(&timeout_key) {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: timeout_key.clone(),
                message: format!("expected whole seconds, got {raw:?}"),
            })?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: timeout_key,
                    message: "timeout must be greater than zero".into(),
                });
            }
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// Settings for every external provider the workflows call.
#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub background_check: ProviderConfig,
    pub insurance: ProviderConfig,
    pub payments: ProviderConfig,
    pub storage: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            background_check: ProviderConfig::new("https://api.checkr.com"),
            insurance: ProviderConfig::new("https://api.insurance-verify.example"),
            payments: ProviderConfig::new("https://api.stripe.com"),
            storage: ProviderConfig::new("https://storage.example"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path of the libSQL database file.
    pub database_path: PathBuf,
    /// Port the HTTP trigger surface listens on.
    pub listen_port: u16,
    pub providers: ProvidersConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/driver-onboard.db"),
            listen_port: 8080,
            providers: ProvidersConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_path = std::env::var("DRIVER_ONBOARD_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);

        let listen_port = match std::env::var("DRIVER_ONBOARD_PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "DRIVER_ONBOARD_PORT".into(),
                message: format!("expected a port number, got {raw:?}"),
            })?,
            Err(_) => defaults.listen_port,
        };

        let d = defaults.providers;
        let providers = ProvidersConfig {
            background_check: ProviderConfig::from_env(
                "BACKGROUND_CHECK",
                &d.background_check.base_url,
            )?,
            insurance: ProviderConfig::from_env("INSURANCE", &d.insurance.base_url)?,
            payments: ProviderConfig::from_env("PAYMENTS", &d.payments.base_url)?,
            storage: ProviderConfig::from_env("STORAGE", &d.storage.base_url)?,
        };

        Ok(Self {
            database_path,
            listen_port,
            providers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_config_strips_trailing_slash() {
        let config = ProviderConfig::new("https://api.example.com/");
        assert_eq!(config.base_url, "https://api.example.com");
        assert!(config.api_key.is_none());
        assert_eq!(config.timeout, DEFAULT_PROVIDER_TIMEOUT);
    }

    #[test]
    fn defaults_have_no_credentials() {
        let config = AppConfig::default();
        assert!(config.providers.background_check.api_key.is_none());
        assert!(config.providers.storage.api_key.is_none());
        assert_eq!(config.listen_port, 8080);
    }

    #[test]
    fn builder_sets_key_and_timeout() {
        let config = ProviderConfig::new("http://localhost")
            .with_api_key("sk_test")
            .with_timeout(Duration::from_secs(5));
        assert!(config.api_key.is_some());
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
