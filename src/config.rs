//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};

use crate::limits::model::{LimitGroup, LimitWindow};

/// Main configuration for the Turnstile admission layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Config-key construction
    #[serde(default)]
    pub keys: KeyConfig,

    /// Rejection response configuration
    #[serde(default)]
    pub response: ResponseConfig,

    /// Built-in request-scope limits applied when nothing is configured
    #[serde(default)]
    pub defaults: DefaultLimitsConfig,

    /// Whether an unauthenticated caller is rejected outright.
    ///
    /// When `false`, unauthenticated requests proceed with an unidentified
    /// caller and only request-scope limits apply.
    #[serde(default = "default_require_authentication")]
    pub require_authentication: bool,
}

impl Default for TurnstileConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            keys: KeyConfig::default(),
            response: ResponseConfig::default(),
            defaults: DefaultLimitsConfig::default(),
            require_authentication: default_require_authentication(),
        }
    }
}

fn default_require_authentication() -> bool {
    true
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store connection URL
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Bound on the atomic procedure round trip, in milliseconds.
    /// A timed-out evaluation is treated as a store error and fails open.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_store_url() -> String {
    "redis://127.0.0.1/".to_string()
}

fn default_timeout_ms() -> u64 {
    500
}

/// Key construction configuration.
///
/// An explicit value passed to the key generator at construction time; there
/// is no process-global prefix or delimiter state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    /// Namespace prefix for every generated key
    #[serde(default = "default_key_prefix")]
    pub prefix: String,

    /// Delimiter between key segments
    #[serde(default = "default_key_delimiter")]
    pub delimiter: String,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            prefix: default_key_prefix(),
            delimiter: default_key_delimiter(),
        }
    }
}

fn default_key_prefix() -> String {
    "ss".to_string()
}

fn default_key_delimiter() -> String {
    "/".to_string()
}

/// Rejection response configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    /// Status code returned when a limit has been reached
    #[serde(default = "default_status_code")]
    pub status_code: u16,

    /// Message returned when a limit has been reached
    #[serde(default = "default_status_description")]
    pub description: String,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            status_code: default_status_code(),
            description: default_status_description(),
        }
    }
}

fn default_status_code() -> u16 {
    429
}

fn default_status_description() -> String {
    "Too many requests.".to_string()
}

/// Built-in request-scope limits used when no source configures any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultLimitsConfig {
    /// Set to `false` to disable the built-in fallback entirely
    #[serde(default = "default_defaults_enabled")]
    pub enabled: bool,

    /// Fallback windows
    #[serde(default = "default_windows")]
    pub windows: Vec<LimitWindow>,
}

impl Default for DefaultLimitsConfig {
    fn default() -> Self {
        Self {
            enabled: default_defaults_enabled(),
            windows: default_windows(),
        }
    }
}

impl DefaultLimitsConfig {
    /// The fallback group, or `None` when disabled.
    pub fn group(&self) -> Option<LimitGroup> {
        if self.enabled {
            Some(LimitGroup {
                windows: self.windows.clone(),
            })
        } else {
            None
        }
    }
}

fn default_defaults_enabled() -> bool {
    true
}

fn default_windows() -> Vec<LimitWindow> {
    vec![
        LimitWindow {
            limit: 10,
            seconds: 60,
        },
        LimitWindow {
            limit: 30,
            seconds: 3600,
        },
    ]
}

impl TurnstileConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: TurnstileConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::TurnstileError::Config(e.to_string()))?;
        Ok(config)
    }
}
