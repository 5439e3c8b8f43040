//! Layered settings source for limit configuration.
//!
//! Limit groups are plain key-value entries; the key grammar lives in
//! [`crate::limits::keys`]. A missing key is a normal outcome, never an error.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, TurnstileError};
use crate::limits::model::LimitGroup;

/// Settings key holding a pre-provisioned identifier of the registered atomic
/// procedure, so it need not be re-registered on every process restart.
pub const SCRIPT_KEY: &str = "script:ratelimit";

/// Read-only view over a layered settings source.
pub trait SettingsStore: Send + Sync {
    /// The limit group configured under `key`, if any.
    fn limit_group(&self, key: &str) -> Option<LimitGroup>;

    /// The plain string configured under `key`, if any.
    fn string(&self, key: &str) -> Option<String>;
}

/// Settings backed by a layered [`config::Config`], so limits can come from
/// files, environment overlays, or anything else the config stack provides.
///
/// The merged root table is flattened once at construction; lookups use the
/// literal key text, so generated keys may contain any delimiter.
pub struct ConfigSettings {
    entries: HashMap<String, config::Value>,
}

impl ConfigSettings {
    /// Flatten an already-built configuration.
    pub fn new(config: config::Config) -> Result<Self> {
        let entries = config
            .try_deserialize()
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        Ok(Self { entries })
    }

    /// Build from a single configuration file.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        Self::new(config)
    }

    /// Build from a YAML string. Primarily useful for tests.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        Self::new(config)
    }
}

impl SettingsStore for ConfigSettings {
    fn limit_group(&self, key: &str) -> Option<LimitGroup> {
        let value = self.entries.get(key)?.clone();
        match LimitGroup::deserialize(value) {
            Ok(group) => Some(group),
            Err(e) => {
                debug!(key = %key, error = %e, "Ignoring unreadable limit group");
                None
            }
        }
    }

    fn string(&self, key: &str) -> Option<String> {
        self.entries.get(key)?.clone().into_string().ok()
    }
}

/// A fixed in-memory settings store.
#[derive(Debug, Default)]
pub struct StaticSettings {
    groups: HashMap<String, LimitGroup>,
    strings: HashMap<String, String>,
}

impl StaticSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a limit group under `key`.
    pub fn with_group(mut self, key: &str, group: LimitGroup) -> Self {
        self.groups.insert(key.to_string(), group);
        self
    }

    /// Add a plain string under `key`.
    pub fn with_string(mut self, key: &str, value: &str) -> Self {
        self.strings.insert(key.to_string(), value.to_string());
        self
    }
}

impl SettingsStore for StaticSettings {
    fn limit_group(&self, key: &str) -> Option<LimitGroup> {
        self.groups.get(key).cloned()
    }

    fn string(&self, key: &str) -> Option<String> {
        self.strings.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::model::LimitWindow;

    #[test]
    fn test_config_settings_reads_limit_group() {
        let yaml = r#"
"ss/lmt/checkout":
  windows:
    - limit: 2
      seconds: 60
"#;
        let settings = ConfigSettings::from_yaml(yaml).unwrap();

        let group = settings.limit_group("ss/lmt/checkout").unwrap();
        assert_eq!(group.windows, vec![LimitWindow::new(2, 60)]);

        assert!(settings.limit_group("ss/lmt/other").is_none());
    }

    #[test]
    fn test_config_settings_reads_string() {
        let yaml = r#"
"script:ratelimit": abc123
"#;
        let settings = ConfigSettings::from_yaml(yaml).unwrap();

        assert_eq!(settings.string(SCRIPT_KEY).as_deref(), Some("abc123"));
        assert!(settings.string("missing").is_none());
    }

    #[test]
    fn test_config_settings_ignores_non_group_values() {
        let yaml = r#"
"ss/lmt/checkout": not-a-group
"#;
        let settings = ConfigSettings::from_yaml(yaml).unwrap();

        assert!(settings.limit_group("ss/lmt/checkout").is_none());
    }

    #[test]
    fn test_static_settings() {
        let settings = StaticSettings::new()
            .with_group("ss/lmt/ping", LimitGroup::new(vec![LimitWindow::new(5, 10)]))
            .with_string(SCRIPT_KEY, "sha");

        assert!(settings.limit_group("ss/lmt/ping").is_some());
        assert!(settings.limit_group("ss/lmt/pong").is_none());
        assert_eq!(settings.string(SCRIPT_KEY).as_deref(), Some("sha"));
    }
}
