//! Configuration for permission records
//!
//! Holds the doctype names the record layer writes into source ids and
//! built-in permission sets, and the default lifetime of share codes.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when building a [`PermissionConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required name was left empty
    #[error("{field} must not be empty")]
    EmptyField {
        /// Name of the offending field
        field: &'static str,
    },

    /// A doctype or id that cannot appear in a scope string
    #[error("{field} contains whitespace or ':' ({value:?})")]
    ReservedCharacter {
        /// Name of the offending field
        field: &'static str,
        /// The rejected value
        value: String,
    },

    /// A zero share code lifetime would expire codes on creation
    #[error("share code lifetime must be greater than zero - omit it to disable expiry")]
    ZeroLifetime,

    /// The configuration document is not valid JSON
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings for the record layer.
///
/// # Example
///
/// ```rust
/// use permset_core::PermissionConfig;
/// use std::time::Duration;
///
/// let config = PermissionConfig::builder()
///     .apps_doctype("io.example.apps")
///     .share_code_lifetime(Duration::from_secs(7 * 24 * 3600))
///     .build()
///     .unwrap();
///
/// assert_eq!(config.application_source_id("notes"), "io.example.apps/notes");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// Doctype prefix of application source ids (`<apps_doctype>/<slug>`).
    pub apps_doctype: String,

    /// Doctype granted to register tokens.
    pub settings_doctype: String,

    /// The single settings document register tokens may read.
    pub instance_settings_id: String,

    /// Lifetime given to derived (share) records, in seconds. `None` means
    /// they never expire.
    pub share_code_ttl_secs: Option<u64>,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            apps_doctype: "io.cozy.apps".to_string(),
            settings_doctype: "io.cozy.settings".to_string(),
            instance_settings_id: "io.cozy.settings.instance".to_string(),
            share_code_ttl_secs: None,
        }
    }
}

impl PermissionConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for constructing configuration
    pub fn builder() -> PermissionConfigBuilder {
        PermissionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Parse and validate a JSON configuration document.
    ///
    /// Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: PermissionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Source id recorded on every permission record of an application.
    pub fn application_source_id(&self, slug: &str) -> String {
        format!("{}/{}", self.apps_doctype, slug)
    }

    /// Lifetime of share records, if expiry is enabled.
    pub fn share_code_lifetime(&self) -> Option<Duration> {
        self.share_code_ttl_secs.map(Duration::from_secs)
    }

    /// Check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_name("apps_doctype", &self.apps_doctype)?;
        check_name("settings_doctype", &self.settings_doctype)?;
        check_name("instance_settings_id", &self.instance_settings_id)?;
        if self.share_code_ttl_secs == Some(0) {
            return Err(ConfigError::ZeroLifetime);
        }
        Ok(())
    }
}

fn check_name(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::EmptyField { field });
    }
    if value.chars().any(|c| c == ':' || c.is_whitespace()) {
        return Err(ConfigError::ReservedCharacter {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Builder for PermissionConfig
#[derive(Debug, Clone)]
pub struct PermissionConfigBuilder {
    config: PermissionConfig,
}

impl PermissionConfigBuilder {
    pub fn apps_doctype(mut self, doctype: impl Into<String>) -> Self {
        self.config.apps_doctype = doctype.into();
        self
    }

    pub fn settings_doctype(mut self, doctype: impl Into<String>) -> Self {
        self.config.settings_doctype = doctype.into();
        self
    }

    pub fn instance_settings_id(mut self, id: impl Into<String>) -> Self {
        self.config.instance_settings_id = id.into();
        self
    }

    /// Expire share records after `lifetime`. Sub-second precision is dropped.
    pub fn share_code_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.share_code_ttl_secs = Some(lifetime.as_secs());
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a name is empty or contains characters
    /// reserved by the scope encoding, or if the lifetime is zero.
    pub fn build(self) -> Result<PermissionConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PermissionConfig::default();
        assert_eq!(config.apps_doctype, "io.cozy.apps");
        assert_eq!(config.application_source_id("calendar"), "io.cozy.apps/calendar");
        assert!(config.share_code_lifetime().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_builder() {
        let config = PermissionConfig::builder()
            .settings_doctype("io.example.settings")
            .instance_settings_id("io.example.settings.main")
            .share_code_lifetime(Duration::from_secs(60))
            .build()
            .unwrap();

        assert_eq!(config.settings_doctype, "io.example.settings");
        assert_eq!(config.instance_settings_id, "io.example.settings.main");
        assert_eq!(config.share_code_lifetime(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_builder_rejects_empty_name() {
        let err = PermissionConfig::builder().apps_doctype("").build().unwrap_err();
        assert!(matches!(err, ConfigError::EmptyField { field: "apps_doctype" }));
    }

    #[test]
    fn test_builder_rejects_reserved_characters() {
        let err = PermissionConfig::builder()
            .settings_doctype("io.cozy:settings")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("settings_doctype"));
    }

    #[test]
    fn test_builder_rejects_zero_lifetime() {
        let err = PermissionConfig::builder()
            .share_code_lifetime(Duration::from_millis(500))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroLifetime));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = PermissionConfig::from_json(r#"{"share_code_ttl_secs": 3600}"#).unwrap();
        assert_eq!(config.apps_doctype, "io.cozy.apps");
        assert_eq!(config.share_code_lifetime(), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_from_json_validates() {
        assert!(matches!(
            PermissionConfig::from_json(r#"{"apps_doctype": ""}"#),
            Err(ConfigError::EmptyField { .. })
        ));
        assert!(matches!(
            PermissionConfig::from_json("not json"),
            Err(ConfigError::Json(_))
        ));
    }
}
