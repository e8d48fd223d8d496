//! Deployment request

use serde::{Deserialize, Serialize};

use crate::errors::ReleaseError;
use crate::platforms::{normalize_platform, ConfigOverrides, ReleaseChannel};

/// What to deploy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Config names, in processing order; duplicates are processed again
    pub configs: Vec<String>,

    /// Platform identifiers, in processing order
    pub platforms: Vec<String>,

    /// Build for store submission rather than internal distribution
    #[serde(default)]
    pub store_release: bool,

    /// Version applied to every pair's installed config
    #[serde(default)]
    pub version: Option<String>,
}

impl DeploymentRequest {
    pub fn new<C, P>(configs: C, platforms: P) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            configs: configs.into_iter().map(Into::into).collect(),
            platforms: platforms.into_iter().map(Into::into).collect(),
            store_release: false,
            version: None,
        }
    }

    pub fn store_release(mut self, store_release: bool) -> Self {
        self.store_release = store_release;
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Trim names, lowercase platforms, and reject empty lists or names
    pub fn normalized(&self) -> Result<Self, ReleaseError> {
        let configs: Vec<String> = self.configs.iter().map(|c| c.trim().to_string()).collect();
        let platforms: Vec<String> = self.platforms.iter().map(|p| normalize_platform(p)).collect();

        if configs.is_empty() {
            return Err(ReleaseError::ConfigError("No configs requested".to_string()));
        }
        if platforms.is_empty() {
            return Err(ReleaseError::ConfigError("No platforms requested".to_string()));
        }
        if configs.iter().chain(platforms.iter()).any(String::is_empty) {
            return Err(ReleaseError::ConfigError(
                "Config and platform names must not be empty".to_string(),
            ));
        }

        let version = self
            .version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Ok(Self {
            configs,
            platforms,
            store_release: self.store_release,
            version,
        })
    }

    pub fn release_channel(&self) -> ReleaseChannel {
        ReleaseChannel::from_store_release(self.store_release)
    }

    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            version: self.version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_defaults() {
        let request: DeploymentRequest =
            serde_json::from_value(json!({ "configs": ["staging"], "platforms": ["ios"] })).unwrap();

        assert!(!request.store_release);
        assert_eq!(request.version, None);
        assert_eq!(request.release_channel(), ReleaseChannel::Internal);
    }

    #[test]
    fn test_normalized() {
        let request = DeploymentRequest::new([" staging ", "prod"], ["iOS", "Android"]).version(" ");
        let normalized = request.normalized().unwrap();

        assert_eq!(normalized.configs, vec!["staging", "prod"]);
        assert_eq!(normalized.platforms, vec!["ios", "android"]);
        assert_eq!(normalized.version, None);

        let err = DeploymentRequest::new(Vec::<String>::new(), ["ios"]).normalized().unwrap_err();
        assert!(err.is_setup_fault());
        let err = DeploymentRequest::new(["staging"], [""]).normalized().unwrap_err();
        assert!(err.is_setup_fault());
    }
}
