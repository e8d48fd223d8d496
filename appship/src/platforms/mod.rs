//! Platform builders
//!
//! Every platform adapter implements [`PlatformBuilder`]: install an
//! environment's config into the native project, then build and stage an
//! artifact. Adapters are created by a [`BuilderFactory`], looked up by
//! platform identifier in the [`BuilderRegistry`], which validates the
//! platform's settings section before handing it to the factory.

pub mod android;
pub mod install;
pub mod ios;
pub mod manifest;
pub mod toolchain;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use config_eval::{evaluate, NormalizedConfig, Property, Schema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::ReleaseError;
use crate::storage::layout::{ConfigInfo, ProjectLayout};
use crate::storage::settings::resolve_path;

/// Release channel a build targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseChannel {
    /// Public store submission
    Store,

    /// Internal distribution
    Internal,
}

impl ReleaseChannel {
    pub fn from_store_release(store_release: bool) -> Self {
        if store_release {
            ReleaseChannel::Store
        } else {
            ReleaseChannel::Internal
        }
    }
}

/// Caller-supplied values that win over the environment's config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigOverrides {
    pub version: Option<String>,
}

/// Result of installing an environment's config
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledConfig {
    pub installed_config_name: String,
    pub config_settings: NormalizedConfig,
}

/// Result of a build.
///
/// Toolchain failures are reported here rather than as errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutcome {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_artifact_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BuildOutcome {
    pub fn succeeded(artifact: PathBuf, stdout: String) -> Self {
        Self {
            success: true,
            output_artifact_path: Some(artifact),
            stdout: Some(stdout),
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>, stdout: Option<String>) -> Self {
        Self {
            success: false,
            output_artifact_path: None,
            stdout,
            message: Some(message.into()),
        }
    }
}

/// Platform builder trait
#[async_trait]
pub trait PlatformBuilder: Send + Sync {
    /// Platform identifier, lowercase
    fn platform(&self) -> &str;

    /// Install an environment's config into the native project
    async fn install_config(
        &self,
        info: &ConfigInfo,
        overrides: &ConfigOverrides,
    ) -> Result<InstalledConfig, ReleaseError>;

    /// Build the project and stage the artifact into `output_path`
    async fn build(
        &self,
        channel: ReleaseChannel,
        output_path: &Path,
    ) -> Result<BuildOutcome, ReleaseError>;
}

/// Creates builders for one platform
pub trait BuilderFactory: Send + Sync {
    /// Platform identifier, lowercase
    fn platform(&self) -> &str;

    /// Platform-specific settings, overlaid on [`common_settings_schema`]
    fn settings_schema(&self) -> Schema {
        Schema::new()
    }

    /// Create a builder from validated settings
    fn create(&self, settings: &PlatformSettings) -> Result<Arc<dyn PlatformBuilder>, ReleaseError>;
}

/// Settings every platform section accepts
pub fn common_settings_schema() -> Schema {
    Schema::new()
        .field("projectPath", Property::string().named("Native project directory"))
        .field("projectFile", Property::string().optional())
        .field("templatePath", Property::string().default("config_template.json"))
        .field("resourcesPath", Property::string().default("Resources"))
        .field("toolchain", Property::string().default("msbuild"))
}

/// Validated settings for one platform
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    pub platform: String,

    /// Absolute native project directory
    pub project_path: PathBuf,

    /// File handed to the toolchain; the solution unless overridden
    pub project_file: PathBuf,

    /// Absolute config template path
    pub template_path: PathBuf,

    /// Resource directory name, relative to both project and environment
    pub resources_dir: PathBuf,

    pub toolchain: String,

    /// Every normalized value, including platform-specific ones
    pub values: NormalizedConfig,
}

impl PlatformSettings {
    /// String setting by schema key
    pub fn str(&self, key: &str) -> Option<&str> {
        self.values.str(key)
    }

    /// Resolve a project-relative setting to an absolute path
    pub fn project_file_path(&self, key: &str) -> Option<PathBuf> {
        self.str(key)
            .map(|p| resolve_path(&self.project_path, Path::new(p)))
    }
}

/// Lowercase, trimmed platform identifier
pub fn normalize_platform(platform: &str) -> String {
    platform.trim().to_lowercase()
}

/// Registry of builder factories keyed by platform identifier
pub struct BuilderRegistry {
    factories: HashMap<String, Arc<dyn BuilderFactory>>,
}

impl BuilderRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory, replacing any previous one for the same platform
    pub fn register(&mut self, factory: Arc<dyn BuilderFactory>) {
        self.factories
            .insert(normalize_platform(factory.platform()), factory);
    }

    pub fn platforms(&self) -> Vec<&str> {
        let mut platforms: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        platforms.sort_unstable();
        platforms
    }

    fn factory(&self, platform: &str) -> Result<&Arc<dyn BuilderFactory>, ReleaseError> {
        self.factories
            .get(&normalize_platform(platform))
            .ok_or_else(|| ReleaseError::UnknownPlatform(platform.to_string()))
    }

    /// Evaluate `platforms.<platform>` of the settings document
    pub fn resolve_settings(
        &self,
        platform: &str,
        raw: &Value,
        layout: &ProjectLayout,
    ) -> Result<PlatformSettings, ReleaseError> {
        let platform = normalize_platform(platform);
        let factory = self.factory(&platform)?;
        let schema = common_settings_schema().merge(factory.settings_schema());

        let section = raw
            .get("platforms")
            .and_then(|p| p.get(&platform))
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        let values = evaluate(&schema, &section, &format!("platforms.{}", platform))
            .into_result()
            .map_err(|errors| ReleaseError::ValidationError {
                context: format!("{} platform settings", platform),
                errors,
            })?;

        let required = |key: &str| {
            values
                .str(key)
                .map(PathBuf::from)
                .ok_or_else(|| ReleaseError::ConfigError(format!("Missing platforms.{}.{}", platform, key)))
        };
        let project_path = resolve_path(layout.solution_root(), &required("projectPath")?);
        let project_file = match values.str("projectFile") {
            Some(file) => resolve_path(&project_path, Path::new(file)),
            None => layout.solution_path().to_path_buf(),
        };
        let template_path = resolve_path(&project_path, &required("templatePath")?);
        let resources_dir = required("resourcesPath")?;
        let toolchain = values.str("toolchain").unwrap_or("msbuild").to_string();

        debug!("Resolved {} settings: project at {}", platform, project_path.display());
        Ok(PlatformSettings {
            platform,
            project_path,
            project_file,
            template_path,
            resources_dir,
            toolchain,
            values,
        })
    }

    /// Create a builder for validated settings
    pub fn create(&self, settings: &PlatformSettings) -> Result<Arc<dyn PlatformBuilder>, ReleaseError> {
        self.factory(&settings.platform)?.create(settings)
    }
}

impl Default for BuilderRegistry {
    /// Registry with the Android and iOS builders
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(android::AndroidBuilderFactory));
        registry.register(Arc::new(ios::IosBuilderFactory));
        registry
    }
}
