//! Settings file management
//!
//! A single JSON file carries both the ambient settings (logging, uploads),
//! which deserialize directly with serde, and the project and platform
//! sections, which are evaluated against schemas so that every invalid field
//! is reported at once.

use std::path::{Path, PathBuf};

use config_eval::{evaluate, Property, Schema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ReleaseError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Default settings file name
pub const DEFAULT_SETTINGS_FILE: &str = "appship.json";

/// Ambient settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub json_logs: bool,

    /// Directory for rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Artifact upload configuration
    #[serde(default)]
    pub upload: Option<UploadSettings>,
}

/// HTTP artifact upload settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Endpoint receiving the artifact bytes
    pub url: String,

    /// Bearer token
    #[serde(default)]
    pub token: Option<String>,

    /// Platforms to upload; empty means all
    #[serde(default)]
    pub platforms: Vec<String>,
}

/// A loaded settings file
#[derive(Debug, Clone)]
pub struct SettingsFile {
    /// Directory relative paths resolve against
    pub base_dir: PathBuf,

    /// Ambient settings
    pub settings: Settings,

    /// The raw document, for schema-evaluated sections
    pub raw: Value,
}

impl SettingsFile {
    /// Load and parse a settings file
    pub async fn load(path: &Path) -> Result<Self, ReleaseError> {
        let file = File::new(path);
        if !file.exists().await {
            return Err(ReleaseError::ConfigError(format!(
                "Settings file not found: {}",
                path.display()
            )));
        }

        let raw: Value = file.read_json().await?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_value(raw, base_dir)
    }

    /// Build from an already-parsed document
    pub fn from_value(raw: Value, base_dir: impl Into<PathBuf>) -> Result<Self, ReleaseError> {
        if !raw.is_object() {
            return Err(ReleaseError::ConfigError(
                "Settings must be a JSON object".to_string(),
            ));
        }
        let settings: Settings = serde_json::from_value(raw.clone())?;
        Ok(Self {
            base_dir: base_dir.into(),
            settings,
            raw,
        })
    }
}

/// Schema for the `project` section
pub fn project_schema() -> Schema {
    Schema::new().group(
        "project",
        Schema::new()
            .field("solutionPath", Property::string().named("Solution file"))
            .field("configsPath", Property::string().default("configs"))
            .field("outputPath", Property::string().default("output")),
    )
}

/// Validated project-level settings
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSettings {
    /// Absolute path to the solution file
    pub solution_path: PathBuf,

    /// Configs directory, relative to the solution root unless absolute
    pub configs_path: PathBuf,

    /// Output directory, relative to the solution root unless absolute
    pub output_path: PathBuf,
}

impl ProjectSettings {
    /// Evaluate the `project` section of a settings document
    pub fn resolve(raw: &Value, base_dir: &Path) -> Result<Self, ReleaseError> {
        let normalized = evaluate(&project_schema(), raw, "")
            .into_result()
            .map_err(|errors| ReleaseError::ValidationError {
                context: "project settings".to_string(),
                errors,
            })?;

        let field = |path: &str| {
            normalized
                .str(path)
                .map(PathBuf::from)
                .ok_or_else(|| ReleaseError::ConfigError(format!("Missing {}", path)))
        };

        Ok(Self {
            solution_path: resolve_path(base_dir, &field("project.solutionPath")?),
            configs_path: field("project.configsPath")?,
            output_path: field("project.outputPath")?,
        })
    }

    /// The solution root: parent directory of the solution file
    pub fn solution_root(&self) -> &Path {
        self.solution_path.parent().unwrap_or(Path::new("/"))
    }
}

/// Join `path` onto `base` unless it is already absolute
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
