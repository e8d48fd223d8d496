//! Project layout
//!
//! Resolves where per-environment configs live and where build outputs go:
//!
//! ```text
//! <solution root>/
//!   App.sln
//!   <configs>/<config>/<platform>/config.json
//!   <configs>/<config>/<platform>/Resources/...
//!   <output>/<config>/<platform>/<artifact>
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::filesys::dir::Dir;
use crate::platforms::PlatformSettings;
use crate::storage::settings::{resolve_path, ProjectSettings};

/// Per-environment config file name
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Resolved paths for one (config, platform) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInfo {
    pub config_name: String,
    pub platform: String,
    pub solution_path: PathBuf,
    pub project_path: PathBuf,
    pub template_path: PathBuf,
    /// The environment's folder for this platform
    pub config_path: PathBuf,
    /// Resource bundle shipped with the environment, if any
    pub config_resources_path: PathBuf,
    /// The project's resource directory the bundle is copied over
    pub project_resources_path: PathBuf,
}

impl ConfigInfo {
    pub fn config_file(&self) -> PathBuf {
        self.config_path.join(CONFIG_FILE_NAME)
    }
}

/// Project layout derived from validated project settings
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    solution_path: PathBuf,
    solution_root: PathBuf,
    configs_dir: PathBuf,
    output_dir: PathBuf,
}

impl ProjectLayout {
    pub fn new(project: &ProjectSettings) -> Self {
        let solution_root = project.solution_root().to_path_buf();
        Self {
            solution_path: project.solution_path.clone(),
            configs_dir: resolve_path(&solution_root, &project.configs_path),
            output_dir: resolve_path(&solution_root, &project.output_path),
            solution_root,
        }
    }

    pub fn solution_path(&self) -> &Path {
        &self.solution_path
    }

    pub fn solution_root(&self) -> &Path {
        &self.solution_root
    }

    pub fn configs_dir(&self) -> &Path {
        &self.configs_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Folder holding every platform of one environment
    pub fn config_dir(&self, config: &str) -> Dir {
        Dir::new(self.configs_dir.join(config))
    }

    /// Folder holding one environment for one platform
    pub fn platform_config_dir(&self, config: &str, platform: &str) -> Dir {
        self.config_dir(config).subdir(&platform.to_lowercase())
    }

    /// Build output directory for a pair
    pub fn output_dir_for(&self, config: &str, platform: &str) -> PathBuf {
        self.output_dir.join(config).join(platform.to_lowercase())
    }

    /// A pair is escaped when its environment exists but has no folder for
    /// this platform.
    pub async fn is_escaped(&self, config: &str, platform: &str) -> bool {
        self.config_dir(config).exists().await
            && !self.platform_config_dir(config, platform).exists().await
    }

    /// Resolve every path a builder needs for one pair
    pub fn config_info(&self, config: &str, settings: &PlatformSettings) -> ConfigInfo {
        let config_path = self
            .platform_config_dir(config, &settings.platform)
            .path()
            .to_path_buf();
        ConfigInfo {
            config_name: config.to_string(),
            platform: settings.platform.clone(),
            solution_path: self.solution_path.clone(),
            project_path: settings.project_path.clone(),
            template_path: settings.template_path.clone(),
            config_resources_path: config_path.join(&settings.resources_dir),
            project_resources_path: settings.project_path.join(&settings.resources_dir),
            config_path,
        }
    }
}
