//! Android builder

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use config_eval::{Property, Schema};
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::ReleaseError;
use crate::filesys::file::File;
use crate::platforms::install::{copy_resources, manifest_entries, prepare_config, ManifestKeys};
use crate::platforms::manifest::{scalar_text, set_element_attribute, upsert_resource_value};
use crate::platforms::toolchain::{ArtifactKind, BuildPlan};
use crate::platforms::{
    BuildOutcome, BuilderFactory, ConfigOverrides, InstalledConfig, PlatformBuilder, PlatformSettings,
    ReleaseChannel,
};
use crate::storage::layout::ConfigInfo;

pub const PLATFORM: &str = "android";

pub const MANIFEST_KEYS: ManifestKeys = ManifestKeys {
    name: "android:label",
    version: "android:versionCode",
    version_name: "android:versionName",
    bundle_id: "package",
};

/// Keys written as attributes of the root `<manifest>` element
const ROOT_ATTRIBUTES: [&str; 3] = ["package", "android:versionCode", "android:versionName"];

/// Keys written as attributes of `<application>`
const APPLICATION_ATTRIBUTES: [&str; 1] = ["android:label"];

/// Empty resource document for projects without a settings file
const EMPTY_SETTINGS: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<resources>\n</resources>\n";

fn is_manifest_key(key: &str) -> bool {
    ROOT_ATTRIBUTES.contains(&key) || APPLICATION_ATTRIBUTES.contains(&key)
}

pub struct AndroidBuilderFactory;

impl BuilderFactory for AndroidBuilderFactory {
    fn platform(&self) -> &str {
        PLATFORM
    }

    fn settings_schema(&self) -> Schema {
        Schema::new()
            .field("manifestPath", Property::string().default("Properties/AndroidManifest.xml"))
            .field("settingsPath", Property::string().default("Resources/values/settings.xml"))
            .field("storeConfiguration", Property::string().default("Release"))
            .field("internalConfiguration", Property::string().default("Release"))
    }

    fn create(&self, settings: &PlatformSettings) -> Result<Arc<dyn PlatformBuilder>, ReleaseError> {
        Ok(Arc::new(AndroidBuilder::from_settings(settings)?))
    }
}

/// Builds signed APKs with an MSBuild-compatible toolchain
#[derive(Debug, Clone)]
pub struct AndroidBuilder {
    manifest_path: PathBuf,
    settings_path: PathBuf,
    project_file: PathBuf,
    project_path: PathBuf,
    toolchain: String,
    store_configuration: String,
    internal_configuration: String,
}

impl AndroidBuilder {
    pub fn from_settings(settings: &PlatformSettings) -> Result<Self, ReleaseError> {
        let manifest_path = settings
            .project_file_path("manifestPath")
            .ok_or_else(|| ReleaseError::ConfigError("Missing platforms.android.manifestPath".to_string()))?;
        let settings_path = settings
            .project_file_path("settingsPath")
            .ok_or_else(|| ReleaseError::ConfigError("Missing platforms.android.settingsPath".to_string()))?;
        let configuration = |key: &str| settings.str(key).unwrap_or("Release").to_string();

        Ok(Self {
            manifest_path,
            settings_path,
            project_file: settings.project_file.clone(),
            project_path: settings.project_path.clone(),
            toolchain: settings.toolchain.clone(),
            store_configuration: configuration("storeConfiguration"),
            internal_configuration: configuration("internalConfiguration"),
        })
    }

    fn configuration(&self, channel: ReleaseChannel) -> &str {
        match channel {
            ReleaseChannel::Store => &self.store_configuration,
            ReleaseChannel::Internal => &self.internal_configuration,
        }
    }

    fn plan(&self, channel: ReleaseChannel) -> BuildPlan {
        let project_file = self.project_file.display().to_string();
        let configuration = format!("/p:Configuration={}", self.configuration(channel));
        BuildPlan {
            toolchain: self.toolchain.clone(),
            working_dir: self.project_path.clone(),
            clean_args: vec![project_file.clone(), "/t:Clean".to_string(), configuration.clone()],
            package_args: vec![
                project_file,
                "/t:SignAndroidPackage".to_string(),
                configuration,
                "/p:OutputPath={out}".to_string(),
            ],
            artifact: ArtifactKind {
                extension: "apk",
                stem_suffix: Some("-Signed"),
            },
        }
    }
}

/// Write the default fields into an `AndroidManifest.xml` document
pub fn apply_manifest(xml: &str, entries: &[(String, Value)]) -> Result<String, ReleaseError> {
    let mut xml = xml.to_string();
    for (key, value) in entries {
        let Some(text) = scalar_text(value) else {
            continue;
        };
        if ROOT_ATTRIBUTES.contains(&key.as_str()) {
            xml = set_element_attribute(&xml, "manifest", key, &text)?;
        } else if APPLICATION_ATTRIBUTES.contains(&key.as_str()) {
            xml = set_element_attribute(&xml, "application", key, &text)?;
        }
    }
    Ok(xml)
}

/// Write app values into a `settings.xml` resource document
pub fn apply_settings(xml: &str, entries: &[(String, Value)]) -> Result<String, ReleaseError> {
    entries
        .iter()
        .try_fold(xml.to_string(), |xml, (key, value)| upsert_resource_value(&xml, key, value))
}

impl AndroidBuilder {
    async fn write_manifest(&self, entries: &[(String, Value)]) -> Result<(), ReleaseError> {
        let manifest = File::new(&self.manifest_path);
        let context = manifest.path().display();
        let xml = manifest
            .read_string()
            .await
            .map_err(|e| ReleaseError::install(&context, e))?;
        let updated = apply_manifest(&xml, entries).map_err(|e| ReleaseError::install(&context, e))?;
        manifest
            .write_atomic(&updated)
            .await
            .map_err(|e| ReleaseError::install(&context, e))?;
        debug!("Wrote {} entries to {}", entries.len(), context);
        Ok(())
    }

    async fn write_settings(&self, entries: &[(String, Value)]) -> Result<(), ReleaseError> {
        if entries.is_empty() {
            return Ok(());
        }

        let settings = File::new(&self.settings_path);
        let context = settings.path().display();
        let xml = if settings.exists().await {
            settings
                .read_string()
                .await
                .map_err(|e| ReleaseError::install(&context, e))?
        } else {
            debug!("Creating {}", context);
            EMPTY_SETTINGS.to_string()
        };
        let updated = apply_settings(&xml, entries).map_err(|e| ReleaseError::install(&context, e))?;
        if let Some(parent) = settings.path().parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ReleaseError::install(&context, e))?;
        }
        settings
            .write_atomic(&updated)
            .await
            .map_err(|e| ReleaseError::install(&context, e))?;
        debug!("Wrote {} entries to {}", entries.len(), context);
        Ok(())
    }
}

#[async_trait]
impl PlatformBuilder for AndroidBuilder {
    fn platform(&self) -> &str {
        PLATFORM
    }

    async fn install_config(
        &self,
        info: &ConfigInfo,
        overrides: &ConfigOverrides,
    ) -> Result<InstalledConfig, ReleaseError> {
        let config = prepare_config(info, overrides, &MANIFEST_KEYS).await?;

        let (manifest, resources): (Vec<_>, Vec<_>) = manifest_entries(&config)
            .into_iter()
            .partition(|(key, _)| is_manifest_key(key));
        self.write_manifest(&manifest).await?;
        self.write_settings(&resources).await?;

        copy_resources(info).await?;

        info!("Installed {} into the Android project", info.config_name);
        Ok(InstalledConfig {
            installed_config_name: info.config_name.clone(),
            config_settings: config,
        })
    }

    async fn build(&self, channel: ReleaseChannel, output_path: &Path) -> Result<BuildOutcome, ReleaseError> {
        info!(
            "Building Android package ({} configuration)",
            self.configuration(channel)
        );
        self.plan(channel).execute(output_path).await
    }
}
