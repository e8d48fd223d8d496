//! iOS builder

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use config_eval::{Property, Schema};
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::ReleaseError;
use crate::filesys::file::File;
use crate::platforms::install::{copy_resources, manifest_entries, prepare_config, ManifestKeys};
use crate::platforms::manifest::upsert_plist_entry;
use crate::platforms::toolchain::{ArtifactKind, BuildPlan};
use crate::platforms::{
    BuildOutcome, BuilderFactory, ConfigOverrides, InstalledConfig, PlatformBuilder, PlatformSettings,
    ReleaseChannel,
};
use crate::storage::layout::ConfigInfo;

pub const PLATFORM: &str = "ios";

pub const MANIFEST_KEYS: ManifestKeys = ManifestKeys {
    name: "CFBundleDisplayName",
    version: "CFBundleVersion",
    version_name: "CFBundleShortVersionString",
    bundle_id: "CFBundleIdentifier",
};

pub struct IosBuilderFactory;

impl BuilderFactory for IosBuilderFactory {
    fn platform(&self) -> &str {
        PLATFORM
    }

    fn settings_schema(&self) -> Schema {
        Schema::new()
            .field("plistPath", Property::string().default("Info.plist"))
            .field("storeConfiguration", Property::string().default("AppStore"))
            .field("internalConfiguration", Property::string().default("AdHoc"))
    }

    fn create(&self, settings: &PlatformSettings) -> Result<Arc<dyn PlatformBuilder>, ReleaseError> {
        Ok(Arc::new(IosBuilder::from_settings(settings)?))
    }
}

/// Builds IPAs with an MSBuild-compatible toolchain
#[derive(Debug, Clone)]
pub struct IosBuilder {
    plist_path: PathBuf,
    project_file: PathBuf,
    project_path: PathBuf,
    toolchain: String,
    store_configuration: String,
    internal_configuration: String,
}

impl IosBuilder {
    pub fn from_settings(settings: &PlatformSettings) -> Result<Self, ReleaseError> {
        let plist_path = settings
            .project_file_path("plistPath")
            .ok_or_else(|| ReleaseError::ConfigError("Missing platforms.ios.plistPath".to_string()))?;

        Ok(Self {
            plist_path,
            project_file: settings.project_file.clone(),
            project_path: settings.project_path.clone(),
            toolchain: settings.toolchain.clone(),
            store_configuration: settings.str("storeConfiguration").unwrap_or("AppStore").to_string(),
            internal_configuration: settings.str("internalConfiguration").unwrap_or("AdHoc").to_string(),
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
                "/t:Build".to_string(),
                configuration,
                "/p:Platform=iPhone".to_string(),
                "/p:BuildIpa=true".to_string(),
                "/p:IpaPackageDir={out}".to_string(),
            ],
            artifact: ArtifactKind {
                extension: "ipa",
                stem_suffix: None,
            },
        }
    }
}

/// Write every entry into an `Info.plist` document
pub fn apply_plist(xml: &str, entries: &[(String, Value)]) -> Result<String, ReleaseError> {
    entries
        .iter()
        .try_fold(xml.to_string(), |xml, (key, value)| upsert_plist_entry(&xml, key, value))
}

#[async_trait]
impl PlatformBuilder for IosBuilder {
    fn platform(&self) -> &str {
        PLATFORM
    }

    async fn install_config(
        &self,
        info: &ConfigInfo,
        overrides: &ConfigOverrides,
    ) -> Result<InstalledConfig, ReleaseError> {
        let config = prepare_config(info, overrides, &MANIFEST_KEYS).await?;

        let plist = File::new(&self.plist_path);
        let xml = plist
            .read_string()
            .await
            .map_err(|e| ReleaseError::install(plist.path().display(), e))?;
        let entries = manifest_entries(&config);
        let updated =
            apply_plist(&xml, &entries).map_err(|e| ReleaseError::install(plist.path().display(), e))?;
        plist
            .write_atomic(&updated)
            .await
            .map_err(|e| ReleaseError::install(plist.path().display(), e))?;
        debug!("Wrote {} entries to {}", entries.len(), plist.path().display());

        copy_resources(info).await?;

        info!("Installed {} into the iOS project", info.config_name);
        Ok(InstalledConfig {
            installed_config_name: info.config_name.clone(),
            config_settings: config,
        })
    }

    async fn build(&self, channel: ReleaseChannel, output_path: &Path) -> Result<BuildOutcome, ReleaseError> {
        info!("Building iOS package ({} configuration)", self.configuration(channel));
        self.plan(channel).execute(output_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
	<key>CFBundleIdentifier</key>
	<string>com.old</string>
</dict>
</plist>
"#;

    fn builder(root: &Path) -> IosBuilder {
        IosBuilder {
            plist_path: root.join("App.iOS/Info.plist"),
            project_file: root.join("App.sln"),
            project_path: root.join("App.iOS"),
            toolchain: "msbuild".to_string(),
            store_configuration: "AppStore".to_string(),
            internal_configuration: "AdHoc".to_string(),
        }
    }

    #[test]
    fn test_build_plan_packages_ipa() {
        let plan = builder(Path::new("/work")).plan(ReleaseChannel::Store);

        assert_eq!(plan.clean_args[2], "/p:Configuration=AppStore");
        assert!(plan.package_args.contains(&"/p:BuildIpa=true".to_string()));
        assert_eq!(plan.package_args.last().unwrap(), "/p:IpaPackageDir={out}");
        assert_eq!(plan.artifact.extension, "ipa");
    }

    #[tokio::test]
    async fn test_install_config_writes_plist_and_resources() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let info = ConfigInfo {
            config_name: "staging".to_string(),
            platform: PLATFORM.to_string(),
            solution_path: root.join("App.sln"),
            project_path: root.join("App.iOS"),
            template_path: root.join("App.iOS/config_template.json"),
            config_path: root.join("configs/staging/ios"),
            config_resources_path: root.join("configs/staging/ios/Resources"),
            project_resources_path: root.join("App.iOS/Resources"),
        };
        File::new(root.join("App.iOS/Info.plist")).write_string(PLIST).await.unwrap();
        File::new(&info.template_path)
            .write_string(r#"{ "apiUrl": { "type": "string", "key": "ApiUrl" } }"#)
            .await
            .unwrap();
        File::new(info.config_file())
            .write_string(
                r#"{ "bundleId": "com.example.staging", "versionName": "2.1.0", "apiUrl": "https://staging" }"#,
            )
            .await
            .unwrap();
        File::new(info.config_resources_path.join("icon.png"))
            .write_string("staging-icon")
            .await
            .unwrap();

        let installed = builder(root)
            .install_config(&info, &ConfigOverrides::default())
            .await
            .unwrap();

        assert_eq!(installed.installed_config_name, "staging");
        assert_eq!(installed.config_settings.str("version"), Some("2.1.0"));

        let plist = File::new(root.join("App.iOS/Info.plist")).read_string().await.unwrap();
        assert!(plist.contains("<string>com.example.staging</string>"));
        assert!(plist.contains("<key>CFBundleVersion</key>\n\t<string>2.1.0</string>"));
        assert!(plist.contains("<key>ApiUrl</key>\n\t<string>https://staging</string>"));
        assert!(!plist.contains("com.old"));

        let icon = File::new(root.join("App.iOS/Resources/icon.png")).read_string().await.unwrap();
        assert_eq!(icon, "staging-icon");
    }

    #[tokio::test]
    async fn test_plist_write_failure_names_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let info = ConfigInfo {
            config_name: "staging".to_string(),
            platform: PLATFORM.to_string(),
            solution_path: root.join("App.sln"),
            project_path: root.join("App.iOS"),
            template_path: root.join("App.iOS/config_template.json"),
            config_path: root.join("configs/staging/ios"),
            config_resources_path: root.join("configs/staging/ios/Resources"),
            project_resources_path: root.join("App.iOS/Resources"),
        };
        File::new(root.join("App.iOS/Info.plist")).write_string(PLIST).await.unwrap();
        File::new(info.config_file())
            .write_string(r#"{ "bundleId": "com.example.staging" }"#)
            .await
            .unwrap();
        // The atomic write's temporary sibling cannot be created over a directory
        std::fs::create_dir_all(root.join("App.iOS/Info.tmp")).unwrap();

        let err = tokio_test::assert_err!(
            builder(root)
                .install_config(&info, &ConfigOverrides::default())
                .await
        );

        assert!(matches!(err, ReleaseError::InstallError(_)));
        assert!(err.to_string().contains("Info.plist"));
    }
}
