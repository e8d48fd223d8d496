//! End-to-end deployment through the stock iOS builder, driven by a fake
//! toolchain script.
#![cfg(unix)]

use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use appship::artifacts::{ArtifactInfo, ArtifactProcessor, ProcessOutcome};
use appship::deploy::fsm::PairState;
use appship::deploy::DeploymentEngine;
use appship::errors::ReleaseError;
use appship::events::handlers::JsonLinesHandler;
use appship::models::DeploymentRequest;
use appship::platforms::BuilderRegistry;
use async_trait::async_trait;
use serde_json::{json, Value};

const FAKE_TOOLCHAIN: &str = r#"
echo "fake toolchain $*"
for arg in "$@"; do
  case "$arg" in
    /t:Build) build=1 ;;
    /p:Configuration=Broken) broken=1 ;;
    /p:IpaPackageDir=*) dir="${arg#/p:IpaPackageDir=}" ;;
  esac
done
if [ -n "$build" ] && [ -n "$broken" ]; then
  exit 4
fi
if [ -n "$dir" ]; then
  mkdir -p "${dir}bin"
  echo "ipa" > "${dir}bin/App.ipa"
fi
"#;

const PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
	<key>CFBundleIdentifier</key>
	<string>com.example.dev</string>
</dict>
</plist>
"#;

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct ArtifactCheck {
    seen: Arc<Mutex<Vec<(String, String, bool)>>>,
}

#[async_trait]
impl ArtifactProcessor for ArtifactCheck {
    fn name(&self) -> &str {
        "Check"
    }

    fn supports(&self, _platform: &str) -> bool {
        true
    }

    async fn process(&self, artifact: &ArtifactInfo) -> Result<ProcessOutcome, ReleaseError> {
        self.seen.lock().unwrap().push((
            artifact.artifact_path.display().to_string(),
            artifact.config.str("apiUrl").unwrap_or_default().to_string(),
            artifact.artifact_path.exists(),
        ));
        Ok(ProcessOutcome::succeeded(None))
    }
}

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn project(root: &Path, internal_configuration: &str) -> Value {
    write(&root.join("App.iOS/build.sh"), FAKE_TOOLCHAIN);
    write(&root.join("App.iOS/Info.plist"), PLIST);
    write(
        &root.join("App.iOS/config_template.json"),
        r#"{ "apiUrl": { "type": "string", "key": "ApiUrl", "regex": "^https://" } }"#,
    );
    write(
        &root.join("configs/staging/ios/config.json"),
        r#"{ "name": "Example Staging", "bundleId": "com.example.staging", "versionName": "1.4.0", "apiUrl": "https://staging.example.com" }"#,
    );
    write(&root.join("configs/staging/ios/Resources/theme.json"), "{}");

    json!({
        "project": { "solutionPath": "App.sln" },
        "platforms": {
            "ios": {
                "projectPath": "App.iOS",
                "projectFile": "build.sh",
                "toolchain": "sh",
                "internalConfiguration": internal_configuration
            }
        }
    })
}

#[tokio::test]
async fn test_ios_pipeline_installs_builds_and_processes() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let settings = project(root, "AdHoc");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let buffer = SharedBuffer::default();
    let mut engine = DeploymentEngine::new(settings, root, BuilderRegistry::default());
    engine.use_event_handler(Arc::new(JsonLinesHandler::with_writer(buffer.clone())));
    engine.use_artifact_processor(Arc::new(ArtifactCheck { seen: seen.clone() }));

    let job = engine
        .deploy(&DeploymentRequest::new(["staging"], ["ios"]).version("1.4.7"))
        .await
        .unwrap();

    let pair = job.pair("staging", "ios").unwrap();
    assert_eq!(pair.status(), PairState::Successful, "{:?}", pair.error());

    let artifact = root.join("output/staging/ios/App.ipa");
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(
            artifact.display().to_string(),
            "https://staging.example.com".to_string(),
            true
        )]
    );

    let plist = std::fs::read_to_string(root.join("App.iOS/Info.plist")).unwrap();
    assert!(plist.contains("<string>com.example.staging</string>"));
    assert!(plist.contains("<key>CFBundleVersion</key>\n\t<string>1.4.7</string>"));
    assert!(plist.contains("<key>CFBundleShortVersionString</key>\n\t<string>1.4.0</string>"));
    assert!(plist.contains("<key>CFBundleDisplayName</key>\n\t<string>Example Staging</string>"));
    assert!(plist.contains("<key>ApiUrl</key>"));
    assert!(root.join("App.iOS/Resources/theme.json").exists());

    let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    let names: Vec<String> = output
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).unwrap()["data"]["event"].to_string())
        .collect();
    assert_eq!(names.first().map(String::as_str), Some("\"willStartJob\""));
    assert_eq!(names.last().map(String::as_str), Some("\"didFinishJob\""));
    assert!(names.contains(&"\"didProcessArtifact\"".to_string()));
}

#[tokio::test]
async fn test_ios_pipeline_reports_toolchain_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let settings = project(root, "Broken");

    let engine = DeploymentEngine::new(settings, root, BuilderRegistry::default());
    let job = engine
        .deploy(&DeploymentRequest::new(["staging"], ["ios"]))
        .await
        .unwrap();

    let pair = job.pair("staging", "ios").unwrap();
    assert_eq!(pair.status(), PairState::Failed);
    assert_eq!(pair.failed_on(), Some("Build Project"));
    assert_eq!(
        pair.error(),
        Some("Build error: Package step exited with code 4")
    );
    assert!(!root.join("output/staging/ios").exists());
}

#[tokio::test]
async fn test_ios_pipeline_rejects_invalid_config() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let settings = project(root, "AdHoc");
    write(
        &root.join("configs/staging/ios/config.json"),
        r#"{ "apiUrl": "http://insecure.example.com" }"#,
    );

    let engine = DeploymentEngine::new(settings, root, BuilderRegistry::default());
    let job = engine
        .deploy(&DeploymentRequest::new(["staging"], ["ios"]))
        .await
        .unwrap();

    let pair = job.pair("staging", "ios").unwrap();
    assert_eq!(pair.failed_on(), Some("Install Config"));
    assert!(pair
        .error()
        .unwrap()
        .contains("staging.apiUrl: value does not match pattern '^https://'"));

    let plist = std::fs::read_to_string(root.join("App.iOS/Info.plist")).unwrap();
    assert_eq!(plist, PLIST);
}
