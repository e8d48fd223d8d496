//! Post-build artifact processors

pub mod upload;

use std::path::PathBuf;

use async_trait::async_trait;
use config_eval::NormalizedConfig;
use serde::Serialize;
use serde_json::Value;

use crate::errors::ReleaseError;

/// Everything a processor knows about a built artifact
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInfo {
    pub artifact_path: PathBuf,
    pub config: NormalizedConfig,
    pub config_name: String,
    pub platform: String,
}

/// Result of processing one artifact
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessOutcome {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Processor-specific data, e.g. a distribution URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ProcessOutcome {
    pub fn succeeded(details: Option<Value>) -> Self {
        Self {
            success: true,
            message: None,
            details,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            details: None,
        }
    }
}

/// A post-build step, e.g. an upload to a distribution service.
///
/// `process` must be idempotent: a job may be re-run for the same artifact.
#[async_trait]
pub trait ArtifactProcessor: Send + Sync {
    /// Name shown in the pair's task list
    fn name(&self) -> &str;

    /// Whether this processor handles artifacts of `platform`
    fn supports(&self, platform: &str) -> bool;

    async fn process(&self, artifact: &ArtifactInfo) -> Result<ProcessOutcome, ReleaseError>;
}
