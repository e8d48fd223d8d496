//! Deployment lifecycle events
//!
//! The engine broadcasts a [`DeployEvent`] at every transition of a job and
//! its pairs. Handlers registered on the [`EventBus`] are awaited one after
//! another in registration order, so for a single job they observe events in
//! exactly the order the pairs were processed. A handler that fails or
//! panics is logged and skipped; it never affects the job.

pub mod handlers;

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use tracing::warn;

use crate::artifacts::{ArtifactInfo, ProcessOutcome};
use crate::errors::ReleaseError;
use crate::models::DeploymentJob;
use crate::platforms::{BuildOutcome, InstalledConfig, ReleaseChannel};
use crate::storage::layout::ConfigInfo;

/// Job-level payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub job_id: String,
    pub total: usize,
}

/// Identifies a pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairPayload {
    pub config: String,
    pub platform: String,
}

impl PairPayload {
    pub fn new(config: &str, platform: &str) -> Self {
        Self {
            config: config.to_string(),
            platform: platform.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallPayload {
    #[serde(flatten)]
    pub pair: PairPayload,
    pub config_info: ConfigInfo,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPayload {
    #[serde(flatten)]
    pub pair: PairPayload,
    pub installed: InstalledConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPayload {
    #[serde(flatten)]
    pub pair: PairPayload,
    pub channel: ReleaseChannel,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltPayload {
    #[serde(flatten)]
    pub pair: PairPayload,
    pub outcome: BuildOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPayload {
    pub processor: String,
    pub artifact: ArtifactInfo,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedPayload {
    pub processor: String,
    pub artifact: ArtifactInfo,
    pub outcome: ProcessOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailurePayload {
    #[serde(flatten)]
    pub pair: PairPayload,
    pub failed_on: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedPayload {
    pub job_id: String,
    pub successful: bool,
    pub summary: String,
}

/// A lifecycle event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum DeployEvent {
    WillStartJob(JobPayload),
    WillStartConfig(PairPayload),
    DidEscapeConfig(PairPayload),
    WillInstallConfig(InstallPayload),
    DidInstallConfig(InstalledPayload),
    WillBuildProject(BuildPayload),
    DidBuildProject(BuiltPayload),
    WillProcessArtifact(ArtifactPayload),
    DidProcessArtifact(ProcessedPayload),
    DidFinishConfig(PairPayload),
    DidFailConfig(FailurePayload),
    DidFinishJob(FinishedPayload),
}

impl DeployEvent {
    /// Event name as it appears in the serialized form
    pub fn name(&self) -> &'static str {
        match self {
            DeployEvent::WillStartJob(_) => "willStartJob",
            DeployEvent::WillStartConfig(_) => "willStartConfig",
            DeployEvent::DidEscapeConfig(_) => "didEscapeConfig",
            DeployEvent::WillInstallConfig(_) => "willInstallConfig",
            DeployEvent::DidInstallConfig(_) => "didInstallConfig",
            DeployEvent::WillBuildProject(_) => "willBuildProject",
            DeployEvent::DidBuildProject(_) => "didBuildProject",
            DeployEvent::WillProcessArtifact(_) => "willProcessArtifact",
            DeployEvent::DidProcessArtifact(_) => "didProcessArtifact",
            DeployEvent::DidFinishConfig(_) => "didFinishConfig",
            DeployEvent::DidFailConfig(_) => "didFailConfig",
            DeployEvent::DidFinishJob(_) => "didFinishJob",
        }
    }
}

/// Observer of deployment events
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DeployEvent, job: &DeploymentJob) -> Result<(), ReleaseError>;
}

/// Ordered list of event handlers
#[derive(Default, Clone)]
pub struct EventBus {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Number of subscribed handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Deliver `event` to every handler in registration order
    pub async fn emit(&self, event: DeployEvent, job: &DeploymentJob) {
        for (index, handler) in self.handlers.iter().enumerate() {
            let delivery = AssertUnwindSafe(handler.handle(&event, job)).catch_unwind().await;
            match delivery {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Event handler {} failed on {}: {}", index, event.name(), e),
                Err(_) => warn!("Event handler {} panicked on {}", index, event.name()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeploymentRequest;
    use std::sync::Mutex;

    struct Recorder {
        id: usize,
        seen: Arc<Mutex<Vec<(usize, &'static str)>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &DeployEvent, _job: &DeploymentJob) -> Result<(), ReleaseError> {
            self.seen.lock().unwrap().push((self.id, event.name()));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        async fn handle(&self, _event: &DeployEvent, _job: &DeploymentJob) -> Result<(), ReleaseError> {
            Err(ReleaseError::Internal("observer down".to_string()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl EventHandler for Panicking {
        async fn handle(&self, _event: &DeployEvent, _job: &DeploymentJob) -> Result<(), ReleaseError> {
            panic!("observer bug");
        }
    }

    #[tokio::test]
    async fn test_emit_in_registration_order_despite_faults() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.subscribe(Arc::new(Recorder { id: 1, seen: seen.clone() }));
        bus.subscribe(Arc::new(Failing));
        bus.subscribe(Arc::new(Panicking));
        bus.subscribe(Arc::new(Recorder { id: 2, seen: seen.clone() }));

        let job = DeploymentJob::new(&DeploymentRequest::new(["staging"], ["ios"]));
        bus.emit(DeployEvent::WillStartConfig(PairPayload::new("staging", "ios")), &job)
            .await;
        bus.emit(DeployEvent::DidEscapeConfig(PairPayload::new("staging", "ios")), &job)
            .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (1, "willStartConfig"),
                (2, "willStartConfig"),
                (1, "didEscapeConfig"),
                (2, "didEscapeConfig"),
            ]
        );
    }

    #[test]
    fn test_event_serializes_with_name_tag() {
        let event = DeployEvent::DidFailConfig(FailurePayload {
            pair: PairPayload::new("staging", "android"),
            failed_on: "Build Project".to_string(),
            error: "exit code 1".to_string(),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], event.name());
        assert_eq!(value["config"], "staging");
        assert_eq!(value["failedOn"], "Build Project");
    }
}
