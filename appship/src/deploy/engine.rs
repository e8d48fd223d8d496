//! Deployment job engine

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::artifacts::{ArtifactInfo, ArtifactProcessor};
use crate::deploy::fsm::PairEvent;
use crate::errors::ReleaseError;
use crate::events::{
    ArtifactPayload, BuildPayload, BuiltPayload, DeployEvent, EventBus, EventHandler, FailurePayload,
    FinishedPayload, InstallPayload, InstalledPayload, JobPayload, PairPayload, ProcessedPayload,
};
use crate::models::{DeploymentJob, DeploymentRequest};
use crate::platforms::{
    normalize_platform, BuildOutcome, BuilderRegistry, ConfigOverrides, InstalledConfig, PlatformSettings,
    ReleaseChannel,
};
use crate::storage::layout::ProjectLayout;
use crate::storage::settings::ProjectSettings;

/// Drives (config, platform) pairs through install, build, and artifact
/// processing.
///
/// Pairs run strictly one after another. A failing pair is recorded on the
/// job and the next pair starts; only settings faults found before the first
/// pair are returned as errors.
pub struct DeploymentEngine {
    raw: Value,
    base_dir: PathBuf,
    registry: BuilderRegistry,
    events: EventBus,
    processors: Vec<Arc<dyn ArtifactProcessor>>,
}

/// Per-job inputs shared by every pair
struct JobContext<'a> {
    layout: &'a ProjectLayout,
    settings: &'a HashMap<String, PlatformSettings>,
    channel: ReleaseChannel,
    overrides: &'a ConfigOverrides,
}

impl DeploymentEngine {
    /// Create an engine over a settings document
    pub fn new(raw: Value, base_dir: impl Into<PathBuf>, registry: BuilderRegistry) -> Self {
        Self {
            raw,
            base_dir: base_dir.into(),
            registry,
            events: EventBus::new(),
            processors: Vec::new(),
        }
    }

    /// Register an event handler; handlers are notified in registration order
    pub fn use_event_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.events.subscribe(handler);
    }

    /// Register an artifact processor; processors run in registration order
    pub fn use_artifact_processor(&mut self, processor: Arc<dyn ArtifactProcessor>) {
        self.processors.push(processor);
    }

    /// Validate the project section and derive the layout
    pub fn layout(&self) -> Result<ProjectLayout, ReleaseError> {
        let project = ProjectSettings::resolve(&self.raw, &self.base_dir)?;
        Ok(ProjectLayout::new(&project))
    }

    /// Validate one platform's settings section
    pub fn platform_settings(&self, platform: &str) -> Result<PlatformSettings, ReleaseError> {
        let layout = self.layout()?;
        self.registry.resolve_settings(platform, &self.raw, &layout)
    }

    /// Install a single environment's config outside of a job
    pub async fn install_config(
        &self,
        config: &str,
        platform: &str,
        overrides: &ConfigOverrides,
    ) -> Result<InstalledConfig, ReleaseError> {
        let layout = self.layout()?;
        let settings = self.registry.resolve_settings(platform, &self.raw, &layout)?;
        let builder = self.registry.create(&settings)?;
        let info = layout.config_info(config.trim(), &settings);
        builder.install_config(&info, overrides).await
    }

    /// Build a single platform's project outside of a job
    pub async fn build(
        &self,
        channel: ReleaseChannel,
        platform: &str,
        output_path: &Path,
    ) -> Result<BuildOutcome, ReleaseError> {
        let settings = self.platform_settings(platform)?;
        let builder = self.registry.create(&settings)?;
        builder.build(channel, output_path).await
    }

    /// Run every pair of `request` and return the finished job.
    ///
    /// Returns `Err` only for faults found before any pair starts: an empty or
    /// malformed request, invalid project settings, an unknown platform, or
    /// invalid platform settings.
    pub async fn deploy(&self, request: &DeploymentRequest) -> Result<DeploymentJob, ReleaseError> {
        let request = request.normalized()?;
        let layout = self.layout()?;

        let mut settings = HashMap::new();
        for platform in &request.platforms {
            if !settings.contains_key(platform) {
                let resolved = self.registry.resolve_settings(platform, &self.raw, &layout)?;
                settings.insert(platform.clone(), resolved);
            }
        }

        let overrides = request.overrides();
        let context = JobContext {
            layout: &layout,
            settings: &settings,
            channel: request.release_channel(),
            overrides: &overrides,
        };

        let mut job = DeploymentJob::new(&request);
        info!("Deployment {} started: {}", job.id, job.last_update);
        debug!(
            "{} event handlers, {} artifact processors",
            self.events.handler_count(),
            self.processors.len()
        );
        self.events
            .emit(
                DeployEvent::WillStartJob(JobPayload {
                    job_id: job.id.clone(),
                    total: job.status.total,
                }),
                &job,
            )
            .await;

        for (config, platform) in job.pairs() {
            self.run_pair(&mut job, &context, &config, &platform).await?;
        }

        job.finish();
        info!("Deployment {} finished: {}", job.id, job.last_update);
        self.events
            .emit(
                DeployEvent::DidFinishJob(FinishedPayload {
                    job_id: job.id.clone(),
                    successful: job.is_successful(),
                    summary: job.last_update.clone(),
                }),
                &job,
            )
            .await;
        Ok(job)
    }

    async fn run_pair(
        &self,
        job: &mut DeploymentJob,
        context: &JobContext<'_>,
        config: &str,
        platform: &str,
    ) -> Result<(), ReleaseError> {
        job.begin_pair(config, platform);
        self.events
            .emit(DeployEvent::WillStartConfig(PairPayload::new(config, platform)), job)
            .await;

        if context.layout.is_escaped(config, platform).await {
            job.transition(config, platform, PairEvent::Escape)?;
            job.record_outcome(config, platform)?;
            self.events
                .emit(DeployEvent::DidEscapeConfig(PairPayload::new(config, platform)), job)
                .await;
            return Ok(());
        }

        job.transition(config, platform, PairEvent::Start)?;
        match self.run_stages(job, context, config, platform).await {
            Ok(()) => {
                job.transition(config, platform, PairEvent::Succeed)?;
                job.record_outcome(config, platform)?;
                self.events
                    .emit(DeployEvent::DidFinishConfig(PairPayload::new(config, platform)), job)
                    .await;
            }
            Err(e) => {
                warn!("{} ({}) failed: {}", config, platform, e);
                job.transition(config, platform, PairEvent::Fail(e.to_string()))?;
                job.record_outcome(config, platform)?;

                let failed_on = job
                    .pair(config, platform)
                    .and_then(|p| p.failed_on())
                    .unwrap_or_default()
                    .to_string();
                self.events
                    .emit(
                        DeployEvent::DidFailConfig(FailurePayload {
                            pair: PairPayload::new(config, platform),
                            failed_on,
                            error: e.to_string(),
                        }),
                        job,
                    )
                    .await;
            }
        }
        Ok(())
    }

    async fn run_stages(
        &self,
        job: &mut DeploymentJob,
        context: &JobContext<'_>,
        config: &str,
        platform: &str,
    ) -> Result<(), ReleaseError> {
        let pair = PairPayload::new(config, platform);
        let settings = context
            .settings
            .get(&normalize_platform(platform))
            .ok_or_else(|| ReleaseError::UnknownPlatform(platform.to_string()))?;

        // Install
        job.transition(config, platform, PairEvent::Install)?;
        let info = context.layout.config_info(config, settings);
        self.events
            .emit(
                DeployEvent::WillInstallConfig(InstallPayload {
                    pair: pair.clone(),
                    config_info: info.clone(),
                }),
                job,
            )
            .await;
        let builder = self.registry.create(settings)?;
        let installed = builder.install_config(&info, context.overrides).await?;
        self.events
            .emit(
                DeployEvent::DidInstallConfig(InstalledPayload {
                    pair: pair.clone(),
                    installed: installed.clone(),
                }),
                job,
            )
            .await;

        // Build
        job.transition(config, platform, PairEvent::Build)?;
        let output_path = context.layout.output_dir_for(config, platform);
        self.events
            .emit(
                DeployEvent::WillBuildProject(BuildPayload {
                    pair: pair.clone(),
                    channel: context.channel,
                    output_path: output_path.clone(),
                }),
                job,
            )
            .await;
        let outcome = builder.build(context.channel, &output_path).await?;
        self.events
            .emit(
                DeployEvent::DidBuildProject(BuiltPayload {
                    pair: pair.clone(),
                    outcome: outcome.clone(),
                }),
                job,
            )
            .await;
        if !outcome.success {
            return Err(ReleaseError::BuildError(
                outcome.message.unwrap_or_else(|| "Build failed".to_string()),
            ));
        }
        let artifact_path = outcome
            .output_artifact_path
            .ok_or_else(|| ReleaseError::BuildError("Build reported no artifact".to_string()))?;

        // Process artifacts
        let artifact = ArtifactInfo {
            artifact_path,
            config: installed.config_settings,
            config_name: config.to_string(),
            platform: platform.to_string(),
        };
        for processor in self.processors.iter().filter(|p| p.supports(platform)) {
            let name = processor.name().to_string();
            job.transition(config, platform, PairEvent::ProcessArtifact(name.clone()))?;
            self.events
                .emit(
                    DeployEvent::WillProcessArtifact(ArtifactPayload {
                        processor: name.clone(),
                        artifact: artifact.clone(),
                    }),
                    job,
                )
                .await;

            let outcome = processor
                .process(&artifact)
                .await
                .map_err(|e| ReleaseError::ArtifactError(format!("{}: {}", name, e)))?;
            self.events
                .emit(
                    DeployEvent::DidProcessArtifact(ProcessedPayload {
                        processor: name.clone(),
                        artifact: artifact.clone(),
                        outcome: outcome.clone(),
                    }),
                    job,
                )
                .await;
            if !outcome.success {
                return Err(ReleaseError::ArtifactError(format!(
                    "{}: {}",
                    name,
                    outcome.message.as_deref().unwrap_or("processing failed")
                )));
            }
        }

        debug!("{} ({}) passed every stage", config, platform);
        Ok(())
    }
}
