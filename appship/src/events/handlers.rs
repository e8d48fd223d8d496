//! Stock event handlers

use std::io::{self, Write};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::errors::ReleaseError;
use crate::events::{DeployEvent, EventHandler};
use crate::models::{pair_label, DeploymentJob};

/// Logs every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventHandler;

#[async_trait]
impl EventHandler for LogEventHandler {
    async fn handle(&self, event: &DeployEvent, job: &DeploymentJob) -> Result<(), ReleaseError> {
        match event {
            DeployEvent::WillStartJob(p) => info!("Starting job {} with {} pair(s)", p.job_id, p.total),
            DeployEvent::WillStartConfig(p) => info!("Starting {}", pair_label(&p.config, &p.platform)),
            DeployEvent::DidEscapeConfig(p) => info!(
                "Escaped {}: no {} folder for this config",
                pair_label(&p.config, &p.platform),
                p.platform
            ),
            DeployEvent::WillInstallConfig(p) => debug!(
                "Installing {} from {}",
                pair_label(&p.pair.config, &p.pair.platform),
                p.config_info.config_path.display()
            ),
            DeployEvent::DidInstallConfig(p) => info!(
                "Installed config {} for {}",
                p.installed.installed_config_name, p.pair.platform
            ),
            DeployEvent::WillBuildProject(p) => info!(
                "Building {} into {}",
                pair_label(&p.pair.config, &p.pair.platform),
                p.output_path.display()
            ),
            DeployEvent::DidBuildProject(p) => match &p.outcome.output_artifact_path {
                Some(path) => info!("Built {}", path.display()),
                None => warn!(
                    "Build of {} failed: {}",
                    pair_label(&p.pair.config, &p.pair.platform),
                    p.outcome.message.as_deref().unwrap_or("no message")
                ),
            },
            DeployEvent::WillProcessArtifact(p) => {
                debug!("Running {} on {}", p.processor, p.artifact.artifact_path.display())
            }
            DeployEvent::DidProcessArtifact(p) => info!(
                "{} finished for {} (success: {})",
                p.processor,
                pair_label(&p.artifact.config_name, &p.artifact.platform),
                p.outcome.success
            ),
            DeployEvent::DidFinishConfig(p) => info!("Finished {}", pair_label(&p.config, &p.platform)),
            DeployEvent::DidFailConfig(p) => error!(
                "{} failed on {}: {}",
                pair_label(&p.pair.config, &p.pair.platform),
                p.failed_on,
                p.error
            ),
            DeployEvent::DidFinishJob(p) if p.successful => info!("{}", p.summary),
            DeployEvent::DidFinishJob(p) => error!("{}", p.summary),
        }
        debug!(
            "Job {}: {} remaining of {}",
            job.id, job.status.remaining, job.status.total
        );
        Ok(())
    }
}

/// Writes one JSON object per event (NDJSON)
pub struct JsonLinesHandler {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesHandler {
    /// Write to stdout
    pub fn stdout() -> Self {
        Self::with_writer(io::stdout())
    }

    /// Write to a custom writer
    pub fn with_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }
}

#[async_trait]
impl EventHandler for JsonLinesHandler {
    async fn handle(&self, event: &DeployEvent, job: &DeploymentJob) -> Result<(), ReleaseError> {
        let line = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "jobId": job.id,
            "lastUpdate": job.last_update,
            "status": job.status,
            "data": event,
        });

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| ReleaseError::Internal("Event writer lock poisoned".to_string()))?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PairPayload;
    use crate::models::DeploymentRequest;
    use std::sync::Arc;

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

    #[tokio::test]
    async fn test_json_lines_one_object_per_event() {
        let buffer = SharedBuffer::default();
        let handler = JsonLinesHandler::with_writer(buffer.clone());
        let job = DeploymentJob::new(&DeploymentRequest::new(["staging"], ["ios"]));

        handler
            .handle(&DeployEvent::WillStartConfig(PairPayload::new("staging", "ios")), &job)
            .await
            .unwrap();
        handler
            .handle(&DeployEvent::DidFinishConfig(PairPayload::new("staging", "ios")), &job)
            .await
            .unwrap();

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["data"]["event"], "willStartConfig");
        assert_eq!(lines[1]["data"]["platform"], "ios");
        assert_eq!(lines[1]["jobId"], job.id.as_str());
        assert_eq!(lines[1]["status"]["total"], 1);
        let timestamp = lines[0]["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[tokio::test]
    async fn test_log_handler_never_fails() {
        let job = DeploymentJob::new(&DeploymentRequest::new(["staging"], ["ios"]));
        let event = DeployEvent::DidEscapeConfig(PairPayload::new("staging", "ios"));

        tokio_test::assert_ok!(LogEventHandler.handle(&event, &job).await);
    }
}
