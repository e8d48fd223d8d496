//! HTTP artifact upload

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::artifacts::{ArtifactInfo, ArtifactProcessor, ProcessOutcome};
use crate::errors::ReleaseError;
use crate::filesys::file::File;
use crate::platforms::normalize_platform;
use crate::storage::settings::UploadSettings;
use crate::utils::{calc_exp_backoff, sha256_hash, CooldownOptions};

const MAX_ATTEMPTS: u32 = 3;

/// Uploads artifacts with a single `POST` of the raw bytes
pub struct HttpUploadProcessor {
    client: Client,
    url: String,
    token: Option<String>,
    platforms: Vec<String>,
    cooldown: CooldownOptions,
}

impl HttpUploadProcessor {
    pub fn new(settings: &UploadSettings) -> Result<Self, ReleaseError> {
        let client = Client::builder().timeout(Duration::from_secs(600)).build()?;

        Ok(Self {
            client,
            url: settings.url.clone(),
            token: settings.token.clone(),
            platforms: settings.platforms.iter().map(|p| normalize_platform(p)).collect(),
            cooldown: CooldownOptions::default(),
        })
    }

    async fn send(
        &self,
        artifact: &ArtifactInfo,
        name: &str,
        digest: &str,
        bytes: Vec<u8>,
    ) -> Result<StatusCode, ReleaseError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header("X-Config-Name", &artifact.config_name)
            .header("X-Platform", &artifact.platform)
            .header("X-Artifact-Name", name)
            .header("X-Artifact-Sha256", digest)
            .body(bytes);
        if let Some(token) = &self.token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        Ok(response.status())
    }
}

#[async_trait]
impl ArtifactProcessor for HttpUploadProcessor {
    fn name(&self) -> &str {
        "Upload"
    }

    fn supports(&self, platform: &str) -> bool {
        self.platforms.is_empty() || self.platforms.contains(&normalize_platform(platform))
    }

    async fn process(&self, artifact: &ArtifactInfo) -> Result<ProcessOutcome, ReleaseError> {
        let file = File::new(&artifact.artifact_path);
        let name = file.name().unwrap_or("artifact").to_string();
        let bytes = file.read_bytes().await?;
        let digest = sha256_hash(&bytes);
        debug!("Uploading {} ({} bytes, sha256 {})", name, bytes.len(), digest);

        let mut attempt = 0;
        loop {
            match self.send(artifact, &name, &digest, bytes.clone()).await {
                Ok(status) if status.is_success() => {
                    info!("Uploaded {} to {}", name, self.url);
                    return Ok(ProcessOutcome::succeeded(Some(json!({
                        "url": self.url,
                        "sha256": digest,
                        "status": status.as_u16(),
                    }))));
                }
                // Client errors will not improve on retry
                Ok(status) if status.is_client_error() => {
                    error!("Upload of {} rejected: {}", name, status);
                    return Ok(ProcessOutcome::failed(status.to_string()));
                }
                Ok(status) if attempt + 1 >= MAX_ATTEMPTS => {
                    error!("Upload of {} failed: {}", name, status);
                    return Ok(ProcessOutcome::failed(status.to_string()));
                }
                Err(e) if attempt + 1 >= MAX_ATTEMPTS => return Err(e),
                Ok(status) => warn!("Upload of {} failed with {}, retrying", name, status),
                Err(e) => warn!("Upload of {} failed: {}, retrying", name, e),
            }

            tokio::time::sleep(calc_exp_backoff(&self.cooldown, attempt)).await;
            attempt += 1;
        }
    }
}
