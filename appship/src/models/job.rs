//! Deployment job record

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::deploy::fsm::{PairEvent, PairResult, PairState};
use crate::errors::ReleaseError;
use crate::models::request::DeploymentRequest;
use crate::utils::generate_uuid;

/// Aggregate counters of a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub successful: usize,
    pub failed: usize,
    pub escaped: usize,
    pub remaining: usize,
    pub total: usize,

    /// `"config (platform)"` labels
    pub successful_configs: Vec<String>,
    pub failed_configs: Vec<String>,
    pub escaped_configs: Vec<String>,
}

/// A single run over every (config, platform) pair of a request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentJob {
    pub id: String,
    pub configs: Vec<String>,
    pub platforms: Vec<String>,
    pub store_release: bool,
    pub version: Option<String>,
    pub finished: bool,
    pub current_config: Option<String>,
    pub last_update: String,
    pub status: JobStatus,
    pub results: BTreeMap<String, BTreeMap<String, PairResult>>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Friendly label of a pair
pub fn pair_label(config: &str, platform: &str) -> String {
    format!("{} ({})", config, platform)
}

impl DeploymentJob {
    pub fn new(request: &DeploymentRequest) -> Self {
        let total = request.configs.len() * request.platforms.len();
        Self {
            id: generate_uuid(),
            configs: request.configs.clone(),
            platforms: request.platforms.clone(),
            store_release: request.store_release,
            version: request.version.clone(),
            finished: false,
            current_config: None,
            last_update: format!("Deployment queued: {} pair(s)", total),
            status: JobStatus {
                remaining: total,
                total,
                ..Default::default()
            },
            results: BTreeMap::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Every pair, configs outer and platforms inner
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.configs
            .iter()
            .flat_map(|config| {
                self.platforms
                    .iter()
                    .map(move |platform| (config.clone(), platform.clone()))
            })
            .collect()
    }

    pub fn pair(&self, config: &str, platform: &str) -> Option<&PairResult> {
        self.results.get(config).and_then(|r| r.get(platform))
    }

    /// Start tracking a pair with a fresh result
    pub fn begin_pair(&mut self, config: &str, platform: &str) {
        self.current_config = Some(config.to_string());
        self.last_update = format!("Processing {}", pair_label(config, platform));
        self.results
            .entry(config.to_string())
            .or_default()
            .insert(platform.to_string(), PairResult::new());
    }

    /// Apply an event to a pair's state machine
    pub fn transition(&mut self, config: &str, platform: &str, event: PairEvent) -> Result<(), ReleaseError> {
        let pair = self
            .results
            .get_mut(config)
            .and_then(|r| r.get_mut(platform))
            .ok_or_else(|| ReleaseError::Internal(format!("Untracked pair {}", pair_label(config, platform))))?;
        pair.process(event).map_err(ReleaseError::Internal)?;

        let label = pair_label(config, platform);
        self.last_update = match (pair.status(), pair.current_task()) {
            (PairState::Successful, _) => format!("{} succeeded", label),
            (PairState::Escaped, _) => format!("{} escaped", label),
            (PairState::Failed, _) => format!(
                "{} failed on {}",
                label,
                pair.failed_on().unwrap_or("an unknown task")
            ),
            (_, Some(task)) => format!("{}: {}", label, task),
            (_, None) => format!("Processing {}", label),
        };
        Ok(())
    }

    /// Count a pair that reached a terminal state
    pub fn record_outcome(&mut self, config: &str, platform: &str) -> Result<PairState, ReleaseError> {
        let state = self
            .pair(config, platform)
            .map(PairResult::status)
            .filter(PairState::is_terminal)
            .ok_or_else(|| {
                ReleaseError::Internal(format!(
                    "{} has not reached a terminal state",
                    pair_label(config, platform)
                ))
            })?;

        let label = pair_label(config, platform);
        match state {
            PairState::Successful => {
                self.status.successful += 1;
                self.status.successful_configs.push(label);
            }
            PairState::Failed => {
                self.status.failed += 1;
                self.status.failed_configs.push(label);
            }
            _ => {
                self.status.escaped += 1;
                self.status.escaped_configs.push(label);
            }
        }
        self.status.remaining = self.status.remaining.saturating_sub(1);
        Ok(state)
    }

    /// Mark the job finished and write the summary line
    pub fn finish(&mut self) {
        self.finished = true;
        self.current_config = None;
        self.finished_at = Some(Utc::now());
        self.last_update = if self.is_successful() {
            format!(
                "Deployment succeeded: {} successful, {} escaped",
                self.status.successful, self.status.escaped
            )
        } else {
            format!(
                "Deployment failed: {} of {} pair(s) failed ({})",
                self.status.failed,
                self.status.total,
                self.status.failed_configs.join(", ")
            )
        };
    }

    /// Whether no pair failed
    pub fn is_successful(&self) -> bool {
        self.status.failed == 0
    }
}
