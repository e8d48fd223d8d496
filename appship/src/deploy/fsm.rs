//! Finite state machine for a single (config, platform) pair

use serde::{Deserialize, Serialize};

pub const TASK_START: &str = "Start Config";
pub const TASK_INSTALL: &str = "Install Config";
pub const TASK_BUILD: &str = "Build Project";

/// Task name of an artifact processor's stage
pub fn process_artifact_task(processor: &str) -> String {
    format!("Process Artifact ({})", processor)
}

/// Pair state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairState {
    /// Not started yet
    Pending,

    /// Started, no stage entered yet
    Running,

    /// Installing the environment's config
    Installing,

    /// Building the native project
    Building,

    /// Running artifact processors
    ProcessingArtifacts,

    /// Every stage succeeded
    Successful,

    /// A stage failed
    Failed,

    /// The environment does not target this platform
    Escaped,
}

impl PairState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PairState::Successful | PairState::Failed | PairState::Escaped
        )
    }
}

/// Pair event
#[derive(Debug, Clone)]
pub enum PairEvent {
    /// Begin processing
    Start,

    /// Skip, the environment has no folder for this platform
    Escape,

    /// Enter the install stage
    Install,

    /// Enter the build stage
    Build,

    /// Enter a processor's stage
    ProcessArtifact(String),

    /// Every stage completed
    Succeed,

    /// The current stage failed
    Fail(String),
}

/// Progress and outcome of one pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairResult {
    status: PairState,

    /// Completed tasks, in order
    tasks: Vec<String>,

    #[serde(skip)]
    current_task: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    failed_on: Option<String>,
}

impl PairResult {
    /// Create a pair result in pending state
    pub fn new() -> Self {
        Self {
            status: PairState::Pending,
            tasks: Vec::new(),
            current_task: None,
            error: None,
            failed_on: None,
        }
    }

    pub fn status(&self) -> PairState {
        self.status
    }

    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    pub fn current_task(&self) -> Option<&str> {
        self.current_task.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn failed_on(&self) -> Option<&str> {
        self.failed_on.as_deref()
    }

    fn complete_task(&mut self) {
        if let Some(task) = self.current_task.take() {
            self.tasks.push(task);
        }
    }

    fn begin_task(&mut self, task: impl Into<String>) {
        self.complete_task();
        self.current_task = Some(task.into());
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: PairEvent) -> Result<(), String> {
        let new_state = match (&self.status, &event) {
            // From Pending
            (PairState::Pending, PairEvent::Start) => {
                self.current_task = Some(TASK_START.to_string());
                PairState::Running
            }
            (PairState::Pending, PairEvent::Escape) => PairState::Escaped,

            // Stage progression
            (PairState::Running, PairEvent::Install) => {
                self.begin_task(TASK_INSTALL);
                PairState::Installing
            }
            (PairState::Installing, PairEvent::Build) => {
                self.begin_task(TASK_BUILD);
                PairState::Building
            }
            (PairState::Building | PairState::ProcessingArtifacts, PairEvent::ProcessArtifact(name)) => {
                self.begin_task(process_artifact_task(name));
                PairState::ProcessingArtifacts
            }
            (PairState::Building | PairState::ProcessingArtifacts, PairEvent::Succeed) => {
                self.complete_task();
                PairState::Successful
            }

            // Failure in any active stage
            (
                PairState::Running
                | PairState::Installing
                | PairState::Building
                | PairState::ProcessingArtifacts,
                PairEvent::Fail(error),
            ) => {
                self.error = Some(error.clone());
                self.failed_on = self.current_task.take();
                PairState::Failed
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.status = new_state;
        Ok(())
    }
}

impl Default for PairResult {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_records_tasks() {
        let mut pair = PairResult::new();
        assert_eq!(pair.status(), PairState::Pending);

        pair.process(PairEvent::Start).unwrap();
        pair.process(PairEvent::Install).unwrap();
        assert_eq!(pair.current_task(), Some(TASK_INSTALL));

        pair.process(PairEvent::Build).unwrap();
        pair.process(PairEvent::ProcessArtifact("Upload".to_string())).unwrap();
        assert_eq!(pair.status(), PairState::ProcessingArtifacts);

        pair.process(PairEvent::Succeed).unwrap();
        assert_eq!(pair.status(), PairState::Successful);
        assert_eq!(
            pair.tasks(),
            &[TASK_START, TASK_INSTALL, TASK_BUILD, "Process Artifact (Upload)"]
        );
        assert_eq!(pair.current_task(), None);
    }

    #[test]
    fn test_failure_records_stage() {
        let mut pair = PairResult::new();
        pair.process(PairEvent::Start).unwrap();
        pair.process(PairEvent::Install).unwrap();
        pair.process(PairEvent::Build).unwrap();
        pair.process(PairEvent::Fail("exit code 1".to_string())).unwrap();

        assert_eq!(pair.status(), PairState::Failed);
        assert_eq!(pair.failed_on(), Some(TASK_BUILD));
        assert_eq!(pair.error(), Some("exit code 1"));
        assert_eq!(pair.tasks(), &[TASK_START, TASK_INSTALL]);
    }

    #[test]
    fn test_terminal_states_reject_events() {
        let mut pair = PairResult::new();
        pair.process(PairEvent::Escape).unwrap();
        assert!(pair.status().is_terminal());
        assert!(pair.process(PairEvent::Start).is_err());

        let mut pair = PairResult::new();
        assert!(pair.process(PairEvent::Build).is_err());
        assert_eq!(pair.status(), PairState::Pending);
    }
}
