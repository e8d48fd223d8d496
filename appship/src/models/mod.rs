//! Deployment models

pub mod job;
pub mod request;

pub use job::{pair_label, DeploymentJob, JobStatus};
pub use request::DeploymentRequest;
