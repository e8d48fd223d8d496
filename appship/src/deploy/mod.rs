//! Deployment module

pub mod engine;
pub mod fsm;

pub use engine::DeploymentEngine;
