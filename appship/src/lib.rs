//! appship library
//!
//! Release orchestration for native mobile projects: per-environment config
//! installation, native builds, and post-build artifact processing.

pub mod app;
pub mod artifacts;
pub mod deploy;
pub mod errors;
pub mod events;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod platforms;
pub mod storage;
pub mod utils;
