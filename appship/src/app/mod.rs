//! Command line host

pub mod options;
pub mod run;
