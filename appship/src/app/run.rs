//! Command execution

use std::io::Write;
use std::sync::Arc;

use colored::Colorize;
use tracing::{error, info};

use crate::app::options::{CliOptions, Command};
use crate::artifacts::upload::HttpUploadProcessor;
use crate::deploy::DeploymentEngine;
use crate::errors::ReleaseError;
use crate::events::handlers::{JsonLinesHandler, LogEventHandler};
use crate::models::{DeploymentJob, DeploymentRequest};
use crate::platforms::{BuilderRegistry, ConfigOverrides};
use crate::storage::settings::SettingsFile;
use crate::utils::version_info;

/// Process exit codes
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PAIR_FAILURES: i32 = 1;
pub const EXIT_SETUP_FAULT: i32 = 2;

/// Wire the stock handlers and processors onto an engine
pub fn build_engine(settings_file: &SettingsFile, json_events: bool) -> Result<DeploymentEngine, ReleaseError> {
    let mut engine = DeploymentEngine::new(
        settings_file.raw.clone(),
        settings_file.base_dir.clone(),
        BuilderRegistry::default(),
    );

    engine.use_event_handler(Arc::new(LogEventHandler));
    if json_events {
        engine.use_event_handler(Arc::new(JsonLinesHandler::stdout()));
    }
    if let Some(upload) = &settings_file.settings.upload {
        engine.use_artifact_processor(Arc::new(HttpUploadProcessor::new(upload)?));
    }
    Ok(engine)
}

/// Run a parsed command and return the process exit code
pub async fn run(options: &CliOptions, settings_file: &SettingsFile) -> i32 {
    let result = match &options.command {
        Command::Version => print_version().map(|_| EXIT_SUCCESS),
        Command::Deploy(request) => deploy(options, settings_file, request).await,
        Command::Install {
            config,
            platforms,
            version,
        } => install(settings_file, config, platforms, version.clone()).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("{} {}", "error:".red().bold(), e);
            EXIT_SETUP_FAULT
        }
    }
}

/// Print build version info as JSON; `--version` needs no settings file
pub fn print_version() -> Result<(), ReleaseError> {
    println!("{}", serde_json::to_string_pretty(&version_info())?);
    Ok(())
}

async fn deploy(
    options: &CliOptions,
    settings_file: &SettingsFile,
    request: &DeploymentRequest,
) -> Result<i32, ReleaseError> {
    let engine = build_engine(settings_file, options.json_events)?;
    let job = engine.deploy(request).await?;

    // stdout carries the event stream in JSON mode
    if options.json_events {
        print_summary(&job, &mut std::io::stderr())?;
    } else {
        print_summary(&job, &mut std::io::stdout())?;
    }

    Ok(if job.is_successful() {
        EXIT_SUCCESS
    } else {
        EXIT_PAIR_FAILURES
    })
}

async fn install(
    settings_file: &SettingsFile,
    config: &str,
    platforms: &[String],
    version: Option<String>,
) -> Result<i32, ReleaseError> {
    if platforms.is_empty() {
        return Err(ReleaseError::ConfigError(
            "--install needs --platforms=<platform,...>".to_string(),
        ));
    }

    let engine = build_engine(settings_file, false)?;
    let overrides = ConfigOverrides { version };
    let mut code = EXIT_SUCCESS;
    for platform in platforms {
        match engine.install_config(config, platform, &overrides).await {
            Ok(installed) => {
                info!("Installed {} for {}", installed.installed_config_name, platform);
                println!(
                    "{} {} ({})",
                    "installed".green().bold(),
                    installed.installed_config_name,
                    platform
                );
            }
            Err(e) if e.is_setup_fault() => return Err(e),
            Err(e) => {
                error!("Install of {} for {} failed: {}", config, platform, e);
                println!("{} {} ({}): {}", "failed".red().bold(), config, platform, e);
                code = EXIT_PAIR_FAILURES;
            }
        }
    }
    Ok(code)
}

/// Print a human-readable summary of a finished job
pub fn print_summary(job: &DeploymentJob, out: &mut dyn Write) -> Result<(), ReleaseError> {
    writeln!(out, "{}", "Deployment summary".bold().cyan())?;
    for label in &job.status.successful_configs {
        writeln!(out, "  {} {}", "✔".green(), label)?;
    }
    for label in &job.status.escaped_configs {
        writeln!(out, "  {} {} {}", "○".yellow(), label, "(escaped)".dimmed())?;
    }
    for (config, platforms) in &job.results {
        for (platform, pair) in platforms {
            if let (Some(task), Some(error)) = (pair.failed_on(), pair.error()) {
                writeln!(out, "  {} {} ({}) on {}: {}", "✘".red(), config, platform, task, error)?;
            }
        }
    }

    let status = &job.status;
    let line = format!(
        "{} successful, {} failed, {} escaped of {}",
        status.successful, status.failed, status.escaped, status.total
    );
    if job.is_successful() {
        writeln!(out, "{}", line.green().bold())?;
    } else {
        writeln!(out, "{}", line.red().bold())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::fsm::PairEvent;
    use serde_json::json;

    #[test]
    fn test_summary_lists_each_outcome() {
        colored::control::set_override(false);
        let mut job = DeploymentJob::new(&DeploymentRequest::new(["staging"], ["ios", "android"]));
        job.begin_pair("staging", "ios");
        job.transition("staging", "ios", PairEvent::Start).unwrap();
        job.transition("staging", "ios", PairEvent::Install).unwrap();
        job.transition("staging", "ios", PairEvent::Fail("bad template".into())).unwrap();
        job.record_outcome("staging", "ios").unwrap();
        job.begin_pair("staging", "android");
        job.transition("staging", "android", PairEvent::Escape).unwrap();
        job.record_outcome("staging", "android").unwrap();
        job.finish();

        let mut out = Vec::new();
        print_summary(&job, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("staging (android) (escaped)"));
        assert!(text.contains("staging (ios) on Install Config: bad template"));
        assert!(text.contains("0 successful, 1 failed, 1 escaped of 2"));
    }

    #[tokio::test]
    async fn test_version_command_skips_the_engine() {
        let settings_file =
            SettingsFile::from_value(json!({ "project": { "solutionPath": "App.sln" } }), "/work").unwrap();
        let options = CliOptions {
            command: Command::Version,
            settings_path: "appship.json".into(),
            json_events: false,
        };

        assert_eq!(run(&options, &settings_file).await, EXIT_SUCCESS);
    }
}
