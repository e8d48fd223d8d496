//! appship - Entry Point
//!
//! Installs per-environment configs into native mobile projects, builds
//! them, and hands the artifacts to post-build processors.

use std::env;
use std::process::ExitCode;

use appship::app::options::{parse_args, CliOptions, Command};
use appship::app::run::{print_version, run, EXIT_SETUP_FAULT};
use appship::logs::{init_logging, LogOptions};
use appship::storage::settings::{resolve_path, SettingsFile};

use tracing::debug;

#[tokio::main]
async fn main() -> ExitCode {
    let cli_args = parse_args(env::args().skip(1));
    let options = match CliOptions::from_args(&cli_args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(EXIT_SETUP_FAULT as u8);
        }
    };

    // Print version and exit
    if options.command == Command::Version {
        return match print_version() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::from(EXIT_SETUP_FAULT as u8)
            }
        };
    }

    // Retrieve the settings file
    let settings_file = match SettingsFile::load(&options.settings_path).await {
        Ok(settings_file) => settings_file,
        Err(e) => {
            eprintln!("Unable to read settings file: {}", e);
            return ExitCode::from(EXIT_SETUP_FAULT as u8);
        }
    };

    // Initialize logging
    let settings = &settings_file.settings;
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings
            .log_dir
            .as_ref()
            .map(|dir| resolve_path(&settings_file.base_dir, dir)),
        json_format: settings.json_logs,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    debug!("Running with options: {:?}", options);
    let code = run(&options, &settings_file).await;
    ExitCode::from(code as u8)
}
