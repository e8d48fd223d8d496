//! Command line options

use std::collections::HashMap;
use std::path::PathBuf;

use crate::errors::ReleaseError;
use crate::models::DeploymentRequest;
use crate::storage::settings::DEFAULT_SETTINGS_FILE;

/// What the binary was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version info and exit
    Version,

    /// Run a full deployment job
    Deploy(DeploymentRequest),

    /// Install one config into each listed platform's project
    Install {
        config: String,
        platforms: Vec<String>,
        version: Option<String>,
    },
}

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOptions {
    pub command: Command,
    pub settings_path: PathBuf,
    /// Stream events as NDJSON on stdout
    pub json_events: bool,
}

/// Collect `--key=value` and `--flag` arguments
pub fn parse_args<I>(args: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = String>,
{
    let mut cli_args = HashMap::new();
    for arg in args {
        if let Some((key, value)) = arg.split_once('=') {
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }
    cli_args
}

fn list(value: Option<&String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn flag(cli_args: &HashMap<String, String>, key: &str) -> Result<bool, ReleaseError> {
    match cli_args.get(key).map(String::as_str) {
        None | Some("false") => Ok(false),
        Some("true") => Ok(true),
        Some(other) => Err(ReleaseError::ConfigError(format!(
            "--{} expects true or false, got '{}'",
            key, other
        ))),
    }
}

impl CliOptions {
    pub fn from_args(cli_args: &HashMap<String, String>) -> Result<Self, ReleaseError> {
        let settings_path = cli_args
            .get("settings")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
        let json_events = flag(cli_args, "json")?;
        let platforms = list(cli_args.get("platforms"));
        let version = cli_args.get("set-version").cloned();

        let command = if cli_args.contains_key("version") {
            Command::Version
        } else if let Some(config) = cli_args.get("install") {
            if config == "true" || config.trim().is_empty() {
                return Err(ReleaseError::ConfigError(
                    "--install expects a config name: --install=<config>".to_string(),
                ));
            }
            Command::Install {
                config: config.trim().to_string(),
                platforms,
                version,
            }
        } else {
            Command::Deploy(DeploymentRequest {
                configs: list(cli_args.get("configs")),
                platforms,
                store_release: flag(cli_args, "store-release")?,
                version,
            })
        };

        Ok(Self {
            command,
            settings_path,
            json_events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliOptions, ReleaseError> {
        CliOptions::from_args(&parse_args(args.iter().map(|a| a.to_string())))
    }

    #[test]
    fn test_deploy_options() {
        let options = parse(&[
            "--configs=staging, prod",
            "--platforms=ios,android",
            "--store-release",
            "--set-version=2.0.0",
            "--json",
        ])
        .unwrap();

        assert!(options.json_events);
        assert_eq!(options.settings_path, PathBuf::from("appship.json"));
        assert_eq!(
            options.command,
            Command::Deploy(DeploymentRequest {
                configs: vec!["staging".to_string(), "prod".to_string()],
                platforms: vec!["ios".to_string(), "android".to_string()],
                store_release: true,
                version: Some("2.0.0".to_string()),
            })
        );
    }

    #[test]
    fn test_install_and_version_options() {
        let options = parse(&["--install=staging", "--platforms=ios", "--settings=/work/appship.json"]).unwrap();
        assert_eq!(options.settings_path, PathBuf::from("/work/appship.json"));
        assert!(matches!(options.command, Command::Install { ref config, .. } if config == "staging"));

        assert_eq!(parse(&["--version"]).unwrap().command, Command::Version);
        assert!(parse(&["--install"]).is_err());
        assert!(parse(&["--store-release=maybe"]).is_err());
    }
}
