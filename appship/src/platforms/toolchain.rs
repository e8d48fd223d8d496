//! Native toolchain invocation

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::ReleaseError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::platforms::BuildOutcome;

/// Captured output of one toolchain step
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Run one toolchain step to completion
pub async fn run_step(program: &str, args: &[String], cwd: &Path) -> Result<StepOutput, ReleaseError> {
    debug!("Running {} {}", program, args.join(" "));
    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| ReleaseError::BuildError(format!("Failed to run {}: {}", program, e)))?;

    Ok(StepOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// What a packaging step is expected to produce
#[derive(Debug, Clone, Copy)]
pub struct ArtifactKind {
    /// File extension, without the dot
    pub extension: &'static str,

    /// Required file stem suffix, e.g. `-Signed`
    pub stem_suffix: Option<&'static str>,
}

impl ArtifactKind {
    fn matches(&self, path: &Path) -> bool {
        match self.stem_suffix {
            Some(suffix) => path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.ends_with(suffix)),
            None => true,
        }
    }
}

/// A clean + package build of one project
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub toolchain: String,
    pub working_dir: PathBuf,
    pub clean_args: Vec<String>,
    /// Packaging arguments; `{out}` is replaced by the temporary output directory
    pub package_args: Vec<String>,
    pub artifact: ArtifactKind,
}

impl BuildPlan {
    /// Run the plan in a fresh temporary directory and stage the artifact in
    /// `output_path`.
    ///
    /// The temporary directory is removed on every return path. Toolchain
    /// failures and missing or ambiguous artifacts come back as an
    /// unsuccessful [`BuildOutcome`]; only staging I/O errors are `Err`.
    pub async fn execute(&self, output_path: &Path) -> Result<BuildOutcome, ReleaseError> {
        let temp_dir = tempfile::Builder::new().prefix("appship-build-").tempdir()?;
        let out_dir = format!("{}/", temp_dir.path().display());
        info!("Building {} in {}", self.working_dir.display(), temp_dir.path().display());

        let mut log = String::new();

        let clean = match run_step(&self.toolchain, &self.clean_args, &self.working_dir).await {
            Ok(output) => output,
            Err(e) => return Ok(BuildOutcome::failed(e.to_string(), None)),
        };
        log.push_str(&clean.stdout);
        if !clean.success {
            warn!("Clean step failed: {}", clean.stderr.trim());
            return Ok(BuildOutcome::failed(exit_message("Clean", &clean), Some(log)));
        }

        let package_args: Vec<String> = self
            .package_args
            .iter()
            .map(|arg| arg.replace("{out}", &out_dir))
            .collect();
        let package = match run_step(&self.toolchain, &package_args, &self.working_dir).await {
            Ok(output) => output,
            Err(e) => return Ok(BuildOutcome::failed(e.to_string(), Some(log))),
        };
        log.push_str(&package.stdout);
        if !package.success {
            warn!("Package step failed: {}", package.stderr.trim());
            return Ok(BuildOutcome::failed(exit_message("Package", &package), Some(log)));
        }

        let artifacts: Vec<PathBuf> = Dir::new(temp_dir.path())
            .find_files(self.artifact.extension)
            .await?
            .into_iter()
            .filter(|p| self.artifact.matches(p))
            .collect();

        match artifacts.as_slice() {
            [artifact] => {
                let staged = File::new(artifact).copy_into(output_path).await?;
                info!("Staged artifact at {}", staged.path().display());
                Ok(BuildOutcome::succeeded(staged.path().to_path_buf(), log))
            }
            [] => Ok(BuildOutcome::failed(
                format!("Build produced no .{} artifact", self.artifact.extension),
                Some(log),
            )),
            many => Ok(BuildOutcome::failed(
                format!(
                    "Build produced {} .{} artifacts, expected exactly one",
                    many.len(),
                    self.artifact.extension
                ),
                Some(log),
            )),
        }
    }
}

fn exit_message(step: &str, output: &StepOutput) -> String {
    match output.code {
        Some(code) => format!("{} step exited with code {}", step, code),
        None => format!("{} step was terminated by a signal", step),
    }
}
