// Runs the roop command line pipeline as a child process.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::executor::{Collaborator, CollaboratorError};
use super::job::JobConfiguration;

const PROVIDER_PROBE: &str =
    "import onnxruntime; print(','.join(onnxruntime.get_available_providers()))";

pub struct RoopCollaborator {
    python: String,
    script: PathBuf,
}

impl RoopCollaborator {
    pub fn new(python: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            script: script.into(),
        }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Headless invocation arguments for one job.
    pub fn command_args(config: &JobConfiguration, processors: &[&'static str]) -> Vec<String> {
        let mut args = vec![
            "-s".to_string(),
            config.source_path().display().to_string(),
            "-t".to_string(),
            config.target_path().display().to_string(),
            "-o".to_string(),
            config.output_path().display().to_string(),
            "--frame-processor".to_string(),
        ];
        args.extend(processors.iter().map(|p| p.to_string()));
        args.push("--execution-provider".to_string());
        args.extend(config.execution_providers().iter().cloned());
        args.push("--execution-threads".to_string());
        args.push(config.execution_thread_count().to_string());
        args.push("--max-memory".to_string());
        args.push(config.max_memory_gib().to_string());
        if config.detect_all_faces() {
            args.push("--many-faces".to_string());
        }
        args
    }
}

/// Parses the probe output, accepting both `a,b` and `['a', 'b']` forms.
pub fn parse_provider_list(output: &str) -> Vec<String> {
    output
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|p| p.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[async_trait]
impl Collaborator for RoopCollaborator {
    async fn available_providers(&self) -> Vec<String> {
        let output = Command::new(&self.python)
            .arg("-c")
            .arg(PROVIDER_PROBE)
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                let providers = parse_provider_list(&String::from_utf8_lossy(&out.stdout));
                if providers.is_empty() {
                    vec!["cpu".to_string()]
                } else {
                    providers
                }
            }
            Ok(out) => {
                log::warn!(
                    "onnxruntime provider probe failed ({}): {}",
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                );
                vec!["cpu".to_string()]
            }
            Err(e) => {
                log::warn!("Could not run {} to probe providers: {}", self.python, e);
                vec!["cpu".to_string()]
            }
        }
    }

    async fn run(
        &self,
        config: &JobConfiguration,
        processors: &[&'static str],
    ) -> Result<(), CollaboratorError> {
        let args = Self::command_args(config, processors);
        log::info!(
            "Spawning {} {} {}",
            self.python,
            self.script.display(),
            args.join(" ")
        );

        let mut child = Command::new(&self.python)
            .arg(&self.script)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(CollaboratorError::Spawn)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let job_id = config.job_id();

        let drain_stdout = async move {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::debug!("[roop {}] {}", job_id, line);
                }
            }
        };

        let drain_stderr = async move {
            let mut last_line = String::new();
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::debug!("[roop {} stderr] {}", job_id, line);
                    if !line.trim().is_empty() {
                        last_line = line;
                    }
                }
            }
            last_line
        };

        let ((), last_error, status) = tokio::join!(drain_stdout, drain_stderr, child.wait());
        let status = status?;
        log::info!("roop exited for job {} with {}", job_id, status);

        if !status.success() {
            return Err(match status.code() {
                Some(code) => CollaboratorError::ExitStatus {
                    code,
                    detail: last_error,
                },
                None => CollaboratorError::Failed(format!("roop terminated by signal: {}", last_error)),
            });
        }
        Ok(())
    }
}
