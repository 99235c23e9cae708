//! Local execution
//!
//! Runs commands as child processes of this host and treats a directory per
//! platform as that platform's agent workspace. Good enough to drive the
//! whole pipeline on one machine.

use super::traits::{AgentProvider, AgentSession, ArtifactTransfer, CommandOutput, CommandRunner};
use crate::pipeline::{PipelineError, Platform};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;

/// Configuration for local executor
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// Working directory
    pub cwd: PathBuf,

    /// Environment variables to set
    pub env: HashMap<String, String>,

    /// Environment variables to remove from the inherited environment
    pub env_remove: Vec<String>,
}

/// Local executor that runs commands on host system
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    config: ExecutorConfig,
}

impl LocalExecutor {
    /// Creates a new local executor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets current working directory
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.config.cwd = cwd.into();
        self
    }

    /// Adds an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.env.insert(key.into(), value.into());
        self
    }

    /// Removes an inherited environment variable
    #[must_use]
    pub fn without_env(mut self, key: impl Into<String>) -> Self {
        self.config.env_remove.push(key.into());
        self
    }
}

#[async_trait]
impl CommandRunner for LocalExecutor {
    async fn run(&self, argv: &[String]) -> Result<CommandOutput, PipelineError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(PipelineError::Io("empty command".to_string()));
        };

        let mut cmd = Command::new(program);
        cmd.args(args);
        if !self.config.cwd.as_os_str().is_empty() {
            cmd.current_dir(&self.config.cwd);
        }
        for key in &self.config.env_remove {
            cmd.env_remove(key);
        }
        cmd.envs(&self.config.env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::debug!(command = %shell_words::join(argv), cwd = %self.config.cwd.display(), "Executing command");
        let start = Instant::now();

        let output = cmd
            .output()
            .await
            .map_err(|e| PipelineError::Io(format!("failed to start {program}: {e}")))?;

        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        tracing::debug!(
            exit_code = result.exit_code,
            duration_ms = start.elapsed().as_millis(),
            "Command finished"
        );

        Ok(result)
    }
}

/// Copies artifacts out of a local agent workspace
#[derive(Debug, Clone)]
pub struct LocalTransfer {
    source_dir: PathBuf,
}

impl LocalTransfer {
    /// Transfers files found in `source_dir`
    #[must_use]
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
        }
    }
}

#[async_trait]
impl ArtifactTransfer for LocalTransfer {
    async fn transfer(&self, filename: &str, destination: &Path) -> Result<(), PipelineError> {
        let failure = |reason: String| PipelineError::TransferFailure {
            filename: filename.to_string(),
            reason,
        };

        let source = self.source_dir.join(filename);
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| failure(format!("cannot create {}: {e}", parent.display())))?;
        }
        let bytes = tokio::fs::copy(&source, destination)
            .await
            .map_err(|e| failure(format!("{}: {e}", source.display())))?;

        tracing::info!(
            filename,
            destination = %destination.display(),
            bytes,
            "Artifact transferred"
        );
        Ok(())
    }
}

/// Local "agents": one workspace directory per platform key
#[derive(Debug, Clone)]
pub struct LocalAgents {
    workspace_root: PathBuf,
    env: BTreeMap<String, String>,
    env_remove: Vec<String>,
}

impl LocalAgents {
    /// Agents whose workspaces live under `workspace_root`
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            env: BTreeMap::new(),
            env_remove: Vec::new(),
        }
    }

    /// Sets these variables for every agent command
    #[must_use]
    pub fn with_envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    /// Removes these variables from every agent command's environment
    #[must_use]
    pub fn without_env(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.env_remove.extend(keys);
        self
    }

    /// Workspace directory used for a platform
    #[must_use]
    pub fn workspace(&self, platform: &Platform) -> PathBuf {
        self.workspace_root.join(&platform.key)
    }
}

#[async_trait]
impl AgentProvider for LocalAgents {
    async fn connect(&self, platform: &Platform) -> Result<AgentSession, PipelineError> {
        let workspace = self.workspace(platform);
        tokio::fs::create_dir_all(&workspace).await?;

        let mut executor = LocalExecutor::new().with_cwd(&workspace);
        for key in &self.env_remove {
            executor = executor.without_env(key.clone());
        }
        for (key, value) in &self.env {
            executor = executor.with_env(key.clone(), value.clone());
        }

        Ok(AgentSession {
            runner: Arc::new(executor),
            transfer: Arc::new(LocalTransfer::new(workspace)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_run_captures_output() {
        let executor = LocalExecutor::new().with_cwd("/tmp");
        let output = executor
            .run(&argv(&["sh", "-c", "echo out; echo err >&2"]))
            .await
            .unwrap();
        assert!(output.is_success());
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_not_an_error() {
        let executor = LocalExecutor::new();
        let output = executor.run(&argv(&["sh", "-c", "exit 3"])).await.unwrap();
        assert_eq!(output.exit_code, 3);
        assert!(!output.is_success());
    }

    #[tokio::test]
    async fn test_env_set_and_removed() {
        let executor = LocalExecutor::new()
            .with_env("BINARYDIST_TEST_VAR", "value")
            .without_env("HOME");
        let output = executor
            .run(&argv(&["sh", "-c", "echo \"$BINARYDIST_TEST_VAR:${HOME:-unset}\""]))
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "value:unset");
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let executor = LocalExecutor::new();
        let err = executor
            .run(&argv(&["/nonexistent/binarydist-test-program"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
        assert!(executor.run(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_local_transfer() {
        let agent = tempfile::tempdir().unwrap();
        let controller = tempfile::tempdir().unwrap();
        std::fs::write(agent.path().join("julia-1.0.0-linux64.tar.gz"), b"payload").unwrap();

        let dest = controller.path().join("staging/julia-1.0.0-linux64.tar.gz");
        LocalTransfer::new(agent.path())
            .transfer("julia-1.0.0-linux64.tar.gz", &dest)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_local_transfer_missing_file() {
        let agent = tempfile::tempdir().unwrap();
        let dest = agent.path().join("out/missing.tar.gz");
        let err = LocalTransfer::new(agent.path().join("src"))
            .transfer("missing.tar.gz", &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TransferFailure { .. }));
    }

    #[tokio::test]
    async fn test_local_agents_workspace_per_platform() {
        let root = tempfile::tempdir().unwrap();
        let agents = LocalAgents::new(root.path());
        let platform = Platform {
            key: "package_linux64".into(),
            agent: "centos5_11-x64".into(),
            os: crate::pipeline::OsClass::Linux,
            arch: "x64".into(),
            flags: String::new(),
            publish_eligible: true,
        };
        let session = agents.connect(&platform).await.unwrap();
        assert!(root.path().join("package_linux64").is_dir());

        let output = session.runner.run(&argv(&["pwd"])).await.unwrap();
        assert!(output.stdout.trim().ends_with("package_linux64"));
    }

    #[tokio::test]
    async fn test_local_agents_environment() {
        let root = tempfile::tempdir().unwrap();
        let agents = LocalAgents::new(root.path())
            .without_env(["HOME".to_string()])
            .with_envs([("LLVM_CMAKE".to_string(), "/opt/cmake/bin/cmake".to_string())]);
        let platform = Platform {
            key: "package_osx64".into(),
            agent: "macos".into(),
            os: crate::pipeline::OsClass::Osx,
            arch: "x64".into(),
            flags: String::new(),
            publish_eligible: true,
        };
        let session = agents.connect(&platform).await.unwrap();
        let output = session
            .runner
            .run(&argv(&["sh", "-c", "echo \"$LLVM_CMAKE:${HOME:-unset}\""]))
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "/opt/cmake/bin/cmake:unset");
    }
}
