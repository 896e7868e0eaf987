use std::collections::HashMap;
use std::path::Path;
use std::process::{Command, ExitStatus};
use std::time::Duration;

use crate::errors::DepGateError;

/// Hard cap for secret-command execution.
const SECRET_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for constructing and executing external processes.
///
/// Provides a fluent API for setting program, arguments, environment
/// variables, and working directory. Used by `depgate run` to spawn the
/// wrapped package-manager command with registry overrides applied.
pub struct CommandBuilder {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<String>,
}

impl CommandBuilder {
    /// Create a new builder for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory for the child process.
    pub fn cwd(mut self, dir: impl Into<String>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Run the command with inherited stdio and wait for it to finish.
    pub fn status(&self) -> Result<ExitStatus, DepGateError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        if let Some(ref dir) = self.cwd {
            cmd.current_dir(Path::new(dir));
        }
        cmd.status().map_err(DepGateError::from)
    }
}

/// Resolve an optional secret from the environment.
///
/// Checks `direct_env` first; if unset or blank, runs the shell snippet in
/// `command_env` (when set) and takes its trimmed stdout. The command is
/// killed after ten seconds. Stderr is captured and discarded; the resolved
/// value is treated as opaque and never logged.
pub async fn resolve_secret(direct_env: &str, command_env: &str) -> Option<String> {
    if let Ok(value) = std::env::var(direct_env) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    let snippet = std::env::var(command_env).ok()?;
    if snippet.trim().is_empty() {
        return None;
    }

    let child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&snippet)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .stdin(std::process::Stdio::null())
        .output();

    let output = match tokio::time::timeout(SECRET_COMMAND_TIMEOUT, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(_)) => {
            tracing::warn!("secret command could not be spawned");
            return None;
        }
        Err(_) => {
            tracing::warn!("secret command timed out after 10s");
            return None;
        }
    };

    if !output.status.success() {
        tracing::warn!(status = ?output.status.code(), "secret command exited non-zero");
        return None;
    }

    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_builder_runs() {
        let status = CommandBuilder::new("true").status().unwrap();
        assert!(status.success());
    }

    #[test]
    fn command_builder_propagates_failure() {
        let status = CommandBuilder::new("false").status().unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn resolve_secret_prefers_direct_env() {
        std::env::set_var("DEPGATE_TEST_SECRET_A", "  tok-123  ");
        let got = resolve_secret("DEPGATE_TEST_SECRET_A", "DEPGATE_TEST_SECRET_A_CMD").await;
        assert_eq!(got.as_deref(), Some("tok-123"));
        std::env::remove_var("DEPGATE_TEST_SECRET_A");
    }

    #[tokio::test]
    async fn resolve_secret_runs_command() {
        std::env::remove_var("DEPGATE_TEST_SECRET_B");
        std::env::set_var("DEPGATE_TEST_SECRET_B_CMD", "echo tok-from-cmd");
        let got = resolve_secret("DEPGATE_TEST_SECRET_B", "DEPGATE_TEST_SECRET_B_CMD").await;
        assert_eq!(got.as_deref(), Some("tok-from-cmd"));
        std::env::remove_var("DEPGATE_TEST_SECRET_B_CMD");
    }

    #[tokio::test]
    async fn resolve_secret_none_when_unset() {
        std::env::remove_var("DEPGATE_TEST_SECRET_C");
        std::env::remove_var("DEPGATE_TEST_SECRET_C_CMD");
        let got = resolve_secret("DEPGATE_TEST_SECRET_C", "DEPGATE_TEST_SECRET_C_CMD").await;
        assert!(got.is_none());
    }
}
