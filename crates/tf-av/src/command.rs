//! Builder for executing external tool invocations with output capture.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Command;

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// Both output streams are captured. A non-zero exit, a spawn failure, and a
/// deadline expiry all surface as [`tf_core::Error::Tool`]; the caller cannot
/// tell a missing binary from a crashed one, which is intentional — both are
/// "the transform failed".
///
/// By default there is no deadline: a transform invocation is bounded by the
/// job layer, not here. [`ToolCommand::deadline`] exists for quick metadata
/// calls (probing, version checks) that must never hang a request worker.
/// The child is spawned with `kill_on_drop`, so a caller that drops the
/// execution future (job timeout, shutdown) also kills the process.
///
/// # Example
///
/// ```no_run
/// use tf_av::ToolCommand;
/// use std::path::Path;
///
/// # async fn example() -> tf_core::Result<()> {
/// let output = ToolCommand::new(Path::new("ffprobe"))
///     .arg("-v").arg("quiet")
///     .arg("-print_format").arg("json")
///     .arg("-show_format")
///     .arg("/path/to/input.mp3")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    deadline: Option<Duration>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            deadline: None,
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, s: impl Into<String>) -> Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Append a path argument.
    pub fn path_arg(self, p: &Path) -> Self {
        self.arg(p.to_string_lossy().to_string())
    }

    /// Bound the execution time. On expiry the child is killed and the call
    /// fails with a tool error.
    pub fn deadline(mut self, d: Duration) -> Self {
        self.deadline = Some(d);
        self
    }

    fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - [`tf_core::Error::Tool`] if spawning fails (binary missing,
    ///   permission denied).
    /// - [`tf_core::Error::Tool`] if the process exits non-zero (message
    ///   includes trimmed stderr).
    /// - [`tf_core::Error::Tool`] if the deadline expires.
    pub async fn execute(&self) -> tf_core::Result<ToolOutput> {
        let tool = self.tool_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(tool = %tool, args = ?self.args, "Spawning external tool");

        let child = cmd.spawn().map_err(|e| {
            tf_core::Error::tool(tool.clone(), format!("failed to spawn: {e}"))
        })?;

        let wait = child.wait_with_output();
        let output = match self.deadline {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result,
                Err(_) => {
                    // The wait future is dropped here; kill_on_drop reaps the child.
                    return Err(tf_core::Error::tool(
                        tool,
                        format!("timed out after {limit:?}"),
                    ));
                }
            },
            None => wait.await,
        }
        .map_err(|e| tf_core::Error::tool(tool.clone(), format!("I/O error waiting: {e}")))?;

        let result = ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !result.status.success() {
            return Err(tf_core::Error::tool(
                tool,
                format!(
                    "exited with status {}: {}",
                    result.status,
                    result.stderr.trim()
                ),
            ));
        }

        Ok(result)
    }
}
