//! Subprocess execution for registered commands.
//!
//! Each invocation:
//! 1. Checks required arguments.
//! 2. Builds a positional argv from the declared arguments, in declaration
//!    order. Arguments the command does not declare are dropped.
//! 3. Resolves the executable (rooted paths verbatim, everything else through
//!    `which`).
//! 4. Runs it under the command's deadline, capturing stdout and stderr.
//!
//! Output is collected while the child runs, so a command killed at its
//! deadline still reports whatever it printed.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rmcp::model::JsonObject;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::model::CommandDef;

/// How long to keep draining pipes after the child has exited or been killed.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Errors that can occur while running a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// A required argument was not supplied.
    MissingArgument(String),
    /// The executable could not be resolved on the search path.
    ExecutableNotFound { exec: String, reason: String },
    /// The deadline expired; the child was killed.
    Timeout { timeout: String, output: String },
    /// The child could not be spawned or exited unsuccessfully.
    Failed { reason: String, output: String },
}

impl ExecError {
    /// Output captured before the failure, if any.
    pub fn output(&self) -> &str {
        match self {
            ExecError::Timeout { output, .. } | ExecError::Failed { output, .. } => output,
            ExecError::MissingArgument(_) | ExecError::ExecutableNotFound { .. } => "",
        }
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::MissingArgument(arg) => write!(f, "missing required argument: {}", arg),
            ExecError::ExecutableNotFound { exec, reason } => {
                write!(f, "executable {:?} not found: {}", exec, reason)
            }
            ExecError::Timeout { timeout, .. } => write!(f, "command timed out after {}", timeout),
            ExecError::Failed { reason, .. } => write!(f, "command failed: {}", reason),
        }
    }
}

impl std::error::Error for ExecError {}

/// Run `def` with the caller-supplied `args` and return its captured output.
pub async fn execute(def: &CommandDef, args: &JsonObject) -> Result<String, ExecError> {
    check_required(def, args)?;

    let argv = build_argv(def, args);
    let (deadline, timeout_label) = def.effective_timeout();
    let program = resolve_exec(&def.exec)?;

    debug!(
        command = %def.name,
        program = %program.display(),
        argc = argv.len(),
        timeout = %timeout_label,
        "Spawning command"
    );

    let mut child = Command::new(&program)
        .args(&argv)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ExecError::Failed {
            reason: e.to_string(),
            output: String::new(),
        })?;

    let stdout = Capture::start(child.stdout.take());
    let stderr = Capture::start(child.stderr.take());

    let waited = tokio::time::timeout(deadline, child.wait()).await;
    if waited.is_err() {
        if let Err(e) = child.kill().await {
            warn!(command = %def.name, "Failed to kill timed out command: {}", e);
        }
    }

    let (stdout, stderr) = tokio::join!(stdout.finish(), stderr.finish());
    let output = combine_output(stdout, stderr);

    match waited {
        Err(_) => Err(ExecError::Timeout {
            timeout: timeout_label,
            output,
        }),
        Ok(Err(e)) => Err(ExecError::Failed {
            reason: e.to_string(),
            output,
        }),
        Ok(Ok(status)) if !status.success() => Err(ExecError::Failed {
            reason: status.to_string(),
            output,
        }),
        Ok(Ok(_)) => Ok(output),
    }
}

/// Fail on the first declared-required argument missing from `args`.
pub fn check_required(def: &CommandDef, args: &JsonObject) -> Result<(), ExecError> {
    match def
        .args
        .iter()
        .find(|(arg_name, spec)| spec.required && !args.contains_key(*arg_name))
    {
        Some((arg_name, _)) => Err(ExecError::MissingArgument(arg_name.clone())),
        None => Ok(()),
    }
}

/// Run `def` on the runtime without waiting for it.
///
/// The outcome is only logged; the deadline still applies.
pub fn spawn_detached(def: CommandDef, args: JsonObject) -> JoinHandle<()> {
    tokio::spawn(async move {
        match execute(&def, &args).await {
            Ok(output) => info!(
                command = %def.name,
                bytes = output.len(),
                "Background command finished"
            ),
            Err(e) => warn!(command = %def.name, "Background command failed: {}", e),
        }
    })
}

/// Positional argv for `def`, in the command's argument order.
pub fn build_argv(def: &CommandDef, args: &JsonObject) -> Vec<String> {
    def.args
        .keys()
        .filter_map(|arg_name| args.get(arg_name))
        .map(render_value)
        .collect()
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        // f64's Display drops the fraction for integral values ("3", not "3.0")
        Value::Number(n) if n.is_f64() => n
            .as_f64()
            .map(|f| f.to_string())
            .unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}

fn resolve_exec(exec: &str) -> Result<PathBuf, ExecError> {
    let path = Path::new(exec);
    if path.has_root() {
        return Ok(path.to_path_buf());
    }

    which::which(exec).map_err(|e| ExecError::ExecutableNotFound {
        exec: exec.to_string(),
        reason: e.to_string(),
    })
}

fn combine_output(stdout: String, stderr: String) -> String {
    let mut output = stdout;
    if !stderr.is_empty() {
        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str("stderr: ");
        output.push_str(&stderr);
    }
    output
}

/// Background reader that appends a pipe's bytes to a shared buffer.
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl Capture {
    fn start<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = pipe.map(|mut pipe| {
            let buffer = buffer.clone();
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buffer
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });
        Self { buffer, task }
    }

    async fn finish(mut self) -> String {
        if let Some(mut task) = self.task.take() {
            // a grandchild may still hold the pipe open
            if tokio::time::timeout(DRAIN_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
        let bytes = std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner));
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
