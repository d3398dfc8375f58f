use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use axon_types::ports::Sandbox;
use axon_types::{KernelError, SandboxLimits, SandboxOutput};

/// Runs a tool's `code` as a shell command in a fresh child process,
/// feeding the call's `context` to it as JSON on stdin and reading its
/// stdout back as JSON (falling back to a raw string if it isn't). No
/// Sandbox implementation exists anywhere upstream of this crate; this
/// one trades real OS-level isolation for something runnable without an
/// unverified external dependency: per-call process isolation plus a
/// wall-clock timeout. `network_enabled`/`filesystem_enabled` and
/// `max_memory_bytes` are accepted so a host that layers real capability
/// restrictions on top has somewhere to read them from, but this
/// implementation does not enforce them, and `memory_used_bytes` is
/// always reported as `0` rather than a fabricated measurement.
pub struct ProcessSandbox {
    shell: &'static str,
    shell_flag: &'static str,
}

impl ProcessSandbox {
    pub fn new() -> Self {
        if cfg!(windows) {
            Self { shell: "cmd", shell_flag: "/C" }
        } else {
            Self { shell: "/bin/sh", shell_flag: "-c" }
        }
    }
}

impl Default for ProcessSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn execute(&self, code: &str, context: Value, limits: &SandboxLimits) -> Result<SandboxOutput, KernelError> {
        let started = Instant::now();
        let mut child = Command::new(self.shell)
            .arg(self.shell_flag)
            .arg(code)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| KernelError::SandboxError(format!("failed to spawn sandbox process: {err}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(&context).unwrap_or_default();
            let _ = stdin.write_all(&payload).await;
        }

        let budget = Duration::from_millis(limits.timeout_ms.max(1));
        let output = match tokio::time::timeout(budget, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return Err(KernelError::SandboxError(format!("sandbox process failed: {err}"))),
            Err(_) => return Err(KernelError::ToolTimeout { timeout_ms: limits.timeout_ms }),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let error = if stderr.is_empty() {
                format!("sandbox process exited with status {}", output.status)
            } else {
                stderr
            };
            return Ok(SandboxOutput { output: Value::Null, error: Some(error), duration_ms, memory_used_bytes: 0 });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let value = serde_json::from_str::<Value>(stdout.trim())
            .unwrap_or_else(|_| Value::String(stdout.trim().to_string()));
        Ok(SandboxOutput { output: value, error: None, duration_ms, memory_used_bytes: 0 })
    }
}
