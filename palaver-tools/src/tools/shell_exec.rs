use async_trait::async_trait;
use palaver_infra::infra::permission_gate::PermissionGate;
use serde::Deserialize;
use serde_json::json;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::info;
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::tools::base::Tool;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct RunCommandInput {
    command: String,
}

/// Runs a shell command after it clears the permission gate.
pub struct RunCommandTool {
    gate: Arc<PermissionGate>,
    command_timeout: Duration,
}

impl RunCommandTool {
    pub fn new(gate: Arc<PermissionGate>) -> Self {
        Self {
            gate,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    async fn clear(&self, command: &str) -> Result<(), ToolError> {
        let gate = Arc::clone(&self.gate);
        let owned = command.to_string();

        // The approver may block on a terminal prompt
        let decision = tokio::task::spawn_blocking(move || gate.check(&owned))
            .await
            .map_err(|_| ToolError::Internal)?
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        if decision.is_permitted() {
            info!("Command permitted ({:?}): {}", decision, command);
            Ok(())
        } else {
            Err(ToolError::PermissionDenied(format!(
                "'{}' requires approval and was not approved",
                command
            )))
        }
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &'static str {
        "run_command"
    }

    fn description(&self) -> &'static str {
        "Run a shell command on the user's computer"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to run"
                }
            },
            "required": ["command"]
        })
    }

    async fn authorize(&self, input: &serde_json::Value) -> Result<(), ToolError> {
        let command = parse_command(input.clone())?;
        self.clear(&command).await
    }

    async fn execute(
        &self,
        ctx: ExecutionContext,
        input: serde_json::Value,
    ) -> Result<String, ToolError> {
        let command = parse_command(input)?;

        // Already decided when the dispatcher authorized the call, so this
        // is a record lookup and never prompts again
        self.clear(&command).await?;
        let command = command.as_str();

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own session and process group, so a timeout can kill the whole tree
        #[cfg(unix)]
        {
            unsafe {
                cmd.pre_exec(|| {
                    libc::setsid();
                    Ok(())
                });
            }
        }

        let limit = self
            .command_timeout
            .min(Duration::from_millis(ctx.timeout_ms));

        let child = cmd
            .spawn()
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        let pid = child.id();

        let output = match timeout(limit, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| ToolError::ExecutionFailed(e.to_string()))?,
            Err(_) => {
                kill_process_group(pid);
                return Err(ToolError::Timeout);
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let text = text.trim();

        let mut result = if text.is_empty() {
            "(no output)".to_string()
        } else {
            text.to_string()
        };
        if !output.status.success() {
            if let Some(code) = output.status.code() {
                result.push_str(&format!("\n[exit code {}]", code));
            }
        }

        Ok(result)
    }
}

fn parse_command(input: serde_json::Value) -> Result<String, ToolError> {
    let input: RunCommandInput =
        serde_json::from_value(input).map_err(|e| ToolError::ValidationError(e.to_string()))?;

    let command = input.command.trim();
    if command.is_empty() {
        return Err(ToolError::ValidationError("Empty command".into()));
    }
    Ok(command.to_string())
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // The shell leads its own session, so its pid is the group id
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
