//! Shell toolset — run a command through `sh -c` with a hard timeout.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use ens_domain::chat::{ToolCall, ToolCallResult};
use ens_domain::error::{Error, Result};
use ens_domain::tool::Tool;

use crate::toolset::{ToolContext, Toolset};

/// Exposes a single `shell` tool.
pub struct ShellToolset {
    workdir: Option<PathBuf>,
    timeout: Duration,
}

impl ShellToolset {
    pub fn new() -> Self {
        Self {
            workdir: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, ctx: &ToolContext, cmd: &str) -> Result<ToolCallResult> {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref wd) = self.workdir {
            command.current_dir(wd);
        }

        let mut child = command.spawn().map_err(Error::Io)?;
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let wait = async {
            let mut out = String::new();
            let mut err = String::new();
            if let Some(ref mut pipe) = stdout {
                let _ = pipe.read_to_string(&mut out).await;
            }
            if let Some(ref mut pipe) = stderr {
                let _ = pipe.read_to_string(&mut err).await;
            }
            let status = child.wait().await.map_err(Error::Io)?;
            Ok::<_, Error>((status, out, err))
        };

        let (status, out, err) = tokio::select! {
            result = tokio::time::timeout(self.timeout, wait) => match result {
                Ok(inner) => inner?,
                Err(_) => {
                    return Ok(ToolCallResult::error(format!(
                        "command timed out after {}s",
                        self.timeout.as_secs()
                    )))
                }
            },
            _ = ctx.cancel.cancelled() => return Err(Error::Canceled),
        };

        let mut output = out;
        if !err.is_empty() {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(&err);
        }

        if status.success() {
            Ok(ToolCallResult::ok(output))
        } else {
            Ok(ToolCallResult::error(format!(
                "exit code {}: {output}",
                status.code().unwrap_or(-1)
            )))
        }
    }
}

impl Default for ShellToolset {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Toolset for ShellToolset {
    fn name(&self) -> &str {
        "shell"
    }

    async fn tools(&self) -> Result<Vec<Tool>> {
        Ok(vec![Tool::new(
            "shell",
            "Run a shell command and return its combined output.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "cmd": { "type": "string", "description": "Command to execute" }
                },
                "required": ["cmd"]
            }),
        )])
    }

    async fn call(&self, ctx: &ToolContext, call: &ToolCall) -> Result<ToolCallResult> {
        let args: serde_json::Value =
            serde_json::from_str(&call.function.arguments).unwrap_or_default();
        let Some(cmd) = args.get("cmd").and_then(|v| v.as_str()) else {
            return Ok(ToolCallResult::error("missing required argument: cmd"));
        };
        self.run(ctx, cmd).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_round_trip() {
        let toolset = ShellToolset::new();
        let call = ToolCall::new("c1", "shell", r#"{"cmd":"echo hello"}"#);
        let result = toolset.call(&ToolContext::default(), &call).await.unwrap();
        assert_eq!(result.output.trim(), "hello");
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error_result() {
        let toolset = ShellToolset::new();
        let call = ToolCall::new("c1", "shell", r#"{"cmd":"exit 3"}"#);
        let result = toolset.call(&ToolContext::default(), &call).await.unwrap();
        assert!(result.is_error);
        assert!(result.output.contains("exit code 3"));
    }

    #[tokio::test]
    async fn timeout_produces_error_result() {
        let toolset = ShellToolset::new().with_timeout(Duration::from_millis(50));
        let call = ToolCall::new("c1", "shell", r#"{"cmd":"sleep 5"}"#);
        let result = toolset.call(&ToolContext::default(), &call).await.unwrap();
        assert!(result.is_error);
        assert!(result.output.contains("timed out"));
    }

    #[tokio::test]
    async fn missing_cmd_is_an_error_result() {
        let toolset = ShellToolset::new();
        let call = ToolCall::new("c1", "shell", "{}");
        let result = toolset.call(&ToolContext::default(), &call).await.unwrap();
        assert!(result.is_error);
    }
}
