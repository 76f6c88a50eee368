//! Pre/post tool hooks.
//!
//! A hook is a shell command receiving the call payload as JSON on stdin.
//! Its stdout may carry `{ "allowed": bool, "system_message": string }`;
//! anything unparseable counts as allowed (hooks degrade, never break the
//! conversation).

use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use ens_domain::chat::ToolCall;
use ens_domain::config::HookCommand;
use ens_domain::error::{Error, Result};

/// Verdict returned by a hook.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookOutcome {
    #[serde(default = "default_allowed")]
    pub allowed: bool,
    #[serde(default)]
    pub system_message: Option<String>,
}

fn default_allowed() -> bool {
    true
}

impl HookOutcome {
    fn allowed() -> Self {
        Self {
            allowed: true,
            system_message: None,
        }
    }
}

/// Run a hook for a tool call. Infrastructure failures surface as
/// errors; the caller logs them and proceeds as if allowed.
pub async fn run_hook(
    hook: &HookCommand,
    call: &ToolCall,
    cancel: &CancellationToken,
) -> Result<HookOutcome> {
    let payload = serde_json::json!({
        "tool_name": call.function.name,
        "arguments": call.function.arguments,
    })
    .to_string();

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(&hook.command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(Error::Io)?;

    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(payload.as_bytes()).await;
        // Close stdin so line-reading hooks see EOF.
    }
    let mut stdout = child.stdout.take();

    let wait = async {
        let mut out = String::new();
        if let Some(ref mut pipe) = stdout {
            let _ = pipe.read_to_string(&mut out).await;
        }
        let _ = child.wait().await;
        out
    };

    let out = tokio::select! {
        result = tokio::time::timeout(Duration::from_secs(hook.timeout_secs), wait) => {
            match result {
                Ok(out) => out,
                Err(_) => {
                    return Err(Error::Timeout(format!(
                        "hook timed out after {}s",
                        hook.timeout_secs
                    )))
                }
            }
        }
        _ = cancel.cancelled() => return Err(Error::Canceled),
    };

    let trimmed = out.trim();
    if trimmed.is_empty() {
        return Ok(HookOutcome::allowed());
    }
    match serde_json::from_str::<HookOutcome>(trimmed) {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            tracing::warn!(error = %e, "hook output is not valid JSON, treating as allowed");
            Ok(HookOutcome::allowed())
        }
    }
}
