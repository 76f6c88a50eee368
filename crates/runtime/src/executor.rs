//! Tool executor — approval gating, hooks, dispatch, result synthesis.
//!
//! Each batch of calls from one iteration runs sequentially, in call
//! order. A denied or rejected call still produces a `tool_call` /
//! `tool_call_response` pair so every response has a matching call;
//! only a completely unknown tool name is skipped outright.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::Instrument;

use ens_domain::chat::{Message, ToolCall, ToolCallResult};
use ens_domain::config::{PermissionDecision, Permissions};
use ens_domain::error::Error;
use ens_domain::event::Event;
use ens_domain::tool::Tool;
use ens_domain::trace::TraceEvent;
use ens_team::Agent;
use ens_tools::elicit::ElicitationRequest;
use ens_tools::{ToolContext, Toolset};

use crate::hooks::run_hook;
use crate::resume::ResumeDecision;
use crate::runtime::Runtime;
use crate::transfer;

/// What a tool batch did to the runtime.
#[derive(Debug, Default)]
pub(crate) struct ExecOutcome {
    /// Calls that produced a tool message (including denials).
    pub executed: usize,
    /// A successful handoff switches the current agent.
    pub switch_to: Option<String>,
    /// The batch was cut short by cancellation.
    pub canceled: bool,
}

/// First matching rung of the approval ladder.
#[derive(Debug, PartialEq)]
enum Gate {
    Run,
    Deny(String),
    Confirm,
}

fn decide_gate(
    session_permissions: Option<&Permissions>,
    agent_permissions: Option<&Permissions>,
    read_only: bool,
    tools_approved: bool,
    tool_name: &str,
) -> Gate {
    if let Some(perms) = session_permissions {
        match perms.decide(tool_name) {
            PermissionDecision::Deny => {
                return Gate::Deny(format!("tool \"{tool_name}\" denied by session permissions"))
            }
            PermissionDecision::Allow => return Gate::Run,
            PermissionDecision::Ask => {}
        }
    }
    if let Some(perms) = agent_permissions {
        match perms.decide(tool_name) {
            PermissionDecision::Deny => {
                return Gate::Deny(format!("tool \"{tool_name}\" denied by permissions"))
            }
            PermissionDecision::Allow => return Gate::Run,
            PermissionDecision::Ask => {}
        }
    }
    if read_only {
        return Gate::Run;
    }
    if tools_approved {
        return Gate::Run;
    }
    Gate::Confirm
}

impl Runtime {
    pub(crate) async fn execute_tool_calls(
        &self,
        agent: &Arc<Agent>,
        tools_by_name: &HashMap<String, (Tool, Arc<dyn Toolset>)>,
        calls: &[ToolCall],
        elicit_tx: &mpsc::Sender<ElicitationRequest>,
    ) -> ExecOutcome {
        let mut outcome = ExecOutcome::default();

        for (index, call) in calls.iter().enumerate() {
            if self.cancel_token.is_cancelled() {
                self.cancel_remaining(agent, &calls[index..]).await;
                outcome.canceled = true;
                break;
            }

            let name = call.function.name.as_str();

            // ── Locate ────────────────────────────────────────────
            let located = if transfer::is_builtin(name) {
                if transfer::builtin_available(&self.team, agent, name) {
                    Located::Builtin
                } else {
                    Located::Unavailable
                }
            } else if let Some((tool, toolset)) = tools_by_name.get(name) {
                Located::Toolset(tool.clone(), toolset.clone())
            } else {
                tracing::warn!(tool = name, "model requested unknown tool, skipping");
                continue;
            };

            if matches!(located, Located::Unavailable) {
                self.finish_call(
                    agent,
                    call,
                    ToolCallResult::error(format!("tool \"{name}\" is not available to this agent")),
                )
                .await;
                outcome.executed += 1;
                continue;
            }

            // ── Approval ladder ───────────────────────────────────
            let read_only = match &located {
                Located::Toolset(tool, _) => tool.annotations.read_only,
                _ => false,
            };
            let gate = decide_gate(
                self.session.permissions().as_ref(),
                agent.permissions(),
                read_only,
                self.session.tools_approved(),
                name,
            );

            let mut early_result: Option<ToolCallResult> = None;
            match gate {
                Gate::Run => {}
                Gate::Deny(reason) => early_result = Some(ToolCallResult::error(reason)),
                Gate::Confirm => {
                    let armed = self.resume_signal.arm();
                    self.events
                        .send(Event::tool_call_confirmation(
                            agent.name(),
                            self.session.id(),
                            call.clone(),
                        ))
                        .await;
                    match self.resume_signal.wait(armed, &self.cancel_token).await {
                        Ok(ResumeDecision::Approve) => {}
                        Ok(ResumeDecision::ApproveSession) => {
                            self.session.approve_tools_for_session();
                        }
                        Ok(ResumeDecision::Reject) => {
                            early_result = Some(ToolCallResult::error("rejected by user"));
                        }
                        Ok(ResumeDecision::RejectWithReason(reason)) => {
                            early_result =
                                Some(ToolCallResult::error(format!("rejected by user: {reason}")));
                        }
                        Err(_) => {
                            self.cancel_remaining(agent, &calls[index..]).await;
                            outcome.canceled = true;
                            break;
                        }
                    }
                }
            }

            self.events
                .send(Event::tool_call(agent.name(), self.session.id(), call.clone()))
                .await;

            // ── Hooks + dispatch ──────────────────────────────────
            let invoked = early_result.is_none();
            let (mut result, switch) = match early_result {
                Some(result) => (result, None),
                None => match self.invoke(agent, &located, call, elicit_tx).await {
                    Invoked::Done(result, switch) => (result, switch),
                    Invoked::Blocked(result) => (result, None),
                    Invoked::Canceled => {
                        // The tool_call event is already out for this call;
                        // only the response is still owed.
                        self.finish_call(agent, call, ToolCallResult::error("canceled by user"))
                            .await;
                        self.cancel_remaining(agent, &calls[index + 1..]).await;
                        outcome.canceled = true;
                        break;
                    }
                },
            };

            if result.output.is_empty() {
                result.output = "(no output)".into();
            }

            self.finish_call(agent, call, result).await;
            outcome.executed += 1;

            // ── Post-tool hook: warnings only ─────────────────────
            if invoked {
                if let Some(hook) = agent.hooks().and_then(|h| h.post_tool.as_ref()) {
                    match run_hook(hook, call, &self.cancel_token).await {
                        Ok(hook_outcome) => {
                            if let Some(message) = hook_outcome.system_message {
                                if !message.is_empty() {
                                    self.events
                                        .send(Event::warning(
                                            agent.name(),
                                            Some(self.session.id()),
                                            message,
                                        ))
                                        .await;
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!(tool = name, error = %e, "post-tool hook failed");
                        }
                    }
                }
            }

            if let Some(next) = switch {
                outcome.switch_to = Some(next);
            }
        }

        outcome
    }

    /// Pre-hook plus the actual handler invocation, span-wrapped.
    async fn invoke(
        &self,
        agent: &Arc<Agent>,
        located: &Located,
        call: &ToolCall,
        elicit_tx: &mpsc::Sender<ElicitationRequest>,
    ) -> Invoked {
        let name = call.function.name.as_str();

        if let Some(hook) = agent.hooks().and_then(|h| h.pre_tool.as_ref()) {
            match run_hook(hook, call, &self.cancel_token).await {
                Ok(hook_outcome) if !hook_outcome.allowed => {
                    let reason = hook_outcome
                        .system_message
                        .unwrap_or_else(|| "blocked by pre-tool hook".into());
                    self.events
                        .send(Event::hook_blocked(
                            agent.name(),
                            self.session.id(),
                            call.clone(),
                            reason.clone(),
                        ))
                        .await;
                    return Invoked::Blocked(ToolCallResult::error(reason));
                }
                Ok(hook_outcome) => {
                    if let Some(message) = hook_outcome.system_message {
                        if !message.is_empty() {
                            self.events
                                .send(Event::warning(agent.name(), Some(self.session.id()), message))
                                .await;
                        }
                    }
                }
                Err(Error::Canceled) => return Invoked::Canceled,
                Err(e) => {
                    self.events
                        .send(Event::warning(
                            agent.name(),
                            Some(self.session.id()),
                            format!("pre-tool hook failed: {e}"),
                        ))
                        .await;
                }
            }
        }

        let started = Instant::now();
        let span = tracing::info_span!("tool.call", tool_name = name);
        let dispatched = match located {
            Located::Builtin => {
                transfer::dispatch_builtin(self, agent, call)
                    .instrument(span)
                    .await
            }
            Located::Toolset(_, toolset) => {
                let ctx = ToolContext::new(self.cancel_token.clone())
                    .with_elicitation(elicit_tx.clone());
                toolset
                    .call(&ctx, call)
                    .instrument(span)
                    .await
                    .map(|result| (result, None))
            }
            Located::Unavailable => unreachable!("filtered before invoke"),
        };

        let (result, switch) = match dispatched {
            Ok(pair) => pair,
            Err(Error::Canceled) => return Invoked::Canceled,
            Err(e) => (ToolCallResult::error(e.to_string()), None),
        };

        TraceEvent::ToolDispatched {
            agent: agent.name().to_string(),
            tool: name.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
            is_error: result.is_error,
        }
        .emit();

        Invoked::Done(result, switch)
    }

    /// Emit the response event and append the tool-role message.
    async fn finish_call(&self, agent: &Arc<Agent>, call: &ToolCall, result: ToolCallResult) {
        self.events
            .send(Event::tool_call_response(
                agent.name(),
                self.session.id(),
                call.clone(),
                result.clone(),
            ))
            .await;
        self.session.add_message(Message::tool_result(call.id.clone(), &result));
    }

    /// Synthesize canceled results for this and every remaining call.
    async fn cancel_remaining(&self, agent: &Arc<Agent>, remaining: &[ToolCall]) {
        for call in remaining {
            self.events
                .send(Event::tool_call(agent.name(), self.session.id(), call.clone()))
                .await;
            self.finish_call(agent, call, ToolCallResult::error("canceled by user"))
                .await;
        }
    }
}

enum Located {
    Builtin,
    Toolset(Tool, Arc<dyn Toolset>),
    Unavailable,
}

enum Invoked {
    Done(ToolCallResult, Option<String>),
    Blocked(ToolCallResult),
    Canceled,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn perms(allow: &[&str], deny: &[&str]) -> Permissions {
        Permissions {
            allow: allow.iter().map(|s| s.to_string()).collect(),
            deny: deny.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn session_deny_wins_first() {
        let session = perms(&[], &["shell"]);
        let agent = perms(&["shell"], &[]);
        let gate = decide_gate(Some(&session), Some(&agent), true, true, "shell");
        assert_eq!(
            gate,
            Gate::Deny("tool \"shell\" denied by session permissions".into())
        );
    }

    #[test]
    fn agent_deny_message_names_permissions() {
        let agent = perms(&[], &["dangerous_tool"]);
        let gate = decide_gate(None, Some(&agent), false, false, "dangerous_tool");
        match gate {
            Gate::Deny(reason) => assert!(reason.contains("denied by permissions")),
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[test]
    fn session_allow_short_circuits_agent_deny() {
        let session = perms(&["shell"], &[]);
        let agent = perms(&[], &["shell"]);
        assert_eq!(
            decide_gate(Some(&session), Some(&agent), false, false, "shell"),
            Gate::Run
        );
    }

    #[test]
    fn read_only_auto_runs() {
        assert_eq!(decide_gate(None, None, true, false, "ls"), Gate::Run);
    }

    #[test]
    fn approved_session_auto_runs() {
        assert_eq!(decide_gate(None, None, false, true, "shell"), Gate::Run);
    }

    #[test]
    fn default_is_confirmation() {
        assert_eq!(decide_gate(None, None, false, false, "shell"), Gate::Confirm);
    }
}
