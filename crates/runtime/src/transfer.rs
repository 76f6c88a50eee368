//! Built-in runtime tools: task transfer and handoff.
//!
//! `transfer_task` runs a child runtime under another agent and feeds its
//! final answer back as the tool result; `handoff` switches the current
//! agent pointer in place, with no child session.

use std::sync::Arc;

use serde_json::Value;

use ens_domain::chat::{Message, ToolCall, ToolCallResult};
use ens_domain::error::Result;
use ens_domain::event::Event;
use ens_domain::tool::Tool;
use ens_sessions::{NullSessionStore, Session, SessionHandle};
use ens_team::{Agent, Team};

use crate::runtime::{RunOptions, Runtime, SessionRuntime};

pub(crate) const TRANSFER_TASK: &str = "transfer_task";
pub(crate) const HANDOFF: &str = "handoff";

/// System prompt seeding every transferred child session.
const TEAM_MEMBER_PROMPT: &str = "You are a member of a team of agents. Another agent has \
     delegated a task to you. Complete it using your own instructions and tools, then reply \
     with the result; the delegating agent will carry it forward.";

pub(crate) fn is_builtin(name: &str) -> bool {
    name == TRANSFER_TASK || name == HANDOFF
}

/// Whether a built-in is part of this agent's tool list.
pub(crate) fn builtin_available(team: &Team, agent: &Agent, name: &str) -> bool {
    match name {
        TRANSFER_TASK => team.len() > 1,
        HANDOFF => !agent.handoffs().is_empty(),
        _ => false,
    }
}

/// Built-in tool definitions exposed to the model for this agent.
pub(crate) fn builtin_tools(team: &Team, agent: &Agent) -> Vec<Tool> {
    let mut tools = Vec::new();
    if builtin_available(team, agent, TRANSFER_TASK) {
        tools.push(Tool::new(
            TRANSFER_TASK,
            "Delegate a task to another agent on the team. Runs the agent to completion and \
             returns its final answer.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "agent": { "type": "string", "description": "Name of the agent to run" },
                    "task": { "type": "string", "description": "The task to delegate" },
                    "expected_output": {
                        "type": "string",
                        "description": "What a good answer looks like"
                    }
                },
                "required": ["agent", "task"]
            }),
        ));
    }
    if builtin_available(team, agent, HANDOFF) {
        tools.push(Tool::new(
            HANDOFF,
            "Hand the conversation off to another agent. The target agent continues with its \
             own instructions and tools.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "agent": { "type": "string", "description": "Name of the agent to hand off to" }
                },
                "required": ["agent"]
            }),
        ));
    }
    tools
}

/// Dispatch a built-in call. The optional string is the agent to switch
/// to after the batch (handoff only).
pub(crate) async fn dispatch_builtin(
    rt: &Runtime,
    agent: &Arc<Agent>,
    call: &ToolCall,
) -> Result<(ToolCallResult, Option<String>)> {
    let args: Value = serde_json::from_str(&call.function.arguments).unwrap_or_default();
    match call.function.name.as_str() {
        TRANSFER_TASK => transfer_task(rt, agent, &args).await.map(|r| (r, None)),
        HANDOFF => handoff(rt, agent, &args).await,
        other => Ok((
            ToolCallResult::error(format!("unknown builtin tool \"{other}\"")),
            None,
        )),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// transfer_task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn transfer_task(
    rt: &Runtime,
    agent: &Arc<Agent>,
    args: &Value,
) -> Result<ToolCallResult> {
    let Some(target) = args.get("agent").and_then(|v| v.as_str()) else {
        return Ok(ToolCallResult::error("missing required argument: agent"));
    };
    let Some(task) = args.get("task").and_then(|v| v.as_str()) else {
        return Ok(ToolCallResult::error("missing required argument: task"));
    };
    let expected_output = args.get("expected_output").and_then(|v| v.as_str());

    if rt.team.get(target).is_none() {
        return Ok(ToolCallResult::error(format!(
            "agent \"{target}\" not found; available agents: {}",
            rt.team.agent_names().join(", ")
        )));
    }

    // Child session: team prompt + the task, inheriting approvals.
    let mut child = Session::new();
    child.parent_id = Some(rt.session.id());
    child.working_dir = rt.session.with(|s| s.working_dir.clone());
    child.tools_approved = rt.session.tools_approved();
    child.thinking_enabled = rt.session.thinking_enabled();
    child.items.push(ens_sessions::Item::Message(Message::system(TEAM_MEMBER_PROMPT)));
    let mut user_text = task.to_string();
    if let Some(expected) = expected_output {
        user_text.push_str("\n\nExpected output: ");
        user_text.push_str(expected);
    }
    child.items.push(ens_sessions::Item::Message(Message::user(user_text)));

    let child_session = SessionHandle::new(child, Arc::new(NullSessionStore));

    tracing::info!(from = agent.name(), to = target, "transferring task");
    let child_rt = Arc::new(
        Runtime::new(
            rt.team.clone(),
            target,
            child_session.clone(),
            rt.catalog.clone(),
        )
        .with_fallback_controller(rt.fallback.clone())
        .with_cancellation(&rt.cancel_token)
        .with_options(RunOptions {
            generate_title: false,
            ..RunOptions::default()
        }),
    );

    // Forward every child event into the parent stream.
    let mut child_rx = child_rt.run_stream();
    while let Some(event) = child_rx.recv().await {
        rt.events.send(event).await;
    }

    // Merge cost upward; the parent's own counters stay authoritative.
    let (_, _, child_cost) = child_session.tokens_and_cost();
    if child_cost > 0.0 {
        let (input, output, _) = rt.session.tokens_and_cost();
        rt.session.update_session_tokens(input, output, child_cost);
    }

    let output = child_session
        .get_last_assistant_message_content()
        .filter(|content| !content.is_empty())
        .unwrap_or_else(|| "(no output)".into());

    let child_snapshot = child_session.snapshot();
    let child_id = child_snapshot.id.clone();
    rt.session.add_sub_session(child_snapshot);
    rt.events
        .send(Event::sub_session_completed(
            agent.name(),
            rt.session.id(),
            child_id,
        ))
        .await;

    Ok(ToolCallResult::ok(output))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// handoff
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn handoff(
    rt: &Runtime,
    agent: &Arc<Agent>,
    args: &Value,
) -> Result<(ToolCallResult, Option<String>)> {
    let Some(target) = args.get("agent").and_then(|v| v.as_str()) else {
        return Ok((
            ToolCallResult::error("missing required argument: agent"),
            None,
        ));
    };

    if !agent.handoffs().iter().any(|h| h == target) {
        return Ok((
            ToolCallResult::error(format!(
                "agent \"{target}\" is not a valid handoff target; allowed: {}",
                agent.handoffs().join(", ")
            )),
            None,
        ));
    }
    if rt.team.get(target).is_none() {
        return Ok((
            ToolCallResult::error(format!("agent \"{target}\" not found in team")),
            None,
        ));
    }

    rt.events
        .send(Event::agent_switching(agent.name(), agent.name(), target))
        .await;
    tracing::info!(from = agent.name(), to = target, "handing off");

    let brief = format!(
        "Control handed off to \"{target}\". Continue the conversation using only your own \
         instructions, tools, and capabilities."
    );
    Ok((ToolCallResult::ok(brief), Some(target.to_string())))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
