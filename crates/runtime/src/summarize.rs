//! One-shot auxiliary runs: context compaction and session titling.
//!
//! Both instantiate a minimal single-agent team over the calling agent's
//! own model and run it to completion on a rendered transcript. Their
//! events never reach the parent stream.

use std::sync::Arc;

use ens_domain::chat::{Message, Role};
use ens_domain::error::Result;
use ens_domain::event::Event;
use ens_sessions::{Item, NullSessionStore, Session, SessionHandle};
use ens_team::{Agent, Team};

use crate::runtime::{RunOptions, Runtime, SessionRuntime};

const COMPACT_PROMPT: &str = "You are a conversation summarizer. Summarize the conversation \
     you are given into a concise summary that preserves the current goal, key decisions, \
     open questions, and important facts. Write in present tense, omit pleasantries, keep \
     every actionable detail.";

const TITLE_PROMPT: &str = "Generate a short title for the conversation you are given, a few \
     words at most. Reply with the title only, no quotes and no punctuation around it.";

/// Longest single entry embedded into a summarization prompt; longer
/// entries keep their head and tail.
const MAX_RENDERED_ENTRY: usize = 2_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rendering
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Render messages as `User:`/`Assistant:` lines; system and tool
/// messages are skipped.
fn render_history(messages: &[Message]) -> String {
    let mut buf = String::new();
    for message in messages {
        let label = match message.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            _ => continue,
        };
        let content = message.content.text();
        if content.is_empty() {
            continue;
        }
        buf.push_str(label);
        buf.push_str(": ");
        if content.len() > MAX_RENDERED_ENTRY {
            let head = &content[..floor_char_boundary(&content, 1_000)];
            let tail = &content[ceil_char_boundary(&content, content.len() - 500)..];
            buf.push_str(head);
            buf.push_str(" [...] ");
            buf.push_str(tail);
        } else {
            buf.push_str(&content);
        }
        buf.push('\n');
    }
    buf
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Collapse a model reply into a single-line title.
fn sanitize_title(raw: &str) -> Option<String> {
    raw.lines()
        .map(|line| line.replace('\r', ""))
        .map(|line| line.trim().to_string())
        .find(|line| !line.is_empty())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// One-shot sub-runtime
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run a minimal team over the agent's own model and return the single
/// assistant reply, if any. Events are drained and discarded.
async fn one_shot(
    rt: &Runtime,
    agent: &Arc<Agent>,
    system_prompt: &str,
    user_prompt: String,
    options: RunOptions,
) -> Result<Option<String>> {
    let provider = agent.chain().remove(0);
    let mini = Agent::new("root", system_prompt, provider);
    let team = Arc::new(Team::single(mini));

    let mut session = Session::new();
    session.items.push(Item::Message(Message::user(user_prompt)));
    let handle = SessionHandle::new(session, Arc::new(NullSessionStore));

    let one_shot_rt = Arc::new(
        Runtime::new(team, "root", handle.clone(), rt.catalog.clone())
            .with_cancellation(&rt.cancel_token)
            .with_options(options),
    );
    let mut rx = one_shot_rt.run_stream();
    while rx.recv().await.is_some() {}

    Ok(handle
        .get_last_assistant_message_content()
        .filter(|content| !content.trim().is_empty()))
}

/// Summarize the conversation for compaction. `Ok(None)` means the model
/// produced nothing usable; the caller skips the summary item.
pub(crate) async fn compact_session(rt: &Runtime, agent: &Arc<Agent>) -> Result<Option<String>> {
    let rendered = render_history(&rt.session.get_all_messages());
    if rendered.is_empty() {
        return Ok(None);
    }
    one_shot(
        rt,
        agent,
        COMPACT_PROMPT,
        format!("Summarize this conversation:\n\n{rendered}"),
        RunOptions {
            structured_output: false,
            generate_title: false,
            ..RunOptions::default()
        },
    )
    .await
}

/// Generate and store a title for the session. Empty outputs are
/// swallowed silently.
pub(crate) async fn generate_title(rt: &Runtime, agent: &Arc<Agent>) {
    let rendered = render_history(&rt.session.get_all_messages());
    if rendered.is_empty() {
        return;
    }

    let result = one_shot(
        rt,
        agent,
        TITLE_PROMPT,
        format!("Create a title for this conversation:\n\n{rendered}"),
        RunOptions {
            thinking_override: Some(false),
            max_tokens: Some(20),
            structured_output: false,
            generate_title: false,
        },
    )
    .await;

    let title = match result {
        Ok(Some(raw)) => sanitize_title(&raw),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %e, "title generation failed");
            None
        }
    };

    if let Some(title) = title {
        rt.session.update_session_title(&title);
        rt.events
            .send(Event::session_title(rt.session.id(), title))
            .await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
