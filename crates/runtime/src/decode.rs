//! Stream decoder — reassembles provider deltas into content, reasoning,
//! and complete tool calls, emitting events as fragments arrive.
//!
//! Tool-call fragments join on their call id when the provider sends one,
//! falling back to the positional index otherwise. Argument fragments are
//! opaque JSON-string pieces concatenated in arrival order.

use std::collections::HashMap;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use ens_domain::chat::{Message, ToolCall};
use ens_domain::error::{Error, Result};
use ens_domain::event::{Event, TokenUsage};
use ens_domain::stream::Usage;
use ens_providers::catalog::ModelInfo;
use ens_providers::DeltaStream;
use ens_sessions::SessionHandle;

use crate::bus::EventBus;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything one decoded stream produced.
#[derive(Debug, Default)]
pub struct StreamOutcome {
    pub content: String,
    pub reasoning: String,
    pub thinking_signature: Option<String>,
    pub calls: Vec<ToolCall>,
    /// The model finished (or produced nothing at all); the loop should
    /// not request another completion.
    pub stopped: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool call assembly
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Join key for fragments: call id when the provider sends one, the
/// positional index otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum JoinKey {
    Id(String),
    Index(usize),
}

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    index: usize,
    name: String,
    arguments: String,
}

impl PartialCall {
    fn snapshot(&self) -> ToolCall {
        let id = self
            .id
            .clone()
            .unwrap_or_else(|| format!("call_{}", self.index));
        ToolCall::new(id, self.name.clone(), self.arguments.clone())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decoder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Consume a delta stream to completion.
///
/// Side effects, in order: `agent_choice`/`agent_choice_reasoning`/
/// `partial_tool_call` as fragments arrive, the in-progress assistant
/// message appended and finalized on the session, `message_added` once
/// finalized, token counters overwritten per usage record, and one
/// `token_usage` event after the stream ends.
pub async fn decode_stream(
    mut stream: DeltaStream,
    agent: &str,
    session: &SessionHandle,
    model: Option<&ModelInfo>,
    events: &EventBus,
    cancel: &CancellationToken,
) -> Result<StreamOutcome> {
    let session_id = session.id();

    let mut content = String::new();
    let mut reasoning = String::new();
    let mut signature: Option<String> = None;
    let mut stopped = false;
    let mut final_usage: Option<Usage> = None;
    let mut message_id: Option<String> = None;

    let mut order: Vec<JoinKey> = Vec::new();
    let mut building: HashMap<JoinKey, PartialCall> = HashMap::new();

    loop {
        let delta = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Canceled),
            next = stream.next() => match next {
                None => break,
                Some(delta) => delta?,
            },
        };

        if let Some(usage) = delta.usage {
            final_usage = Some(usage);
            // Providers send cumulative counters: overwrite, never add.
            session.update_session_tokens(usage.effective_input(), usage.effective_output(), 0.0);
        }

        let Some(choice) = delta.choice else { continue };

        if let Some(text) = choice.delta.content {
            if !text.is_empty() {
                events
                    .send(Event::agent_choice(agent, session_id.clone(), text.clone()))
                    .await;
                if message_id.is_none() {
                    message_id = Some(session.add_message(Message::assistant("")));
                }
                content.push_str(&text);
            }
        }

        if let Some(text) = choice.delta.reasoning_content {
            if !text.is_empty() {
                events
                    .send(Event::agent_choice_reasoning(
                        agent,
                        session_id.clone(),
                        text.clone(),
                    ))
                    .await;
                if message_id.is_none() {
                    message_id = Some(session.add_message(Message::assistant("")));
                }
                reasoning.push_str(&text);
            }
        }

        if let Some(sig) = choice.delta.thinking_signature {
            signature = Some(sig);
        }

        for fragment in choice.delta.tool_calls {
            let key = match fragment.id.as_deref() {
                Some(id) if !id.is_empty() => JoinKey::Id(id.to_string()),
                _ => JoinKey::Index(fragment.index.unwrap_or(0)),
            };
            let call = building.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                PartialCall {
                    id: fragment.id.clone().filter(|id| !id.is_empty()),
                    index: fragment.index.unwrap_or(order.len() - 1),
                    ..Default::default()
                }
            });

            let mut progressed = false;
            if let Some(name) = fragment.name {
                if call.name.is_empty() && !name.is_empty() {
                    call.name = name;
                    progressed = true;
                }
            }
            if let Some(args) = fragment.arguments {
                call.arguments.push_str(&args);
                progressed = true;
            }

            if progressed {
                events
                    .send(Event::partial_tool_call(
                        agent,
                        session_id.clone(),
                        call.snapshot(),
                    ))
                    .await;
            }
        }

        if choice.finish_reason.is_some() {
            // Trailing deltas may still carry the usage record, so keep
            // draining instead of returning here.
            stopped = true;
        }
    }

    let calls: Vec<ToolCall> = order
        .iter()
        .filter_map(|key| {
            let call = building.remove(key)?;
            if call.name.is_empty() {
                tracing::warn!(?key, "dropping tool call with no name");
                return None;
            }
            Some(call.snapshot())
        })
        .collect();

    // Pending calls mean the model still expects tool results, whatever
    // the finish reason said.
    if !calls.is_empty() {
        stopped = false;
    }
    // An empty stream with no finish reason would loop forever upstream.
    if content.is_empty() && calls.is_empty() {
        stopped = true;
    }

    if !content.is_empty() || !calls.is_empty() {
        let mut message = Message::assistant(content.clone())
            .with_reasoning((!reasoning.is_empty()).then(|| reasoning.clone()))
            .with_thinking_signature(signature.clone())
            .with_tool_calls(calls.clone());
        match &message_id {
            Some(id) => {
                message.id = id.clone();
                session.update_message(id, message.clone());
            }
            None => {
                session.add_message(message.clone());
            }
        }
        events
            .send(Event::message_added(agent, session_id.clone(), message))
            .await;
    }

    if let Some(usage) = final_usage {
        let cost_delta = model.map(|m| m.cost_of(&usage)).unwrap_or(0.0);
        if cost_delta != 0.0 {
            session.update_session_tokens(
                usage.effective_input(),
                usage.effective_output(),
                cost_delta,
            );
        }
        let (input, output, cost) = session.tokens_and_cost();
        events
            .send(Event::token_usage(
                agent,
                session_id,
                TokenUsage {
                    input_tokens: input,
                    output_tokens: output,
                    total_tokens: input + output,
                    cost,
                    context_limit: model.map(|m| m.context_limit).unwrap_or(0),
                },
            ))
            .await;
    }

    Ok(StreamOutcome {
        content,
        reasoning,
        thinking_signature: signature,
        calls,
        stopped,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use ens_domain::stream::ToolCallFragment;
    use ens_providers::mock::{
        content_delta, signature_delta, stop_delta, tool_fragment_delta, usage_delta,
    };
    use ens_sessions::{NullSessionStore, Session};
    use std::sync::Arc;

    fn session() -> SessionHandle {
        SessionHandle::new(Session::new(), Arc::new(NullSessionStore))
    }

    fn stream_of(deltas: Vec<ens_domain::stream::StreamDelta>) -> DeltaStream {
        Box::pin(futures_util::stream::iter(deltas.into_iter().map(Ok)))
    }

    async fn decode(
        deltas: Vec<ens_domain::stream::StreamDelta>,
    ) -> (StreamOutcome, Vec<Event>, SessionHandle) {
        let session = session();
        let (bus, mut rx) = EventBus::channel();
        let outcome = decode_stream(
            stream_of(deltas),
            "root",
            &session,
            None,
            &bus,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        drop(bus);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (outcome, events, session)
    }

    #[tokio::test]
    async fn content_accumulates_and_emits_choices() {
        let (outcome, events, session) = decode(vec![
            content_delta("Hel"),
            content_delta("lo"),
            stop_delta(),
            usage_delta(3, 2),
        ])
        .await;

        assert_eq!(outcome.content, "Hello");
        assert!(outcome.stopped);
        let kinds: Vec<_> = events.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec!["agent_choice", "agent_choice", "message_added", "token_usage"]
        );
        assert_eq!(
            session.get_last_assistant_message_content().as_deref(),
            Some("Hello")
        );
        let (input, output, _) = session.tokens_and_cost();
        assert_eq!((input, output), (3, 2));
    }

    #[tokio::test]
    async fn tool_calls_join_on_id() {
        let (outcome, events, _) = decode(vec![
            tool_fragment_delta(ToolCallFragment {
                id: Some("c1".into()),
                index: Some(0),
                name: Some("shell".into()),
                arguments: None,
            }),
            tool_fragment_delta(ToolCallFragment {
                id: Some("c1".into()),
                index: Some(0),
                name: None,
                arguments: Some(r#"{"cmd":"#.into()),
            }),
            tool_fragment_delta(ToolCallFragment {
                id: Some("c1".into()),
                index: Some(0),
                name: None,
                arguments: Some(r#""ls"}"#.into()),
            }),
            stop_delta(),
        ])
        .await;

        assert_eq!(outcome.calls.len(), 1);
        assert_eq!(outcome.calls[0].id, "c1");
        assert_eq!(outcome.calls[0].function.arguments, r#"{"cmd":"ls"}"#);
        let partials = events
            .iter()
            .filter(|e| e.kind() == "partial_tool_call")
            .count();
        assert_eq!(partials, 3);
    }

    #[tokio::test]
    async fn tool_calls_fall_back_to_index() {
        let (outcome, _, _) = decode(vec![
            tool_fragment_delta(ToolCallFragment {
                id: None,
                index: Some(0),
                name: Some("alpha".into()),
                arguments: None,
            }),
            tool_fragment_delta(ToolCallFragment {
                id: None,
                index: Some(1),
                name: Some("beta".into()),
                arguments: None,
            }),
            tool_fragment_delta(ToolCallFragment {
                id: None,
                index: Some(0),
                name: None,
                arguments: Some("{}".into()),
            }),
            stop_delta(),
        ])
        .await;

        assert_eq!(outcome.calls.len(), 2);
        assert_eq!(outcome.calls[0].function.name, "alpha");
        assert_eq!(outcome.calls[0].function.arguments, "{}");
        assert_eq!(outcome.calls[1].function.name, "beta");
        assert_eq!(outcome.calls[0].id, "call_0");
    }

    #[tokio::test]
    async fn thinking_signature_last_writer_wins() {
        let (outcome, _, _) = decode(vec![
            signature_delta("first"),
            content_delta("x"),
            signature_delta("second"),
            stop_delta(),
        ])
        .await;
        assert_eq!(outcome.thinking_signature.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn empty_stream_marks_stopped() {
        let (outcome, events, session) = decode(vec![]).await;
        assert!(outcome.stopped);
        assert!(events.is_empty());
        assert!(session.get_all_messages().is_empty());
    }

    #[tokio::test]
    async fn cancellation_interrupts_decoding() {
        let session = session();
        let (bus, _rx) = EventBus::channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let pending: DeltaStream = Box::pin(futures_util::stream::pending());
        let result = decode_stream(pending, "root", &session, None, &bus, &cancel).await;
        assert!(matches!(result, Err(Error::Canceled)));
    }
}
