//! End-to-end runtime scenarios driven by the scripted mock provider.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use ens_domain::chat::ToolCallResult;
use ens_domain::config::Permissions;
use ens_domain::event::Event;
use ens_domain::tool::Tool;
use ens_providers::catalog::{CostPerMillion, InMemoryCatalog, ModelCatalog, ModelInfo};
use ens_providers::{MockProvider, ScriptedResponse};
use ens_runtime::{ResumeDecision, Runtime, SessionRuntime};
use ens_sessions::{Item, NullSessionStore, Session, SessionHandle};
use ens_team::{Agent, Team};
use ens_tools::FunctionToolset;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn runtime(team: Team, agent: &str, session: Session) -> (Arc<Runtime>, mpsc::Receiver<Event>) {
    runtime_with_catalog(team, agent, session, Arc::new(InMemoryCatalog::new()))
}

fn runtime_with_catalog(
    team: Team,
    agent: &str,
    session: Session,
    catalog: Arc<dyn ModelCatalog>,
) -> (Arc<Runtime>, mpsc::Receiver<Event>) {
    let handle = SessionHandle::new(session, Arc::new(NullSessionStore));
    let rt = Arc::new(Runtime::new(Arc::new(team), agent, handle, catalog));
    let rx = rt.clone().run_stream();
    (rt, rx)
}

async fn drain(mut rx: mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// Drain while answering confirmation/iteration gates with `responder`.
async fn drain_with(
    mut rx: mpsc::Receiver<Event>,
    rt: &Arc<Runtime>,
    mut responder: impl FnMut(&Event) -> Option<ResumeDecision>,
) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        if let Some(decision) = responder(&event) {
            rt.resume(decision).await.unwrap();
        }
        events.push(event);
    }
    events
}

fn kinds(events: &[Event]) -> Vec<&'static str> {
    events.iter().map(|e| e.kind()).collect()
}

/// Ordering invariants that hold for every run.
fn assert_event_invariants(events: &[Event]) {
    let started = events.iter().filter(|e| e.kind() == "stream_started").count();
    let stopped = events.iter().filter(|e| e.kind() == "stream_stopped").count();
    assert_eq!(started, stopped, "stream_started / stream_stopped pairing");

    for (i, event) in events.iter().enumerate() {
        if let Event::ToolCall { tool_call, .. } = event {
            let response_at = events[i..].iter().position(|e| {
                matches!(e, Event::ToolCallResponse { tool_call: response_call, .. }
                    if response_call.id == tool_call.id)
            });
            assert!(
                response_at.is_some(),
                "tool_call {} has no later tool_call_response",
                tool_call.id
            );
        }
    }
}

fn titled(mut session: Session) -> Session {
    session.title = Some("pre-set".into());
    session
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: simple exchange
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn simple_exchange_emits_canonical_sequence() {
    let provider = MockProvider::new("mock").with_text("Hello");
    let team = Team::single(Agent::new("root", "You are helpful.", Arc::new(provider)));

    let (_rt, rx) = runtime(team, "root", Session::with_user_message("Hi"));
    let events = drain(rx).await;

    assert_eq!(
        kinds(&events),
        vec![
            "agent_info",
            "team_info",
            "toolset_info",
            "user_message",
            "stream_started",
            "agent_choice",
            "message_added",
            "token_usage",
            "stream_stopped",
        ]
    );

    match &events[3] {
        Event::UserMessage { content, .. } => assert_eq!(content, "Hi"),
        other => panic!("expected user_message, got {other:?}"),
    }
    match &events[5] {
        Event::AgentChoice { content, agent_context, .. } => {
            assert_eq!(content, "Hello");
            assert_eq!(agent_context.agent_name, "root");
        }
        other => panic!("expected agent_choice, got {other:?}"),
    }
    match &events[7] {
        Event::TokenUsage { usage, .. } => {
            assert_eq!(usage.input_tokens, 3);
            assert_eq!(usage.output_tokens, 2);
            assert_eq!(usage.total_tokens, 5);
            assert_eq!(usage.cost, 0.0);
            assert_eq!(usage.context_limit, 0);
        }
        other => panic!("expected token_usage, got {other:?}"),
    }
    assert_event_invariants(&events);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: 429 skips to the fallback and pins a cooldown
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn rate_limited_primary_uses_fallback_once_and_pins() {
    let primary = MockProvider::new("primary")
        .with_response(ScriptedResponse::error_status(429, "rate limited"));
    let fallback = MockProvider::new("fallback").with_text("ok");
    let primary_calls = primary.call_counter();
    let fallback_calls = fallback.call_counter();

    let agent = Agent::new("root", "inst", Arc::new(primary))
        .with_fallbacks(vec![Arc::new(fallback)]);
    let team = Team::single(agent);

    let (rt, rx) = runtime(team, "root", titled(Session::with_user_message("Hi")));
    let fallback_controller = rt.fallback_controller();
    let events = drain(rx).await;

    assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        rt.session().get_last_assistant_message_content().as_deref(),
        Some("ok")
    );
    assert_eq!(fallback_controller.pinned("root"), Some(0));
    assert!(events.iter().any(|e| e.kind() == "model_fallback"));
    assert_event_invariants(&events);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: retryable failures back off, fallback untouched
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn transient_503s_retry_the_primary_with_backoff() {
    let primary = MockProvider::new("primary")
        .with_response(ScriptedResponse::error_status(503, "unavailable"))
        .with_response(ScriptedResponse::error_status(503, "unavailable"))
        .with_text("recovered");
    let fallback = MockProvider::new("fallback");
    let primary_calls = primary.call_counter();
    let fallback_calls = fallback.call_counter();

    let agent = Agent::new("root", "inst", Arc::new(primary))
        .with_fallbacks(vec![Arc::new(fallback)]);
    let team = Team::single(agent);

    let started = tokio::time::Instant::now();
    let (rt, rx) = runtime(team, "root", titled(Session::with_user_message("Hi")));
    let events = drain(rx).await;
    let slept = started.elapsed();

    assert_eq!(primary_calls.load(Ordering::SeqCst), 3);
    assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        rt.session().get_last_assistant_message_content().as_deref(),
        Some("recovered")
    );
    // Two jittered backoffs: 200ms + 400ms, each within ±10%.
    assert!(slept >= std::time::Duration::from_millis(540), "slept {slept:?}");
    assert!(slept <= std::time::Duration::from_millis(660), "slept {slept:?}");
    assert!(!events.iter().any(|e| e.kind() == "model_fallback"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: max-iterations gate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn echo_toolset() -> FunctionToolset {
    FunctionToolset::new("local").register(
        Tool::new("echo", "echo", serde_json::json!({"type": "object"})).read_only(),
        |_ctx, _args| async move { Ok(ToolCallResult::ok("echoed")) },
    )
}

#[tokio::test]
async fn rejected_max_iterations_stops_with_stock_message() {
    let provider = MockProvider::new("mock")
        .with_response(ScriptedResponse::tool_call("c1", "echo", "{}"));
    let agent = Agent::new("root", "inst", Arc::new(provider))
        .with_toolsets(vec![Arc::new(echo_toolset())])
        .with_max_iterations(1);
    let team = Team::single(agent);

    let (rt, rx) = runtime(team, "root", titled(Session::with_user_message("go")));
    let rt_for_responder = rt.clone();
    let events = drain_with(rx, &rt_for_responder, |event| {
        matches!(event, Event::MaxIterationsReached { .. }).then_some(ResumeDecision::Reject)
    })
    .await;

    assert!(events.iter().any(|e| e.kind() == "max_iterations_reached"));
    assert_eq!(
        rt.session().get_last_assistant_message_content().as_deref(),
        Some("I have reached the maximum number of iterations (1). Stopping as requested by user.")
    );
    assert_event_invariants(&events);
}

#[tokio::test]
async fn approved_max_iterations_raises_the_ceiling() {
    let provider = MockProvider::new("mock")
        .with_response(ScriptedResponse::tool_call("c1", "echo", "{}"))
        .with_text("done");
    let agent = Agent::new("root", "inst", Arc::new(provider))
        .with_toolsets(vec![Arc::new(echo_toolset())])
        .with_max_iterations(1);
    let team = Team::single(agent);

    let (rt, rx) = runtime(team, "root", titled(Session::with_user_message("go")));
    let rt_for_responder = rt.clone();
    let events = drain_with(rx, &rt_for_responder, |event| {
        matches!(event, Event::MaxIterationsReached { .. }).then_some(ResumeDecision::Approve)
    })
    .await;

    assert_eq!(
        rt.session().get_last_assistant_message_content().as_deref(),
        Some("done")
    );
    assert_event_invariants(&events);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: permission denial
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn denied_tool_never_reaches_the_handler() {
    let invoked = Arc::new(AtomicBool::new(false));
    let invoked_probe = invoked.clone();
    let toolset = FunctionToolset::new("local").register(
        Tool::new("dangerous_tool", "danger", serde_json::json!({"type": "object"})),
        move |_ctx, _args| {
            let invoked = invoked_probe.clone();
            async move {
                invoked.store(true, Ordering::SeqCst);
                Ok(ToolCallResult::ok("ran"))
            }
        },
    );

    let provider = MockProvider::new("mock")
        .with_response(ScriptedResponse::tool_call("c1", "dangerous_tool", "{}"));
    let agent = Agent::new("root", "inst", Arc::new(provider))
        .with_toolsets(vec![Arc::new(toolset)])
        .with_permissions(Permissions {
            allow: vec![],
            deny: vec!["dangerous_tool".into()],
        });
    let team = Team::single(agent);

    let (_rt, rx) = runtime(team, "root", titled(Session::with_user_message("go")));
    let events = drain(rx).await;

    assert!(!invoked.load(Ordering::SeqCst), "handler must not run");
    let response = events
        .iter()
        .find_map(|e| match e {
            Event::ToolCallResponse { result, .. } => Some(result.clone()),
            _ => None,
        })
        .expect("a tool_call_response must be emitted");
    assert!(response.is_error);
    assert!(
        response.output.contains("denied by permissions"),
        "got: {}",
        response.output
    );
    assert_event_invariants(&events);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Confirmation flow
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn approve_session_confirms_once_then_auto_runs() {
    let toolset = FunctionToolset::new("local").register(
        Tool::new("write", "write", serde_json::json!({"type": "object"})),
        |_ctx, _args| async move { Ok(ToolCallResult::ok("written")) },
    );
    let provider = MockProvider::new("mock")
        .with_response(ScriptedResponse::tool_call("c1", "write", "{}"))
        .with_response(ScriptedResponse::tool_call("c2", "write", "{}"))
        .with_text("all done");
    let agent = Agent::new("root", "inst", Arc::new(provider))
        .with_toolsets(vec![Arc::new(toolset)]);
    let team = Team::single(agent);

    let (rt, rx) = runtime(team, "root", titled(Session::with_user_message("go")));
    let rt_for_responder = rt.clone();
    let events = drain_with(rx, &rt_for_responder, |event| {
        matches!(event, Event::ToolCallConfirmation { .. })
            .then_some(ResumeDecision::ApproveSession)
    })
    .await;

    let confirmations = events
        .iter()
        .filter(|e| e.kind() == "tool_call_confirmation")
        .count();
    assert_eq!(confirmations, 1, "second call must auto-run");
    assert!(rt.session().tools_approved());
    assert_eq!(
        rt.session().get_last_assistant_message_content().as_deref(),
        Some("all done")
    );
    assert_event_invariants(&events);
}

#[tokio::test]
async fn rejected_confirmation_synthesizes_error_result() {
    let toolset = FunctionToolset::new("local").register(
        Tool::new("write", "write", serde_json::json!({"type": "object"})),
        |_ctx, _args| async move { Ok(ToolCallResult::ok("written")) },
    );
    let provider = MockProvider::new("mock")
        .with_response(ScriptedResponse::tool_call("c1", "write", "{}"))
        .with_text("understood");
    let agent = Agent::new("root", "inst", Arc::new(provider))
        .with_toolsets(vec![Arc::new(toolset)]);
    let team = Team::single(agent);

    let (rt, rx) = runtime(team, "root", titled(Session::with_user_message("go")));
    let rt_for_responder = rt.clone();
    let events = drain_with(rx, &rt_for_responder, |event| {
        matches!(event, Event::ToolCallConfirmation { .. })
            .then_some(ResumeDecision::RejectWithReason("too risky".into()))
    })
    .await;

    let response = events
        .iter()
        .find_map(|e| match e {
            Event::ToolCallResponse { result, .. } => Some(result.clone()),
            _ => None,
        })
        .unwrap();
    assert!(response.is_error);
    assert!(response.output.contains("rejected by user: too risky"));
    assert_event_invariants(&events);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task transfer and handoff
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn transfer_task_runs_child_and_returns_its_answer() {
    let root_provider = MockProvider::new("root-model")
        .with_response(ScriptedResponse::tool_call(
            "c1",
            "transfer_task",
            r#"{"agent":"helper","task":"compute the thing"}"#,
        ))
        .with_text("wrapped up");
    let helper_provider = MockProvider::new("helper-model").with_text("result from helper");

    let team = Team::new(vec![
        Agent::new("root", "root inst", Arc::new(root_provider)),
        Agent::new("helper", "helper inst", Arc::new(helper_provider)),
    ]);

    let mut session = Session::with_user_message("go");
    session.tools_approved = true;
    let (rt, rx) = runtime(team, "root", titled(session));
    let events = drain(rx).await;

    let response = events
        .iter()
        .find_map(|e| match e {
            Event::ToolCallResponse { result, .. } => Some(result.clone()),
            _ => None,
        })
        .unwrap();
    assert!(!response.is_error);
    assert_eq!(response.output, "result from helper");

    assert!(events.iter().any(|e| e.kind() == "sub_session_completed"));
    // Child events are forwarded into the parent stream.
    assert!(events.iter().any(|e| matches!(
        e,
        Event::AgentChoice { agent_context, .. } if agent_context.agent_name == "helper"
    )));

    let has_sub_session = rt
        .session()
        .with(|s| s.items.iter().any(|i| matches!(i, Item::SubSession(_))));
    assert!(has_sub_session);
    assert_event_invariants(&events);
}

#[tokio::test]
async fn handoff_switches_current_agent() {
    let root_provider = MockProvider::new("root-model").with_response(
        ScriptedResponse::tool_call("c1", "handoff", r#"{"agent":"helper"}"#),
    );
    let helper_provider = MockProvider::new("helper-model").with_text("hello from helper");

    let team = Team::new(vec![
        Agent::new("root", "root inst", Arc::new(root_provider))
            .with_handoffs(vec!["helper".into()]),
        Agent::new("helper", "helper inst", Arc::new(helper_provider)),
    ]);

    let mut session = Session::with_user_message("go");
    session.tools_approved = true;
    let (rt, rx) = runtime(team, "root", titled(session));
    let events = drain(rx).await;

    assert!(events.iter().any(|e| matches!(
        e,
        Event::AgentSwitching { from, to, .. } if from == "root" && to == "helper"
    )));
    assert_eq!(rt.current_agent(), "helper");
    assert_eq!(
        rt.session().get_last_assistant_message_content().as_deref(),
        Some("hello from helper")
    );
    assert_event_invariants(&events);
}

#[tokio::test]
async fn handoff_to_unlisted_agent_is_rejected() {
    let root_provider = MockProvider::new("root-model")
        .with_response(ScriptedResponse::tool_call(
            "c1",
            "handoff",
            r#"{"agent":"stranger"}"#,
        ))
        .with_text("fine, staying");
    let helper_provider = MockProvider::new("helper-model");

    let team = Team::new(vec![
        Agent::new("root", "root inst", Arc::new(root_provider))
            .with_handoffs(vec!["helper".into()]),
        Agent::new("helper", "helper inst", Arc::new(helper_provider)),
    ]);

    let mut session = Session::with_user_message("go");
    session.tools_approved = true;
    let (rt, rx) = runtime(team, "root", titled(session));
    let events = drain(rx).await;

    let response = events
        .iter()
        .find_map(|e| match e {
            Event::ToolCallResponse { result, .. } => Some(result.clone()),
            _ => None,
        })
        .unwrap();
    assert!(response.is_error);
    assert!(response.output.contains("not a valid handoff target"));
    assert!(response.output.contains("helper"));
    assert_eq!(rt.current_agent(), "root");
    assert_event_invariants(&events);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Compaction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn over_budget_context_triggers_compaction() {
    let provider = MockProvider::new("tiny-model")
        .with_text("a long answer")
        .with_text("summary of the conversation");

    let catalog = InMemoryCatalog::with_models([ModelInfo {
        id: "tiny-model".into(),
        name: "Tiny".into(),
        context_limit: 5,
        cost: CostPerMillion {
            input: 1.0,
            output: 2.0,
            ..Default::default()
        },
    }]);

    let agent = Agent::new("root", "inst", Arc::new(provider));
    let team = Team::single(agent);

    let (rt, rx) = runtime_with_catalog(
        team,
        "root",
        titled(Session::with_user_message("talk a lot")),
        Arc::new(catalog),
    );
    let events = drain(rx).await;

    let compactions: Vec<_> = events
        .iter()
        .filter(|e| e.kind() == "session_compaction")
        .collect();
    assert_eq!(compactions.len(), 2, "started + completed");
    assert!(events.iter().any(|e| e.kind() == "session_summary"));

    let has_summary = rt
        .session()
        .with(|s| s.items.iter().any(|i| matches!(i, Item::Summary { .. })));
    assert!(has_summary);

    // Cost accounting uses the catalog rates.
    let usage_cost = events
        .iter()
        .find_map(|e| match e {
            Event::TokenUsage { usage, .. } => Some(usage.cost),
            _ => None,
        })
        .unwrap();
    assert!(usage_cost > 0.0);
    assert_event_invariants(&events);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Titling and cancellation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn untitled_session_gets_a_title_on_stop() {
    let provider = MockProvider::new("mock")
        .with_text("Hello there")
        .with_text("Friendly Greeting\nextra line");
    let team = Team::single(Agent::new("root", "inst", Arc::new(provider)));

    let (rt, rx) = runtime(team, "root", Session::with_user_message("Hi"));
    let events = drain(rx).await;

    let title = events.iter().find_map(|e| match e {
        Event::SessionTitle { title, .. } => Some(title.clone()),
        _ => None,
    });
    assert_eq!(title.as_deref(), Some("Friendly Greeting"));
    assert_eq!(rt.session().title().as_deref(), Some("Friendly Greeting"));

    // session_title arrives before the final stream_stopped.
    let title_at = events.iter().position(|e| e.kind() == "session_title").unwrap();
    let stopped_at = events
        .iter()
        .rposition(|e| e.kind() == "stream_stopped")
        .unwrap();
    assert!(title_at < stopped_at);
}

#[tokio::test]
async fn cancelled_runtime_still_emits_stream_stopped() {
    let provider = MockProvider::new("mock").with_text("never read");
    let team = Team::single(Agent::new("root", "inst", Arc::new(provider)));

    let handle = SessionHandle::new(
        titled(Session::with_user_message("Hi")),
        Arc::new(NullSessionStore),
    );
    let rt = Arc::new(Runtime::new(
        Arc::new(team),
        "root",
        handle,
        Arc::new(InMemoryCatalog::new()),
    ));
    rt.cancel();
    let rx = rt.clone().run_stream();
    let events = drain(rx).await;

    assert_eq!(events.last().map(|e| e.kind()), Some("stream_stopped"));
    assert!(!events.iter().any(|e| e.kind() == "error"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Unknown tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn unknown_tool_is_skipped_without_a_tool_message() {
    let provider = MockProvider::new("mock")
        .with_response(ScriptedResponse::tool_call("c1", "no_such_tool", "{}"))
        .with_text("moving on");
    let team = Team::single(Agent::new("root", "inst", Arc::new(provider)));

    let (rt, rx) = runtime(team, "root", titled(Session::with_user_message("go")));
    let events = drain(rx).await;

    assert!(!events.iter().any(|e| e.kind() == "tool_call"));
    assert!(!events.iter().any(|e| e.kind() == "tool_call_response"));
    let tool_messages = rt.session().with(|s| {
        s.all_messages()
            .iter()
            .filter(|m| m.tool_call_id.is_some())
            .count()
    });
    assert_eq!(tool_messages, 0);
    assert_event_invariants(&events);
}
