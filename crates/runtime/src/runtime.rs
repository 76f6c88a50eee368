//! The per-session runtime loop.
//!
//! One cooperative task per session: it owns the event channel, walks the
//! iteration loop (tools → stream → decode → compact → execute), and
//! finalizes with an optional title run. `stream_stopped` always fires,
//! including on cancellation and terminal errors.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ens_domain::chat::{Message, Role};
use ens_domain::error::{Error, Result};
use ens_domain::event::{CompactionStatus, ElicitationResponse, Event};
use ens_domain::tool::Tool;
use ens_domain::trace::TraceEvent;
use ens_providers::catalog::{ModelCatalog, ModelInfo};
use ens_providers::{ChatStreamRequest, FallbackController};
use ens_sessions::{Item, SessionHandle};
use ens_team::{Agent, Team};
use ens_tools::elicit::{ElicitationCoordinator, ElicitationRequest};
use ens_tools::Toolset;

use crate::bus::EventBus;
use crate::decode::decode_stream;
use crate::resume::{ResumeDecision, ResumeSignal};
use crate::summarize;
use crate::transfer;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runtime contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The session-runtime contract shared by the local runtime and the
/// remote shim. Callers consume the receiver returned by `run_stream`
/// and feed decisions back through the resume methods.
#[async_trait::async_trait]
pub trait SessionRuntime: Send + Sync {
    /// Start the loop; events arrive on the returned channel. Callable
    /// once per runtime.
    fn run_stream(self: Arc<Self>) -> mpsc::Receiver<Event>;

    /// Deliver a tool-approval or max-iterations decision.
    async fn resume(&self, decision: ResumeDecision) -> Result<()>;

    /// Answer a pending elicitation by request id.
    async fn resume_elicitation(&self, request_id: &str, response: ElicitationResponse)
        -> Result<()>;

    /// Request cooperative shutdown.
    fn cancel(&self);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Options
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-run overrides, mainly used by the one-shot summarize/title runs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Overrides the session thinking toggle when set.
    pub thinking_override: Option<bool>,
    pub max_tokens: Option<u32>,
    pub structured_output: bool,
    pub generate_title: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            thinking_override: None,
            max_tokens: None,
            structured_output: true,
            generate_title: true,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runtime
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Runtime {
    pub(crate) team: Arc<Team>,
    pub(crate) current_agent: Mutex<String>,
    pub(crate) session: SessionHandle,
    pub(crate) catalog: Arc<dyn ModelCatalog>,
    pub(crate) fallback: Arc<FallbackController>,
    pub(crate) events: EventBus,
    receiver: Mutex<Option<mpsc::Receiver<Event>>>,
    pub(crate) resume_signal: ResumeSignal,
    pub(crate) elicitations: Arc<ElicitationCoordinator>,
    pub(crate) cancel_token: CancellationToken,
    info_sent: AtomicBool,
    pub(crate) options: RunOptions,
}

impl Runtime {
    pub fn new(
        team: Arc<Team>,
        agent: impl Into<String>,
        session: SessionHandle,
        catalog: Arc<dyn ModelCatalog>,
    ) -> Self {
        let (events, rx) = EventBus::channel();
        Self {
            team,
            current_agent: Mutex::new(agent.into()),
            session,
            catalog,
            fallback: Arc::new(FallbackController::new()),
            events,
            receiver: Mutex::new(Some(rx)),
            resume_signal: ResumeSignal::new(),
            elicitations: ElicitationCoordinator::new(),
            cancel_token: CancellationToken::new(),
            info_sent: AtomicBool::new(false),
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Share the fallback controller (and thus cooldown state) of a
    /// parent runtime; used for task transfers.
    pub fn with_fallback_controller(mut self, fallback: Arc<FallbackController>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Chain a parent's cancellation so a stopped parent stops children.
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.cancel_token = parent.child_token();
        self
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn current_agent(&self) -> String {
        self.current_agent.lock().clone()
    }

    pub fn fallback_controller(&self) -> Arc<FallbackController> {
        self.fallback.clone()
    }

    // ── Loop internals ────────────────────────────────────────────

    async fn run_loop(self: Arc<Self>) {
        let session_id = self.session.id();

        let mut agent = match self.team.require(&self.current_agent()) {
            Ok(agent) => agent,
            Err(e) => {
                self.events
                    .send(Event::error(
                        self.current_agent(),
                        Some(session_id.clone()),
                        e.to_string(),
                    ))
                    .await;
                self.events
                    .send(Event::stream_stopped(self.current_agent(), session_id))
                    .await;
                self.events.close();
                return;
            }
        };

        TraceEvent::SessionStart {
            session_id: session_id.clone(),
            agent: agent.name().to_string(),
        }
        .emit();

        // Elicitations raised by tool handlers surface as events.
        let (elicit_tx, mut elicit_rx) = mpsc::channel::<ElicitationRequest>(8);
        let forwarder = {
            let events = self.events.clone();
            let agent_name = agent.name().to_string();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                while let Some(req) = elicit_rx.recv().await {
                    events
                        .send(Event::elicitation_request(
                            agent_name.clone(),
                            session_id.clone(),
                            req.request_id,
                            req.message,
                            req.schema,
                            req.meta,
                        ))
                        .await;
                }
            })
        };

        if !self.info_sent.swap(true, Ordering::SeqCst) {
            self.emit_info(&agent).await;
        }

        if let Some(content) = self.pending_user_message() {
            self.events
                .send(Event::user_message(agent.name(), session_id.clone(), content))
                .await;
        }

        self.events
            .send(Event::stream_started(agent.name(), session_id.clone()))
            .await;

        let mut ceiling = if self.session.max_iterations() > 0 {
            self.session.max_iterations()
        } else {
            agent.max_iterations()
        };
        let mut completed: usize = 0;

        loop {
            if self.cancel_token.is_cancelled() {
                break;
            }

            // ── Iteration ceiling ─────────────────────────────────
            if ceiling > 0 && completed >= ceiling {
                let armed = self.resume_signal.arm();
                self.events
                    .send(Event::max_iterations_reached(
                        agent.name(),
                        session_id.clone(),
                        ceiling,
                    ))
                    .await;
                match self.resume_signal.wait(armed, &self.cancel_token).await {
                    Ok(ResumeDecision::Approve) | Ok(ResumeDecision::ApproveSession) => {
                        ceiling += 10;
                        continue;
                    }
                    Ok(_) => {
                        let message = Message::assistant(format!(
                            "I have reached the maximum number of iterations ({ceiling}). \
                             Stopping as requested by user."
                        ));
                        self.session.add_message(message.clone());
                        self.events
                            .send(Event::message_added(agent.name(), session_id.clone(), message))
                            .await;
                        break;
                    }
                    Err(_) => break,
                }
            }
            completed += 1;

            // ── GettingTools ──────────────────────────────────────
            let (tool_list, tools_by_name) = self.collect_tools(&agent).await;

            // ── Streaming + decoding via the fallback controller ──
            let model_info = self.catalog.get_model(agent.model_id());
            let request = ChatStreamRequest {
                messages: self.session.get_messages(agent.instruction()),
                tools: tool_list,
                thinking: self
                    .options
                    .thinking_override
                    .unwrap_or_else(|| self.session.thinking_enabled()),
                max_tokens: self.options.max_tokens,
                structured_output: self.options.structured_output,
            };

            let chain = agent.chain();
            let opts = agent.fallback_options();
            let events_sender = self
                .events
                .raw_sender()
                .unwrap_or_else(|| tokio::sync::mpsc::channel(1).0);
            let agent_name = agent.name().to_string();

            let outcome = self
                .fallback
                .execute(
                    &agent_name,
                    &chain,
                    &opts,
                    &events_sender,
                    &self.cancel_token,
                    |provider| {
                        let request = request.clone();
                        let session = self.session.clone();
                        let events = self.events.clone();
                        let cancel = self.cancel_token.clone();
                        let model_info = model_info.clone();
                        let agent_name = agent_name.clone();
                        async move {
                            let stream = provider.create_chat_completion_stream(request).await?;
                            decode_stream(
                                stream,
                                &agent_name,
                                &session,
                                model_info.as_ref(),
                                &events,
                                &cancel,
                            )
                            .await
                        }
                    },
                )
                .await;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(Error::Canceled) => break,
                Err(e) => {
                    self.events
                        .send(Event::error(agent.name(), Some(session_id.clone()), e.to_string()))
                        .await;
                    break;
                }
            };

            // ── Compaction (pre): safe only with no pending calls ──
            if outcome.calls.is_empty() {
                self.maybe_compact(&agent, model_info.as_ref()).await;
            }

            // ── ExecutingTools ────────────────────────────────────
            let mut executed_tools = false;
            if !outcome.calls.is_empty() {
                let exec = self
                    .execute_tool_calls(&agent, &tools_by_name, &outcome.calls, &elicit_tx)
                    .await;
                executed_tools = exec.executed > 0;

                if let Some(next) = exec.switch_to {
                    match self.team.require(&next) {
                        Ok(next_agent) => {
                            *self.current_agent.lock() = next.clone();
                            agent = next_agent;
                        }
                        Err(e) => {
                            self.events
                                .send(Event::warning(
                                    agent.name(),
                                    Some(session_id.clone()),
                                    e.to_string(),
                                ))
                                .await;
                        }
                    }
                }
                if exec.canceled {
                    break;
                }
            }

            // ── Compaction (post): tool results are attached now ──
            if executed_tools {
                self.maybe_compact(&agent, model_info.as_ref()).await;
            }

            if outcome.stopped {
                break;
            }
        }

        // ── Terminating ───────────────────────────────────────────
        drop(elicit_tx);
        self.elicitations.decline_all();
        let _ = forwarder.await;

        if self.options.generate_title
            && !self.session.is_sub_session()
            && self.session.title().is_none()
            && !self.session.get_all_messages().is_empty()
        {
            summarize::generate_title(self.as_ref(), &agent).await;
        }

        self.events
            .send(Event::stream_stopped(agent.name(), session_id.clone()))
            .await;
        self.events.close();
        TraceEvent::SessionEnd {
            session_id,
            agent: agent.name().to_string(),
            iterations: completed,
        }
        .emit();
    }

    async fn emit_info(&self, agent: &Arc<Agent>) {
        self.events
            .send(Event::agent_info(agent.name(), agent.instruction()))
            .await;
        self.events
            .send(Event::team_info(agent.name(), self.team.agent_names()))
            .await;
        let mut toolsets: Vec<String> = agent
            .toolsets()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        toolsets.extend(
            transfer::builtin_tools(&self.team, agent)
                .into_iter()
                .map(|t| t.name),
        );
        self.events
            .send(Event::toolset_info(agent.name(), toolsets))
            .await;
    }

    /// Union of the agent's toolset tools plus the built-ins, with
    /// `mcp_init` bracketing when live toolsets are involved. Listing
    /// failures degrade to warnings.
    async fn collect_tools(
        &self,
        agent: &Arc<Agent>,
    ) -> (Vec<Tool>, HashMap<String, (Tool, Arc<dyn Toolset>)>) {
        let session_id = self.session.id();
        let mut tool_list: Vec<Tool> = Vec::new();
        let mut tools_by_name: HashMap<String, (Tool, Arc<dyn Toolset>)> = HashMap::new();

        let toolsets = agent.toolsets();
        if !toolsets.is_empty() {
            self.events.send(Event::mcp_init_started(agent.name())).await;
            for toolset in toolsets {
                match toolset.tools().await {
                    Ok(tools) => {
                        for tool in tools {
                            if tools_by_name.contains_key(&tool.name) {
                                continue;
                            }
                            tool_list.push(tool.clone());
                            tools_by_name.insert(tool.name.clone(), (tool, toolset.clone()));
                        }
                    }
                    Err(e) => {
                        self.events
                            .send(Event::warning(
                                agent.name(),
                                Some(session_id.clone()),
                                format!("toolset {} failed to list tools: {e}", toolset.name()),
                            ))
                            .await;
                    }
                }
            }
            self.events.send(Event::mcp_init_finished(agent.name())).await;
        }

        tool_list.extend(transfer::builtin_tools(&self.team, agent));
        (tool_list, tools_by_name)
    }

    async fn maybe_compact(&self, agent: &Arc<Agent>, model: Option<&ModelInfo>) {
        let Some(model) = model else { return };
        if model.context_limit == 0 {
            return;
        }
        let (input, output, _) = self.session.tokens_and_cost();
        let threshold = (model.context_limit as f64 * 0.9) as u64;
        if input + output <= threshold {
            return;
        }

        let session_id = self.session.id();
        self.events
            .send(Event::session_compaction(
                agent.name(),
                session_id.clone(),
                CompactionStatus::Started,
            ))
            .await;

        match summarize::compact_session(self, agent).await {
            Ok(Some(summary)) => {
                self.session.add_summary(&summary);
                TraceEvent::SessionCompacted {
                    session_id: session_id.clone(),
                    summary_chars: summary.len(),
                }
                .emit();
                self.events
                    .send(Event::session_summary(agent.name(), session_id.clone(), summary))
                    .await;
            }
            Ok(None) => {}
            Err(e) => {
                self.events
                    .send(Event::warning(
                        agent.name(),
                        Some(session_id.clone()),
                        format!("compaction failed: {e}"),
                    ))
                    .await;
            }
        }

        self.events
            .send(Event::session_compaction(
                agent.name(),
                session_id,
                CompactionStatus::Completed,
            ))
            .await;
    }

    /// The trailing user message, if the conversation ends with one that
    /// no assistant turn has answered yet.
    fn pending_user_message(&self) -> Option<String> {
        self.session.with(|session| {
            session
                .items
                .iter()
                .rev()
                .find_map(|item| match item {
                    Item::Message(message) => Some(message),
                    _ => None,
                })
                .filter(|message| message.role == Role::User)
                .map(|message| message.content.text())
        })
    }
}

#[async_trait::async_trait]
impl SessionRuntime for Runtime {
    fn run_stream(self: Arc<Self>) -> mpsc::Receiver<Event> {
        let rx = match self.receiver.lock().take() {
            Some(rx) => rx,
            None => {
                tracing::error!("run_stream called twice on one runtime");
                let (_, rx) = mpsc::channel(1);
                return rx;
            }
        };

        // Type-erase the loop future: task transfers recurse through
        // here, and the erasure keeps the future type finite.
        let fut: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(self.run_loop());
        tokio::spawn(fut);
        rx
    }

    async fn resume(&self, decision: ResumeDecision) -> Result<()> {
        if !self.resume_signal.resume(decision) {
            tracing::debug!("resume decision arrived with nothing waiting, dropped");
        }
        Ok(())
    }

    async fn resume_elicitation(
        &self,
        request_id: &str,
        response: ElicitationResponse,
    ) -> Result<()> {
        if !self.elicitations.resolve(request_id, response) {
            tracing::debug!(request_id, "elicitation response for unknown request, dropped");
        }
        Ok(())
    }

    fn cancel(&self) {
        self.cancel_token.cancel();
    }
}
