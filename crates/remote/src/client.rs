//! The remote runtime: same contract, events from over the wire.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ens_domain::error::{Error, Result};
use ens_domain::event::{ElicitationAction, ElicitationResponse, Event};
use ens_runtime::{ResumeDecision, SessionRuntime};
use ens_sessions::SessionHandle;

use crate::oauth;
use crate::sse::drain_data_lines;

/// Buffer matching the local runtime's event channel.
const EVENT_BUFFER: usize = 128;

/// Agent context attached to shim-originated events (transport errors,
/// authorization progress).
const SHIM_AGENT: &str = "remote";

pub struct RemoteRuntime {
    base_url: String,
    http: reqwest::Client,
    session: SessionHandle,
    tx: Mutex<Option<mpsc::Sender<Event>>>,
    receiver: Mutex<Option<mpsc::Receiver<Event>>>,
    cancel: CancellationToken,
}

impl RemoteRuntime {
    pub fn new(base_url: impl Into<String>, session: SessionHandle) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            session,
            tx: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            cancel: CancellationToken::new(),
        }
    }

    /// Forward one event to the local consumer; quietly discarded once
    /// the stream has closed.
    async fn emit(&self, event: Event) {
        let sender = self.tx.lock().clone();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    fn session_url(&self, suffix: &str) -> String {
        format!("{}/sessions/{}{suffix}", self.base_url, self.session.id())
    }

    async fn stream_loop(self: Arc<Self>) {
        let session_id = self.session.id();

        // Session messages travel up in the shared wire format.
        let payload = serde_json::json!({
            "session_id": session_id,
            "messages": self.session.get_all_messages(),
            "tools_approved": self.session.tools_approved(),
        });

        let response = self
            .http
            .post(self.session_url("/stream"))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        let mut response = match response {
            Ok(response) => response,
            Err(e) => {
                self.emit(Event::error(
                    SHIM_AGENT,
                    Some(session_id.clone()),
                    format!("remote stream failed: {e}"),
                ))
                .await;
                self.tx.lock().take();
                return;
            }
        };

        let mut buffer = String::new();
        loop {
            let chunk = tokio::select! {
                chunk = response.chunk() => chunk,
                _ = self.cancel.cancelled() => break,
            };
            match chunk {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for data in drain_data_lines(&mut buffer) {
                        self.republish(&data).await;
                    }
                }
                Ok(None) => {
                    // Flush a trailing partial event, then close.
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                        for data in drain_data_lines(&mut buffer) {
                            self.republish(&data).await;
                        }
                    }
                    break;
                }
                Err(e) => {
                    self.emit(Event::error(
                        SHIM_AGENT,
                        Some(session_id.clone()),
                        format!("remote stream failed: {e}"),
                    ))
                    .await;
                    break;
                }
            }
        }

        // End-of-stream for the local consumer.
        self.tx.lock().take();
    }

    /// Parse one `data:` payload by its `type` tag and forward it.
    async fn republish(self: &Arc<Self>, data: &str) {
        let event: Event = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, payload = data, "unparseable remote event, skipping");
                return;
            }
        };

        if let Event::ElicitationRequest { request_id, meta, .. } = &event {
            if let Some(server) = oauth_server_from_meta(meta) {
                let shim = self.clone();
                let request_id = request_id.clone();
                tokio::spawn(async move {
                    shim.handle_oauth_elicitation(request_id, server).await;
                });
            }
        }

        self.emit(event).await;
    }

    /// Drive the browser flow and answer the elicitation either way.
    async fn handle_oauth_elicitation(self: Arc<Self>, request_id: String, server: String) {
        self.emit(Event::authorization(
            SHIM_AGENT,
            server.clone(),
            "starting interactive authorization",
        ))
        .await;

        let response = match oauth::authorize(&self.http, &server, &self.cancel).await {
            Ok(grant) => ElicitationResponse {
                action: ElicitationAction::Accept,
                content: Some(grant.to_json()),
            },
            Err(e) => {
                tracing::warn!(server = %server, error = %e, "authorization failed, declining");
                ElicitationResponse {
                    action: ElicitationAction::Decline,
                    content: None,
                }
            }
        };

        if let Err(e) = self.resume_elicitation(&request_id, response).await {
            tracing::warn!(error = %e, "failed to forward elicitation response");
        }
    }
}

/// Wire form of a resume decision.
pub(crate) fn decision_payload(decision: &ResumeDecision) -> serde_json::Value {
    match decision {
        ResumeDecision::Approve => serde_json::json!({ "decision": "approve" }),
        ResumeDecision::ApproveSession => serde_json::json!({ "decision": "approve-session" }),
        ResumeDecision::Reject => serde_json::json!({ "decision": "reject" }),
        ResumeDecision::RejectWithReason(reason) => serde_json::json!({
            "decision": "reject-with-reason",
            "reason": reason,
        }),
    }
}

/// An elicitation asks for OAuth when its metadata names a server.
fn oauth_server_from_meta(meta: &serde_json::Value) -> Option<String> {
    meta.get("oauth")
        .and_then(|oauth| oauth.get("authorization_server"))
        .or_else(|| meta.get("authorization_server"))
        .and_then(|value| value.as_str())
        .map(String::from)
}

#[async_trait::async_trait]
impl SessionRuntime for RemoteRuntime {
    fn run_stream(self: Arc<Self>) -> mpsc::Receiver<Event> {
        let rx = match self.receiver.lock().take() {
            Some(rx) => rx,
            None => {
                tracing::error!("run_stream called twice on one remote runtime");
                let (_, rx) = mpsc::channel(1);
                return rx;
            }
        };
        tokio::spawn(self.stream_loop());
        rx
    }

    async fn resume(&self, decision: ResumeDecision) -> Result<()> {
        self.http
            .post(self.session_url("/resume"))
            .json(&decision_payload(&decision))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(())
    }

    async fn resume_elicitation(
        &self,
        request_id: &str,
        response: ElicitationResponse,
    ) -> Result<()> {
        self.http
            .post(self.session_url(&format!("/elicitations/{request_id}")))
            .json(&response)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(())
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
