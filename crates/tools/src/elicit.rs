//! Elicitation rendezvous — server-to-client requests for user input
//! raised in the middle of a tool call.
//!
//! A handler registers a pending request and awaits its oneshot; the
//! runtime forwards the matching `resume_elicitation` response by id.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use ens_domain::error::{Error, Result};
use ens_domain::event::{ElicitationAction, ElicitationResponse};

/// An outbound elicitation raised by a tool handler.
#[derive(Debug)]
pub struct ElicitationRequest {
    pub request_id: String,
    pub message: String,
    pub schema: serde_json::Value,
    pub meta: serde_json::Value,
}

/// Channel half given to tool handlers for raising elicitations.
pub type ElicitationSender = mpsc::Sender<ElicitationRequest>;

/// Tracks pending elicitations and resolves them by request id.
#[derive(Default)]
pub struct ElicitationCoordinator {
    pending: Mutex<HashMap<String, oneshot::Sender<ElicitationResponse>>>,
}

impl ElicitationCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a request and wait for its response, racing cancellation.
    pub async fn wait(
        &self,
        request_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ElicitationResponse> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.to_string(), tx);

        let result = tokio::select! {
            response = rx => response.map_err(|_| Error::Canceled),
            _ = cancel.cancelled() => Err(Error::Canceled),
        };
        self.pending.lock().remove(request_id);
        result
    }

    /// Resolve a pending request. Returns `false` when the id is unknown
    /// (stray responses are dropped).
    pub fn resolve(&self, request_id: &str, response: ElicitationResponse) -> bool {
        if let Some(tx) = self.pending.lock().remove(request_id) {
            return tx.send(response).is_ok();
        }
        false
    }

    /// Decline every pending request (used on shutdown).
    pub fn decline_all(&self) {
        let mut pending = self.pending.lock();
        for (_, tx) in pending.drain() {
            let _ = tx.send(ElicitationResponse {
                action: ElicitationAction::Decline,
                content: None,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_unblocks_waiter() {
        let coordinator = ElicitationCoordinator::new();
        let cancel = CancellationToken::new();

        let waiter = {
            let coordinator = coordinator.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { coordinator.wait("r1", &cancel).await })
        };

        // Let the waiter register.
        tokio::task::yield_now().await;
        assert!(coordinator.resolve(
            "r1",
            ElicitationResponse {
                action: ElicitationAction::Accept,
                content: Some(serde_json::json!({"ok": true})),
            }
        ));

        let response = waiter.await.unwrap().unwrap();
        assert_eq!(response.action, ElicitationAction::Accept);
    }

    #[tokio::test]
    async fn stray_response_is_dropped() {
        let coordinator = ElicitationCoordinator::new();
        assert!(!coordinator.resolve(
            "unknown",
            ElicitationResponse {
                action: ElicitationAction::Accept,
                content: None,
            }
        ));
    }

    #[tokio::test]
    async fn cancellation_fails_the_wait() {
        let coordinator = ElicitationCoordinator::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = coordinator.wait("r1", &cancel).await;
        assert!(matches!(result, Err(Error::Canceled)));
    }
}
