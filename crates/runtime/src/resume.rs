//! Resume rendezvous — out-of-band decisions for tool approval and
//! max-iterations gating.
//!
//! One signal per runtime. The waiting side arms a slot *before* the
//! prompting event is emitted, so a consumer answering immediately can
//! never race the registration; `resume` resolves the armed slot if one
//! is pending and drops the decision otherwise, so a stray user click
//! cannot stall the runtime.

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use ens_domain::error::{Error, Result};

/// A decision delivered through the resume protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeDecision {
    Approve,
    /// Approve and set the session-wide tools-approved bit.
    ApproveSession,
    Reject,
    RejectWithReason(String),
}

/// An armed wait slot; await it after emitting the prompting event.
pub struct Armed {
    rx: oneshot::Receiver<ResumeDecision>,
}

#[derive(Default)]
pub struct ResumeSignal {
    pending: Mutex<Option<oneshot::Sender<ResumeDecision>>>,
}

impl ResumeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the wait slot. Any previously armed slot is replaced.
    pub fn arm(&self) -> Armed {
        let (tx, rx) = oneshot::channel();
        *self.pending.lock() = Some(tx);
        Armed { rx }
    }

    /// Wait on an armed slot, racing cancellation.
    pub async fn wait(&self, armed: Armed, cancel: &CancellationToken) -> Result<ResumeDecision> {
        tokio::select! {
            decision = armed.rx => decision.map_err(|_| Error::Canceled),
            _ = cancel.cancelled() => {
                self.pending.lock().take();
                Err(Error::Canceled)
            }
        }
    }

    /// Deliver a decision. Returns `false` when nothing was armed
    /// (the decision is dropped).
    pub fn resume(&self, decision: ResumeDecision) -> bool {
        if let Some(tx) = self.pending.lock().take() {
            return tx.send(decision).is_ok();
        }
        false
    }
}
