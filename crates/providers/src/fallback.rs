//! Fallback controller: retry schedule, chain walk, cooldown pinning.
//!
//! A chain is `[primary, fallback₁, …, fallbackₙ]`. Each model is tried
//! `1 + retries` times with exponential backoff between attempts;
//! non-retryable failures advance to the next model immediately. When the
//! primary fails non-retryably and a fallback then succeeds, the fallback
//! is pinned for a cooldown window so subsequent calls skip the primary.
//!
//! The cooldown map is owned by the controller instance, never by a
//! process-wide singleton.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ens_domain::config::RetryConfig;
use ens_domain::error::{Error, Result};
use ens_domain::event::Event;
use ens_domain::trace::TraceEvent;

use crate::classify::{classify, Disposition};
use crate::traits::Provider;

/// Default pinning window after the primary fails over.
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// One slot of a fallback chain.
pub type ChainEntry = Arc<dyn Provider>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Options
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-agent tuning for the chain walk.
#[derive(Debug, Clone, Default)]
pub struct FallbackOptions {
    /// Extra attempts per model. `None` = 2 when fallbacks exist, 0
    /// otherwise; `-1` = explicitly no retries.
    pub retries: Option<i32>,
    /// Cooldown window override.
    pub cooldown: Option<Duration>,
    pub retry: RetryConfig,
}

impl FallbackOptions {
    fn attempts_per_model(&self, chain_len: usize) -> u32 {
        let retries = match self.retries {
            Some(r) if r < 0 => 0,
            Some(r) => r as u32,
            None if chain_len > 1 => 2,
            None => 0,
        };
        1 + retries
    }

    fn cooldown(&self) -> Duration {
        self.cooldown.unwrap_or(DEFAULT_COOLDOWN)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cooldown state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy)]
struct CooldownEntry {
    /// Index into the fallback list (0 = first fallback).
    pinned_index: usize,
    expires_at: Instant,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Controller
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drives model attempts through a fallback chain with per-agent
/// cooldown pinning. One instance per runtime.
#[derive(Default)]
pub struct FallbackController {
    cooldowns: Mutex<HashMap<String, CooldownEntry>>,
}

impl FallbackController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently pinned fallback index for an agent, if the cooldown is
    /// still live. Expired entries are removed on read.
    pub fn pinned(&self, agent: &str) -> Option<usize> {
        let mut map = self.cooldowns.lock();
        match map.get(agent) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.pinned_index),
            Some(_) => {
                map.remove(agent);
                None
            }
            None => None,
        }
    }

    fn pin(&self, agent: &str, fallback_index: usize, window: Duration) {
        TraceEvent::CooldownPinned {
            agent: agent.to_string(),
            fallback_index,
            expires_in_ms: window.as_millis() as u64,
        }
        .emit();
        self.cooldowns.lock().insert(
            agent.to_string(),
            CooldownEntry {
                pinned_index: fallback_index,
                expires_at: Instant::now() + window,
            },
        );
    }

    fn clear(&self, agent: &str) {
        self.cooldowns.lock().remove(agent);
    }

    /// Run `attempt` against the chain until one model succeeds, the
    /// chain is exhausted, or the context is canceled.
    ///
    /// `attempt` receives the provider to try and performs the whole
    /// model interaction (request plus stream consumption), so transport
    /// errors surfacing mid-stream participate in the retry schedule.
    pub async fn execute<T, F, Fut>(
        &self,
        agent: &str,
        chain: &[ChainEntry],
        opts: &FallbackOptions,
        events: &mpsc::Sender<Event>,
        cancel: &CancellationToken,
        mut attempt: F,
    ) -> Result<T>
    where
        F: FnMut(ChainEntry) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if chain.is_empty() {
            return Err(Error::Config(format!("agent {agent} has no providers")));
        }

        let attempts_per_model = opts.attempts_per_model(chain.len());

        // An unexpired cooldown skips straight into the pinned fallback.
        let start_index = match self.pinned(agent) {
            Some(fallback_index) if fallback_index + 1 < chain.len() => fallback_index + 1,
            _ => 0,
        };

        let mut primary_failed_hard = false;
        let mut last_err: Option<Error> = None;

        for model_index in start_index..chain.len() {
            let provider = chain[model_index].clone();
            let mut advance_reason: Option<String> = None;

            'attempts: for attempt_no in 0..attempts_per_model {
                if cancel.is_cancelled() {
                    return Err(Error::Canceled);
                }

                let started = Instant::now();
                let result = attempt(provider.clone()).await;
                TraceEvent::ModelRequest {
                    agent: agent.to_string(),
                    model: provider.id().to_string(),
                    attempt: attempt_no + 1,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
                .emit();

                match result {
                    Ok(value) => {
                        if model_index == 0 {
                            self.clear(agent);
                        } else if primary_failed_hard {
                            self.pin(agent, model_index - 1, opts.cooldown());
                        }
                        return Ok(value);
                    }
                    Err(err) => match classify(&err) {
                        Disposition::Abort => return Err(err),
                        Disposition::Retry => {
                            tracing::warn!(
                                agent,
                                model = provider.id(),
                                attempt = attempt_no + 1,
                                error = %err,
                                "model attempt failed, will retry"
                            );
                            advance_reason = Some(err.to_string());
                            last_err = Some(err);
                            if attempt_no + 1 < attempts_per_model {
                                self.backoff(opts, attempt_no, cancel).await?;
                            }
                        }
                        Disposition::Advance => {
                            tracing::warn!(
                                agent,
                                model = provider.id(),
                                error = %err,
                                "model failed non-retryably, advancing"
                            );
                            if model_index == 0 {
                                primary_failed_hard = true;
                            }
                            advance_reason = Some(err.to_string());
                            last_err = Some(err);
                            break 'attempts;
                        }
                    },
                }
            }

            // Attempts exhausted (or a hard failure): advance the chain.
            if model_index + 1 < chain.len() {
                let reason = advance_reason.unwrap_or_else(|| "model unavailable".into());
                TraceEvent::ModelFallback {
                    agent: agent.to_string(),
                    from_model: provider.id().to_string(),
                    to_model: chain[model_index + 1].id().to_string(),
                    reason: reason.clone(),
                }
                .emit();
                let _ = events
                    .send(Event::model_fallback(
                        agent,
                        provider.id(),
                        chain[model_index + 1].id(),
                        reason,
                        model_index as u32 + 1,
                        chain.len() as u32,
                    ))
                    .await;
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::provider(agent.to_string(), "model chain exhausted".to_string())
        }))
    }

    /// Sleep `base·factor^attempt ± 10 %`, capped at the max, racing the
    /// cancellation token.
    async fn backoff(
        &self,
        opts: &FallbackOptions,
        attempt_no: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let base = opts.retry.delay_for_attempt(attempt_no);
        let jitter = 0.9 + rand::random::<f64>() * 0.2;
        let delay = Duration::from_secs_f64(base.as_secs_f64() * jitter);

        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = cancel.cancelled() => Err(Error::Canceled),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
