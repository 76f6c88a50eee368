//! Scripted mock provider for tests.
//!
//! Each call pops the next [`ScriptedResponse`]; an exhausted script
//! yields an immediate stop. The mock records every request so tests can
//! assert on call counts and request contents.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use ens_domain::error::{Error, Result};
use ens_domain::stream::{
    DeltaBody, FinishReason, StreamChoice, StreamDelta, ToolCallFragment, Usage,
};

use crate::traits::{ChatStreamRequest, DeltaStream, Provider};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Delta constructors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn content_delta(text: impl Into<String>) -> StreamDelta {
    StreamDelta {
        usage: None,
        choice: Some(StreamChoice {
            finish_reason: None,
            delta: DeltaBody {
                content: Some(text.into()),
                ..Default::default()
            },
        }),
    }
}

pub fn reasoning_delta(text: impl Into<String>) -> StreamDelta {
    StreamDelta {
        usage: None,
        choice: Some(StreamChoice {
            finish_reason: None,
            delta: DeltaBody {
                reasoning_content: Some(text.into()),
                ..Default::default()
            },
        }),
    }
}

pub fn signature_delta(signature: impl Into<String>) -> StreamDelta {
    StreamDelta {
        usage: None,
        choice: Some(StreamChoice {
            finish_reason: None,
            delta: DeltaBody {
                thinking_signature: Some(signature.into()),
                ..Default::default()
            },
        }),
    }
}

pub fn tool_fragment_delta(fragment: ToolCallFragment) -> StreamDelta {
    StreamDelta {
        usage: None,
        choice: Some(StreamChoice {
            finish_reason: None,
            delta: DeltaBody {
                tool_calls: vec![fragment],
                ..Default::default()
            },
        }),
    }
}

pub fn usage_delta(input_tokens: u64, output_tokens: u64) -> StreamDelta {
    StreamDelta {
        usage: Some(Usage {
            input_tokens,
            output_tokens,
            ..Default::default()
        }),
        choice: None,
    }
}

pub fn stop_delta() -> StreamDelta {
    StreamDelta {
        usage: None,
        choice: Some(StreamChoice {
            finish_reason: Some(FinishReason::Stop),
            delta: DeltaBody::default(),
        }),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted responses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One scripted reply for a mock call.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Serve these deltas as the stream.
    Stream(Vec<StreamDelta>),
    /// Fail at stream creation.
    Error { status: Option<u16>, message: String },
}

impl ScriptedResponse {
    /// Content followed by a stop and a usage record.
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedResponse::Stream(vec![
            content_delta(text),
            stop_delta(),
            usage_delta(3, 2),
        ])
    }

    /// A single complete tool call followed by a stop.
    pub fn tool_call(id: &str, name: &str, arguments: &str) -> Self {
        ScriptedResponse::Stream(vec![
            tool_fragment_delta(ToolCallFragment {
                id: Some(id.into()),
                index: Some(0),
                name: Some(name.into()),
                arguments: None,
            }),
            tool_fragment_delta(ToolCallFragment {
                id: Some(id.into()),
                index: Some(0),
                name: None,
                arguments: Some(arguments.into()),
            }),
            stop_delta(),
            usage_delta(5, 5),
        ])
    }

    pub fn error_status(status: u16, message: impl Into<String>) -> Self {
        ScriptedResponse::Error {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ScriptedResponse::Error {
            status: None,
            message: message.into(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mock provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct MockProvider {
    id: String,
    script: Mutex<VecDeque<ScriptedResponse>>,
    calls: Arc<AtomicU32>,
    requests: Mutex<Vec<ChatStreamRequest>>,
}

impl MockProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: Mutex::new(VecDeque::new()),
            calls: Arc::new(AtomicU32::new(0)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(self, response: ScriptedResponse) -> Self {
        self.script.lock().push_back(response);
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_response(ScriptedResponse::text(text))
    }

    /// Shared call counter for asserting how often the provider ran.
    pub fn call_counter(&self) -> Arc<AtomicU32> {
        self.calls.clone()
    }

    /// The most recent request, if any call was made.
    pub fn last_request(&self) -> Option<ChatStreamRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait::async_trait]
impl Provider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn create_chat_completion_stream(&self, req: ChatStreamRequest) -> Result<DeltaStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(req);

        let next = self.script.lock().pop_front();
        match next {
            Some(ScriptedResponse::Error { status, message }) => Err(match status {
                Some(code) => Error::provider_status(self.id.clone(), code, message),
                None => Error::provider(self.id.clone(), message),
            }),
            Some(ScriptedResponse::Stream(deltas)) => {
                let stream = async_stream::stream! {
                    for delta in deltas {
                        yield Ok(delta);
                    }
                };
                Ok(Box::pin(stream))
            }
            None => {
                let stream = async_stream::stream! {
                    yield Ok(stop_delta());
                };
                Ok(Box::pin(stream))
            }
        }
    }
}
