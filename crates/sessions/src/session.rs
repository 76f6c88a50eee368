//! The session aggregate and its mutation facade.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use ens_domain::chat::{Message, Role};
use ens_domain::config::Permissions;

use crate::store::SessionStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Items
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One entry of a session's ordered history.
///
/// A `Summary` folds the semantic weight of everything before it but
/// never deletes the underlying items. Sub-sessions are owned by the
/// parent and flatten into its serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Item {
    Message(Message),
    Summary {
        content: String,
        created_at: DateTime<Utc>,
    },
    SubSession(Session),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Aggregate root of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub working_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    /// Cumulative cost in currency units.
    #[serde(default)]
    pub cost: f64,
    /// 0 = unlimited.
    #[serde(default)]
    pub max_iterations: usize,
    #[serde(default)]
    pub tools_approved: bool,
    #[serde(default)]
    pub thinking_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,
    /// Weak pointer to the owning session, by id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: None,
            working_dir: PathBuf::from("."),
            created_at: Utc::now(),
            items: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            cost: 0.0,
            max_iterations: 0,
            tools_approved: false,
            thinking_enabled: false,
            permissions: None,
            parent_id: None,
        }
    }

    pub fn with_user_message(text: impl Into<String>) -> Self {
        let mut session = Self::new();
        session.items.push(Item::Message(Message::user(text)));
        session
    }

    pub fn is_sub_session(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Index of the item just after the last summary, or 0.
    fn summary_boundary(&self) -> (Option<&str>, usize) {
        for (i, item) in self.items.iter().enumerate().rev() {
            if let Item::Summary { content, .. } = item {
                return (Some(content.as_str()), i + 1);
            }
        }
        (None, 0)
    }

    /// The message sequence an agent sees: its instruction, the latest
    /// summary (if any) folded in as a system message, then every message
    /// after that summary.
    pub fn messages_for_agent(&self, instruction: &str) -> Vec<Message> {
        let mut messages = vec![Message::system(instruction)];

        let (summary, boundary) = self.summary_boundary();
        if let Some(summary) = summary {
            messages.push(Message::system(format!(
                "Summary of the conversation so far:\n{summary}"
            )));
        }

        for item in &self.items[boundary..] {
            if let Item::Message(msg) = item {
                messages.push(msg.clone());
            }
        }
        messages
    }

    /// Every message item, including those folded behind summaries.
    pub fn all_messages(&self) -> Vec<Message> {
        self.items
            .iter()
            .filter_map(|item| match item {
                Item::Message(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_assistant_content(&self) -> Option<String> {
        self.items.iter().rev().find_map(|item| match item {
            Item::Message(msg) if msg.role == Role::Assistant => Some(msg.content.text()),
            _ => None,
        })
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SessionHandle — mutation facade with write-through persistence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shared handle over a live session. All runtime mutations go through
/// here; each durable change persists a snapshot before returning.
/// Persistence failures are logged, never fatal to the conversation.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<Session>>,
    store: Arc<dyn SessionStore>,
}

impl SessionHandle {
    pub fn new(session: Session, store: Arc<dyn SessionStore>) -> Self {
        let handle = Self {
            inner: Arc::new(Mutex::new(session)),
            store,
        };
        handle.persist();
        handle
    }

    pub fn id(&self) -> String {
        self.inner.lock().id.clone()
    }

    /// Read access to the underlying session.
    pub fn with<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        f(&self.inner.lock())
    }

    pub fn snapshot(&self) -> Session {
        self.inner.lock().clone()
    }

    fn persist(&self) {
        let snapshot = self.inner.lock().clone();
        if let Err(e) = self.store.persist(&snapshot) {
            tracing::warn!(session_id = %snapshot.id, error = %e, "session persist failed");
        }
    }

    // ── §4.E operations ───────────────────────────────────────────

    pub fn get_messages(&self, instruction: &str) -> Vec<Message> {
        self.inner.lock().messages_for_agent(instruction)
    }

    /// Append a message; returns its internal id.
    pub fn add_message(&self, msg: Message) -> String {
        let id = msg.id.clone();
        self.inner.lock().items.push(Item::Message(msg));
        self.persist();
        id
    }

    /// Overwrite an in-progress streaming message by id.
    pub fn update_message(&self, id: &str, msg: Message) {
        {
            let mut session = self.inner.lock();
            if let Some(slot) = session.items.iter_mut().find_map(|item| match item {
                Item::Message(m) if m.id == id => Some(m),
                _ => None,
            }) {
                *slot = msg;
            } else {
                tracing::warn!(message_id = id, "update_message: no such message");
                return;
            }
        }
        self.persist();
    }

    pub fn add_sub_session(&self, mut child: Session) {
        let mut session = self.inner.lock();
        child.parent_id = Some(session.id.clone());
        session.items.push(Item::SubSession(child));
        drop(session);
        self.persist();
    }

    pub fn add_summary(&self, content: impl Into<String>) {
        self.inner.lock().items.push(Item::Summary {
            content: content.into(),
            created_at: Utc::now(),
        });
        self.persist();
    }

    /// Overwrite token counters and accumulate cost.
    pub fn update_session_tokens(&self, input: u64, output: u64, cost_delta: f64) {
        {
            let mut session = self.inner.lock();
            session.input_tokens = input;
            session.output_tokens = output;
            session.cost += cost_delta;
        }
        self.persist();
    }

    pub fn update_session_title(&self, title: impl Into<String>) {
        self.inner.lock().title = Some(title.into());
        self.persist();
    }

    pub fn is_sub_session(&self) -> bool {
        self.inner.lock().is_sub_session()
    }

    pub fn get_all_messages(&self) -> Vec<Message> {
        self.inner.lock().all_messages()
    }

    pub fn get_last_assistant_message_content(&self) -> Option<String> {
        self.inner.lock().last_assistant_content()
    }

    // ── Session toggles ───────────────────────────────────────────

    pub fn tools_approved(&self) -> bool {
        self.inner.lock().tools_approved
    }

    pub fn approve_tools_for_session(&self) {
        self.inner.lock().tools_approved = true;
        self.persist();
    }

    pub fn thinking_enabled(&self) -> bool {
        self.inner.lock().thinking_enabled
    }

    pub fn permissions(&self) -> Option<Permissions> {
        self.inner.lock().permissions.clone()
    }

    pub fn max_iterations(&self) -> usize {
        self.inner.lock().max_iterations
    }

    pub fn title(&self) -> Option<String> {
        self.inner.lock().title.clone()
    }

    pub fn tokens_and_cost(&self) -> (u64, u64, f64) {
        let session = self.inner.lock();
        (session.input_tokens, session.output_tokens, session.cost)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
