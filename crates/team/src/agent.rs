//! A single agent: instruction, model chain, toolsets, and policies.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ens_domain::config::{CommandSpec, Hooks, Permissions};
use ens_providers::fallback::{ChainEntry, FallbackOptions};
use ens_providers::Provider;
use ens_tools::Toolset;

/// A named agent. Construction is builder-style; the runtime treats the
/// value as immutable.
pub struct Agent {
    name: String,
    instruction: String,
    provider: Arc<dyn Provider>,
    fallbacks: Vec<Arc<dyn Provider>>,
    toolsets: Vec<Arc<dyn Toolset>>,
    commands: HashMap<String, CommandSpec>,
    hooks: Option<Hooks>,
    handoffs: Vec<String>,
    max_iterations: usize,
    fallback_retries: Option<i32>,
    fallback_cooldown: Option<Duration>,
    permissions: Option<Permissions>,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        instruction: impl Into<String>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
            provider,
            fallbacks: Vec::new(),
            toolsets: Vec::new(),
            commands: HashMap::new(),
            hooks: None,
            handoffs: Vec::new(),
            max_iterations: 0,
            fallback_retries: None,
            fallback_cooldown: None,
            permissions: None,
        }
    }

    // ── Builder setters ───────────────────────────────────────────

    pub fn with_fallbacks(mut self, fallbacks: Vec<Arc<dyn Provider>>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn with_toolsets(mut self, toolsets: Vec<Arc<dyn Toolset>>) -> Self {
        self.toolsets = toolsets;
        self
    }

    pub fn with_commands(mut self, commands: HashMap<String, CommandSpec>) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn with_handoffs(mut self, handoffs: Vec<String>) -> Self {
        self.handoffs = handoffs;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_fallback_retries(mut self, retries: i32) -> Self {
        self.fallback_retries = Some(retries);
        self
    }

    pub fn with_fallback_cooldown(mut self, cooldown: Duration) -> Self {
        self.fallback_cooldown = Some(cooldown);
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = Some(permissions);
        self
    }

    // ── Accessors ─────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn model_id(&self) -> &str {
        self.provider.id()
    }

    /// The full model chain: primary first, fallbacks in order.
    pub fn chain(&self) -> Vec<ChainEntry> {
        let mut chain: Vec<ChainEntry> = Vec::with_capacity(1 + self.fallbacks.len());
        chain.push(self.provider.clone());
        chain.extend(self.fallbacks.iter().cloned());
        chain
    }

    /// Fallback tuning derived from this agent's overrides.
    pub fn fallback_options(&self) -> FallbackOptions {
        FallbackOptions {
            retries: self.fallback_retries,
            cooldown: self.fallback_cooldown,
            retry: Default::default(),
        }
    }

    pub fn toolsets(&self) -> &[Arc<dyn Toolset>] {
        &self.toolsets
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn hooks(&self) -> Option<&Hooks> {
        self.hooks.as_ref()
    }

    pub fn handoffs(&self) -> &[String] {
        &self.handoffs
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn permissions(&self) -> Option<&Permissions> {
        self.permissions.as_ref()
    }
}
