//! Agent configuration shapes and permission policies.
//!
//! Deserialization targets for whatever loader the embedding application
//! uses; the runtime itself only consumes the in-memory structs.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Permissions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of evaluating a permission policy for one tool name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    /// Run without confirmation.
    Allow,
    /// Refuse outright.
    Deny,
    /// Defer to the next rung of the approval ladder.
    Ask,
}

/// Tool allow/deny policy — prefix-based, case-insensitive matching.
/// Deny is evaluated before allow; a name matching neither list asks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

impl Permissions {
    /// Evaluate this policy for a tool name.
    pub fn decide(&self, tool_name: &str) -> PermissionDecision {
        let name = tool_name.to_ascii_lowercase();

        if Self::matches(&self.deny, &name) {
            return PermissionDecision::Deny;
        }
        if Self::matches(&self.allow, &name) {
            return PermissionDecision::Allow;
        }
        PermissionDecision::Ask
    }

    fn matches(patterns: &[String], name: &str) -> bool {
        patterns.iter().any(|p| {
            let p = p.to_ascii_lowercase();
            p == "*" || *name == p || name.starts_with(&format!("{p}."))
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Hooks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A shell command executed around tool invocations. The call payload is
/// written to stdin as JSON; stdout may carry a JSON verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookCommand {
    pub command: String,
    #[serde(default = "d_hook_timeout")]
    pub timeout_secs: u64,
}

fn d_hook_timeout() -> u64 {
    10
}

/// Optional pre/post tool hooks for an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hooks {
    #[serde(default)]
    pub pre_tool: Option<HookCommand>,
    #[serde(default)]
    pub post_tool: Option<HookCommand>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retry / fallback tuning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Backoff schedule for retrying a model within the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 200,
            factor: 2.0,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryConfig {
    /// Unjittered delay before attempt `n` (0-based), capped at the max.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let raw = self.base_delay_ms as f64 * self.factor.powi(attempt as i32);
        Duration::from_millis((raw as u64).min(self.max_delay_ms))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Commands and agents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A slash-command template owned by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Template expanded by the command resolver (`${…}` expressions,
    /// `!tool(…)` invocations, positional args).
    pub instruction: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Declarative shape of one agent. The runtime consumes the resolved
/// `ens_team::Agent`; this struct is the configuration surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub instruction: String,
    /// Primary model id, resolved against the provider registry.
    pub model: String,
    /// Ordered fallback model ids.
    #[serde(default)]
    pub fallbacks: Vec<String>,
    /// Toolset names this agent may use.
    #[serde(default)]
    pub toolsets: Vec<String>,
    #[serde(default)]
    pub commands: HashMap<String, CommandSpec>,
    #[serde(default)]
    pub hooks: Option<Hooks>,
    /// Agents this one may hand off to.
    #[serde(default)]
    pub handoffs: Vec<String>,
    /// 0 = unlimited.
    #[serde(default)]
    pub max_iterations: usize,
    /// Extra attempts per model in the chain. `None` picks the default
    /// (2 when fallbacks exist, 0 otherwise); `-1` explicitly disables.
    #[serde(default)]
    pub fallback_retries: Option<i32>,
    /// Cooldown pinning window after the primary fails over.
    #[serde(default)]
    pub fallback_cooldown_secs: Option<u64>,
    #[serde(default)]
    pub permissions: Option<Permissions>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_wins_over_allow() {
        let perms = Permissions {
            allow: vec!["shell".into()],
            deny: vec!["shell".into()],
        };
        assert_eq!(perms.decide("shell"), PermissionDecision::Deny);
    }

    #[test]
    fn unlisted_tool_asks() {
        let perms = Permissions {
            allow: vec!["fs".into()],
            deny: vec![],
        };
        assert_eq!(perms.decide("shell"), PermissionDecision::Ask);
        assert_eq!(perms.decide("fs"), PermissionDecision::Allow);
    }

    #[test]
    fn prefix_matching_uses_dot_boundary() {
        let perms = Permissions {
            allow: vec!["fs".into()],
            deny: vec![],
        };
        assert_eq!(perms.decide("fs.read"), PermissionDecision::Allow);
        assert_eq!(perms.decide("fsx"), PermissionDecision::Ask);
    }

    #[test]
    fn wildcard_allows_everything() {
        let perms = Permissions {
            allow: vec!["*".into()],
            deny: vec![],
        };
        assert_eq!(perms.decide("anything"), PermissionDecision::Allow);
    }

    #[test]
    fn retry_delay_caps_at_max() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.delay_for_attempt(0).as_millis(), 200);
        assert_eq!(cfg.delay_for_attempt(1).as_millis(), 400);
        assert_eq!(cfg.delay_for_attempt(2).as_millis(), 800);
        assert_eq!(cfg.delay_for_attempt(10).as_millis(), 2_000);
    }

    #[test]
    fn agent_definition_parses_from_toml() {
        let raw = r#"
            name = "root"
            instruction = "You are the root agent."
            model = "gpt-5"
            fallbacks = ["claude-sonnet-4-5"]
            handoffs = ["researcher"]
            max_iterations = 20

            [commands.calc]
            instruction = "${shell({cmd: args.join(' ')})}"
        "#;
        let def: AgentDefinition = toml::from_str(raw).unwrap();
        assert_eq!(def.fallbacks.len(), 1);
        assert!(def.commands.contains_key("calc"));
        assert_eq!(def.fallback_retries, None);
    }
}
