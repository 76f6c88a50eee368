//! Command template expansion.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ens_domain::config::CommandSpec;
use ens_domain::error::Result;

use crate::invoke::{find_invocations, parse_typed_args};
use crate::jseval::eval_expression;

/// Timeout for a tool invoked from inside a command template.
pub(crate) const TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Agent tools as seen by the resolver: callable by name with a JSON
/// argument object, returning plain text.
#[async_trait::async_trait]
pub trait ToolDispatcher: Send + Sync {
    fn tool_names(&self) -> Vec<String>;
    async fn call_tool(&self, name: &str, args: serde_json::Value) -> Result<String>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tokenizer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Split on whitespace, honoring single and double quotes. Quotes group
/// and are stripped; there is no escape processing inside single quotes.
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == '\\' && q == '"' {
                    if let Some(&next) = chars.peek() {
                        current.push(next);
                        chars.next();
                        continue;
                    }
                }
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_token = true;
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Expression scanning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Find `${…}` spans, brace-matched with quote awareness. Returns
/// `(byte_range_of_whole_span, inner_expression)` pairs.
fn find_expressions(template: &str) -> Vec<(std::ops::Range<usize>, String)> {
    let bytes = template.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;

    while i + 1 < bytes.len() {
        if bytes[i] == b'$' && bytes[i + 1] == b'{' {
            let start = i;
            let mut depth = 1usize;
            let mut quote: Option<u8> = None;
            let mut j = i + 2;
            while j < bytes.len() {
                let b = bytes[j];
                match quote {
                    Some(q) => {
                        if b == b'\\' {
                            j += 1;
                        } else if b == q {
                            quote = None;
                        }
                    }
                    None => match b {
                        b'\'' | b'"' | b'`' => quote = Some(b),
                        b'{' => depth += 1,
                        b'}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    },
                }
                j += 1;
            }
            if j < bytes.len() {
                let inner = template[start + 2..j].to_string();
                spans.push((start..j + 1, inner));
                i = j + 1;
                continue;
            }
            // Unterminated: leave the rest literal.
            break;
        }
        i += 1;
    }
    spans
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resolution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Resolve a raw user input against an agent's command map.
///
/// Returns `None` when the input is not a slash command or names no
/// known command (the caller passes it through untouched). Substitution
/// order is fixed: `${…}` expressions, then `!tool(…)` invocations,
/// then positional-argument append — so tool output is never evaluated
/// as an expression.
pub async fn resolve_command(
    input: &str,
    commands: &HashMap<String, CommandSpec>,
    tools: Arc<dyn ToolDispatcher>,
) -> Option<String> {
    let rest = input.strip_prefix('/')?;
    let tokens = tokenize(rest);
    let (name, args) = tokens.split_first()?;
    let spec = commands.get(name)?;

    let template = spec.instruction.clone();
    let mut resolved = template.clone();

    // ── Phase 1: ${…} expressions ─────────────────────────────────
    for (range, expr) in find_expressions(&template).into_iter().rev() {
        match eval_expression(&expr, args, tools.clone()).await {
            Ok(value) => resolved.replace_range(range, &value),
            Err(e) => {
                tracing::warn!(command = %name, expression = %expr, error = %e,
                    "expression evaluation failed, leaving literal");
            }
        }
    }

    // ── Phase 2: !tool(…) invocations ─────────────────────────────
    let snapshot = resolved.clone();
    for (range, tool_name, raw_args) in find_invocations(&snapshot).into_iter().rev() {
        if !tools.tool_names().iter().any(|t| t == &tool_name) {
            tracing::warn!(command = %name, tool = %tool_name, "unknown tool in template, leaving literal");
            continue;
        }
        let args_value = serde_json::Value::Object(parse_typed_args(&raw_args));
        let output = match tokio::time::timeout(TOOL_TIMEOUT, tools.call_tool(&tool_name, args_value))
            .await
        {
            Ok(Ok(output)) => output.trim().to_string(),
            Ok(Err(e)) => format!("(error: {e})"),
            Err(_) => format!("(error: tool {tool_name} timed out)"),
        };
        resolved.replace_range(range, &output);
    }

    // ── Phase 3: positional append ────────────────────────────────
    if !template.contains("${args") && !args.is_empty() {
        let extra = args.join(" ");
        if !extra.is_empty() {
            resolved.push(' ');
            resolved.push_str(&extra);
        }
    }

    Some(resolved)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
