//! `!tool_name(k=v …)` invocation parsing.

use serde_json::{Map, Value};

/// Find `!name(…)` spans in a template. The closing paren match skips
/// parentheses inside quoted spans; `!` inside a quoted span is not an
/// invocation.
pub(crate) fn find_invocations(template: &str) -> Vec<(std::ops::Range<usize>, String, String)> {
    let bytes = template.as_bytes();
    let mut found = Vec::new();
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'!' => {
                    if let Some((range, name, args)) = parse_invocation_at(template, i) {
                        i = range.end;
                        found.push((range, name, args));
                        continue;
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    found
}

/// Parse one invocation starting at the `!` byte, if well-formed.
fn parse_invocation_at(
    template: &str,
    start: usize,
) -> Option<(std::ops::Range<usize>, String, String)> {
    let bytes = template.as_bytes();
    let mut j = start + 1;

    // Tool name: identifier characters plus dots for namespaced tools.
    while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_' || bytes[j] == b'.') {
        j += 1;
    }
    if j == start + 1 || j >= bytes.len() || bytes[j] != b'(' {
        return None;
    }
    let name = template[start + 1..j].to_string();

    let mut depth = 1usize;
    let mut quote: Option<u8> = None;
    let mut k = j + 1;
    while k < bytes.len() {
        let b = bytes[k];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    k += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        let args = template[j + 1..k].to_string();
                        return Some((start..k + 1, name, args));
                    }
                }
                _ => {}
            },
        }
        k += 1;
    }
    None
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Typed argument parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse `k=v k=v …` into a typed JSON object. Unquoted values try
/// bool, then integer, then float, then fall back to string; quoted
/// values are always strings.
pub(crate) fn parse_typed_args(raw: &str) -> Map<String, Value> {
    let mut map = Map::new();
    for token in split_args(raw) {
        let Some((key, value)) = token.raw.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), type_value(value, token.value_quoted));
    }
    map
}

struct ArgToken {
    raw: String,
    /// Whether the value half was quoted (forces string typing).
    value_quoted: bool,
}

/// Split on whitespace outside quotes, keeping quoted spans intact with
/// their quotes stripped.
fn split_args(raw: &str) -> Vec<ArgToken> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut quote: Option<char> = None;
    let mut chars = raw.chars().peekable();

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
                    quoted = true;
                    in_token = true;
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(ArgToken {
                            raw: std::mem::take(&mut current),
                            value_quoted: quoted,
                        });
                        in_token = false;
                        quoted = false;
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
        tokens.push(ArgToken {
            raw: current,
            value_quoted: quoted,
        });
    }
    tokens
}

/// bool → int → float → string, in that precedence.
fn type_value(value: &str, quoted: bool) -> Value {
    if quoted {
        return Value::String(value.to_string());
    }
    match value {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = value.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(f) = value.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(value.to_string())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_simple_invocation() {
        let found = find_invocations("before !shell(cmd=ls) after");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1, "shell");
        assert_eq!(found[0].2, "cmd=ls");
        assert_eq!(&"before !shell(cmd=ls) after"[found[0].0.clone()], "!shell(cmd=ls)");
    }

    #[test]
    fn closer_ignores_parens_in_quotes() {
        let found = find_invocations(r#"!lookup(q="term (with parens)" limit=2)"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].2, r#"q="term (with parens)" limit=2"#);
    }

    #[test]
    fn nested_parens_balance() {
        let found = find_invocations("!calc(expr=(1+(2*3)))");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].2, "expr=(1+(2*3))");
    }

    #[test]
    fn bang_inside_quotes_is_not_an_invocation() {
        let found = find_invocations(r#"say "!not_a_tool(x=1)" ok"#);
        assert!(found.is_empty());
    }

    #[test]
    fn unterminated_invocation_is_ignored() {
        assert!(find_invocations("!shell(cmd=ls").is_empty());
        assert!(find_invocations("just a bang! here").is_empty());
    }

    #[test]
    fn typed_precedence_bool_int_float_string() {
        let args = parse_typed_args(r#"a=true b=7 c=2.5 d=hello e="8" f=1e3"#);
        assert_eq!(args["a"], Value::Bool(true));
        assert_eq!(args["b"], Value::Number(7.into()));
        assert_eq!(args["c"], serde_json::json!(2.5));
        assert_eq!(args["d"], Value::String("hello".into()));
        // Quoting forces string even for numerics.
        assert_eq!(args["e"], Value::String("8".into()));
        assert_eq!(args["f"], serde_json::json!(1000.0));
    }

    #[test]
    fn quoted_values_keep_spaces() {
        let args = parse_typed_args(r#"q='two words' n=1"#);
        assert_eq!(args["q"], Value::String("two words".into()));
        assert_eq!(args["n"], Value::Number(1.into()));
    }

    #[test]
    fn malformed_tokens_are_skipped() {
        let args = parse_typed_args("novalue =3 ok=1");
        assert_eq!(args.len(), 1);
        assert_eq!(args["ok"], Value::Number(1.into()));
    }
}
