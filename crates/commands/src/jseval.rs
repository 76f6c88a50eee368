//! QuickJS evaluation for `${…}` command expressions.
//!
//! Each evaluation runs in a fresh context exposing `args` (the
//! tokenized positional arguments) and one async global function per
//! agent tool. Tool functions marshal their single object argument to
//! JSON, dispatch with the resolver's timeout, and resolve to the tool's
//! text output (errors resolve to an `error: …` string rather than
//! throwing, matching the degrade-to-literal policy).

use std::sync::Arc;

use rquickjs::function::{Async, Func, Rest};
use rquickjs::{async_with, AsyncContext, AsyncRuntime, CatchResultExt, Ctx, Value};

use ens_domain::error::{Error, Result};

use crate::resolver::{ToolDispatcher, TOOL_TIMEOUT};

pub(crate) async fn eval_expression(
    expr: &str,
    args: &[String],
    tools: Arc<dyn ToolDispatcher>,
) -> Result<String> {
    let runtime = AsyncRuntime::new().map_err(js_err)?;
    let context = AsyncContext::full(&runtime).await.map_err(js_err)?;

    let expr = expr.to_string();
    let args = args.to_vec();

    let outcome: std::result::Result<String, String> = async_with!(context => |ctx| {
        if let Err(e) = install_globals(&ctx, &args, tools.clone()) {
            return Err(format!("installing globals: {e}"));
        }

        let evaluated = ctx
            .eval::<Value, _>(expr.clone())
            .catch(&ctx)
            .map_err(|e| e.to_string())?;

        let settled = match evaluated.as_promise() {
            Some(promise) => promise
                .clone()
                .into_future::<Value>()
                .await
                .catch(&ctx)
                .map_err(|e| e.to_string())?,
            None => evaluated,
        };

        stringify(&ctx, settled).map_err(|e| e.to_string())
    })
    .await;

    outcome.map_err(Error::Other)
}

fn install_globals<'js>(
    ctx: &Ctx<'js>,
    args: &[String],
    tools: Arc<dyn ToolDispatcher>,
) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    let array = rquickjs::Array::new(ctx.clone())?;
    for (i, arg) in args.iter().enumerate() {
        array.set(i, arg.as_str())?;
    }
    globals.set("args", array)?;

    for name in tools.tool_names() {
        let dispatcher = tools.clone();
        let tool_name = name.clone();
        let func = Func::from(Async(move |ctx: Ctx<'js>, call_args: Rest<Value<'js>>| {
            // Marshal while the JS values are still live; the future
            // itself must not hold anything tied to the context.
            let payload = call_args
                .0
                .first()
                .map(|value| js_to_json(&ctx, value))
                .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
            let dispatcher = dispatcher.clone();
            let tool_name = tool_name.clone();
            async move {
                let result =
                    tokio::time::timeout(TOOL_TIMEOUT, dispatcher.call_tool(&tool_name, payload))
                        .await;
                let output = match result {
                    Ok(Ok(output)) => output,
                    Ok(Err(e)) => format!("error: {e}"),
                    Err(_) => format!("error: tool {tool_name} timed out"),
                };
                Ok::<String, rquickjs::Error>(output)
            }
        }));
        globals.set(name.as_str(), func)?;
    }

    Ok(())
}

fn js_to_json<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> serde_json::Value {
    let Ok(Some(serialized)) = ctx.json_stringify(value.clone()) else {
        return serde_json::Value::Object(Default::default());
    };
    let Ok(raw) = serialized.to_string() else {
        return serde_json::Value::Object(Default::default());
    };
    serde_json::from_str(&raw).unwrap_or_else(|_| serde_json::Value::Object(Default::default()))
}

fn stringify<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> rquickjs::Result<String> {
    if let Some(s) = value.as_string() {
        return s.to_string();
    }
    if value.is_undefined() || value.is_null() {
        return Ok(String::new());
    }
    match ctx.json_stringify(value)? {
        Some(s) => s.to_string(),
        None => Ok(String::new()),
    }
}

fn js_err(e: rquickjs::Error) -> Error {
    Error::Other(format!("js: {e}"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
