//! Built-in methods served by `tandemd`

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tandem_core::RpcError;

use crate::dispatcher::{Dispatcher, Reply};

/// Longest `sleep` accepted, so a client cannot park a worker forever
pub const MAX_SLEEP_MS: u64 = 60_000;

#[derive(Debug, Deserialize)]
struct SleepParams {
    ms: u64,
}

#[derive(Debug, Deserialize)]
struct FailParams {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

fn parse<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let params = params.ok_or_else(|| RpcError::invalid_params("Missing params"))?;
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

/// Returns its params unchanged
fn echo(params: Option<Value>) -> anyhow::Result<Reply> {
    Ok(Reply::Immediate(params.unwrap_or(Value::Null)))
}

/// Sleeps on a worker for `ms` milliseconds
fn sleep(params: Option<Value>) -> anyhow::Result<Reply> {
    let SleepParams { ms } = parse(params)?;
    if ms > MAX_SLEEP_MS {
        return Err(RpcError::invalid_params(format!(
            "Sleep too long (max {} ms)",
            MAX_SLEEP_MS
        ))
        .into());
    }

    Ok(Reply::deferred(move || {
        std::thread::sleep(Duration::from_millis(ms));
        Ok(json!({ "slept_ms": ms }))
    }))
}

/// Always fails with the requested error
fn fail(params: Option<Value>) -> anyhow::Result<Reply> {
    let FailParams {
        code,
        message,
        data,
    } = parse(params)?;
    Err(RpcError::application(code, message, data).into())
}

/// Notification that records its params
fn log(params: Option<Value>) -> anyhow::Result<Reply> {
    let params = params.unwrap_or(Value::Null);
    tracing::info!("Client log: {}", params);
    Ok(Reply::Immediate(Value::Null))
}

pub fn builtin_dispatcher() -> Dispatcher {
    Dispatcher::new()
        .with_method("echo", echo)
        .with_method("sleep", sleep)
        .with_method("fail", fail)
        .with_method("log", log)
}
