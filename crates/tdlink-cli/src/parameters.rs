//! Startup parameters file and proxy option.
//!
//! The file holds one JSON object. It is forwarded to the engine verbatim at
//! the WaitParameters step, so no field is interpreted here.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{Map, Value};
use std::path::Path;
use tdlink_core::types::{AddProxy, ProxyType};

/// Parse `[user:password@]host:port` into an enabled SOCKS5 proxy.
pub fn socks5(value: &str) -> Result<AddProxy> {
    let (credentials, address) = match value.rsplit_once('@') {
        Some((credentials, address)) => (Some(credentials), address),
        None => (None, value),
    };
    let (server, port) = address
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("Proxy {} is missing a port", address))?;
    if server.is_empty() {
        bail!("Proxy {} is missing a host", address);
    }
    let port = port
        .parse::<u16>()
        .with_context(|| format!("Invalid proxy port in {}", address))?;
    let (username, password) = credentials
        .map(|c| c.split_once(':').unwrap_or((c, "")))
        .unwrap_or_default();

    Ok(AddProxy {
        server: server.to_string(),
        port: i32::from(port),
        enable: true,
        proxy_type: ProxyType::Socks5 {
            username: username.to_string(),
            password: password.to_string(),
        },
    })
}

pub async fn load(path: &Path) -> Result<Map<String, Value>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read parameters file {}", path.display()))?;

    match serde_json::from_str::<Value>(&content)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?
    {
        Value::Object(parameters) => Ok(parameters),
        other => bail!(
            "Parameters file {} must contain a JSON object, found {}",
            path.display(),
            kind_name(&other)
        ),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
