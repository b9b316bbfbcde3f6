//! In-process transport.
//!
//! [`pair`] returns the client side (a [`MemoryTransport`] plus its inbound
//! stream) and an [`EngineEndpoint`] that plays the engine: it receives the
//! requests the client sends and can answer them or push unsolicited messages.

use super::{Inbound, Transport};
use crate::config::ClientConfig;
use crate::types::Envelope;
use crate::{Result, TdError};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// Client half of an in-process connection.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_bytes(&self, payload: Vec<u8>) -> Result<()> {
        self.outbound
            .send(payload)
            .map_err(|_| TdError::transport("engine endpoint closed"))
    }
}

/// Engine half of an in-process connection.
#[derive(Debug)]
pub struct EngineEndpoint {
    requests: mpsc::UnboundedReceiver<Vec<u8>>,
    responses: mpsc::Sender<Vec<u8>>,
}

/// Create a connected client/engine pair.
pub fn pair() -> (MemoryTransport, Inbound, EngineEndpoint) {
    let (outbound, requests) = mpsc::unbounded_channel();
    let (responses, inbound) = mpsc::channel(ClientConfig::INBOUND_QUEUE_SIZE);
    (
        MemoryTransport { outbound },
        inbound,
        EngineEndpoint {
            requests,
            responses,
        },
    )
}

impl EngineEndpoint {
    /// Wait for the next request the client sent.
    ///
    /// Returns `None` once every client-side sender is gone.
    pub async fn next_request(&mut self) -> Option<Result<Envelope>> {
        let raw = self.requests.recv().await?;
        Some(Envelope::parse(&raw))
    }

    /// Answer a request, echoing its correlation id.
    pub async fn reply(&self, request: &Envelope, mut body: Value) -> Result<()> {
        if let (Some(object), Some(extra)) = (body.as_object_mut(), &request.extra) {
            object.insert(
                ClientConfig::EXTRA_FIELD.to_string(),
                Value::String(extra.clone()),
            );
        }
        self.send_value(&body).await
    }

    /// Send an unsolicited message.
    pub async fn push(&self, body: Value) -> Result<()> {
        self.send_value(&body).await
    }

    /// Send raw bytes, valid JSON or not.
    pub async fn send_raw(&self, raw: Vec<u8>) -> Result<()> {
        self.responses
            .send(raw)
            .await
            .map_err(|_| TdError::transport("client inbound closed"))
    }

    async fn send_value(&self, body: &Value) -> Result<()> {
        self.send_raw(serde_json::to_vec(body)?).await
    }
}
