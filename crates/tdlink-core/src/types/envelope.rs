//! Wire envelope shared by requests, responses and push messages.
//!
//! Every message is a JSON object whose `@type` field names its type. Requests
//! carry an `@extra` correlation id which the engine echoes on the matching
//! response; push messages have no `@extra`.
//!
//! ```text
//! {"@type": "checkAuthenticationCode", "@extra": "4f1c…", "code": "12345"}
//! {"@type": "ok", "@extra": "4f1c…"}
//! {"@type": "updateOption", "name": "version", "value": {…}}
//! ```

use super::objects::{Decode, EngineError};
use crate::config::ClientConfig;
use crate::{Result, TdError};
use serde::Serialize;
use serde_json::{Map, Value};

/// A function call sent to the engine.
///
/// `TYPE` is the function's discriminant, `Output` the type the engine answers
/// with on success.
pub trait Function: Serialize + Send + Sync {
    const TYPE: &'static str;
    type Output: Decode;
}

/// An outgoing request: type tag, payload, and the correlation id assigned at send time.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    kind: String,
    payload: Map<String, Value>,
    extra: Option<String>,
}

impl Request {
    /// Create a request from a type tag and a JSON object payload.
    pub fn new(kind: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            payload,
            extra: None,
        }
    }

    /// Build the request for a typed function.
    pub fn from_function<F: Function>(function: &F) -> Result<Self> {
        match serde_json::to_value(function)? {
            Value::Object(payload) => Ok(Self::new(F::TYPE, payload)),
            Value::Null => Ok(Self::new(F::TYPE, Map::new())),
            other => Err(TdError::Json {
                message: format!("{} must serialize to an object, got {}", F::TYPE, other),
                source: None,
            }),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// The correlation id, once the dispatcher has assigned one.
    pub fn extra(&self) -> Option<&str> {
        self.extra.as_deref()
    }

    pub(crate) fn set_extra(&mut self, extra: String) {
        self.extra = Some(extra);
    }

    /// Serialize to the wire form, merging `@type` and `@extra` into the payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut object = self.payload.clone();
        object.insert(
            ClientConfig::TYPE_FIELD.to_string(),
            Value::String(self.kind.clone()),
        );
        if let Some(extra) = &self.extra {
            object.insert(
                ClientConfig::EXTRA_FIELD.to_string(),
                Value::String(extra.clone()),
            );
        }
        Ok(serde_json::to_vec(&Value::Object(object))?)
    }
}

/// An inbound message decoded just far enough to route it.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// The `@type` discriminant.
    pub kind: String,
    /// The `@extra` correlation id; `None` for push messages.
    pub extra: Option<String>,
    /// The whole message, discriminant included.
    pub data: Value,
}

impl Envelope {
    /// Decode the minimal envelope: discriminant and optional correlation id.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let data: Value = serde_json::from_slice(raw)?;
        Self::from_value(data)
    }

    pub fn from_value(data: Value) -> Result<Self> {
        let object = data.as_object().ok_or_else(|| TdError::Json {
            message: "message is not a JSON object".to_string(),
            source: None,
        })?;

        let kind = object
            .get(ClientConfig::TYPE_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| TdError::Json {
                message: format!("message has no {} field", ClientConfig::TYPE_FIELD),
                source: None,
            })?
            .to_string();

        let extra = object
            .get(ClientConfig::EXTRA_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self { kind, extra, data })
    }

    /// Whether this message answers a request.
    pub fn is_response(&self) -> bool {
        self.extra.is_some()
    }

    /// Decode into a fully typed value keyed by the discriminant.
    pub fn decode<T: Decode>(self) -> Result<T> {
        T::decode(&self.kind, self.data)
    }

    /// Decode as a function result, turning the engine's `error` object into
    /// [`TdError::Engine`].
    pub fn into_result<T: Decode>(self) -> Result<T> {
        if self.kind == EngineError::TYPE {
            let error: EngineError = serde_json::from_value(self.data)?;
            return Err(error.into());
        }
        self.decode()
    }
}
