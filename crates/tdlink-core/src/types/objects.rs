//! Typed engine objects the client core understands.
//!
//! Each sum type is keyed by the `@type` discriminant. Decoding goes through
//! [`Decode`], which checks the discriminant first and reports
//! [`TdError::UnknownDiscriminant`] instead of guessing.

use super::Envelope;
use crate::{Result, TdError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Decode a fully typed value given its discriminant.
pub trait Decode: Sized {
    fn decode(kind: &str, data: Value) -> Result<Self>;
}

fn unknown(kind: &str) -> TdError {
    TdError::UnknownDiscriminant {
        kind: kind.to_string(),
    }
}

/// The engine's empty success answer (`ok`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ack;

impl Ack {
    pub const TYPE: &'static str = "ok";
}

impl Decode for Ack {
    fn decode(kind: &str, _data: Value) -> Result<Self> {
        if kind == Self::TYPE {
            Ok(Ack)
        } else {
            Err(unknown(kind))
        }
    }
}

/// The engine's failure answer (`error`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineError {
    pub code: i32,
    pub message: String,
}

impl EngineError {
    pub const TYPE: &'static str = "error";
}

impl From<EngineError> for TdError {
    fn from(err: EngineError) -> Self {
        TdError::Engine {
            code: err.code,
            message: err.message,
        }
    }
}

/// Login handshake state, pushed by the engine and returned by `getAuthorizationState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum AuthorizationState {
    #[serde(rename = "authorizationStateWaitTdlibParameters")]
    WaitParameters,
    #[serde(rename = "authorizationStateWaitPhoneNumber")]
    WaitPhoneNumber,
    #[serde(rename = "authorizationStateWaitCode")]
    WaitCode,
    #[serde(rename = "authorizationStateWaitPassword")]
    WaitPassword,
    #[serde(rename = "authorizationStateWaitOtherDeviceConfirmation")]
    WaitOtherDeviceConfirmation { link: String },
    #[serde(rename = "authorizationStateWaitRegistration")]
    WaitRegistration,
    #[serde(rename = "authorizationStateWaitEmailAddress")]
    WaitEmailAddress,
    #[serde(rename = "authorizationStateWaitEmailCode")]
    WaitEmailCode,
    #[serde(rename = "authorizationStateReady")]
    Ready,
    #[serde(rename = "authorizationStateLoggingOut")]
    LoggingOut,
    #[serde(rename = "authorizationStateClosing")]
    Closing,
    #[serde(rename = "authorizationStateClosed")]
    Closed,
}

impl AuthorizationState {
    pub const KINDS: [&'static str; 12] = [
        "authorizationStateWaitTdlibParameters",
        "authorizationStateWaitPhoneNumber",
        "authorizationStateWaitCode",
        "authorizationStateWaitPassword",
        "authorizationStateWaitOtherDeviceConfirmation",
        "authorizationStateWaitRegistration",
        "authorizationStateWaitEmailAddress",
        "authorizationStateWaitEmailCode",
        "authorizationStateReady",
        "authorizationStateLoggingOut",
        "authorizationStateClosing",
        "authorizationStateClosed",
    ];

    /// The wire discriminant of this state.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthorizationState::WaitParameters => Self::KINDS[0],
            AuthorizationState::WaitPhoneNumber => Self::KINDS[1],
            AuthorizationState::WaitCode => Self::KINDS[2],
            AuthorizationState::WaitPassword => Self::KINDS[3],
            AuthorizationState::WaitOtherDeviceConfirmation { .. } => Self::KINDS[4],
            AuthorizationState::WaitRegistration => Self::KINDS[5],
            AuthorizationState::WaitEmailAddress => Self::KINDS[6],
            AuthorizationState::WaitEmailCode => Self::KINDS[7],
            AuthorizationState::Ready => Self::KINDS[8],
            AuthorizationState::LoggingOut => Self::KINDS[9],
            AuthorizationState::Closing => Self::KINDS[10],
            AuthorizationState::Closed => Self::KINDS[11],
        }
    }

    pub fn is_kind(kind: &str) -> bool {
        Self::KINDS.contains(&kind)
    }

    /// Ready, Closing and Closed end a handshake.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuthorizationState::Ready | AuthorizationState::Closing | AuthorizationState::Closed
        )
    }
}

impl std::fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind())
    }
}

impl Decode for AuthorizationState {
    fn decode(kind: &str, data: Value) -> Result<Self> {
        if !Self::is_kind(kind) {
            return Err(unknown(kind));
        }
        Ok(serde_json::from_value(data)?)
    }
}

/// Network connection state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum ConnectionState {
    #[serde(rename = "connectionStateWaitingForNetwork")]
    WaitingForNetwork,
    #[serde(rename = "connectionStateConnectingToProxy")]
    ConnectingToProxy,
    #[serde(rename = "connectionStateConnecting")]
    Connecting,
    #[serde(rename = "connectionStateUpdating")]
    Updating,
    #[serde(rename = "connectionStateReady")]
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAuthorizationState {
    pub authorization_state: AuthorizationState,
}

impl UpdateAuthorizationState {
    pub const TYPE: &'static str = "updateAuthorizationState";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOption {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

impl UpdateOption {
    pub const TYPE: &'static str = "updateOption";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConnectionState {
    pub state: ConnectionState,
}

impl UpdateConnectionState {
    pub const TYPE: &'static str = "updateConnectionState";
}

/// How the engine talks to a proxy server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum ProxyType {
    #[serde(rename = "proxyTypeSocks5")]
    Socks5 { username: String, password: String },
    #[serde(rename = "proxyTypeHttp")]
    Http {
        username: String,
        password: String,
        /// Use the proxy for HTTP requests only, never for TCP connections.
        http_only: bool,
    },
    #[serde(rename = "proxyTypeMtproto")]
    Mtproto { secret: String },
}

/// A proxy registered with the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    pub id: i32,
    pub server: String,
    pub port: i32,
    /// Unix time of the last successful use, 0 if never used.
    #[serde(default)]
    pub last_used_date: i32,
    pub is_enabled: bool,
    #[serde(rename = "type")]
    pub proxy_type: ProxyType,
}

impl Proxy {
    pub const TYPE: &'static str = "proxy";
}

impl Decode for Proxy {
    fn decode(kind: &str, data: Value) -> Result<Self> {
        if kind != Self::TYPE {
            return Err(unknown(kind));
        }
        Ok(serde_json::from_value(data)?)
    }
}

/// Any inbound message, as seen by result observers.
///
/// Messages the core does not model arrive as [`Object::Other`] with their raw
/// envelope. Typed decoding through [`Decode`] never produces that variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Ack,
    Error(EngineError),
    AuthorizationState(AuthorizationState),
    UpdateAuthorizationState(UpdateAuthorizationState),
    UpdateOption(UpdateOption),
    UpdateConnectionState(UpdateConnectionState),
    Other(Envelope),
}

impl Object {
    pub fn kind(&self) -> &str {
        match self {
            Object::Ack => Ack::TYPE,
            Object::Error(_) => EngineError::TYPE,
            Object::AuthorizationState(state) => state.kind(),
            Object::UpdateAuthorizationState(_) => UpdateAuthorizationState::TYPE,
            Object::UpdateOption(_) => UpdateOption::TYPE,
            Object::UpdateConnectionState(_) => UpdateConnectionState::TYPE,
            Object::Other(envelope) => &envelope.kind,
        }
    }

    /// Whether `kind` is one of the discriminants decoded into a typed variant.
    pub fn is_kind(kind: &str) -> bool {
        matches!(
            kind,
            Ack::TYPE
                | EngineError::TYPE
                | UpdateAuthorizationState::TYPE
                | UpdateOption::TYPE
                | UpdateConnectionState::TYPE
        ) || AuthorizationState::is_kind(kind)
    }

    /// Decode a whole envelope, keeping unmodelled messages as [`Object::Other`].
    pub fn from_envelope(envelope: Envelope) -> Result<Self> {
        if Self::is_kind(&envelope.kind) {
            Self::decode(&envelope.kind, envelope.data)
        } else {
            Ok(Object::Other(envelope))
        }
    }

    /// The engine's terminal signal: its authorization state became Closed.
    pub fn is_closed_signal(&self) -> bool {
        matches!(
            self,
            Object::UpdateAuthorizationState(UpdateAuthorizationState {
                authorization_state: AuthorizationState::Closed,
            })
        )
    }
}

impl Decode for Object {
    fn decode(kind: &str, data: Value) -> Result<Self> {
        match kind {
            Ack::TYPE => Ok(Object::Ack),
            EngineError::TYPE => Ok(Object::Error(serde_json::from_value(data)?)),
            UpdateAuthorizationState::TYPE => Ok(Object::UpdateAuthorizationState(
                serde_json::from_value(data)?,
            )),
            UpdateOption::TYPE => Ok(Object::UpdateOption(serde_json::from_value(data)?)),
            UpdateConnectionState::TYPE => {
                Ok(Object::UpdateConnectionState(serde_json::from_value(data)?))
            }
            k if AuthorizationState::is_kind(k) => Ok(Object::AuthorizationState(
                AuthorizationState::decode(k, data)?,
            )),
            other => Err(unknown(other)),
        }
    }
}
