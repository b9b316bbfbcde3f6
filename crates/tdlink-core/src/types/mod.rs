//! Message envelopes and the typed values carried inside them.
//!
//! - **Envelope**: the two routing fields (`@type`, `@extra`) plus the raw message
//! - **Objects**: sum types for everything the core itself needs to understand
//! - **Functions**: the requests the handshake and session lifecycle issue

mod envelope;
mod functions;
mod objects;

pub use envelope::{Envelope, Function, Request};
pub use functions::{
    AddProxy, CheckAuthenticationBotToken, CheckAuthenticationCode, CheckAuthenticationPassword, Close,
    GetAuthorizationState, LogOut, PhoneNumberAuthenticationSettings,
    RequestQrCodeAuthentication, SetAuthenticationPhoneNumber, SetParameters,
};
pub use objects::{
    Ack, AuthorizationState, ConnectionState, Decode, EngineError, Object, Proxy, ProxyType,
    UpdateAuthorizationState, UpdateConnectionState, UpdateOption,
};
