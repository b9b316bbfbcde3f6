//! Engine functions used by the login handshake and session lifecycle.

use super::envelope::Function;
use super::objects::{Ack, AuthorizationState, Proxy, ProxyType};
use serde::Serialize;
use serde_json::{Map, Value};

/// Returns the current authorization state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GetAuthorizationState {}

impl Function for GetAuthorizationState {
    const TYPE: &'static str = "getAuthorizationState";
    type Output = AuthorizationState;
}

/// Submits the startup parameters, forwarded verbatim.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SetParameters {
    #[serde(flatten)]
    pub parameters: Map<String, Value>,
}

impl Function for SetParameters {
    const TYPE: &'static str = "setTdlibParameters";
    type Output = Ack;
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(tag = "@type", rename = "phoneNumberAuthenticationSettings")]
pub struct PhoneNumberAuthenticationSettings {
    pub allow_flash_call: bool,
    pub is_current_phone_number: bool,
    pub allow_sms_retriever_api: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SetAuthenticationPhoneNumber {
    pub phone_number: String,
    pub settings: PhoneNumberAuthenticationSettings,
}

impl Function for SetAuthenticationPhoneNumber {
    const TYPE: &'static str = "setAuthenticationPhoneNumber";
    type Output = Ack;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckAuthenticationCode {
    pub code: String,
}

impl Function for CheckAuthenticationCode {
    const TYPE: &'static str = "checkAuthenticationCode";
    type Output = Ack;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckAuthenticationPassword {
    pub password: String,
}

impl Function for CheckAuthenticationPassword {
    const TYPE: &'static str = "checkAuthenticationPassword";
    type Output = Ack;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckAuthenticationBotToken {
    pub token: String,
}

impl Function for CheckAuthenticationBotToken {
    const TYPE: &'static str = "checkAuthenticationBotToken";
    type Output = Ack;
}

/// Switches the login to the link flow confirmed from another device.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestQrCodeAuthentication {
    pub other_user_ids: Vec<i64>,
}

impl Function for RequestQrCodeAuthentication {
    const TYPE: &'static str = "requestQrCodeAuthentication";
    type Output = Ack;
}

/// Closes the engine instance; the engine answers with a final `Closed` state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Close {}

impl Function for Close {
    const TYPE: &'static str = "close";
    type Output = Ack;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LogOut {}

impl Function for LogOut {
    const TYPE: &'static str = "logOut";
    type Output = Ack;
}

/// Registers a proxy server with the engine.
#[derive(Debug, Clone, Serialize)]
pub struct AddProxy {
    pub server: String,
    pub port: i32,
    /// Switch to this proxy right away.
    pub enable: bool,
    #[serde(rename = "type")]
    pub proxy_type: ProxyType,
}

impl Function for AddProxy {
    const TYPE: &'static str = "addProxy";
    type Output = Proxy;
}
