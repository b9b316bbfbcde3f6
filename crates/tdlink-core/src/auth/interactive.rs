//! Interactive login: phone number, code and password supplied by a driver.

use super::AuthorizationStateHandler;
use crate::config::AuthConfig;
use crate::types::AuthorizationState;
use crate::{Client, Result, TdError};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

/// Driver side of a [`ClientAuthorizer`].
///
/// Read `states` to learn which input the handshake is waiting for, then send
/// it on the matching channel. Dropping a sender makes the handshake fail with
/// [`TdError::InputClosed`] the next time that input is needed.
#[derive(Debug)]
pub struct AuthorizerInputs {
    pub phone_number: mpsc::Sender<String>,
    pub code: mpsc::Sender<String>,
    pub password: mpsc::Sender<String>,
    pub states: mpsc::Receiver<AuthorizationState>,
}

/// Handler fed by an external driver through [`AuthorizerInputs`].
#[derive(Debug)]
pub struct ClientAuthorizer {
    phone_number: Option<mpsc::Receiver<String>>,
    code: Option<mpsc::Receiver<String>>,
    password: Option<mpsc::Receiver<String>>,
    states: Option<mpsc::Sender<AuthorizationState>>,
}

/// Create an interactive authorizer and the inputs that drive it.
pub fn client_authorizer() -> (ClientAuthorizer, AuthorizerInputs) {
    let (phone_tx, phone_rx) = mpsc::channel(AuthConfig::INPUT_QUEUE_SIZE);
    let (code_tx, code_rx) = mpsc::channel(AuthConfig::INPUT_QUEUE_SIZE);
    let (password_tx, password_rx) = mpsc::channel(AuthConfig::INPUT_QUEUE_SIZE);
    let (state_tx, state_rx) = mpsc::channel(AuthConfig::INPUT_QUEUE_SIZE);

    (
        ClientAuthorizer {
            phone_number: Some(phone_rx),
            code: Some(code_rx),
            password: Some(password_rx),
            states: Some(state_tx),
        },
        AuthorizerInputs {
            phone_number: phone_tx,
            code: code_tx,
            password: password_tx,
            states: state_rx,
        },
    )
}

async fn next_input(
    source: &mut Option<mpsc::Receiver<String>>,
    input: &'static str,
) -> Result<String> {
    let receiver = source.as_mut().ok_or(TdError::InputClosed { input })?;
    receiver.recv().await.ok_or(TdError::InputClosed { input })
}

#[async_trait]
impl AuthorizationStateHandler for ClientAuthorizer {
    async fn handle(&mut self, client: &Client, state: &AuthorizationState) -> Result<()> {
        if let Some(states) = &self.states {
            if states.send(state.clone()).await.is_err() {
                debug!("State feed has no reader");
            }
        }

        match state {
            AuthorizationState::WaitParameters => {
                client.set_parameters().await?;
            }
            AuthorizationState::WaitPhoneNumber => {
                let phone_number = next_input(&mut self.phone_number, "phone number").await?;
                client.set_authentication_phone_number(phone_number).await?;
            }
            AuthorizationState::WaitCode => {
                let code = next_input(&mut self.code, "code").await?;
                client.check_authentication_code(code).await?;
            }
            AuthorizationState::WaitPassword => {
                let password = next_input(&mut self.password, "password").await?;
                client.check_authentication_password(password).await?;
            }
            AuthorizationState::Ready
            | AuthorizationState::Closing
            | AuthorizationState::Closed => {}
            other => return Err(TdError::unsupported_state(other.kind())),
        }
        Ok(())
    }

    fn close(&mut self) {
        self.phone_number = None;
        self.code = None;
        self.password = None;
        self.states = None;
    }
}
