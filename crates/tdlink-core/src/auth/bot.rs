//! Bot login with a static token.

use super::AuthorizationStateHandler;
use crate::types::AuthorizationState;
use crate::{Client, Result, TdError};
use async_trait::async_trait;

/// Handler that answers the phone number step with a bot token.
#[derive(Clone)]
pub struct BotAuthorizer {
    token: String,
}

impl BotAuthorizer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for BotAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotAuthorizer")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl AuthorizationStateHandler for BotAuthorizer {
    async fn handle(&mut self, client: &Client, state: &AuthorizationState) -> Result<()> {
        match state {
            AuthorizationState::WaitParameters => {
                client.set_parameters().await?;
            }
            AuthorizationState::WaitPhoneNumber => {
                client.check_authentication_bot_token(self.token.as_str()).await?;
            }
            AuthorizationState::Ready
            | AuthorizationState::Closing
            | AuthorizationState::Closed => {}
            other => return Err(TdError::unsupported_state(other.kind())),
        }
        Ok(())
    }

    fn close(&mut self) {}
}
