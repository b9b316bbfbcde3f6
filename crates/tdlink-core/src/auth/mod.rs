//! Login handshake.
//!
//! The engine drives the handshake: it announces an [`AuthorizationState`] and
//! waits for the matching call. An [`AuthorizationStateHandler`] decides what
//! to send for each state. Three handlers are provided:
//!
//! - **interactive** ([`ClientAuthorizer`]): phone number, code and password come
//!   from an external driver (a console prompt, a UI)
//! - **bot** ([`BotAuthorizer`]): a static token, nothing interactive
//! - **qr** ([`QrAuthorizer`]): a login link confirmed from another device
//!
//! | State | Interactive | Bot | QR |
//! |---|---|---|---|
//! | WaitParameters | parameters | parameters | parameters |
//! | WaitPhoneNumber | phone number | token | request link |
//! | WaitCode | code | unsupported | unsupported |
//! | WaitPassword | password | unsupported | password |
//! | WaitOtherDeviceConfirmation | unsupported | unsupported | link to sink |
//! | email, registration, LoggingOut | unsupported | unsupported | unsupported |
//! | Ready, Closing, Closed | done | done | done |

mod bot;
mod interactive;
mod qr;

pub use bot::BotAuthorizer;
pub use interactive::{client_authorizer, AuthorizerInputs, ClientAuthorizer};
pub use qr::{qr_authorizer, LinkSink, QrAuthorizer};

use crate::config::AuthConfig;
use crate::types::AuthorizationState;
use crate::{Client, Result, TdError};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Acts on one authorization state.
#[async_trait]
pub trait AuthorizationStateHandler: Send {
    /// Send whatever the state requires.
    ///
    /// Returns [`TdError::UnsupportedState`] for states this handler cannot
    /// complete.
    async fn handle(&mut self, client: &Client, state: &AuthorizationState) -> Result<()>;

    /// Release the handler's input sources.
    fn close(&mut self);
}

/// Drive the handshake to completion with `handler`.
///
/// Fetches the current state, lets the handler act on it and repeats. Returns
/// once the state is Ready (after the client's settle delay) or Closed, whether
/// Closed is fetched or pushed and the session already shut down. A
/// handler error that does not end the handshake (the engine rejecting a code,
/// say) is remembered and the state is retried; Closed then reports the
/// remembered error, and too many failures in a row abort with it.
pub async fn authorize_with<H>(client: &Client, handler: &mut H) -> Result<()>
where
    H: AuthorizationStateHandler + ?Sized,
{
    let mut updates = client.authorization_updates();
    let mut last_error: Option<TdError> = None;
    let mut failures = 0u32;
    let mut handled: Option<AuthorizationState> = None;

    loop {
        updates.borrow_and_update();
        let state = match client.get_authorization_state().await {
            Ok(state) => state,
            // The session closed under us, most likely through a pushed Closed.
            Err(TdError::Closed) => return last_error.map_or(Ok(()), Err),
            Err(e) => return Err(e),
        };
        debug!("Authorization state: {}", state);

        match state {
            AuthorizationState::Closed => {
                return match last_error {
                    Some(e) => Err(e),
                    None => Ok(()),
                };
            }
            AuthorizationState::Ready => {
                handler.handle(client, &state).await?;
                settle(client).await;
                info!("Authorization complete");
                return Ok(());
            }
            _ => {}
        }

        // Handled without error and the engine has not moved on yet.
        if handled.as_ref() == Some(&state) {
            let _ = tokio::time::timeout(AuthConfig::STATE_POLL_INTERVAL, updates.changed()).await;
            continue;
        }

        match handler.handle(client, &state).await {
            Ok(()) => {
                failures = 0;
                handled = Some(state);
            }
            Err(TdError::Closed) => return last_error.map_or(Ok(()), Err),
            Err(e) if e.ends_handshake() => return Err(e),
            Err(e) => {
                failures += 1;
                warn!("Handling {} failed ({} in a row): {}", state, failures, e);
                if failures >= AuthConfig::MAX_CONSECUTIVE_FAILURES {
                    return Err(e);
                }
                last_error = Some(e);
                handled = None;
            }
        }
    }
}

/// Bring an existing session up without any interactive step.
///
/// Submits the startup parameters when asked for them and returns as soon as
/// the state is Ready, or at WaitPhoneNumber / WaitCode so that a caller
/// resuming an unauthenticated session can pick a handler. A closed session
/// also ends it successfully. Any other state is unsupported here.
pub async fn authorize(client: &Client) -> Result<()> {
    loop {
        let state = match client.get_authorization_state().await {
            Ok(state) => state,
            Err(TdError::Closed) => return Ok(()),
            Err(e) => return Err(e),
        };
        debug!("Authorization state: {}", state);

        match state {
            AuthorizationState::WaitParameters => match client.set_parameters().await {
                Ok(_) => {}
                Err(TdError::Closed) => return Ok(()),
                Err(e) => return Err(e),
            },
            AuthorizationState::Ready => {
                settle(client).await;
                return Ok(());
            }
            AuthorizationState::Closed
            | AuthorizationState::WaitPhoneNumber
            | AuthorizationState::WaitCode => return Ok(()),
            other => return Err(TdError::unsupported_state(other.kind())),
        }
    }
}

async fn settle(client: &Client) {
    let delay = client.ready_settle_delay();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
