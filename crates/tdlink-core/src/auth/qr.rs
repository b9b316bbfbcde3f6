//! Login by confirming a link from another, already authorized device.

use super::AuthorizationStateHandler;
use crate::config::AuthConfig;
use crate::types::AuthorizationState;
use crate::{Client, Result, TdError};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

/// Receives each login link; typically renders it as a QR code.
pub type LinkSink = Box<dyn FnMut(&str) -> Result<()> + Send>;

/// Handler for the link-based login flow.
pub struct QrAuthorizer {
    link_sink: LinkSink,
    last_link: Option<String>,
    password: Option<mpsc::Receiver<String>>,
}

/// Create a QR authorizer and the sender for the optional two-step password.
pub fn qr_authorizer<F>(link_sink: F) -> (QrAuthorizer, mpsc::Sender<String>)
where
    F: FnMut(&str) -> Result<()> + Send + 'static,
{
    let (password_tx, password_rx) = mpsc::channel(AuthConfig::INPUT_QUEUE_SIZE);
    (
        QrAuthorizer {
            link_sink: Box::new(link_sink),
            last_link: None,
            password: Some(password_rx),
        },
        password_tx,
    )
}

impl QrAuthorizer {
    /// The most recent link handed to the sink.
    pub fn last_link(&self) -> Option<&str> {
        self.last_link.as_deref()
    }
}

impl std::fmt::Debug for QrAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QrAuthorizer")
            .field("last_link", &self.last_link)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthorizationStateHandler for QrAuthorizer {
    async fn handle(&mut self, client: &Client, state: &AuthorizationState) -> Result<()> {
        match state {
            AuthorizationState::WaitParameters => {
                client.set_parameters().await?;
            }
            AuthorizationState::WaitPhoneNumber => {
                client.request_qr_code_authentication().await?;
            }
            AuthorizationState::WaitOtherDeviceConfirmation { link } => {
                if self.last_link.as_deref() != Some(link.as_str()) {
                    info!("New login link issued");
                    (self.link_sink)(link)?;
                    self.last_link = Some(link.clone());
                }
            }
            AuthorizationState::WaitPassword => {
                let input = "password";
                let receiver = self.password.as_mut().ok_or(TdError::InputClosed { input })?;
                let password = receiver.recv().await.ok_or(TdError::InputClosed { input })?;
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
        self.password = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::authorize_with;
    use crate::auth::test_support::{spawn_engine, start_client, Script, Step};
    use serde_json::{json, Map};
    use std::sync::{Arc, Mutex};

    fn confirmation(link: &str) -> AuthorizationState {
        AuthorizationState::WaitOtherDeviceConfirmation { link: link.into() }
    }

    #[tokio::test]
    async fn test_sink_called_once_per_distinct_link() {
        let (client, _engine) = start_client(Map::new());
        let links = Arc::new(Mutex::new(Vec::new()));
        let sink = links.clone();
        let (mut authorizer, _password) = qr_authorizer(move |link: &str| {
            sink.lock().unwrap().push(link.to_string());
            Ok(())
        });

        for link in ["tg://login?token=a", "tg://login?token=a", "tg://login?token=b", "tg://login?token=b"] {
            authorizer.handle(&client, &confirmation(link)).await.unwrap();
        }

        assert_eq!(
            *links.lock().unwrap(),
            vec!["tg://login?token=a", "tg://login?token=b"]
        );
        assert_eq!(authorizer.last_link(), Some("tg://login?token=b"));
    }

    #[tokio::test]
    async fn test_failed_sink_retries_same_link() {
        let (client, _engine) = start_client(Map::new());
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let (mut authorizer, _password) = qr_authorizer(move |_: &str| {
            let mut calls = counter.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                Err(TdError::Other("display unavailable".into()))
            } else {
                Ok(())
            }
        });

        let state = confirmation("tg://login?token=a");
        assert!(authorizer.handle(&client, &state).await.is_err());
        authorizer.handle(&client, &state).await.unwrap();
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_states() {
        let (client, _engine) = start_client(Map::new());
        let (mut authorizer, _password) = qr_authorizer(|_: &str| Ok(()));

        for state in [
            AuthorizationState::WaitCode,
            AuthorizationState::WaitEmailAddress,
            AuthorizationState::WaitEmailCode,
            AuthorizationState::WaitRegistration,
            AuthorizationState::LoggingOut,
        ] {
            let err = authorizer.handle(&client, &state).await.unwrap_err();
            assert!(err.is_unsupported_state(), "{} should be unsupported", state);
        }
    }

    #[tokio::test]
    async fn test_full_login_with_password() {
        let (client, engine) = start_client(Map::new());
        let engine = spawn_engine(
            engine,
            Script {
                state: AuthorizationState::WaitPhoneNumber,
                steps: vec![
                    (
                        "requestQrCodeAuthentication",
                        Step::Advance(confirmation("tg://login?token=a")),
                    ),
                    (
                        "checkAuthenticationPassword",
                        Step::Advance(AuthorizationState::Ready),
                    ),
                ],
            },
        );

        // The other device confirms as soon as the link is shown.
        let transitions = engine.transitions.clone();
        let links = Arc::new(Mutex::new(Vec::new()));
        let sink = links.clone();
        let (mut authorizer, password) = qr_authorizer(move |link: &str| {
            sink.lock().unwrap().push(link.to_string());
            let _ = transitions.send(AuthorizationState::WaitPassword);
            Ok(())
        });
        password.send("hunter2".into()).await.unwrap();

        authorize_with(&client, &mut authorizer).await.unwrap();

        assert_eq!(*links.lock().unwrap(), vec!["tg://login?token=a"]);
        let log = engine.log.lock().unwrap();
        let password_request = log
            .iter()
            .find(|r| r["@type"] == json!("checkAuthenticationPassword"))
            .unwrap();
        assert_eq!(password_request["password"], json!("hunter2"));
    }
}
