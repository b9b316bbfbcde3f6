//! Client handle: the public face of one engine session.
//!
//! A [`Client`] is an explicit, cheaply cloneable handle. There is no global
//! registry of clients; whoever builds one owns it and passes it around.

use crate::admission::{AdmissionStrategy, RateLimiter, WindUp};
use crate::cancel::CancellationToken;
use crate::config::{AuthConfig, ClientConfig};
use crate::dispatcher::{
    uuid_v4_generator, CallbackResultHandler, Dispatcher, ExtraGenerator, NoopResultHandler,
    ResultHandler,
};
use crate::transport::{Diagnostics, Inbound, Transport};
use crate::types::{
    Ack, AddProxy, AuthorizationState, CheckAuthenticationBotToken, CheckAuthenticationCode,
    CheckAuthenticationPassword, Close, Envelope, Function, GetAuthorizationState, LogOut, Object,
    PhoneNumberAuthenticationSettings, Proxy, Request, RequestQrCodeAuthentication,
    SetAuthenticationPhoneNumber, SetParameters,
};
use crate::{Result, TdError};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Builder for configuring a [`Client`].
///
/// # Example
///
/// ```rust,ignore
/// use tdlink_core::{transport::TcpTransport, Client};
///
/// let (transport, inbound, diagnostics) = TcpTransport::connect(addr).await?;
/// let client = Client::builder(parameters)
///     .with_fallback_timeout(Duration::from_secs(30))
///     .with_diagnostics(diagnostics)
///     .start(Arc::new(transport), inbound)?;
/// ```
pub struct ClientBuilder {
    parameters: Map<String, Value>,
    fallback_timeout: Duration,
    extra_generator: ExtraGenerator,
    result_handler: Arc<dyn ResultHandler>,
    admission: Option<Arc<dyn AdmissionStrategy>>,
    diagnostics: Option<Diagnostics>,
    proxy: Option<AddProxy>,
    ready_settle_delay: Duration,
}

impl ClientBuilder {
    /// Create a builder holding the startup parameters sent at WaitParameters.
    pub fn new(parameters: Map<String, Value>) -> Self {
        Self {
            parameters,
            fallback_timeout: ClientConfig::FALLBACK_TIMEOUT,
            extra_generator: uuid_v4_generator(),
            result_handler: Arc::new(NoopResultHandler),
            admission: None,
            diagnostics: None,
            proxy: None,
            ready_settle_delay: AuthConfig::READY_SETTLE_DELAY,
        }
    }

    /// Upper bound for waiting on any single response.
    ///
    /// Default: 60 seconds
    pub fn with_fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = timeout;
        self
    }

    /// Replace the correlation id generator.
    ///
    /// Default: random UUID v4
    pub fn with_extra_generator(mut self, generator: ExtraGenerator) -> Self {
        self.extra_generator = generator;
        self
    }

    pub fn with_result_handler(mut self, handler: Arc<dyn ResultHandler>) -> Self {
        self.result_handler = handler;
        self
    }

    /// Replace the admission strategy.
    ///
    /// Default: [`WindUp`] with the stock tuning
    pub fn with_admission(mut self, strategy: Arc<dyn AdmissionStrategy>) -> Self {
        self.admission = Some(strategy);
        self
    }

    /// Engine diagnostics stream; penalty notices in it throttle the client.
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Register a proxy with the engine as soon as the client starts.
    ///
    /// The request is sent in the background; a failure is logged and does
    /// not stop the client.
    pub fn with_proxy(mut self, proxy: AddProxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Pause after the handshake reaches Ready.
    ///
    /// Default: 1 second
    pub fn with_ready_settle_delay(mut self, delay: Duration) -> Self {
        self.ready_settle_delay = delay;
        self
    }

    /// Start the client over a connected transport.
    ///
    /// Spawns the inbound consumption task (and the diagnostics listener when a
    /// stream was given), so it must be called inside a tokio runtime.
    pub fn start(self, transport: Arc<dyn Transport>, inbound: Inbound) -> Result<Client> {
        if self.fallback_timeout.is_zero() {
            return Err(TdError::Config {
                message: "fallback timeout must be greater than zero".to_string(),
            });
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(TdError::Config {
                message: "client must be started inside a tokio runtime".to_string(),
            });
        }

        let strategy = self
            .admission
            .unwrap_or_else(|| Arc::new(WindUp::default()));
        let admission = RateLimiter::new(strategy);

        if let Some(diagnostics) = self.diagnostics {
            admission.subscribe(diagnostics);
        }

        let dispatcher = Arc::new(Dispatcher::new(
            transport,
            admission,
            self.extra_generator,
            self.result_handler,
            self.fallback_timeout,
        ));
        tokio::spawn(dispatcher.clone().run(inbound));
        debug!("Client started");

        let client = Client {
            dispatcher,
            parameters: Arc::new(self.parameters),
            ready_settle_delay: self.ready_settle_delay,
        };

        if let Some(proxy) = self.proxy {
            let client = client.clone();
            tokio::spawn(async move {
                match client.add_proxy(&proxy).await {
                    Ok(added) => debug!("Proxy {}:{} registered as {}", added.server, added.port, added.id),
                    Err(e) => warn!("Failed to register proxy {}:{}: {}", proxy.server, proxy.port, e),
                }
            });
        }

        Ok(client)
    }
}

/// Handle to one engine session.
#[derive(Debug, Clone)]
pub struct Client {
    dispatcher: Arc<Dispatcher>,
    parameters: Arc<Map<String, Value>>,
    ready_settle_delay: Duration,
}

impl Client {
    pub fn builder(parameters: Map<String, Value>) -> ClientBuilder {
        ClientBuilder::new(parameters)
    }

    /// Send a raw request and return the raw response envelope.
    pub async fn send(&self, request: Request, cancel: &CancellationToken) -> Result<Envelope> {
        self.dispatcher.send(request, cancel).await
    }

    /// Call a typed function; the engine's `error` answer becomes [`TdError::Engine`].
    pub async fn call<F: Function>(&self, function: &F) -> Result<F::Output> {
        self.call_with(function, &CancellationToken::new()).await
    }

    pub async fn call_with<F: Function>(
        &self,
        function: &F,
        cancel: &CancellationToken,
    ) -> Result<F::Output> {
        let request = Request::from_function(function)?;
        self.send(request, cancel).await?.into_result()
    }

    pub async fn get_authorization_state(&self) -> Result<AuthorizationState> {
        self.call(&GetAuthorizationState::default()).await
    }

    /// Submit the startup parameters this client was built with.
    pub async fn set_parameters(&self) -> Result<Ack> {
        self.set_parameters_from(self.parameters.as_ref().clone())
            .await
    }

    pub async fn set_parameters_from(&self, parameters: Map<String, Value>) -> Result<Ack> {
        self.call(&SetParameters { parameters }).await
    }

    pub async fn set_authentication_phone_number(&self, phone_number: impl Into<String>) -> Result<Ack> {
        self.call(&SetAuthenticationPhoneNumber {
            phone_number: phone_number.into(),
            settings: PhoneNumberAuthenticationSettings::default(),
        })
        .await
    }

    pub async fn check_authentication_code(&self, code: impl Into<String>) -> Result<Ack> {
        self.call(&CheckAuthenticationCode { code: code.into() })
            .await
    }

    pub async fn check_authentication_password(&self, password: impl Into<String>) -> Result<Ack> {
        self.call(&CheckAuthenticationPassword {
            password: password.into(),
        })
        .await
    }

    pub async fn check_authentication_bot_token(&self, token: impl Into<String>) -> Result<Ack> {
        self.call(&CheckAuthenticationBotToken {
            token: token.into(),
        })
        .await
    }

    pub async fn request_qr_code_authentication(&self) -> Result<Ack> {
        self.call(&RequestQrCodeAuthentication::default()).await
    }

    /// Ask the engine to close; it answers `ok` and later pushes the Closed state.
    pub async fn close(&self) -> Result<Ack> {
        self.call(&Close::default()).await
    }

    pub async fn log_out(&self) -> Result<Ack> {
        self.call(&LogOut::default()).await
    }

    pub async fn add_proxy(&self, proxy: &AddProxy) -> Result<Proxy> {
        self.call(proxy).await
    }

    pub fn set_result_handler(&self, handler: Arc<dyn ResultHandler>) {
        self.dispatcher.register_observer(handler);
    }

    /// Observe every decoded message through a closure.
    pub fn on_result<F>(&self, callback: F)
    where
        F: Fn(&Object) + Send + Sync + 'static,
    {
        self.set_result_handler(Arc::new(CallbackResultHandler::new(callback)));
    }

    pub fn drop_result_handler(&self) {
        self.dispatcher.drop_observer();
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        self.dispatcher.rate_limiter()
    }

    /// Follow the authorization states the engine pushes.
    pub fn authorization_updates(&self) -> watch::Receiver<Option<AuthorizationState>> {
        self.dispatcher.subscribe_authorization()
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    pub fn ready_settle_delay(&self) -> Duration {
        self.ready_settle_delay
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_closed()
    }

    /// Wait until the engine reports Closed or the inbound stream ends.
    pub async fn closed(&self) {
        self.dispatcher.shutdown_token().cancelled().await
    }

    /// Stop the client locally without asking the engine.
    pub fn shutdown(&self) {
        self.dispatcher.shutdown();
    }
}
