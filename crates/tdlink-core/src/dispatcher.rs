//! Correlation and dispatch of engine messages.
//!
//! The engine speaks over one interleaved stream: answers to requests carry the
//! request's `@extra` correlation id, pushes carry none. The dispatcher turns
//! that stream into independent request/response calls:
//!
//! - [`Dispatcher::send`] tags a request with a fresh id, registers a pending
//!   call, passes admission control, writes to the transport and waits.
//! - [`Dispatcher::feed`] routes each inbound message to its pending call (if
//!   any) and hands the decoded value to the result observer.
//!
//! # Thread Safety
//!
//! `send` may run concurrently from any number of tasks; the only shared state
//! is the pending-call map and the admission limiter. `feed` is driven by the
//! single consumption task started with [`Dispatcher::run`], which is the only
//! writer into delivery slots and the only caller of the observer. A slow
//! observer stalls every pending call.

use crate::admission::RateLimiter;
use crate::cancel::CancellationToken;
use crate::transport::{Inbound, Transport};
use crate::types::{AuthorizationState, Envelope, Object, Request};
use crate::{Result, TdError};
use dashmap::DashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, trace};

/// Produces correlation ids.
///
/// Ids must be unique among outstanding requests. The default generator uses
/// random UUIDs; a collision is treated as impossible and is not detected (the
/// later request would replace the earlier one's delivery slot).
pub type ExtraGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Random UUID v4 correlation ids.
pub fn uuid_v4_generator() -> ExtraGenerator {
    Arc::new(|| uuid::Uuid::new_v4().to_string())
}

/// Observer for every decoded inbound message, responses included.
pub trait ResultHandler: Send + Sync {
    fn on_result(&self, result: &Object);
}

/// Observer backed by a closure.
pub struct CallbackResultHandler<F> {
    callback: F,
}

impl<F> CallbackResultHandler<F>
where
    F: Fn(&Object) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ResultHandler for CallbackResultHandler<F>
where
    F: Fn(&Object) + Send + Sync,
{
    fn on_result(&self, result: &Object) {
        (self.callback)(result)
    }
}

/// Default observer: discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResultHandler;

impl ResultHandler for NoopResultHandler {
    fn on_result(&self, _result: &Object) {}
}

type PendingMap = DashMap<String, oneshot::Sender<Envelope>>;

/// Removes a pending call on every exit path of `send`.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    extra: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.extra);
    }
}

/// Correlates requests with their responses over one transport.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    admission: RateLimiter,
    extra_generator: ExtraGenerator,
    observer: RwLock<Arc<dyn ResultHandler>>,
    pending: PendingMap,
    fallback_timeout: Duration,
    shutdown: CancellationToken,
    /// Latest pushed authorization state.
    authorization: watch::Sender<Option<AuthorizationState>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending.len())
            .field("fallback_timeout", &self.fallback_timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Dispatcher {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        admission: RateLimiter,
        extra_generator: ExtraGenerator,
        observer: Arc<dyn ResultHandler>,
        fallback_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            admission,
            extra_generator,
            observer: RwLock::new(observer),
            pending: DashMap::new(),
            fallback_timeout,
            shutdown: CancellationToken::new(),
            authorization: watch::channel(None).0,
        }
    }

    /// Send a request and wait for its response.
    ///
    /// Waits for the first of: the response, `cancel` firing, the fallback
    /// timeout, or client shutdown. Cancelling does not retract the request at
    /// the engine; a late answer is dropped by [`Dispatcher::feed`].
    pub async fn send(&self, mut request: Request, cancel: &CancellationToken) -> Result<Envelope> {
        if self.is_closed() {
            return Err(TdError::Closed);
        }

        let extra = (self.extra_generator)();
        request.set_extra(extra.clone());
        let payload = request.to_bytes()?;

        let (slot, delivery) = oneshot::channel();
        self.pending.insert(extra.clone(), slot);
        let _guard = PendingGuard {
            pending: &self.pending,
            extra: extra.clone(),
        };

        self.admission.wait().await;
        debug!("request: {} ({})", request.kind(), extra);
        self.transport.send_bytes(payload).await?;

        tokio::select! {
            biased;
            response = delivery => response.map_err(|_| TdError::Closed),
            _ = cancel.cancelled() => Err(TdError::Cancelled),
            _ = self.shutdown.cancelled() => Err(TdError::Closed),
            _ = tokio::time::sleep(self.fallback_timeout) => {
                Err(TdError::RequestTimeout(self.fallback_timeout))
            }
        }
    }

    /// Route one inbound message.
    ///
    /// Undecodable messages are dropped. A message whose id matches no pending
    /// call is dropped as a response but still reaches the observer, and so do
    /// messages without a typed [`Object`] variant.
    pub fn feed(&self, raw: &[u8]) {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("Dropping undecodable message: {}", e);
                return;
            }
        };

        if let Some(extra) = &envelope.extra {
            match self.pending.remove(extra) {
                Some((_, slot)) => {
                    if slot.send(envelope.clone()).is_err() {
                        trace!("Waiter for {} left before delivery", envelope.kind);
                    }
                }
                None => debug!("Dropping {} for unknown request {}", envelope.kind, extra),
            }
        }

        let object = match Object::from_envelope(envelope) {
            Ok(object) => object,
            Err(e) => {
                debug!("Not observing malformed message: {}", e);
                return;
            }
        };

        if let Object::UpdateAuthorizationState(update) = &object {
            self.authorization
                .send_replace(Some(update.authorization_state.clone()));
        }

        self.observer().on_result(&object);

        if object.is_closed_signal() && self.shutdown.cancel() {
            info!("Engine reported Closed, shutting down dispatcher");
        }
    }

    /// Consume the inbound stream until shutdown or until the stream ends.
    ///
    /// The end of the stream also shuts the dispatcher down: no response can
    /// arrive any more.
    pub async fn run(self: Arc<Self>, mut inbound: Inbound) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(raw) => self.feed(&raw),
                    None => {
                        debug!("Inbound stream ended");
                        self.shutdown.cancel();
                        break;
                    }
                },
            }
        }
        debug!("Dispatcher consumption loop stopped");
    }

    pub fn register_observer(&self, observer: Arc<dyn ResultHandler>) {
        *self.observer.write().unwrap_or_else(|e| e.into_inner()) = observer;
    }

    /// Restore the default no-op observer.
    pub fn drop_observer(&self) {
        self.register_observer(Arc::new(NoopResultHandler));
    }

    fn observer(&self) -> Arc<dyn ResultHandler> {
        self.observer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Follow authorization state pushes; holds `None` until the first one.
    pub fn subscribe_authorization(&self) -> watch::Receiver<Option<AuthorizationState>> {
        self.authorization.subscribe()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.admission
    }

    /// Number of calls still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled exactly once when the dispatcher shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop the consumption loop and fail every pending call with `Closed`.
    pub fn shutdown(&self) {
        if self.shutdown.cancel() {
            debug!("Dispatcher shut down by caller");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::Unthrottled;
    use crate::transport::memory::{self, EngineEndpoint};
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fixture(timeout: Duration, generator: ExtraGenerator) -> (Arc<Dispatcher>, EngineEndpoint) {
        let (transport, inbound, engine) = memory::pair();
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(transport),
            RateLimiter::new(Arc::new(Unthrottled)),
            generator,
            Arc::new(NoopResultHandler),
            timeout,
        ));
        tokio::spawn(dispatcher.clone().run(inbound));
        (dispatcher, engine)
    }

    fn echo_request(value: u64) -> Request {
        let mut payload = Map::new();
        payload.insert("value".into(), json!(value));
        Request::new("echo", payload)
    }

    struct CountingHandler {
        seen: AtomicUsize,
    }

    impl ResultHandler for CountingHandler {
        fn on_result(&self, _result: &Object) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_response_delivered_to_matching_id() {
        let (dispatcher, mut engine) =
            fixture(Duration::from_secs(5), Arc::new(|| "abc".to_string()));

        let caller = dispatcher.clone();
        let call = tokio::spawn(async move {
            caller
                .send(echo_request(1), &CancellationToken::new())
                .await
        });

        let request = engine.next_request().await.unwrap().unwrap();
        assert_eq!(request.extra.as_deref(), Some("abc"));
        dispatcher.feed(br#"{"@type":"echoed","@extra":"abc","payload":"X"}"#);

        let response = call.await.unwrap().unwrap();
        assert_eq!(response.kind, "echoed");
        assert_eq!(response.data["payload"], json!("X"));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_releases_pending_call() {
        let (dispatcher, _engine) = fixture(Duration::from_millis(1), uuid_v4_generator());

        let result = dispatcher
            .send(echo_request(1), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(TdError::RequestTimeout(_))));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_sends_receive_own_responses() {
        let (dispatcher, mut engine) = fixture(Duration::from_secs(5), uuid_v4_generator());

        let calls: Vec<_> = (0..16u64)
            .map(|i| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    let response = dispatcher
                        .send(echo_request(i), &CancellationToken::new())
                        .await
                        .unwrap();
                    (i, response)
                })
            })
            .collect();

        let mut requests = Vec::new();
        for _ in 0..16 {
            requests.push(engine.next_request().await.unwrap().unwrap());
        }

        // Answer in reverse order, interleaved with id-less pushes.
        for request in requests.iter().rev() {
            engine
                .push(json!({"@type": "updateOption", "name": "unix_time", "value": {}}))
                .await
                .unwrap();
            let value = request.data["value"].clone();
            engine
                .reply(request, json!({"@type": "echoed", "value": value}))
                .await
                .unwrap();
        }

        for (i, response) in futures::future::join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap())
        {
            assert_eq!(response.data["value"], json!(i));
        }
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unmatched_id_is_dropped_without_affecting_others() {
        let (dispatcher, mut engine) = fixture(Duration::from_secs(5), uuid_v4_generator());

        let caller = dispatcher.clone();
        let call = tokio::spawn(async move {
            caller
                .send(echo_request(7), &CancellationToken::new())
                .await
        });
        let request = engine.next_request().await.unwrap().unwrap();

        engine
            .push(json!({"@type": "echoed", "@extra": "never-issued", "value": 0}))
            .await
            .unwrap();
        engine
            .reply(&request, json!({"@type": "echoed", "value": 7}))
            .await
            .unwrap();

        let response = call.await.unwrap().unwrap();
        assert_eq!(response.data["value"], json!(7));
    }

    #[tokio::test]
    async fn test_cancellation_releases_pending_call() {
        let (dispatcher, mut engine) = fixture(Duration::from_secs(5), uuid_v4_generator());
        let cancel = CancellationToken::new();

        let caller = dispatcher.clone();
        let token = cancel.clone();
        let call = tokio::spawn(async move { caller.send(echo_request(1), &token).await });

        let request = engine.next_request().await.unwrap().unwrap();
        cancel.cancel();
        assert!(matches!(call.await.unwrap(), Err(TdError::Cancelled)));
        assert_eq!(dispatcher.pending_count(), 0);

        // The late answer is dropped; the dispatcher keeps working.
        engine
            .reply(&request, json!({"@type": "echoed", "value": 1}))
            .await
            .unwrap();
        let caller = dispatcher.clone();
        let next = tokio::spawn(async move {
            caller
                .send(echo_request(2), &CancellationToken::new())
                .await
        });
        let request = engine.next_request().await.unwrap().unwrap();
        engine
            .reply(&request, json!({"@type": "echoed", "value": 2}))
            .await
            .unwrap();
        assert_eq!(next.await.unwrap().unwrap().data["value"], json!(2));
    }

    struct FailingTransport;

    #[async_trait::async_trait]
    impl Transport for FailingTransport {
        async fn send_bytes(&self, _payload: Vec<u8>) -> Result<()> {
            Err(TdError::transport("connection reset"))
        }
    }

    #[tokio::test]
    async fn test_transport_failure_releases_pending_call() {
        let dispatcher = Dispatcher::new(
            Arc::new(FailingTransport),
            RateLimiter::new(Arc::new(Unthrottled)),
            uuid_v4_generator(),
            Arc::new(NoopResultHandler),
            Duration::from_secs(5),
        );

        let result = dispatcher
            .send(echo_request(1), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(TdError::Transport { .. })));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_bad_message_does_not_stop_consumption() {
        let (dispatcher, mut engine) = fixture(Duration::from_secs(5), uuid_v4_generator());

        engine.send_raw(b"{not json".to_vec()).await.unwrap();
        engine.send_raw(b"[]".to_vec()).await.unwrap();

        let caller = dispatcher.clone();
        let call = tokio::spawn(async move {
            caller
                .send(echo_request(3), &CancellationToken::new())
                .await
        });
        let request = engine.next_request().await.unwrap().unwrap();
        engine
            .reply(&request, json!({"@type": "echoed", "value": 3}))
            .await
            .unwrap();

        assert_eq!(call.await.unwrap().unwrap().data["value"], json!(3));
        assert!(!dispatcher.is_closed());
    }

    #[tokio::test]
    async fn test_observer_sees_responses_and_pushes() {
        let (dispatcher, mut engine) = fixture(Duration::from_secs(5), uuid_v4_generator());
        let handler = Arc::new(CountingHandler {
            seen: AtomicUsize::new(0),
        });
        dispatcher.register_observer(handler.clone());

        let caller = dispatcher.clone();
        let call = tokio::spawn(async move {
            caller
                .send(echo_request(1), &CancellationToken::new())
                .await
        });
        let request = engine.next_request().await.unwrap().unwrap();
        engine
            .push(json!({"@type": "updateOption", "name": "version", "value": {}}))
            .await
            .unwrap();
        engine.reply(&request, json!({"@type": "ok"})).await.unwrap();

        assert_eq!(call.await.unwrap().unwrap().kind, "ok");
        assert_eq!(handler.seen.load(Ordering::SeqCst), 2);

        dispatcher.drop_observer();
        dispatcher.feed(br#"{"@type":"ok"}"#);
        assert_eq!(handler.seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_observer_sees_unmodelled_pushes() {
        let (dispatcher, _engine) = fixture(Duration::from_secs(5), uuid_v4_generator());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        dispatcher.register_observer(Arc::new(CallbackResultHandler::new(move |object: &Object| {
            sink.lock().unwrap().push(object.clone());
        })));

        dispatcher.feed(br#"{"@type":"updateNewMessage","message":{"id":7,"chat_id":-100}}"#);
        dispatcher.feed(br#"{"@type":"updateUser","user":{"id":9}}"#);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        match &seen[0] {
            Object::Other(envelope) => {
                assert_eq!(envelope.kind, "updateNewMessage");
                assert_eq!(envelope.data["message"]["chat_id"], json!(-100));
            }
            other => panic!("Expected Other, got: {:?}", other),
        }
        assert_eq!(seen[1].kind(), "updateUser");
    }

    #[tokio::test]
    async fn test_closed_signal_shuts_down_once() {
        let (dispatcher, mut engine) = fixture(Duration::from_secs(5), uuid_v4_generator());
        let handler = Arc::new(CountingHandler {
            seen: AtomicUsize::new(0),
        });
        dispatcher.register_observer(handler.clone());

        let caller = dispatcher.clone();
        let call = tokio::spawn(async move {
            caller
                .send(echo_request(1), &CancellationToken::new())
                .await
        });
        engine.next_request().await.unwrap().unwrap();

        let closed: Value = json!({
            "@type": "updateAuthorizationState",
            "authorization_state": {"@type": "authorizationStateClosed"}
        });
        engine.push(closed.clone()).await.unwrap();

        assert!(matches!(call.await.unwrap(), Err(TdError::Closed)));
        assert!(dispatcher.is_closed());
        assert_eq!(dispatcher.pending_count(), 0);
        assert_eq!(handler.seen.load(Ordering::SeqCst), 1);

        let result = dispatcher
            .send(echo_request(2), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(TdError::Closed)));
    }

    #[tokio::test]
    async fn test_authorization_pushes_are_tracked() {
        let (dispatcher, engine) = fixture(Duration::from_secs(5), uuid_v4_generator());
        let mut updates = dispatcher.subscribe_authorization();
        assert_eq!(*updates.borrow(), None);

        engine
            .push(json!({
                "@type": "updateAuthorizationState",
                "authorization_state": {"@type": "authorizationStateWaitCode"}
            }))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), updates.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            *updates.borrow_and_update(),
            Some(AuthorizationState::WaitCode)
        );
    }
}
