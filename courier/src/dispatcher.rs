//! The request pipeline.
//!
//! One dispatch cycle runs: request interceptors, payload serialization,
//! the auth strategy (if any), the transport, response interceptors, the
//! status resolution policy, and deserialization, settling a per-cycle
//! [`Deferred`] at the end. A [`RequestPromise`] aggregates the cycles of
//! a polling request behind one handle with persistent callbacks.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::auth::Auth;
use crate::deferred::{Deferred, Progress, SettleResult};
use crate::error::{ErrorKind, RequestError};
use crate::header::Header;
use crate::http::Method;
use crate::interceptor::InterceptorChain;
use crate::metrics;
use crate::payload::SerializedPayload;
use crate::request::{PollingStrategy, SerializedRequest};
use crate::response::{RawResponse, Response};
use crate::scheduler::Scheduler;
use crate::serialization::{
    Providers, SerializationContext, SerializationError, SerializerRegistry,
};
use crate::store::LeafStore;
use crate::transport::{
    Connection, TlsClientConfig, Transport, TransportError, TransportEvents,
};
use crate::uri::Uri;

/// Produces the outgoing payload for one cycle. Re-invoked per polling
/// cycle, so mutations made by interceptors never leak into the next
/// serialization.
pub type PayloadCodec = Arc<
    dyn Fn(&SerializerRegistry, &SerializationContext) -> Result<SerializedPayload, SerializationError>
        + Send
        + Sync,
>;

/// Turns an intercepted raw response into the typed body.
pub type ResponseDecoder<T> = Arc<
    dyn Fn(&RawResponse, &SerializerRegistry, &Arc<Providers>) -> Result<T, SerializationError>
        + Send
        + Sync,
>;

/// Terminal callback for side-channel dispatches made by auth strategies.
pub type DualCallback = Box<dyn FnOnce(Result<RawResponse, RequestError>) + Send>;

// Shortest interval a polling cycle may be scheduled at.
const MIN_POLL_DELAY: Duration = Duration::from_millis(10);

/// Store key under which the dispatcher records the current cycle number
/// (`u32`), readable by interceptors and auth strategies through the
/// request's context store.
pub const POLL_COUNT_KEY: &str = "courier.polling.count";

/// Type-erased continuation of one cycle past the transport: delivery of
/// the terminal result plus progress and connection plumbing.
#[derive(Clone)]
pub(crate) struct ResponseSink {
    deliver: Arc<dyn Fn(Result<RawResponse, RequestError>) + Send + Sync>,
    upload: Arc<dyn Fn(Progress) + Send + Sync>,
    download: Arc<dyn Fn(Progress) + Send + Sync>,
    attach: Arc<dyn Fn(Arc<dyn Connection>) + Send + Sync>,
}

struct EventsAdapter {
    sink: ResponseSink,
    method: Method,
    uri: String,
    timeout_ms: u64,
}

impl TransportEvents for EventsAdapter {
    fn on_response(&mut self, response: RawResponse) {
        (self.sink.deliver)(Ok(response));
    }

    fn on_error(&mut self, error: TransportError) {
        let kind = classify(error, self.timeout_ms);
        (self.sink.deliver)(Err(RequestError::new(self.method, &self.uri, kind)));
    }

    fn on_upload_progress(&mut self, progress: Progress) {
        (self.sink.upload)(progress);
    }

    fn on_download_progress(&mut self, progress: Progress) {
        (self.sink.download)(progress);
    }
}

fn classify(error: TransportError, timeout_ms: u64) -> ErrorKind {
    match error {
        TransportError::Permission(reason) => ErrorKind::Permission(reason),
        TransportError::Dispatch(reason) => ErrorKind::Dispatch(reason),
        TransportError::Timeout => ErrorKind::Timeout(timeout_ms),
        TransportError::Network(reason) => ErrorKind::Network(reason),
    }
}

pub struct RequestDispatcher {
    transport: Arc<dyn Transport>,
    scheduler: Arc<dyn Scheduler>,
    interceptors: Arc<InterceptorChain>,
    registry: SerializerRegistry,
    providers: Arc<Providers>,
}

impl RequestDispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn Scheduler>,
        interceptors: Arc<InterceptorChain>,
        registry: SerializerRegistry,
        providers: Arc<Providers>,
    ) -> Self {
        Self { transport, scheduler, interceptors, registry, providers }
    }

    pub fn registry(&self) -> &SerializerRegistry {
        &self.registry
    }

    pub fn providers(&self) -> &Arc<Providers> {
        &self.providers
    }

    /// Entry point: schedules the first cycle after the request's
    /// configured delay and returns the aggregating promise.
    pub fn dispatch<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        request: SerializedRequest,
        auth: Option<Arc<dyn Auth>>,
        codec: Option<PayloadCodec>,
        decoder: ResponseDecoder<T>,
    ) -> RequestPromise<T> {
        let promise = RequestPromise::new(
            request.method(),
            request.uri().to_string(),
            request.polling(),
        );
        let delay = request.options().delay;
        self.schedule_cycle(delay, request, auth, codec, decoder, promise.clone());
        promise
    }

    fn schedule_cycle<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        delay: Duration,
        request: SerializedRequest,
        auth: Option<Arc<dyn Auth>>,
        codec: Option<PayloadCodec>,
        decoder: ResponseDecoder<T>,
        promise: RequestPromise<T>,
    ) {
        let this = self.clone();
        self.scheduler.schedule(
            delay,
            Box::new(move || this.run_cycle(request, auth, codec, decoder, promise)),
        );
    }

    fn run_cycle<T: Send + Sync + 'static>(
        self: Arc<Self>,
        mut request: SerializedRequest,
        auth: Option<Arc<dyn Auth>>,
        codec: Option<PayloadCodec>,
        decoder: ResponseDecoder<T>,
        promise: RequestPromise<T>,
    ) {
        if promise.inner.aborted.load(Ordering::SeqCst) {
            return;
        }
        // A continuation scheduled before stop_polling was called still
        // lands here; drop it.
        if promise.inner.polling_count.load(Ordering::SeqCst) > 0 && !promise.polling_active() {
            return;
        }
        promise.begin_cycle();
        crate::store::save_value(
            request.store().as_ref(),
            POLL_COUNT_KEY,
            promise.polling_count(),
        );
        metrics::REQUESTS_DISPATCHED.increment();
        log::debug!(
            "dispatching {} {} (cycle {})",
            request.method(),
            request.uri(),
            promise.polling_count()
        );

        let deferred: Deferred<T> = Deferred::new();
        promise.attach_cycle(&deferred);

        // Settlement feeds the promise, then schedules the next polling
        // cycle. The replica is taken before interceptors run.
        {
            let this = self.clone();
            let promise = promise.clone();
            let next = request.replicate();
            let auth = auth.clone();
            let codec = codec.clone();
            let decoder = decoder.clone();
            deferred.on_settle(move |result| {
                promise.deliver(result);
                let Some(polling) = next.polling().cloned() else {
                    return;
                };
                if !promise.polling_active() {
                    return;
                }
                metrics::POLL_CYCLES.increment();
                let delay = match polling.strategy {
                    PollingStrategy::Short => polling.interval.max(MIN_POLL_DELAY),
                    PollingStrategy::Long => Duration::ZERO,
                };
                this.schedule_cycle(delay, next, auth, codec, decoder, promise);
            });
        }

        self.interceptors.run_request(&mut request);

        if let Some(codec) = &codec {
            let ctx = SerializationContext::new(
                request.effective_content_type(),
                request.options().charset.clone(),
                request.options().fields.clone(),
                self.providers.clone(),
            );
            match codec(&self.registry, &ctx) {
                Ok(payload) => request.set_payload(payload),
                Err(error) => {
                    deferred.reject(RequestError::new(
                        request.method(),
                        request.uri().to_string(),
                        error.into(),
                    ));
                    return;
                }
            }
        }

        if !request.headers().contains("Content-Type") && !request.payload().is_empty() {
            request.set_header(Header::content_type(request.effective_content_type()));
        }

        let sink = self.cycle_sink(&request, deferred, decoder);

        match auth {
            Some(auth) => auth.auth(PreparedRequest {
                request,
                dispatcher: self,
                sink,
            }),
            None => self.transport_send(request, sink),
        }
    }

    fn cycle_sink<T: Send + Sync + 'static>(
        &self,
        request: &SerializedRequest,
        deferred: Deferred<T>,
        decoder: ResponseDecoder<T>,
    ) -> ResponseSink {
        let interceptors = self.interceptors.clone();
        let registry = self.registry.clone();
        let providers = self.providers.clone();
        let method = request.method();
        let uri = request.uri().to_string();
        let resolve_any_status = request.options().resolve_any_status;

        let settle = deferred.clone();
        let upload = deferred.clone();
        let download = deferred.clone();
        let attach = deferred;

        ResponseSink {
            deliver: Arc::new(move |result| match result {
                Err(error) => settle.reject(error),
                Ok(mut raw) => {
                    metrics::RESPONSES_RECEIVED.increment();
                    interceptors.run_response(&mut raw);
                    if !raw.status.is_success() && !resolve_any_status {
                        settle.reject(RequestError::new(
                            method,
                            &uri,
                            ErrorKind::Status { status: raw.status },
                        ));
                        return;
                    }
                    match decoder(&raw, &registry, &providers) {
                        Ok(body) => {
                            settle.resolve(Response::new(raw.status, raw.headers, body));
                        }
                        Err(error) => {
                            settle.reject(RequestError::new(method, &uri, error.into()));
                        }
                    }
                }
            }),
            upload: Arc::new(move |progress| upload.notify_upload(progress)),
            download: Arc::new(move |progress| download.notify_download(progress)),
            attach: Arc::new(move |connection| attach.set_connection(connection)),
        }
    }

    pub(crate) fn transport_send(&self, request: SerializedRequest, sink: ResponseSink) {
        let timeout_ms = request
            .options()
            .timeout
            .map(|t| t.as_millis() as u64)
            .unwrap_or(0);
        let events = Box::new(EventsAdapter {
            sink: sink.clone(),
            method: request.method(),
            uri: request.uri().to_string(),
            timeout_ms,
        });
        match self.transport.dispatch(&request, events) {
            Ok(connection) => (sink.attach)(connection),
            Err(error) => {
                let kind = classify(error, timeout_ms);
                (sink.deliver)(Err(RequestError::new(
                    request.method(),
                    request.uri().to_string(),
                    kind,
                )));
            }
        }
    }

    /// Sends a side-channel request outside the normal pipeline: no
    /// interceptors, auth, polling, or deserialization. Auth strategies
    /// use this for challenge rounds.
    pub fn dispatch_attempt(&self, request: SerializedRequest, callback: DualCallback) {
        metrics::AUTH_ATTEMPTS.increment();
        let callback = Arc::new(Mutex::new(Some(callback)));
        let sink = ResponseSink {
            deliver: Arc::new(move |result| {
                if let Some(callback) = callback.lock().unwrap().take() {
                    callback(result);
                }
            }),
            upload: Arc::new(|_| {}),
            download: Arc::new(|_| {}),
            attach: Arc::new(|_| {}),
        };
        self.transport_send(request, sink);
    }
}

/// A request paused at the auth stage.
///
/// The strategy may adjust the request, fire side-channel attempts
/// through [`dispatcher`](PreparedRequest::dispatcher), and must finish
/// by calling exactly one of [`send`](PreparedRequest::send),
/// [`abort`](PreparedRequest::abort), or
/// [`abort_with_response`](PreparedRequest::abort_with_response).
pub struct PreparedRequest {
    request: SerializedRequest,
    dispatcher: Arc<RequestDispatcher>,
    sink: ResponseSink,
}

impl PreparedRequest {
    pub fn method(&self) -> Method {
        self.request.method()
    }

    pub fn uri(&self) -> &Uri {
        self.request.uri()
    }

    pub fn payload(&self) -> &SerializedPayload {
        self.request.payload()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.request.header(name)
    }

    pub fn store(&self) -> &Arc<LeafStore> {
        self.request.store()
    }

    pub fn set_header(&mut self, header: Header) {
        self.request.set_header(header);
    }

    pub fn set_with_credentials(&mut self, with_credentials: bool) {
        self.request.options_mut().with_credentials = with_credentials;
    }

    pub fn set_tls(&mut self, tls: TlsClientConfig) {
        self.request.set_tls(tls);
    }

    /// Appends a query parameter, rebuilding the uri.
    pub fn set_query_param(&mut self, name: &str, value: &str) {
        let rebuilt = crate::uri::UriBuilder::from_uri(self.request.uri())
            .query_param(name, &[value])
            .build(&[]);
        match rebuilt {
            Ok(uri) => self.request.set_uri(uri),
            Err(error) => log::warn!("could not rebuild uri with query param {name}: {error}"),
        }
    }

    /// A detached copy, sharing the context store, for side-channel
    /// attempts.
    pub fn mutable_copy(&self) -> SerializedRequest {
        self.request.replicate()
    }

    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }

    /// Builds an error carrying this request's method and uri.
    pub fn error(&self, kind: ErrorKind) -> RequestError {
        RequestError::new(self.request.method(), self.request.uri().to_string(), kind)
    }

    /// Releases the request to the transport.
    pub fn send(self) {
        self.dispatcher.transport_send(self.request, self.sink);
    }

    /// Fails the exchange without touching the wire.
    pub fn abort(self, error: RequestError) {
        (self.sink.deliver)(Err(error));
    }

    /// Settles the exchange with a response obtained out of band, running
    /// the normal response half of the pipeline on it.
    pub fn abort_with_response(self, response: RawResponse) {
        (self.sink.deliver)(Ok(response));
    }
}

struct PromiseInner<T> {
    method: Method,
    uri: String,
    success: Mutex<Vec<Box<dyn FnMut(&Response<T>) + Send>>>,
    error: Mutex<Vec<Box<dyn FnMut(&RequestError) + Send>>>,
    upload: Mutex<Vec<Box<dyn FnMut(Progress) + Send>>>,
    download: Mutex<Vec<Box<dyn FnMut(Progress) + Send>>>,
    last: Mutex<Option<SettleResult<T>>>,
    waiters: Mutex<Vec<crossbeam_channel::Sender<SettleResult<T>>>>,
    polling_active: AtomicBool,
    polling_limit: u32,
    polling_count: AtomicU32,
    aborted: AtomicBool,
    abort_handle: Mutex<Option<Box<dyn Fn(RequestError) + Send>>>,
}

/// Caller-facing handle for a dispatched request.
///
/// Callbacks are persistent: for a polling request they fire once per
/// cycle. Registering after a settlement also fires immediately with the
/// latest result.
pub struct RequestPromise<T> {
    inner: Arc<PromiseInner<T>>,
}

impl<T> Clone for RequestPromise<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: Send + Sync + 'static> RequestPromise<T> {
    fn new(method: Method, uri: String, polling: Option<&crate::request::PollingOptions>) -> Self {
        Self {
            inner: Arc::new(PromiseInner {
                method,
                uri,
                success: Mutex::new(Vec::new()),
                error: Mutex::new(Vec::new()),
                upload: Mutex::new(Vec::new()),
                download: Mutex::new(Vec::new()),
                last: Mutex::new(None),
                waiters: Mutex::new(Vec::new()),
                polling_active: AtomicBool::new(polling.is_some()),
                polling_limit: polling.map(|p| p.limit).unwrap_or(0),
                polling_count: AtomicU32::new(0),
                aborted: AtomicBool::new(false),
                abort_handle: Mutex::new(None),
            }),
        }
    }

    pub fn method(&self) -> Method {
        self.inner.method
    }

    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    pub fn on_success(&self, callback: impl FnMut(&Response<T>) + Send + 'static) -> &Self {
        let mut callback = Box::new(callback);
        // Push while still holding the `last` guard when pending, so a
        // concurrent deliver cannot settle and drain in between, leaving
        // the callback stranded. Late-fires run outside the lock.
        let settled = {
            let last = self.inner.last.lock().unwrap();
            match &*last {
                None => {
                    self.inner.success.lock().unwrap().push(callback);
                    return self;
                }
                Some(result) => result.clone(),
            }
        };
        if let Ok(response) = &settled {
            callback(response);
        }
        self.inner.success.lock().unwrap().push(callback);
        self
    }

    pub fn on_error(&self, callback: impl FnMut(&RequestError) + Send + 'static) -> &Self {
        let mut callback = Box::new(callback);
        let settled = {
            let last = self.inner.last.lock().unwrap();
            match &*last {
                None => {
                    self.inner.error.lock().unwrap().push(callback);
                    return self;
                }
                Some(result) => result.clone(),
            }
        };
        if let Err(error) = &settled {
            callback(error);
        }
        self.inner.error.lock().unwrap().push(callback);
        self
    }

    pub fn on_upload_progress(&self, callback: impl FnMut(Progress) + Send + 'static) -> &Self {
        self.inner.upload.lock().unwrap().push(Box::new(callback));
        self
    }

    pub fn on_download_progress(&self, callback: impl FnMut(Progress) + Send + 'static) -> &Self {
        self.inner.download.lock().unwrap().push(Box::new(callback));
        self
    }

    /// Latest settlement, if any cycle has completed.
    pub fn result(&self) -> Option<SettleResult<T>> {
        self.inner.last.lock().unwrap().clone()
    }

    /// Blocks for a settlement. Returns the latest one immediately if a
    /// cycle already completed; times out with a timeout error otherwise.
    pub fn wait(&self, timeout: Duration) -> SettleResult<T> {
        let receiver = {
            let last = self.inner.last.lock().unwrap();
            if let Some(result) = &*last {
                return result.clone();
            }
            let (tx, rx) = crossbeam_channel::bounded(1);
            self.inner.waiters.lock().unwrap().push(tx);
            rx
        };
        receiver.recv_timeout(timeout).unwrap_or_else(|_| {
            Err(Arc::new(RequestError::new(
                self.inner.method,
                &self.inner.uri,
                ErrorKind::Timeout(timeout.as_millis() as u64),
            )))
        })
    }

    pub fn polling_active(&self) -> bool {
        self.inner.polling_active.load(Ordering::SeqCst)
    }

    /// Cycles started so far; `1` after a non-polling dispatch.
    pub fn polling_count(&self) -> u32 {
        self.inner.polling_count.load(Ordering::SeqCst)
    }

    /// No further cycles will start; the in-flight one still settles.
    pub fn stop_polling(&self) {
        self.inner.polling_active.store(false, Ordering::SeqCst);
    }

    /// Cancels the in-flight cycle and stops polling. The promise
    /// settles with an abort error.
    pub fn abort(&self) {
        self.stop_polling();
        self.inner.aborted.store(true, Ordering::SeqCst);
        let error = RequestError::new(
            self.inner.method,
            &self.inner.uri,
            ErrorKind::Abort("cancelled by caller".into()),
        );
        let handle = self.inner.abort_handle.lock().unwrap().take();
        match handle {
            Some(handle) => handle(error),
            // Aborted before the first cycle ran; settle directly.
            None => self.deliver(&Err(Arc::new(error))),
        }
    }

    fn begin_cycle(&self) {
        let count = self.inner.polling_count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.inner.polling_limit > 0 && count >= self.inner.polling_limit {
            self.inner.polling_active.store(false, Ordering::SeqCst);
        }
    }

    fn attach_cycle(&self, deferred: &Deferred<T>) {
        let cycle = deferred.clone();
        *self.inner.abort_handle.lock().unwrap() = Some(Box::new(move |error| cycle.abort(error)));

        let promise = self.clone();
        deferred.on_upload_progress(move |progress| {
            for callback in promise.inner.upload.lock().unwrap().iter_mut() {
                callback(progress);
            }
        });
        let promise = self.clone();
        deferred.on_download_progress(move |progress| {
            for callback in promise.inner.download.lock().unwrap().iter_mut() {
                callback(progress);
            }
        });
    }

    fn deliver(&self, result: &SettleResult<T>) {
        *self.inner.last.lock().unwrap() = Some(result.clone());
        // Callbacks run outside the list lock so they may register
        // further callbacks on this promise.
        match result {
            Ok(response) => {
                let mut callbacks = std::mem::take(&mut *self.inner.success.lock().unwrap());
                for callback in callbacks.iter_mut() {
                    callback(response);
                }
                let mut lock = self.inner.success.lock().unwrap();
                callbacks.append(&mut lock);
                *lock = callbacks;
            }
            Err(error) => {
                metrics::REQUESTS_FAILED.increment();
                let mut callbacks = std::mem::take(&mut *self.inner.error.lock().unwrap());
                for callback in callbacks.iter_mut() {
                    callback(error);
                }
                let mut lock = self.inner.error.lock().unwrap();
                callbacks.append(&mut lock);
                *lock = callbacks;
            }
        }
        for waiter in self.inner.waiters.lock().unwrap().drain(..) {
            let _ = waiter.try_send(result.clone());
        }
    }
}
