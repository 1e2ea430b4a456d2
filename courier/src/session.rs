//! Session construction and the fluent request surface.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::auth::Auth;
use crate::dispatcher::{PayloadCodec, RequestDispatcher, RequestPromise, ResponseDecoder};
use crate::header::{Header, Headers};
use crate::http::Method;
use crate::interceptor::{InterceptorChain, RequestInterceptor, ResponseInterceptor};
use crate::payload::SerializedPayload;
use crate::request::{PollingOptions, RequestOptions, SerializedRequest};
use crate::response::RawResponse;
use crate::scheduler::{Scheduler, ThreadScheduler};
use crate::serialization::{
    DeserializationContext, Deserializer, Providers, SerializationError, Serializer,
    SerializerRegistry,
};
use crate::store::{save_value, LeafStore, RootStore};
use crate::transport::{TlsClientConfig, Transport};
use crate::uri::{Uri, UriParseError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a transport is required to build a session")]
    MissingTransport,

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

/// Configures and builds a [`Session`].
pub struct SessionBuilder {
    transport: Option<Arc<dyn Transport>>,
    scheduler: Arc<dyn Scheduler>,
    defaults: RequestOptions,
    registry: SerializerRegistry,
    providers: Arc<Providers>,
    interceptors: InterceptorChain,
    pending: Option<SerializationError>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            scheduler: Arc::new(ThreadScheduler),
            defaults: RequestOptions::default(),
            registry: SerializerRegistry::with_defaults(),
            providers: Arc::new(Providers::new()),
            interceptors: InterceptorChain::new(),
            pending: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.defaults.timeout = Some(timeout);
        self
    }

    pub fn content_type(mut self, media_type: impl Into<String>) -> Self {
        self.defaults.content_type = Some(media_type.into());
        self
    }

    pub fn accept(mut self, media_type: impl Into<String>) -> Self {
        self.defaults.accept = Some(media_type.into());
        self
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.defaults.charset = charset.into();
        self
    }

    /// Resolve promises for every status instead of rejecting non-2xx.
    pub fn resolve_any_status(mut self) -> Self {
        self.defaults.resolve_any_status = true;
        self
    }

    pub fn serializer<T, S>(mut self, serializer: Arc<S>) -> Self
    where
        T: 'static,
        S: Serializer<T> + Deserializer<T> + 'static,
    {
        if let Err(error) = self.registry.register::<T, S>(serializer) {
            self.pending.get_or_insert(error);
        }
        self
    }

    pub fn provider<T: Any>(self, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.providers.register(factory);
        self
    }

    pub fn request_interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.interceptors.add_request(interceptor);
        self
    }

    pub fn response_interceptor(mut self, interceptor: Arc<dyn ResponseInterceptor>) -> Self {
        self.interceptors.add_response(interceptor);
        self
    }

    pub fn build(self) -> Result<Session, SessionError> {
        if let Some(error) = self.pending {
            return Err(error.into());
        }
        let transport = self.transport.ok_or(SessionError::MissingTransport)?;
        let dispatcher = Arc::new(RequestDispatcher::new(
            transport,
            self.scheduler,
            Arc::new(self.interceptors),
            self.registry.clone(),
            self.providers.clone(),
        ));
        Ok(Session {
            inner: Arc::new(SessionInner {
                dispatcher,
                registry: self.registry,
                providers: self.providers,
                store: Arc::new(RootStore::new()),
                defaults: self.defaults,
            }),
        })
    }
}

struct SessionInner {
    dispatcher: Arc<RequestDispatcher>,
    registry: SerializerRegistry,
    providers: Arc<Providers>,
    store: Arc<RootStore>,
    defaults: RequestOptions,
}

/// A configured client: transport, serializers, interceptors, defaults,
/// and the root context store. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn registry(&self) -> &SerializerRegistry {
        &self.inner.registry
    }

    pub fn providers(&self) -> &Arc<Providers> {
        &self.inner.providers
    }

    pub fn store(&self) -> &Arc<RootStore> {
        &self.inner.store
    }

    pub fn request(&self, method: Method, uri: &str) -> Result<RequestBuilder, UriParseError> {
        Ok(self.request_uri(method, Uri::parse(uri)?))
    }

    pub fn request_uri(&self, method: Method, uri: Uri) -> RequestBuilder {
        RequestBuilder {
            session: self.inner.clone(),
            method,
            uri,
            headers: Headers::new(),
            options: self.inner.defaults.clone(),
            polling: None,
            auth: None,
            tls: None,
            codec: None,
            payload: SerializedPayload::empty(),
            store: Arc::new(LeafStore::new(self.inner.store.clone())),
        }
    }

    pub fn get(&self, uri: &str) -> Result<RequestBuilder, UriParseError> {
        self.request(Method::Get, uri)
    }

    pub fn post(&self, uri: &str) -> Result<RequestBuilder, UriParseError> {
        self.request(Method::Post, uri)
    }

    pub fn put(&self, uri: &str) -> Result<RequestBuilder, UriParseError> {
        self.request(Method::Put, uri)
    }

    pub fn delete(&self, uri: &str) -> Result<RequestBuilder, UriParseError> {
        self.request(Method::Delete, uri)
    }

    pub fn patch(&self, uri: &str) -> Result<RequestBuilder, UriParseError> {
        self.request(Method::Patch, uri)
    }

    pub fn head(&self, uri: &str) -> Result<RequestBuilder, UriParseError> {
        self.request(Method::Head, uri)
    }

    pub fn options(&self, uri: &str) -> Result<RequestBuilder, UriParseError> {
        self.request(Method::Options, uri)
    }
}

/// Builds one request; terminal `send*` methods dispatch it.
pub struct RequestBuilder {
    session: Arc<SessionInner>,
    method: Method,
    uri: Uri,
    headers: Headers,
    options: RequestOptions,
    polling: Option<PollingOptions>,
    auth: Option<Arc<dyn Auth>>,
    tls: Option<TlsClientConfig>,
    codec: Option<PayloadCodec>,
    payload: SerializedPayload,
    store: Arc<LeafStore>,
}

impl RequestBuilder {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.set_field(name, value);
        self
    }

    pub fn header_typed(mut self, header: Header) -> Self {
        self.headers.set(header);
        self
    }

    pub fn content_type(mut self, media_type: impl Into<String>) -> Self {
        self.options.content_type = Some(media_type.into());
        self
    }

    pub fn accept(mut self, media_type: impl Into<String>) -> Self {
        self.options.accept = Some(media_type.into());
        self
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.options.charset = charset.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Holds the first dispatch back for `delay`.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.options.delay = delay;
        self
    }

    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.options.with_credentials = with_credentials;
        self
    }

    pub fn resolve_any_status(mut self) -> Self {
        self.options.resolve_any_status = true;
        self
    }

    /// Serialize only these fields of the payload, for serializers that
    /// support projection.
    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.options.fields = fields.iter().map(|f| (*f).to_owned()).collect();
        self
    }

    pub fn auth(mut self, auth: Arc<dyn Auth>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn tls(mut self, tls: TlsClientConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn poll(mut self, polling: PollingOptions) -> Self {
        self.polling = Some(polling);
        self
    }

    /// Stashes a value in the request's context store.
    pub fn save<T: Any + Send + Sync>(self, key: &str, value: T) -> Self {
        save_value(self.store.as_ref(), key, value);
        self
    }

    /// Typed payload, serialized lazily (and re-serialized per polling
    /// cycle) through the session registry.
    pub fn payload<P: Send + Sync + 'static>(mut self, value: P) -> Self {
        self.codec = Some(Arc::new(move |registry, ctx| {
            registry
                .serializer_for::<P>(ctx.media_type())?
                .serialize(&value, ctx)
        }));
        self
    }

    /// Typed collection payload.
    pub fn payload_collection<P: Send + Sync + 'static>(mut self, values: Vec<P>) -> Self {
        self.codec = Some(Arc::new(move |registry, ctx| {
            registry
                .serializer_for::<P>(ctx.media_type())?
                .serialize_collection(&values, ctx)
        }));
        self
    }

    /// Pre-serialized payload, bypassing the registry.
    pub fn payload_serialized(mut self, payload: SerializedPayload) -> Self {
        self.codec = None;
        self.payload = payload;
        self
    }

    /// Dispatches, deserializing the response body as `T`.
    pub fn send<T: Send + Sync + 'static>(self) -> RequestPromise<T> {
        let charset = self.options.charset.clone();
        let decoder: ResponseDecoder<T> = Arc::new(move |raw, registry, providers| {
            let media_type = response_media_type(raw);
            let ctx = DeserializationContext::new(&media_type, &charset, providers.clone());
            registry
                .deserializer_for::<T>(&media_type)?
                .deserialize(&raw.payload, &ctx)
        });
        self.dispatch(decoder)
    }

    /// Dispatches, deserializing the response body as a collection of `T`.
    pub fn send_collection<T: Send + Sync + 'static>(self) -> RequestPromise<Vec<T>> {
        let charset = self.options.charset.clone();
        let decoder: ResponseDecoder<Vec<T>> = Arc::new(move |raw, registry, providers| {
            let media_type = response_media_type(raw);
            let ctx = DeserializationContext::new(&media_type, &charset, providers.clone());
            registry
                .deserializer_for::<T>(&media_type)?
                .deserialize_collection(&raw.payload, &ctx)
        });
        self.dispatch(decoder)
    }

    /// Dispatches, delivering the raw payload untouched.
    pub fn send_raw(self) -> RequestPromise<SerializedPayload> {
        self.dispatch(Arc::new(|raw, _, _| Ok(raw.payload.clone())))
    }

    /// Dispatches, discarding the response body.
    pub fn send_void(self) -> RequestPromise<()> {
        self.dispatch(Arc::new(|_, _, _| Ok(())))
    }

    fn dispatch<T: Send + Sync + 'static>(self, decoder: ResponseDecoder<T>) -> RequestPromise<T> {
        let mut request = SerializedRequest::new(
            self.method,
            self.uri,
            self.headers,
            self.payload,
            self.options,
            self.polling,
            self.store,
        );
        if let Some(tls) = self.tls {
            request.set_tls(tls);
        }
        self.session
            .dispatcher
            .dispatch(request, self.auth, self.codec, decoder)
    }
}

fn response_media_type(raw: &RawResponse) -> String {
    raw.content_type().unwrap_or_else(|| "*/*".to_owned())
}
