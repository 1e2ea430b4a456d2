//! The wire-ready request.
//!
//! A [`SerializedRequest`] is what flows through interceptors, auth, and
//! the transport: method, uri, headers, an already (or about to be)
//! serialized payload, and the per-request options. Replicating one for a
//! polling cycle shares its context store, so state written during one
//! cycle is visible to the next.

use std::sync::Arc;
use std::time::Duration;

use crate::header::{Header, Headers};
use crate::http::Method;
use crate::payload::SerializedPayload;
use crate::store::LeafStore;
use crate::transport::TlsClientConfig;
use crate::uri::Uri;

pub const DEFAULT_CHARSET: &str = "utf-8";
pub const DEFAULT_MEDIA_TYPE: &str = "text/plain";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingStrategy {
    /// Wait out the interval after each settlement before re-dispatching.
    Short,
    /// Re-dispatch as soon as the previous cycle settles.
    Long,
}

#[derive(Debug, Clone)]
pub struct PollingOptions {
    pub strategy: PollingStrategy,
    pub interval: Duration,
    /// Maximum number of cycles; `0` polls until stopped.
    pub limit: u32,
}

impl PollingOptions {
    pub fn short(interval: Duration) -> Self {
        Self { strategy: PollingStrategy::Short, interval, limit: 0 }
    }

    pub fn long(interval: Duration) -> Self {
        Self { strategy: PollingStrategy::Long, interval, limit: 0 }
    }

    pub fn limited(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub delay: Duration,
    pub with_credentials: bool,
    pub charset: String,
    pub content_type: Option<String>,
    pub accept: Option<String>,
    /// Resolve the promise for any status instead of rejecting non-2xx.
    pub resolve_any_status: bool,
    /// Field projection forwarded to the serializer; empty serializes
    /// everything.
    pub fields: Vec<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            delay: Duration::ZERO,
            with_credentials: false,
            charset: DEFAULT_CHARSET.to_owned(),
            content_type: None,
            accept: None,
            resolve_any_status: false,
            fields: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct SerializedRequest {
    method: Method,
    uri: Arc<Uri>,
    headers: Headers,
    payload: SerializedPayload,
    options: RequestOptions,
    polling: Option<PollingOptions>,
    store: Arc<LeafStore>,
    tls: Option<TlsClientConfig>,
}

impl SerializedRequest {
    pub fn new(
        method: Method,
        uri: Uri,
        headers: Headers,
        payload: SerializedPayload,
        options: RequestOptions,
        polling: Option<PollingOptions>,
        store: Arc<LeafStore>,
    ) -> Self {
        Self {
            method,
            uri: Arc::new(uri),
            headers,
            payload,
            options,
            polling,
            store,
            tls: None,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn set_uri(&mut self, uri: Uri) {
        self.uri = Arc::new(uri);
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn set_header(&mut self, header: Header) {
        self.headers.set(header);
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers.get_value(name)
    }

    pub fn payload(&self) -> &SerializedPayload {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: SerializedPayload) {
        self.payload = payload;
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut RequestOptions {
        &mut self.options
    }

    pub fn polling(&self) -> Option<&PollingOptions> {
        self.polling.as_ref()
    }

    pub fn store(&self) -> &Arc<LeafStore> {
        &self.store
    }

    pub fn tls(&self) -> Option<&TlsClientConfig> {
        self.tls.as_ref()
    }

    pub fn set_tls(&mut self, tls: TlsClientConfig) {
        self.tls = Some(tls);
    }

    /// Content type the payload will be serialized as: the explicit
    /// `Content-Type` header wins, then the configured option, then
    /// `text/plain`.
    pub fn effective_content_type(&self) -> String {
        self.headers
            .content_type()
            .or_else(|| self.options.content_type.clone())
            .unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_owned())
    }

    pub fn effective_accept(&self) -> String {
        self.headers
            .get_value("Accept")
            .or_else(|| self.options.accept.clone())
            .unwrap_or_else(|| "*/*".to_owned())
    }

    /// A copy for the next polling cycle. Headers, payload, and options
    /// are cloned; the context store is shared.
    pub fn replicate(&self) -> Self {
        self.clone()
    }
}

impl std::fmt::Debug for SerializedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializedRequest")
            .field("method", &self.method)
            .field("uri", &self.uri.to_string())
            .field("headers", &self.headers)
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}
