//! The pluggable wire seam.
//!
//! The runtime never talks to sockets itself; a [`Transport`] takes a
//! fully serialized request and reports back through [`TransportEvents`].
//! Implementations may deliver events synchronously from `dispatch` or
//! later from their own threads.

use std::sync::Arc;

use thiserror::Error;

use crate::deferred::Progress;
use crate::request::SerializedRequest;
use crate::response::RawResponse;

/// TLS material a transport should use for one request. Mirrors the
/// client configuration shape rustls expects, pre-built so the hot path
/// only clones an `Arc`.
#[derive(Clone)]
pub struct TlsClientConfig {
    pub client_config: Arc<rustls::ClientConfig>,
}

impl std::fmt::Debug for TlsClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsClientConfig").finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection could not be opened at all.
    #[error("not permitted: {0}")]
    Permission(String),

    /// The connection opened but the request could not be written.
    #[error("send failed: {0}")]
    Dispatch(String),

    #[error("timed out")]
    Timeout,

    #[error("{0}")]
    Network(String),
}

/// Handle to an in-flight exchange.
pub trait Connection: Send + Sync {
    fn cancel(&self);
    fn is_open(&self) -> bool;
}

/// Callback surface a transport drives while serving one request.
pub trait TransportEvents: Send {
    fn on_response(&mut self, response: RawResponse);
    fn on_error(&mut self, error: TransportError);
    fn on_upload_progress(&mut self, _progress: Progress) {}
    fn on_download_progress(&mut self, _progress: Progress) {}
}

pub trait Transport: Send + Sync {
    /// Starts the exchange. The returned connection must remain
    /// cancellable until one terminal event has been delivered.
    fn dispatch(
        &self,
        request: &SerializedRequest,
        events: Box<dyn TransportEvents>,
    ) -> Result<Arc<dyn Connection>, TransportError>;
}

/// A connection that is never open; used for requests that failed before
/// reaching the wire.
pub struct ClosedConnection;

impl Connection for ClosedConnection {
    fn cancel(&self) {}

    fn is_open(&self) -> bool {
        false
    }
}
