//! Error taxonomy for dispatched requests.
//!
//! Every failure delivered through a promise is a [`RequestError`]: the
//! method and target URI of the request that failed, plus an [`ErrorKind`]
//! classifying where in the pipeline things went wrong.

use thiserror::Error;

use crate::http::{Method, Status};
use crate::serialization::SerializationError;

#[derive(Debug, Error)]
pub enum ErrorKind {
    /// The transport refused to open the connection at all.
    #[error("connection not permitted: {0}")]
    Permission(String),

    /// The connection opened but the request could not be written.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("network failure: {0}")]
    Network(String),

    #[error("aborted: {0}")]
    Abort(String),

    #[error("authentication failed: {reason}")]
    Auth {
        reason: String,
        #[source]
        source: Option<Box<RequestError>>,
    },

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// The response arrived but its status was not accepted by the
    /// session's resolution policy.
    #[error("unexpected response status: {status}")]
    Status { status: Status },
}

#[derive(Debug, Error)]
#[error("{method} {uri}: {kind}")]
pub struct RequestError {
    method: Method,
    uri: String,
    kind: ErrorKind,
}

impl RequestError {
    pub fn new(method: Method, uri: impl Into<String>, kind: ErrorKind) -> Self {
        Self { method, uri: uri.into(), kind }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout(_))
    }

    pub fn is_abort(&self) -> bool {
        matches!(self.kind, ErrorKind::Abort(_))
    }

    /// Status of the rejected response, when the failure was a status
    /// policy rejection.
    pub fn status(&self) -> Option<Status> {
        match self.kind {
            ErrorKind::Status { status } => Some(status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_method_and_uri() {
        let err = RequestError::new(
            Method::Get,
            "http://localhost/items",
            ErrorKind::Timeout(250),
        );
        assert_eq!(
            err.to_string(),
            "GET http://localhost/items: timed out after 250 ms"
        );
        assert!(err.is_timeout());
    }

    #[test]
    fn status_accessor() {
        let err = RequestError::new(
            Method::Post,
            "http://localhost/items",
            ErrorKind::Status { status: Status::new(409) },
        );
        assert_eq!(err.status(), Some(Status::new(409)));
        assert_eq!(
            RequestError::new(Method::Get, "x", ErrorKind::Network("reset".into())).status(),
            None
        );
    }
}
