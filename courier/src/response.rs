//! Responses, raw and typed.

use crate::header::{Headers, Link};
use crate::http::Status;
use crate::payload::SerializedPayload;

/// A response as delivered by the transport, before deserialization.
/// Response interceptors mutate this form.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: Status,
    pub headers: Headers,
    pub payload: SerializedPayload,
}

impl RawResponse {
    pub fn new(status: Status, headers: Headers, payload: SerializedPayload) -> Self {
        Self { status, headers, payload }
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers.get_value(name)
    }

    pub fn content_type(&self) -> Option<String> {
        self.headers.content_type()
    }
}

/// A settled, deserialized response.
#[derive(Debug)]
pub struct Response<T> {
    status: Status,
    headers: Headers,
    body: T,
}

impl<T> Response<T> {
    pub fn new(status: Status, headers: Headers, body: T) -> Self {
        Self { status, headers, body }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers.get_value(name)
    }

    pub fn content_type(&self) -> Option<String> {
        self.headers.content_type()
    }

    pub fn link(&self, rel: &str) -> Option<&Link> {
        self.headers.link(rel)
    }

    pub fn body(&self) -> &T {
        &self.body
    }

    pub fn into_body(self) -> T {
        self.body
    }
}
