//! Serialized request and response bodies.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use bytes::Bytes;

/// One part of a multipart body.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub payload: SerializedPayload,
}

#[derive(Debug, Clone, PartialEq)]
enum Body {
    Empty,
    Text(String),
    Binary(Bytes),
    Multipart { boundary: String, parts: Vec<Part> },
}

/// A wire-format body, viewable as text or bytes.
///
/// Conversions between the two views are computed on first access and
/// memoized, so repeated reads are free.
#[derive(Debug, Clone)]
pub struct SerializedPayload {
    body: Body,
    text: OnceLock<String>,
    bytes: OnceLock<Bytes>,
}

static BOUNDARY_SEQ: AtomicU64 = AtomicU64::new(0);

impl SerializedPayload {
    pub fn empty() -> Self {
        Self::from_body(Body::Empty)
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self::from_body(Body::Text(text.into()))
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::from_body(Body::Binary(bytes.into()))
    }

    pub fn multipart(parts: Vec<Part>) -> Self {
        let seq = BOUNDARY_SEQ.fetch_add(1, Ordering::Relaxed);
        Self::from_body(Body::Multipart {
            boundary: format!("courier-boundary-{seq:016x}"),
            parts,
        })
    }

    fn from_body(body: Body) -> Self {
        Self { body, text: OnceLock::new(), bytes: OnceLock::new() }
    }

    pub fn is_empty(&self) -> bool {
        match &self.body {
            Body::Empty => true,
            Body::Text(t) => t.is_empty(),
            Body::Binary(b) => b.is_empty(),
            Body::Multipart { parts, .. } => parts.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Multipart boundary, when this payload is multipart.
    pub fn boundary(&self) -> Option<&str> {
        match &self.body {
            Body::Multipart { boundary, .. } => Some(boundary),
            _ => None,
        }
    }

    pub fn as_text(&self) -> &str {
        match &self.body {
            Body::Empty => "",
            Body::Text(t) => t,
            Body::Binary(b) => self
                .text
                .get_or_init(|| String::from_utf8_lossy(b).into_owned()),
            Body::Multipart { boundary, parts } => self
                .text
                .get_or_init(|| render_multipart(boundary, parts)),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.body {
            Body::Empty => &[],
            Body::Text(t) => t.as_bytes(),
            Body::Binary(b) => b,
            Body::Multipart { boundary, parts } => self
                .bytes
                .get_or_init(|| Bytes::from(render_multipart(boundary, parts).into_bytes())),
        }
    }
}

fn render_multipart(boundary: &str, parts: &[Part]) -> String {
    let mut out = String::new();
    for part in parts {
        out.push_str("--");
        out.push_str(boundary);
        out.push_str("\r\n");
        out.push_str("Content-Disposition: form-data; name=\"");
        out.push_str(&part.name);
        out.push('"');
        if let Some(filename) = &part.filename {
            out.push_str("; filename=\"");
            out.push_str(filename);
            out.push('"');
        }
        out.push_str("\r\n");
        if let Some(content_type) = &part.content_type {
            out.push_str("Content-Type: ");
            out.push_str(content_type);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out.push_str(part.payload.as_text());
        out.push_str("\r\n");
    }
    out.push_str("--");
    out.push_str(boundary);
    out.push_str("--\r\n");
    out
}

impl PartialEq for SerializedPayload {
    fn eq(&self, other: &Self) -> bool {
        self.body == other.body
    }
}

impl Default for SerializedPayload {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for SerializedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_text())
    }
}

/// A value headed for serialization, optionally restricted to a subset of
/// its fields.
#[derive(Debug, Clone)]
pub struct Payload<T> {
    value: T,
    fields: Vec<String>,
}

impl<T> Payload<T> {
    pub fn new(value: T) -> Self {
        Self { value, fields: Vec::new() }
    }

    pub fn with_fields(value: T, fields: Vec<String>) -> Self {
        Self { value, fields }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// Field filter for serializers that support projection. Empty means
    /// serialize everything.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl<T: fmt::Display> fmt::Display for Payload<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_view_of_text() {
        let payload = SerializedPayload::from_text("hello");
        assert_eq!(payload.as_bytes(), b"hello");
        assert_eq!(payload.len(), 5);
        assert!(!payload.is_empty());
    }

    #[test]
    fn text_view_of_binary_is_memoized() {
        let payload = SerializedPayload::from_bytes(Bytes::from_static(b"abc"));
        let first = payload.as_text() as *const str;
        let second = payload.as_text() as *const str;
        assert_eq!(first, second);
        assert_eq!(payload.as_text(), "abc");
    }

    #[test]
    fn empty_payload() {
        let payload = SerializedPayload::empty();
        assert!(payload.is_empty());
        assert_eq!(payload.as_text(), "");
        assert_eq!(payload.as_bytes(), b"");
    }

    #[test]
    fn multipart_rendering() {
        let payload = SerializedPayload::multipart(vec![
            Part {
                name: "meta".into(),
                filename: None,
                content_type: Some("application/json".into()),
                payload: SerializedPayload::from_text("{}"),
            },
            Part {
                name: "file".into(),
                filename: Some("a.txt".into()),
                content_type: None,
                payload: SerializedPayload::from_text("data"),
            },
        ]);
        let boundary = payload.boundary().unwrap().to_owned();
        let text = payload.as_text();
        assert!(text.contains(&format!("--{boundary}\r\n")));
        assert!(text.contains("name=\"meta\""));
        assert!(text.contains("filename=\"a.txt\""));
        assert!(text.ends_with(&format!("--{boundary}--\r\n")));
    }

    #[test]
    fn equality_ignores_memoization() {
        let a = SerializedPayload::from_text("x");
        let b = SerializedPayload::from_text("x");
        b.as_bytes();
        assert_eq!(a, b);
    }
}
