//! Media-type driven serialization.
//!
//! Serializers and deserializers register against one or more media-type
//! patterns (`application/json`, `application/*+json`, `*/json`, `*/*`)
//! and are resolved per request from the [`SerializerRegistry`], most
//! specific pattern first.

mod context;
mod misc;
mod registry;

pub use context::{DeserializationContext, Providers, SerializationContext};
pub use misc::{TextSerializer, VoidSerializer};
pub use registry::{Registration, SerializerRegistry};

use std::cmp::Ordering;
use core::fmt;

use thiserror::Error;

use crate::payload::SerializedPayload;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SerializationError {
    #[error("unable to serialize {type_name}: {reason}")]
    Serialize { type_name: &'static str, reason: String },

    #[error("unable to deserialize {type_name}: {reason}")]
    Deserialize { type_name: &'static str, reason: String },

    #[error("no serializer registered for {type_name} and media type '{media_type}'")]
    NoSerializer { type_name: &'static str, media_type: String },

    #[error("no deserializer registered for {type_name} and media type '{media_type}'")]
    NoDeserializer { type_name: &'static str, media_type: String },

    #[error("{type_name} does not support {operation}")]
    Unsupported { type_name: &'static str, operation: &'static str },

    #[error("invalid media type '{0}'")]
    InvalidMediaType(String),
}

/// Turns a typed value into a wire payload.
pub trait Serializer<T>: Send + Sync {
    /// Media-type patterns this serializer handles.
    fn media_types(&self) -> &[&'static str];

    fn serialize(
        &self,
        value: &T,
        ctx: &SerializationContext,
    ) -> Result<SerializedPayload, SerializationError>;

    fn serialize_collection(
        &self,
        values: &[T],
        ctx: &SerializationContext,
    ) -> Result<SerializedPayload, SerializationError>;
}

/// Turns a wire payload back into a typed value.
pub trait Deserializer<T>: Send + Sync {
    fn media_types(&self) -> &[&'static str];

    fn deserialize(
        &self,
        payload: &SerializedPayload,
        ctx: &DeserializationContext,
    ) -> Result<T, SerializationError>;

    fn deserialize_collection(
        &self,
        payload: &SerializedPayload,
        ctx: &DeserializationContext,
    ) -> Result<Vec<T>, SerializationError>;
}

/// A `type/subtype` pair where either part may carry a `*` wildcard.
///
/// Patterns order by specificity: an exact part sorts before a partial
/// wildcard (`*+json`), which sorts before a bare `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTypePattern {
    main: String,
    sub: String,
}

impl MediaTypePattern {
    pub fn parse(raw: &str) -> Result<Self, SerializationError> {
        // Parameters like `;charset=utf-8` do not participate in matching.
        let bare = raw.split(';').next().unwrap_or("").trim();
        let (main, sub) = bare
            .split_once('/')
            .ok_or_else(|| SerializationError::InvalidMediaType(raw.to_owned()))?;
        if main.is_empty() || sub.is_empty() {
            return Err(SerializationError::InvalidMediaType(raw.to_owned()));
        }
        Ok(Self {
            main: main.to_ascii_lowercase(),
            sub: sub.to_ascii_lowercase(),
        })
    }

    pub fn matches(&self, other: &MediaTypePattern) -> bool {
        part_matches(&self.main, &other.main) && part_matches(&self.sub, &other.sub)
    }

    fn rank(&self) -> (u8, u8) {
        (part_rank(&self.main), part_rank(&self.sub))
    }
}

impl fmt::Display for MediaTypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main, self.sub)
    }
}

impl PartialOrd for MediaTypePattern {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaTypePattern {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.main.cmp(&other.main))
            .then_with(|| self.sub.cmp(&other.sub))
    }
}

fn part_rank(part: &str) -> u8 {
    if part == "*" {
        2
    } else if part.contains('*') {
        1
    } else {
        0
    }
}

fn part_matches(a: &str, b: &str) -> bool {
    if a == "*" || b == "*" {
        return true;
    }
    match (a.contains('*'), b.contains('*')) {
        (false, false) => a == b,
        (true, false) => affix_match(a, b),
        (false, true) => affix_match(b, a),
        (true, true) => affix_overlap(a, b),
    }
}

// `pre*suf` against a concrete part.
fn affix_match(pattern: &str, concrete: &str) -> bool {
    let (prefix, suffix) = pattern.split_once('*').unwrap();
    concrete.len() >= prefix.len() + suffix.len()
        && concrete.starts_with(prefix)
        && concrete.ends_with(suffix)
}

// Two wildcarded parts overlap when their fixed affixes are compatible.
fn affix_overlap(a: &str, b: &str) -> bool {
    let (pa, sa) = a.split_once('*').unwrap();
    let (pb, sb) = b.split_once('*').unwrap();
    (pa.starts_with(pb) || pb.starts_with(pa)) && (sa.ends_with(sb) || sb.ends_with(sa))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(s: &str) -> MediaTypePattern {
        MediaTypePattern::parse(s).unwrap()
    }

    #[test]
    fn exact_and_wildcard_matching() {
        assert!(pat("application/json").matches(&pat("application/json")));
        assert!(pat("*/json").matches(&pat("application/json")));
        assert!(pat("application/*").matches(&pat("application/xml")));
        assert!(pat("*/*").matches(&pat("text/plain")));
        assert!(!pat("text/*").matches(&pat("application/json")));
    }

    #[test]
    fn suffix_wildcards() {
        assert!(pat("application/*+json").matches(&pat("application/vnd.api+json")));
        assert!(!pat("application/*+json").matches(&pat("application/json")));
        assert!(pat("application/*+json").matches(&pat("application/*")));
    }

    #[test]
    fn parameters_are_ignored() {
        assert!(pat("text/plain; charset=utf-8").matches(&pat("text/plain")));
    }

    #[test]
    fn specificity_order() {
        let mut patterns = vec![pat("*/*"), pat("application/json"), pat("*/json"), pat("application/*+json")];
        patterns.sort();
        let rendered: Vec<_> = patterns.iter().map(|p| p.to_string()).collect();
        assert_eq!(
            rendered,
            ["application/json", "application/*+json", "*/json", "*/*"]
        );
    }

    #[test]
    fn invalid_media_types() {
        assert!(MediaTypePattern::parse("json").is_err());
        assert!(MediaTypePattern::parse("/json").is_err());
        assert!(MediaTypePattern::parse("text/").is_err());
    }
}
