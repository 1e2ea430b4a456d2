//! URI model, parser, and fluent builder.
//!
//! A [`Uri`] is a decoded component tree: scheme, user info, host, port,
//! path segments with their matrix parameters, query parameters, and
//! fragment. Parsing and building both go through a [`UriCodec`], so the
//! textual form and the component tree round-trip losslessly.

mod builder;
mod codec;
mod parser;

pub use builder::UriBuilder;
pub use codec::{PercentCodec, UriCodec};

use core::fmt;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriParseError {
    #[error("uri cannot be empty")]
    Empty,

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("invalid percent-encoding in '{0}'")]
    InvalidEncoding(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriBuildError {
    /// Fewer template values than distinct `{name}` parameters.
    #[error("insufficient values to resolve the uri template parameters")]
    InsufficientValues,

    #[error("template parameter '{0}' has no value")]
    Unresolved(String),

    #[error("matrix parameters require a preceding path segment")]
    NoSegment,

    #[error("path segment cannot be empty")]
    EmptySegment,

    #[error("parameter name cannot be empty")]
    EmptyParamName,

    #[error("host is required to build an absolute uri")]
    MissingHost,
}

/// How a multi-valued parameter is written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamComposition {
    /// `name=v1&name=v2` (or `;name=v1;name=v2` in a matrix).
    #[default]
    Repeated,
    /// `name=v1,v2`.
    CommaSeparated,
}

impl ParamComposition {
    fn render(
        &self,
        out: &mut String,
        separator: char,
        param: &Param,
        encode: &dyn Fn(&str) -> String,
    ) {
        match self {
            ParamComposition::Repeated => {
                for (i, value) in param.values.iter().enumerate() {
                    if i > 0 {
                        out.push(separator);
                    }
                    out.push_str(&encode(&param.name));
                    if !value.is_empty() {
                        out.push('=');
                        out.push_str(&encode(value));
                    }
                }
            }
            ParamComposition::CommaSeparated => {
                out.push_str(&encode(&param.name));
                if param.values.len() > 1 || !param.values[0].is_empty() {
                    out.push('=');
                    for (i, value) in param.values.iter().enumerate() {
                        if i > 0 {
                            out.push(',');
                        }
                        out.push_str(&encode(value));
                    }
                }
            }
        }
    }
}

/// A named parameter holding one or more decoded values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    name: String,
    values: Vec<String>,
}

impl Param {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        let mut values = values;
        if values.is_empty() {
            values.push(String::new());
        }
        Self { name: name.into(), values }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// First value; the empty string for a bare `name` parameter.
    pub fn value(&self) -> &str {
        &self.values[0]
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    fn push(&mut self, value: String) {
        self.values.push(value);
    }
}

/// A decoded path segment plus its matrix parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    name: String,
    matrix: Vec<Param>,
}

impl Segment {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), matrix: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matrix_params(&self) -> &[Param] {
        &self.matrix
    }

    pub fn matrix_param(&self, name: &str) -> Option<&Param> {
        self.matrix.iter().find(|p| p.name == name)
    }

    fn add_matrix(&mut self, name: &str, value: String) {
        match self.matrix.iter_mut().find(|p| p.name == name) {
            Some(param) => param.push(value),
            None => self.matrix.push(Param::new(name, vec![value])),
        }
    }
}

pub(crate) struct UriParts {
    pub scheme: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub segments: Vec<Segment>,
    pub query: Vec<Param>,
    pub fragment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Uri {
    scheme: Option<String>,
    user: Option<String>,
    password: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    segments: Vec<Segment>,
    query: Vec<Param>,
    fragment: Option<String>,
    // Rendered forms, fixed at construction time so a custom codec is
    // not needed again afterwards.
    path_repr: String,
    query_repr: String,
    repr: String,
}

impl Uri {
    pub fn parse(input: &str) -> Result<Self, UriParseError> {
        parser::parse(input, &PercentCodec)
    }

    pub fn parse_with(input: &str, codec: &dyn UriCodec) -> Result<Self, UriParseError> {
        parser::parse(input, codec)
    }

    pub fn builder() -> UriBuilder {
        UriBuilder::new()
    }

    pub(crate) fn from_parts(
        parts: UriParts,
        codec: &dyn UriCodec,
        composition: ParamComposition,
        raw: Option<String>,
    ) -> Self {
        let path_repr = render_path(&parts.segments, codec, composition);
        let query_repr = render_query(&parts.query, codec, composition);
        let repr = match raw {
            Some(raw) => raw,
            None => render_full(&parts, &path_repr, &query_repr, codec),
        };
        Self {
            scheme: parts.scheme,
            user: parts.user,
            password: parts.password,
            host: parts.host,
            port: parts.port,
            segments: parts.segments,
            query: parts.query,
            fragment: parts.fragment,
            path_repr,
            query_repr,
            repr,
        }
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn query_params(&self) -> &[Param] {
        &self.query
    }

    pub fn query_param(&self, name: &str) -> Option<&Param> {
        self.query.iter().find(|p| p.name == name)
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// Encoded path including matrix parameters, as written on the wire.
    /// `/` when the uri has no path segments.
    pub fn path(&self) -> &str {
        if self.path_repr.is_empty() {
            "/"
        } else {
            &self.path_repr
        }
    }

    /// Encoded query string, without the leading `?`. Empty when absent.
    pub fn query(&self) -> &str {
        &self.query_repr
    }
}

// Logical equality over components; the rendered form is derived and a
// parsed uri keeps its original text.
impl PartialEq for Uri {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme
            && self.user == other.user
            && self.password == other.password
            && self.host == other.host
            && self.port == other.port
            && self.segments == other.segments
            && self.query == other.query
            && self.fragment == other.fragment
    }
}

impl Eq for Uri {}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

fn render_path(segments: &[Segment], codec: &dyn UriCodec, composition: ParamComposition) -> String {
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        out.push_str(&codec.encode_path_segment(&segment.name));
        for param in &segment.matrix {
            out.push(';');
            composition.render(&mut out, ';', param, &|s| codec.encode_path_segment(s));
        }
    }
    out
}

fn render_query(query: &[Param], codec: &dyn UriCodec, composition: ParamComposition) -> String {
    let mut out = String::new();
    for (i, param) in query.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        composition.render(&mut out, '&', param, &|s| codec.encode_query(s));
    }
    out
}

fn render_full(
    parts: &UriParts,
    path_repr: &str,
    query_repr: &str,
    codec: &dyn UriCodec,
) -> String {
    let mut out = String::new();
    if let Some(scheme) = &parts.scheme {
        out.push_str(scheme);
        out.push_str("://");
    } else if parts.host.is_some() {
        out.push_str("//");
    }
    if let Some(user) = &parts.user {
        out.push_str(&codec.encode_user_info(user));
        if let Some(password) = &parts.password {
            out.push(':');
            out.push_str(&codec.encode_user_info(password));
        }
        out.push('@');
    }
    if let Some(host) = &parts.host {
        out.push_str(host);
    }
    if let Some(port) = parts.port {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(path_repr);
    if !query_repr.is_empty() {
        out.push('?');
        out.push_str(query_repr);
    }
    if let Some(fragment) = &parts.fragment {
        out.push('#');
        out.push_str(&codec.encode_fragment(fragment));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_separated_composition() {
        let parts = UriParts {
            scheme: Some("http".into()),
            user: None,
            password: None,
            host: Some("localhost".into()),
            port: None,
            segments: vec![{
                let mut s = Segment::new("items");
                s.add_matrix("class", "2".into());
                s.add_matrix("class", "5".into());
                s
            }],
            query: vec![Param::new("name", vec!["Aa".into(), "Zz".into()])],
            fragment: None,
        };
        let uri = Uri::from_parts(parts, &PercentCodec, ParamComposition::CommaSeparated, None);
        assert_eq!(uri.to_string(), "http://localhost/items;class=2,5?name=Aa,Zz");
    }

    #[test]
    fn bare_param_renders_name_only() {
        let parts = UriParts {
            scheme: None,
            user: None,
            password: None,
            host: None,
            port: None,
            segments: vec![Segment::new("q")],
            query: vec![Param::new("verbose", vec![String::new()])],
            fragment: None,
        };
        let uri = Uri::from_parts(parts, &PercentCodec, ParamComposition::Repeated, None);
        assert_eq!(uri.to_string(), "/q?verbose");
    }

    #[test]
    fn empty_path_renders_as_root() {
        let uri = Uri::parse("http://localhost:8080").unwrap();
        assert_eq!(uri.path(), "/");
        assert_eq!(uri.query(), "");
    }
}
