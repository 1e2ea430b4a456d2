//! Typed HTTP headers.
//!
//! Multi-valued headers are modeled as a list of [`Element`]s, each with
//! optional `;`-separated parameters. Splitting respects double quotes, so
//! `title="a, b"` stays one element. `Link` headers get first-class
//! parsing into [`Link`] values.

use core::fmt;

use crate::uri::{PercentCodec, UriCodec};

/// A `key` or `key=value` parameter attached to a header element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderParam {
    name: String,
    value: Option<String>,
    quoted: bool,
}

impl HeaderParam {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: Some(value.into()), quoted: false }
    }

    pub fn quoted(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: Some(value.into()), quoted: true }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

impl fmt::Display for HeaderParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) if self.quoted || value.contains([' ', ',', ';']) => {
                write!(f, "{}=\"{}\"", self.name, value)
            }
            Some(value) => write!(f, "{}={}", self.name, value),
            None => f.write_str(&self.name),
        }
    }
}

/// One comma-separated element of a header value, e.g. `text/html;q=0.8`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    value: String,
    params: Vec<HeaderParam>,
}

impl Element {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into(), params: Vec::new() }
    }

    pub fn with_params(value: impl Into<String>, params: Vec<HeaderParam>) -> Self {
        Self { value: value.into(), params }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn params(&self) -> &[HeaderParam] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .and_then(|p| p.value())
    }

    /// Quality factor; `1.0` when no `q` parameter is present.
    pub fn q(&self) -> f32 {
        self.param("q").and_then(|v| v.parse().ok()).unwrap_or(1.0)
    }

    fn parse(raw: &str) -> Self {
        let mut pieces = split_escaping_quotes(raw, ';').into_iter();
        let value = pieces.next().unwrap_or_default();
        let params = pieces
            .filter(|p| !p.is_empty())
            .map(|piece| match piece.split_once('=') {
                Some((k, v)) => {
                    let trimmed = v.trim();
                    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
                        HeaderParam::quoted(k.trim(), &trimmed[1..trimmed.len() - 1])
                    } else {
                        HeaderParam::new(k.trim(), trimmed)
                    }
                }
                None => HeaderParam { name: piece, value: None, quoted: false },
            })
            .collect();
        Self { value, params }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)?;
        for param in &self.params {
            write!(f, "; {param}")?;
        }
        Ok(())
    }
}

/// Splits `raw` on `separator`, ignoring separators inside double quotes.
/// A quote escaped with `\` does not toggle the quoting state. Pieces are
/// trimmed of surrounding whitespace.
pub fn split_escaping_quotes(raw: &str, separator: char) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    for ch in raw.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => {
                current.push(ch);
                escaped = true;
            }
            '"' => {
                current.push(ch);
                in_quotes = !in_quotes;
            }
            c if c == separator && !in_quotes => {
                pieces.push(std::mem::take(&mut current).trim().to_owned());
            }
            c => current.push(c),
        }
    }
    pieces.push(current.trim().to_owned());
    pieces
}

/// One value of a `Link` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    uri: String,
    element: Element,
}

impl Link {
    fn from_element(element: Element) -> Self {
        let uri = element
            .value()
            .trim()
            .trim_start_matches('<')
            .trim_end_matches('>')
            .to_owned();
        Self { uri, element }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn rel(&self) -> Option<&str> {
        self.element.param("rel")
    }

    pub fn anchor(&self) -> Option<&str> {
        self.element.param("anchor")
    }

    pub fn media(&self) -> Option<&str> {
        self.element.param("media")
    }

    pub fn media_type(&self) -> Option<&str> {
        self.element.param("type")
    }

    pub fn href_lang(&self) -> Option<&str> {
        self.element.param("hreflang")
    }

    pub fn rev(&self) -> Option<&str> {
        self.element.param("rev")
    }

    /// Title of the link; `title*` (RFC 5987 extended form, decoded) is
    /// preferred over plain `title` when both are present.
    pub fn title(&self) -> Option<String> {
        if let Some(ext) = self.element.param("title*") {
            if let Some(decoded) = decode_extended_value(ext) {
                return Some(decoded);
            }
        }
        self.element.param("title").map(str::to_owned)
    }

    pub fn element(&self) -> &Element {
        &self.element
    }
}

// charset'lang'percent-encoded-text
fn decode_extended_value(raw: &str) -> Option<String> {
    let mut parts = raw.splitn(3, '\'');
    let _charset = parts.next()?;
    let _lang = parts.next()?;
    let text = parts.next()?;
    PercentCodec.decode(text).ok()
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.element.fmt(f)
    }
}

/// A single HTTP header: a plain name/value pair, a multi-element value,
/// or a parsed `Link` header.
#[derive(Debug, Clone, PartialEq)]
pub enum Header {
    Simple { name: String, value: String },
    Multi { name: String, elements: Vec<Element> },
    Link { links: Vec<Link> },
}

impl Header {
    pub fn simple(name: impl Into<String>, value: impl Into<String>) -> Self {
        Header::Simple { name: name.into(), value: value.into() }
    }

    pub fn multi(name: impl Into<String>, values: &[&str]) -> Self {
        Header::Multi {
            name: name.into(),
            elements: values.iter().map(|v| Element::new(*v)).collect(),
        }
    }

    pub fn content_type(value: impl Into<String>) -> Self {
        Header::simple("Content-Type", value)
    }

    pub fn accept(values: &[&str]) -> Self {
        Header::multi("Accept", values)
    }

    /// Parses a raw header field, dispatching on the name: `Link` gets
    /// the link variant, the list-valued media-type headers
    /// (`Content-Type`, `Accept`) get the multi variant, everything else
    /// stays simple so values with embedded commas (dates, user agents)
    /// are never split apart.
    pub fn from_field(name: &str, value: &str) -> Self {
        if name.eq_ignore_ascii_case("link") {
            let links = split_escaping_quotes(value, ',')
                .into_iter()
                .filter(|piece| !piece.is_empty())
                .map(|piece| Link::from_element(Element::parse(&piece)))
                .collect();
            return Header::Link { links };
        }
        if name.eq_ignore_ascii_case("content-type") || name.eq_ignore_ascii_case("accept") {
            return Header::Multi {
                name: name.to_owned(),
                elements: split_escaping_quotes(value, ',')
                    .into_iter()
                    .filter(|piece| !piece.is_empty())
                    .map(|piece| Element::parse(&piece))
                    .collect(),
            };
        }
        Header::simple(name, value)
    }

    pub fn name(&self) -> &str {
        match self {
            Header::Simple { name, .. } | Header::Multi { name, .. } => name,
            Header::Link { .. } => "Link",
        }
    }

    /// The header value as written on the wire.
    pub fn value(&self) -> String {
        match self {
            Header::Simple { value, .. } => value.clone(),
            Header::Multi { elements, .. } => {
                elements.iter().map(Element::to_string).collect::<Vec<_>>().join(", ")
            }
            Header::Link { links } => {
                links.iter().map(Link::to_string).collect::<Vec<_>>().join(", ")
            }
        }
    }

    pub fn elements(&self) -> Vec<Element> {
        match self {
            Header::Simple { value, .. } => vec![Element::parse(value)],
            Header::Multi { elements, .. } => elements.clone(),
            Header::Link { links } => links.iter().map(|l| l.element.clone()).collect(),
        }
    }

    pub fn links(&self) -> &[Link] {
        match self {
            Header::Link { links } => links,
            _ => &[],
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.value())
    }
}

/// Ordered, case-insensitive header collection. Setting an existing name
/// replaces it in place; insertion order is otherwise preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    items: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Header> {
        self.items.iter().find(|h| h.name().eq_ignore_ascii_case(name))
    }

    pub fn get_value(&self, name: &str) -> Option<String> {
        self.get(name).map(Header::value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn set(&mut self, header: Header) {
        match self
            .items
            .iter_mut()
            .find(|h| h.name().eq_ignore_ascii_case(header.name()))
        {
            Some(slot) => *slot = header,
            None => self.items.push(header),
        }
    }

    pub fn set_field(&mut self, name: &str, value: &str) {
        self.set(Header::from_field(name, value));
    }

    pub fn remove(&mut self, name: &str) -> Option<Header> {
        let pos = self
            .items
            .iter()
            .position(|h| h.name().eq_ignore_ascii_case(name))?;
        Some(self.items.remove(pos))
    }

    pub fn content_type(&self) -> Option<String> {
        self.get_value("Content-Type")
    }

    pub fn links(&self) -> &[Link] {
        self.get("Link").map(Header::links).unwrap_or(&[])
    }

    pub fn link(&self, rel: &str) -> Option<&Link> {
        self.links()
            .iter()
            .find(|l| l.rel().is_some_and(|r| r.eq_ignore_ascii_case(rel)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
