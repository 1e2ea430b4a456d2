//! Percent-encoding of URI components.

use super::UriParseError;

/// Encodes and decodes the textual parts of a URI.
///
/// The default [`PercentCodec`] follows RFC 3986; a custom implementation
/// can be plugged into the parser and builder when a service deviates from
/// standard escaping.
pub trait UriCodec: Send + Sync {
    fn encode_path_segment(&self, part: &str) -> String;
    fn encode_query(&self, part: &str) -> String;
    fn encode_user_info(&self, part: &str) -> String;
    fn encode_fragment(&self, part: &str) -> String;
    fn decode(&self, part: &str) -> Result<String, UriParseError>;
    /// Query decoding additionally maps `+` to a space.
    fn decode_query(&self, part: &str) -> Result<String, UriParseError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PercentCodec;

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

// Path segments keep sub-delims except `;` and `=`, which carry matrix
// parameter structure and must round-trip through the parser.
fn segment_allowed(b: u8) -> bool {
    is_unreserved(b) || matches!(b, b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' | b':' | b'@')
}

// Query values keep `/` and `?` but escape the `&`, `=`, `+`, and `#`
// that would be read back as structure.
fn query_allowed(b: u8) -> bool {
    is_unreserved(b) || matches!(b, b'!' | b'$' | b'\'' | b'(' | b')' | b'*' | b',' | b';' | b':' | b'@' | b'/' | b'?')
}

fn user_info_allowed(b: u8) -> bool {
    is_unreserved(b) || matches!(b, b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' | b';' | b'=')
}

fn fragment_allowed(b: u8) -> bool {
    query_allowed(b) || matches!(b, b'&' | b'=' | b'+')
}

fn encode_with(allowed: fn(u8) -> bool, part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for &b in part.as_bytes() {
        if allowed(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0f) as usize] as char);
        }
    }
    out
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn decode_with(part: &str, plus_as_space: bool) -> Result<String, UriParseError> {
    let bytes = part.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let (hi, lo) = match (bytes.get(i + 1), bytes.get(i + 2)) {
                    (Some(&h), Some(&l)) => (hex_val(h), hex_val(l)),
                    _ => (None, None),
                };
                match (hi, lo) {
                    (Some(h), Some(l)) => {
                        out.push((h << 4) | l);
                        i += 3;
                    }
                    _ => return Err(UriParseError::InvalidEncoding(part.to_owned())),
                }
            }
            b'+' if plus_as_space => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| UriParseError::InvalidEncoding(part.to_owned()))
}

impl UriCodec for PercentCodec {
    fn encode_path_segment(&self, part: &str) -> String {
        encode_with(segment_allowed, part)
    }

    fn encode_query(&self, part: &str) -> String {
        encode_with(query_allowed, part)
    }

    fn encode_user_info(&self, part: &str) -> String {
        encode_with(user_info_allowed, part)
    }

    fn encode_fragment(&self, part: &str) -> String {
        encode_with(fragment_allowed, part)
    }

    fn decode(&self, part: &str) -> Result<String, UriParseError> {
        decode_with(part, false)
    }

    fn decode_query(&self, part: &str) -> Result<String, UriParseError> {
        decode_with(part, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_reserved_characters() {
        let codec = PercentCodec;
        let raw = "a b;c=d/e";
        let enc = codec.encode_path_segment(raw);
        assert_eq!(enc, "a%20b%3Bc%3Dd%2Fe");
        assert_eq!(codec.decode(&enc).unwrap(), raw);
    }

    #[test]
    fn query_plus_is_space_on_decode_only() {
        let codec = PercentCodec;
        assert_eq!(codec.decode_query("a+b").unwrap(), "a b");
        assert_eq!(codec.decode("a+b").unwrap(), "a+b");
        assert_eq!(codec.encode_query("a+b"), "a%2Bb");
    }

    #[test]
    fn rejects_truncated_escapes() {
        let codec = PercentCodec;
        assert!(matches!(codec.decode("abc%2"), Err(UriParseError::InvalidEncoding(_))));
        assert!(matches!(codec.decode("%zz"), Err(UriParseError::InvalidEncoding(_))));
    }

    #[test]
    fn utf8_multibyte() {
        let codec = PercentCodec;
        let enc = codec.encode_query("café");
        assert_eq!(enc, "caf%C3%A9");
        assert_eq!(codec.decode_query(&enc).unwrap(), "café");
    }
}
