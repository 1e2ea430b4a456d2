//! The auth seam and the two header-based strategies every session gets
//! for free. Challenge-driven strategies (digest, OAuth2, client certs)
//! live in the companion auth crate.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::dispatcher::PreparedRequest;
use crate::header::Header;

/// A strategy that readies a request for the wire.
///
/// Runs after serialization and interceptors. The strategy owns the
/// request until it calls one of the [`PreparedRequest`] terminal
/// methods; nothing reaches the transport before then.
pub trait Auth: Send + Sync {
    fn auth(&self, request: PreparedRequest);
}

/// RFC 7617 basic credentials.
pub struct BasicAuth {
    user: String,
    password: String,
    with_credentials: bool,
}

impl BasicAuth {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self { user: user.into(), password: password.into(), with_credentials: false }
    }

    /// Also flag the request for cross-site credential forwarding.
    pub fn with_credentials(mut self) -> Self {
        self.with_credentials = true;
        self
    }
}

pub(crate) fn basic_credentials(user: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{user}:{password}")))
}

impl Auth for BasicAuth {
    fn auth(&self, mut request: PreparedRequest) {
        request.set_with_credentials(self.with_credentials);
        request.set_header(Header::simple(
            "Authorization",
            basic_credentials(&self.user, &self.password),
        ));
        request.send();
    }
}

/// RFC 6750 bearer token.
pub struct BearerAuth {
    token: String,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl Auth for BearerAuth {
    fn auth(&self, mut request: PreparedRequest) {
        request.set_header(Header::simple("Authorization", format!("Bearer {}", self.token)));
        request.send();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_credentials_encoding() {
        // RFC 7617 example.
        assert_eq!(
            basic_credentials("Aladdin", "open sesame"),
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="
        );
    }
}
