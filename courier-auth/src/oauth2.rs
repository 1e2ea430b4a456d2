//! OAuth2 bearer-token authentication.
//!
//! Token acquisition is delegated to a [`TokenFlow`] so the same strategy
//! covers client-credentials exchanges, refresh loops, or tokens minted
//! out of band. Tokens are cached until they expire; the flow is only
//! consulted again once the cached token goes stale.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use courier::{Auth, ErrorKind, Header, PreparedRequest};

/// An access token and when it stops being usable.
#[derive(Clone, Debug)]
pub struct Token {
    access_token: String,
    token_type: String,
    expires_at: Option<Instant>,
}

impl Token {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_owned(),
            expires_at: None,
        }
    }

    pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = token_type.into();
        self
    }

    /// Marks the token as expiring `expires_in` from now, as reported by
    /// the token endpoint.
    pub fn expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_at = Some(Instant::now() + expires_in);
        self
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    fn header_value(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// How a token is obtained. The callback shape keeps the flow free to
/// answer inline (a static token) or from another thread (a token
/// endpoint round trip).
pub trait TokenFlow: Send + Sync {
    fn request_token(&self, callback: Box<dyn FnOnce(Result<Token, String>) + Send>);
}

impl<F> TokenFlow for F
where
    F: Fn(Box<dyn FnOnce(Result<Token, String>) + Send>) + Send + Sync,
{
    fn request_token(&self, callback: Box<dyn FnOnce(Result<Token, String>) + Send>) {
        self(callback)
    }
}

/// Where the token goes on the outgoing request.
#[derive(Clone, Debug, Default)]
pub enum TokenTarget {
    /// `Authorization: <type> <token>` header. The usual choice.
    #[default]
    Header,
    /// A query parameter, for endpoints that insist on it.
    QueryParam(String),
}

struct OAuth2Inner {
    flow: Arc<dyn TokenFlow>,
    target: TokenTarget,
    cached: Mutex<Option<Token>>,
}

#[derive(Clone)]
pub struct OAuth2Auth {
    inner: Arc<OAuth2Inner>,
}

impl OAuth2Auth {
    pub fn new(flow: Arc<dyn TokenFlow>) -> Self {
        Self {
            inner: Arc::new(OAuth2Inner {
                flow,
                target: TokenTarget::Header,
                cached: Mutex::new(None),
            }),
        }
    }

    pub fn target(mut self, target: TokenTarget) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("configure OAuth2Auth before sharing it")
            .target = target;
        self
    }
}

impl Auth for OAuth2Auth {
    fn auth(&self, request: PreparedRequest) {
        let cached = self.inner.cached.lock().unwrap().clone();
        if let Some(token) = cached.filter(|t| !t.is_expired()) {
            apply(&self.inner.target, token, request);
            return;
        }
        let inner = self.inner.clone();
        self.inner.flow.request_token(Box::new(move |result| match result {
            Ok(token) => {
                *inner.cached.lock().unwrap() = Some(token.clone());
                apply(&inner.target, token, request);
            }
            Err(reason) => {
                let error = request.error(ErrorKind::Auth {
                    reason: format!("token flow failed: {reason}"),
                    source: None,
                });
                request.abort(error);
            }
        }));
    }
}

fn apply(target: &TokenTarget, token: Token, mut request: PreparedRequest) {
    match target {
        TokenTarget::Header => {
            request.set_header(Header::simple("Authorization", token.header_value()));
        }
        TokenTarget::QueryParam(name) => {
            request.set_query_param(name, token.access_token());
        }
    }
    request.send();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_defaults_to_bearer_and_never_expires() {
        let token = Token::new("abc123");
        assert_eq!(token.header_value(), "Bearer abc123");
        assert!(!token.is_expired());
    }

    #[test]
    fn token_expiry() {
        let live = Token::new("t").expires_in(Duration::from_secs(3600));
        assert!(!live.is_expired());
        let stale = Token::new("t").expires_in(Duration::ZERO);
        assert!(stale.is_expired());
    }

    #[test]
    fn custom_token_type() {
        let token = Token::new("m").token_type("MAC");
        assert_eq!(token.header_value(), "MAC m");
    }
}
