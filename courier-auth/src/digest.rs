//! Digest access authentication (RFC 2617 / RFC 7616, MD5 algorithm).
//!
//! The strategy holds the pipeline request at the auth stage and runs the
//! challenge handshake over side-channel attempts: a bare attempt invites
//! the `WWW-Authenticate` challenge, each challenged round answers with
//! credentials, and the final round releases the original request with
//! the winning `Authorization` header. If an attempt comes back already
//! successful, the original request settles with that response instead of
//! touching the wire again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use courier::header::split_escaping_quotes;
use courier::{Auth, ErrorKind, Header, PreparedRequest, RawResponse};

use crate::md5::md5_hex;

// Statuses that carry a digest challenge worth answering. 404 shows up
// when the server guards existence checks behind auth.
const EXPECTED_CODES: [u16; 2] = [401, 404];

const DEFAULT_MAX_CHALLENGE_CALLS: u32 = 2;

struct DigestState {
    // 1-based; counts the rounds of the current handshake.
    challenge_calls: u32,
    nonce_count: u32,
    last_nonce: Option<String>,
}

struct DigestInner {
    user: String,
    password: String,
    with_credentials: bool,
    max_challenge_calls: u32,
    state: Mutex<DigestState>,
}

impl DigestInner {
    // Nonce counts survive across handshakes for the same server nonce;
    // the round counter does not.
    fn reset_rounds(&self) {
        self.state.lock().unwrap().challenge_calls = 1;
    }

    fn next_nonce_count(&self, nonce: &str) -> u32 {
        let mut state = self.state.lock().unwrap();
        if state.last_nonce.as_deref() == Some(nonce) {
            state.nonce_count += 1;
        } else {
            state.nonce_count = 1;
            state.last_nonce = Some(nonce.to_owned());
        }
        state.nonce_count
    }
}

/// Digest auth strategy. One instance serves one request sequence at a
/// time; the nonce bookkeeping is shared, so concurrent requests through
/// the same instance should be serialized by the caller.
#[derive(Clone)]
pub struct DigestAuth {
    inner: Arc<DigestInner>,
}

impl DigestAuth {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(DigestInner {
                user: user.into(),
                password: password.into(),
                with_credentials: false,
                max_challenge_calls: DEFAULT_MAX_CHALLENGE_CALLS,
                state: Mutex::new(DigestState {
                    challenge_calls: 1,
                    nonce_count: 0,
                    last_nonce: None,
                }),
            }),
        }
    }

    pub fn with_credentials(mut self) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("configure DigestAuth before sharing it")
            .with_credentials = true;
        self
    }

    /// How many rounds to spend answering challenges before giving the
    /// original request its final header.
    pub fn max_challenge_calls(mut self, calls: u32) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("configure DigestAuth before sharing it")
            .max_challenge_calls = calls.max(1);
        self
    }
}

impl Auth for DigestAuth {
    fn auth(&self, mut request: PreparedRequest) {
        request.set_with_credentials(self.inner.with_credentials);
        attempt(self.inner.clone(), request, None);
    }
}

fn attempt(inner: Arc<DigestInner>, request: PreparedRequest, challenge: Option<RawResponse>) {
    let rounds = inner.state.lock().unwrap().challenge_calls;
    if rounds >= inner.max_challenge_calls {
        finish(inner, request, challenge);
        return;
    }

    let mut probe = request.mutable_copy();
    if let Some(response) = &challenge {
        match authorization_header(&inner, &request, response) {
            Ok(header) => probe.set_header(header),
            Err(reason) => {
                inner.reset_rounds();
                let error = request.error(ErrorKind::Auth { reason, source: None });
                request.abort(error);
                return;
            }
        }
    }
    inner.state.lock().unwrap().challenge_calls += 1;

    let dispatcher = request.dispatcher().clone();
    dispatcher.dispatch_attempt(
        probe,
        Box::new(move |result| match result {
            Err(error) => {
                inner.reset_rounds();
                let error = request.error(ErrorKind::Auth {
                    reason: "challenge attempt failed".to_owned(),
                    source: Some(Box::new(error)),
                });
                request.abort(error);
            }
            Ok(response) if EXPECTED_CODES.contains(&response.status.code()) => {
                log::debug!("digest challenge received ({})", response.status);
                attempt(inner, request, Some(response));
            }
            Ok(response) if response.status.is_success() => {
                // The server accepted an attempt outright; deliver its
                // response as the outcome of the original request.
                inner.reset_rounds();
                request.abort_with_response(response);
            }
            Ok(response) => {
                inner.reset_rounds();
                let error = request.error(ErrorKind::Auth {
                    reason: format!("unexpected status during handshake: {}", response.status),
                    source: None,
                });
                request.abort(error);
            }
        }),
    );
}

fn finish(inner: Arc<DigestInner>, mut request: PreparedRequest, challenge: Option<RawResponse>) {
    let Some(response) = challenge else {
        // No challenge rounds configured; send as-is and let the server
        // decide.
        inner.reset_rounds();
        request.send();
        return;
    };
    match authorization_header(&inner, &request, &response) {
        Ok(header) => {
            request.set_header(header);
            inner.reset_rounds();
            request.send();
        }
        Err(reason) => {
            inner.reset_rounds();
            let error = request.error(ErrorKind::Auth { reason, source: None });
            request.abort(error);
        }
    }
}

fn authorization_header(
    inner: &DigestInner,
    request: &PreparedRequest,
    response: &RawResponse,
) -> Result<Header, String> {
    let challenge = response
        .header("WWW-Authenticate")
        .ok_or_else(|| "challenge response carries no WWW-Authenticate header".to_owned())?;
    let params = parse_challenge(&challenge);
    let realm = params
        .get("realm")
        .ok_or_else(|| "challenge has no realm".to_owned())?;
    let nonce = params
        .get("nonce")
        .ok_or_else(|| "challenge has no nonce".to_owned())?;
    let qop = select_qop(params.get("qop").map(String::as_str))?;

    let method = request.method().to_string();
    let uri = request.uri().path().to_owned();
    let nc = format!("{:08}", inner.next_nonce_count(nonce));
    let cnonce = generate_cnonce(&nc, nonce);

    let body = match qop {
        Some("auth-int") => {
            let payload = request.payload();
            if payload.is_empty() {
                return Err("qop auth-int requires a request body".to_owned());
            }
            Some(payload.as_text().to_owned())
        }
        _ => None,
    };

    let digest = digest_response(
        &inner.user,
        &inner.password,
        realm,
        &method,
        &uri,
        nonce,
        qop,
        &nc,
        &cnonce,
        body.as_deref(),
    );

    let mut value = format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
        inner.user, realm, nonce, uri, digest
    );
    if let Some(qop) = qop {
        value.push_str(&format!(", qop={qop}, nc={nc}, cnonce=\"{cnonce}\""));
    }
    if let Some(opaque) = params.get("opaque") {
        value.push_str(&format!(", opaque=\"{opaque}\""));
    }
    Ok(Header::simple("Authorization", value))
}

/// The RFC 2617/7616 response digest, as a pure function of its inputs.
#[allow(clippy::too_many_arguments)]
fn digest_response(
    user: &str,
    password: &str,
    realm: &str,
    method: &str,
    uri: &str,
    nonce: &str,
    qop: Option<&str>,
    nc: &str,
    cnonce: &str,
    body: Option<&str>,
) -> String {
    let ha1 = md5_hex(format!("{user}:{realm}:{password}").as_bytes());
    match qop {
        None => {
            let ha2 = md5_hex(format!("{method}:{uri}").as_bytes());
            md5_hex(format!("{ha1}:{nonce}:{ha2}").as_bytes())
        }
        Some("auth-int") => {
            let body_hash = md5_hex(body.unwrap_or("").as_bytes());
            let ha2 = md5_hex(format!("{method}:{uri}:{body_hash}").as_bytes());
            md5_hex(format!("{ha1}:{nonce}:{nc}:{cnonce}:auth-int:{ha2}").as_bytes())
        }
        Some(qop) => {
            let ha2 = md5_hex(format!("{method}:{uri}").as_bytes());
            md5_hex(format!("{ha1}:{nonce}:{nc}:{cnonce}:{qop}:{ha2}").as_bytes())
        }
    }
}

// Prefer plain `auth` when the server offers a choice.
fn select_qop(offered: Option<&str>) -> Result<Option<&'static str>, String> {
    let Some(offered) = offered else {
        return Ok(None);
    };
    let options: Vec<&str> = offered.split(',').map(str::trim).collect();
    if options.contains(&"auth") {
        Ok(Some("auth"))
    } else if options.contains(&"auth-int") {
        Ok(Some("auth-int"))
    } else {
        Err(format!("no supported qop in challenge: '{offered}'"))
    }
}

fn generate_cnonce(nc: &str, nonce: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let salt: u32 = rand::thread_rng().gen_range(10..u32::MAX);
    md5_hex(format!("{nc}{nonce}{millis}{salt}").as_bytes())
}

fn parse_challenge(header: &str) -> HashMap<String, String> {
    let rest = match header.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("digest") => rest,
        _ => header,
    };
    let mut params = HashMap::new();
    for piece in split_escaping_quotes(rest, ',') {
        if let Some((key, value)) = piece.split_once('=') {
            params.insert(
                key.trim().to_ascii_lowercase(),
                value.trim().trim_matches('"').to_owned(),
            );
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc2617_example_digest() {
        // The worked example from RFC 2617 section 3.5.
        let digest = digest_response(
            "Mufasa",
            "Circle Of Life",
            "testrealm@host.com",
            "GET",
            "/dir/index.html",
            "dcd98b7102dd2f0e8b11d0f600bfb0c093",
            Some("auth"),
            "00000001",
            "0a4f113b",
            None,
        );
        assert_eq!(digest, "6629fae49393a05397450978507c4ef1");
    }

    #[test]
    fn legacy_digest_without_qop() {
        // RFC 2069-style example.
        let digest = digest_response(
            "Mufasa",
            "CircleOfLife",
            "testrealm@host.com",
            "GET",
            "/dir/index.html",
            "dcd98b7102dd2f0e8b11d0f600bfb0c093",
            None,
            "",
            "",
            None,
        );
        assert_eq!(digest, "1949323746fe6a43ef61f9606e7febea");
    }

    #[test]
    fn nonce_count_increments_and_resets() {
        let auth = DigestAuth::new("u", "p");
        assert_eq!(auth.inner.next_nonce_count("n1"), 1);
        assert_eq!(auth.inner.next_nonce_count("n1"), 2);
        assert_eq!(auth.inner.next_nonce_count("n1"), 3);
        assert_eq!(auth.inner.next_nonce_count("n2"), 1);
        assert_eq!(auth.inner.next_nonce_count("n2"), 2);
    }

    #[test]
    fn challenge_parsing_handles_quotes_and_case() {
        let params = parse_challenge(
            "Digest realm=\"api@example.org\", qop=\"auth,auth-int\", \
             nonce=\"abc==\", opaque=\"xyz\", stale=FALSE",
        );
        assert_eq!(params["realm"], "api@example.org");
        assert_eq!(params["qop"], "auth,auth-int");
        assert_eq!(params["nonce"], "abc==");
        assert_eq!(params["opaque"], "xyz");
        assert_eq!(params["stale"], "FALSE");
    }

    #[test]
    fn qop_selection() {
        assert_eq!(select_qop(None).unwrap(), None);
        assert_eq!(select_qop(Some("auth")).unwrap(), Some("auth"));
        assert_eq!(select_qop(Some("auth-int, auth")).unwrap(), Some("auth"));
        assert_eq!(select_qop(Some("auth-int")).unwrap(), Some("auth-int"));
        assert!(select_qop(Some("token")).is_err());
    }

    #[test]
    fn cnonce_is_hex_and_changes() {
        let a = generate_cnonce("00000001", "n");
        let b = generate_cnonce("00000002", "n");
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
