//! Auth strategies exercised through a full session against a scripted
//! transport.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use courier::{
    Connection, ErrorKind, Header, Headers, ImmediateScheduler, RawResponse, SerializedPayload,
    SerializedRequest, Session, Status, Transport, TransportError, TransportEvents,
};
use courier_auth::{CertAuth, DigestAuth, OAuth2Auth, Token, TokenTarget};

struct Reply {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: &'static str,
}

impl Reply {
    fn ok(body: &'static str) -> Self {
        Reply { status: 200, headers: vec![], body }
    }

    fn status(status: u16) -> Self {
        Reply { status, headers: vec![], body: "" }
    }

    fn challenge(nonce: &str) -> Self {
        Reply {
            status: 401,
            headers: vec![(
                "WWW-Authenticate",
                format!(
                    "Digest realm=\"api@test\", qop=\"auth\", nonce=\"{nonce}\", \
                     opaque=\"5ccc069c403ebaf9f0171e9517f40e41\""
                ),
            )],
            body: "",
        }
    }
}

#[derive(Clone)]
struct SeenRequest {
    uri: String,
    headers: Vec<(String, String)>,
    has_tls: bool,
}

impl SeenRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

struct OpenConnection;

impl Connection for OpenConnection {
    fn cancel(&self) {}

    fn is_open(&self) -> bool {
        true
    }
}

#[derive(Default)]
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Reply, TransportError>>>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedTransport {
    fn new(replies: Vec<Result<Reply, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(replies.into()),
            ..Self::default()
        })
    }

    fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn dispatch(
        &self,
        request: &SerializedRequest,
        mut events: Box<dyn TransportEvents>,
    ) -> Result<Arc<dyn Connection>, TransportError> {
        self.seen.lock().unwrap().push(SeenRequest {
            uri: request.uri().to_string(),
            headers: request
                .headers()
                .iter()
                .map(|h| (h.name().to_owned(), h.value()))
                .collect(),
            has_tls: request.tls().is_some(),
        });
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Reply::ok("ok")));
        match reply {
            Ok(reply) => {
                let mut headers = Headers::new();
                headers.set(Header::content_type("text/plain"));
                for (name, value) in reply.headers {
                    headers.set(Header::simple(name, value));
                }
                events.on_response(RawResponse::new(
                    Status::new(reply.status),
                    headers,
                    SerializedPayload::from_text(reply.body),
                ));
            }
            Err(error) => events.on_error(error),
        }
        Ok(Arc::new(OpenConnection))
    }
}

fn session(transport: Arc<ScriptedTransport>) -> Session {
    Session::builder()
        .transport(transport)
        .scheduler(Arc::new(ImmediateScheduler))
        .content_type("text/plain")
        .build()
        .unwrap()
}

fn authorization_param<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    let start = header.find(&format!("{name}="))? + name.len() + 1;
    let rest = &header[start..];
    let rest = rest.strip_prefix('"').unwrap_or(rest);
    let end = rest.find(['"', ',']).unwrap_or(rest.len());
    Some(&rest[..end])
}

#[test]
fn digest_handshake_answers_the_challenge() {
    let transport = ScriptedTransport::new(vec![
        Ok(Reply::challenge("dcd98b7102dd2f0e8b11d0f600bfb0c093")),
        Ok(Reply::ok("granted")),
    ]);
    let promise = session(transport.clone())
        .get("http://localhost/secret")
        .unwrap()
        .auth(Arc::new(DigestAuth::new("Mufasa", "Circle Of Life")))
        .send::<String>();

    let response = promise.result().expect("settled").expect("resolved");
    assert_eq!(response.body(), "granted");

    let seen = transport.seen();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].header("Authorization").is_none());

    let auth = seen[1].header("Authorization").expect("credentials sent");
    assert!(auth.starts_with("Digest "));
    assert_eq!(authorization_param(auth, "username"), Some("Mufasa"));
    assert_eq!(authorization_param(auth, "realm"), Some("api@test"));
    assert_eq!(
        authorization_param(auth, "nonce"),
        Some("dcd98b7102dd2f0e8b11d0f600bfb0c093")
    );
    assert_eq!(authorization_param(auth, "uri"), Some("/secret"));
    assert_eq!(authorization_param(auth, "qop"), Some("auth"));
    assert_eq!(authorization_param(auth, "nc"), Some("00000001"));
    assert_eq!(
        authorization_param(auth, "opaque"),
        Some("5ccc069c403ebaf9f0171e9517f40e41")
    );
    let digest = authorization_param(auth, "response").unwrap();
    assert_eq!(digest.len(), 32);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn digest_probe_success_settles_without_a_resend() {
    // With three rounds allowed, the authenticated probe itself comes
    // back 200; its response becomes the outcome and nothing is resent.
    let transport = ScriptedTransport::new(vec![
        Ok(Reply::challenge("abc")),
        Ok(Reply::ok("early")),
    ]);
    let promise = session(transport.clone())
        .get("http://localhost/secret")
        .unwrap()
        .auth(Arc::new(
            DigestAuth::new("user", "pass").max_challenge_calls(3),
        ))
        .send::<String>();

    let response = promise.result().expect("settled").expect("resolved");
    assert_eq!(response.body(), "early");
    let seen = transport.seen();
    assert_eq!(seen.len(), 2);
    assert!(seen[1].header("Authorization").is_some());
}

#[test]
fn digest_unexpected_status_rejects() {
    let transport = ScriptedTransport::new(vec![
        Ok(Reply::challenge("abc")),
        Ok(Reply::status(500)),
    ]);
    let promise = session(transport)
        .get("http://localhost/secret")
        .unwrap()
        .auth(Arc::new(
            DigestAuth::new("user", "pass").max_challenge_calls(3),
        ))
        .send::<String>();

    let error = promise.result().expect("settled").expect_err("rejected");
    assert!(matches!(error.kind(), ErrorKind::Auth { .. }));
}

#[test]
fn digest_transport_failure_rejects_with_a_source() {
    let transport = ScriptedTransport::new(vec![Err(TransportError::Network(
        "connection refused".to_owned(),
    ))]);
    let promise = session(transport)
        .get("http://localhost/secret")
        .unwrap()
        .auth(Arc::new(DigestAuth::new("user", "pass")))
        .send::<String>();

    let error = promise.result().expect("settled").expect_err("rejected");
    match error.kind() {
        ErrorKind::Auth { source, .. } => assert!(source.is_some()),
        other => panic!("expected an auth error, got {other:?}"),
    }
}

#[test]
fn digest_nonce_count_grows_across_handshakes() {
    let transport = ScriptedTransport::new(vec![
        Ok(Reply::challenge("samenonce")),
        Ok(Reply::ok("one")),
        Ok(Reply::challenge("samenonce")),
        Ok(Reply::ok("two")),
    ]);
    let session = session(transport.clone());
    let auth: Arc<DigestAuth> = Arc::new(DigestAuth::new("user", "pass"));

    let first = session
        .get("http://localhost/secret")
        .unwrap()
        .auth(auth.clone())
        .send::<String>();
    assert!(first.result().expect("settled").is_ok());

    let second = session
        .get("http://localhost/secret")
        .unwrap()
        .auth(auth)
        .send::<String>();
    assert!(second.result().expect("settled").is_ok());

    let seen = transport.seen();
    assert_eq!(seen.len(), 4);
    let first_auth = seen[1].header("Authorization").unwrap();
    let second_auth = seen[3].header("Authorization").unwrap();
    assert_eq!(authorization_param(first_auth, "nc"), Some("00000001"));
    assert_eq!(authorization_param(second_auth, "nc"), Some("00000002"));
}

#[test]
fn oauth2_applies_and_caches_the_token() {
    let transport = ScriptedTransport::new(vec![]);
    let calls = Arc::new(AtomicU32::new(0));
    let flow = {
        let calls = calls.clone();
        move |callback: Box<dyn FnOnce(Result<Token, String>) + Send>| {
            calls.fetch_add(1, Ordering::SeqCst);
            callback(Ok(Token::new("tok")));
        }
    };
    let auth = Arc::new(OAuth2Auth::new(Arc::new(flow)));
    let session = session(transport.clone());

    for _ in 0..2 {
        let promise = session
            .get("http://localhost/data")
            .unwrap()
            .auth(auth.clone())
            .send::<String>();
        assert!(promise.result().expect("settled").is_ok());
    }

    let seen = transport.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].header("Authorization"), Some("Bearer tok"));
    assert_eq!(seen[1].header("Authorization"), Some("Bearer tok"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn oauth2_can_target_a_query_parameter() {
    let transport = ScriptedTransport::new(vec![]);
    let flow = |callback: Box<dyn FnOnce(Result<Token, String>) + Send>| {
        callback(Ok(Token::new("tok")));
    };
    let auth = Arc::new(
        OAuth2Auth::new(Arc::new(flow)).target(TokenTarget::QueryParam("access_token".to_owned())),
    );
    let promise = session(transport.clone())
        .get("http://localhost/data?page=2")
        .unwrap()
        .auth(auth)
        .send::<String>();
    assert!(promise.result().expect("settled").is_ok());

    let seen = transport.seen();
    assert!(seen[0].uri.contains("access_token=tok"));
    assert!(seen[0].uri.contains("page=2"));
}

#[test]
fn oauth2_flow_failure_rejects() {
    let transport = ScriptedTransport::new(vec![]);
    let flow = |callback: Box<dyn FnOnce(Result<Token, String>) + Send>| {
        callback(Err("token endpoint said no".to_owned()));
    };
    let promise = session(transport.clone())
        .get("http://localhost/data")
        .unwrap()
        .auth(Arc::new(OAuth2Auth::new(Arc::new(flow))))
        .send::<String>();

    let error = promise.result().expect("settled").expect_err("rejected");
    match error.kind() {
        ErrorKind::Auth { reason, .. } => assert!(reason.contains("token endpoint said no")),
        other => panic!("expected an auth error, got {other:?}"),
    }
    assert!(transport.seen().is_empty());
}

#[test]
fn cert_auth_attaches_tls_material() {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_owned()]).unwrap();
    let auth = CertAuth::builder()
        .cert_chain_pem(certified.cert.pem())
        .key_pem(certified.key_pair.serialize_pem())
        .build()
        .unwrap();

    let transport = ScriptedTransport::new(vec![]);
    let promise = session(transport.clone())
        .get("https://localhost/data")
        .unwrap()
        .auth(Arc::new(auth))
        .send::<String>();
    assert!(promise.result().expect("settled").is_ok());
    assert!(transport.seen()[0].has_tls);
}
