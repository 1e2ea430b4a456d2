//! A session-oriented HTTP client runtime with pluggable transports.
//!
//! The crate wires a request pipeline around whatever actually moves
//! bytes: callers describe requests fluently on a [`Session`], payloads
//! are serialized through a media-type driven registry, interceptors and
//! auth strategies adjust the wire form, and a [`Transport`]
//! implementation performs the exchange. Results come back through
//! promises with persistent callbacks, which also power short and long
//! polling.
//!
//! ```no_run
//! use std::sync::Arc;
//! use courier::Session;
//! # fn transport() -> Arc<dyn courier::Transport> { unimplemented!() }
//!
//! let session = Session::builder()
//!     .transport(transport())
//!     .content_type("text/plain")
//!     .build()
//!     .unwrap();
//!
//! session
//!     .post("http://localhost:8080/echo")
//!     .unwrap()
//!     .payload("hello".to_owned())
//!     .send::<String>()
//!     .on_success(|response| println!("{}", response.body()));
//! ```

pub mod auth;
pub mod deferred;
pub mod dispatcher;
pub mod error;
pub mod header;
pub mod http;
pub mod interceptor;
pub mod metrics;
pub mod payload;
pub mod request;
pub mod response;
pub mod scheduler;
pub mod serialization;
pub mod session;
pub mod store;
pub mod transport;
pub mod uri;

pub use auth::{Auth, BasicAuth, BearerAuth};
pub use deferred::{Deferred, Progress};
pub use dispatcher::{
    DualCallback, PayloadCodec, PreparedRequest, RequestDispatcher, RequestPromise,
    ResponseDecoder, POLL_COUNT_KEY,
};
pub use error::{ErrorKind, RequestError};
pub use header::{Header, Headers, Link};
pub use http::{Method, Status, StatusFamily};
pub use interceptor::{RequestInterceptor, ResponseInterceptor};
pub use payload::{Part, Payload, SerializedPayload};
pub use request::{PollingOptions, PollingStrategy, RequestOptions, SerializedRequest};
pub use response::{RawResponse, Response};
pub use scheduler::{ImmediateScheduler, Scheduler, ThreadScheduler};
pub use serialization::{
    DeserializationContext, Deserializer, SerializationContext, SerializationError,
    Serializer, SerializerRegistry,
};
pub use session::{RequestBuilder, Session, SessionBuilder, SessionError};
pub use store::{Store, StoredValue};
pub use transport::{
    ClosedConnection, Connection, TlsClientConfig, Transport, TransportError, TransportEvents,
};
pub use uri::{ParamComposition, Uri, UriBuilder, UriParseError};
