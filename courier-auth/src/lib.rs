//! Authentication strategies for the courier HTTP runtime.
//!
//! Everything here plugs into the pipeline through the [`courier::Auth`]
//! seam: a strategy receives the prepared request at the auth stage and
//! decides when (and with what credentials attached) it goes to the wire.
//!
//! - [`DigestAuth`] runs the RFC 2617/7616 challenge handshake.
//! - [`OAuth2Auth`] applies a bearer token from a pluggable [`TokenFlow`].
//! - [`CertAuth`] attaches a client certificate for mutual TLS.

pub mod cert;
pub mod digest;
mod md5;
pub mod oauth2;

pub use cert::{AuthSetupError, CertAuth, CertAuthBuilder, TrustPolicy};
pub use digest::DigestAuth;
pub use oauth2::{OAuth2Auth, Token, TokenFlow, TokenTarget};
