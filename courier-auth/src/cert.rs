//! Client-certificate (mutual TLS) authentication.
//!
//! Builds a rustls [`ClientConfig`] carrying a client certificate chain
//! and private key, and hands it to the request so the transport presents
//! it during the handshake. Server trust starts from the webpki root set
//! plus any extra roots; an optional [`TrustPolicy`] gets the last word
//! on certificates that already chain to a trusted root.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::client::WebPkiServerVerifier;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use thiserror::Error;

use courier::transport::TlsClientConfig;
use courier::{Auth, PreparedRequest};

#[derive(Debug, Error)]
pub enum AuthSetupError {
    #[error("no client certificate configured")]
    MissingCertificate,
    #[error("no private key configured")]
    MissingKey,
    #[error("certificate source contains no certificates")]
    EmptyChain,
    #[error("pem: {0}")]
    Pem(#[from] rustls_pki_types::pem::Error),
    #[error("trust anchors: {0}")]
    Roots(#[from] rustls::client::VerifierBuilderError),
    #[error("tls: {0}")]
    Tls(#[from] rustls::Error),
}

/// Extra acceptance check applied after webpki chain validation.
pub trait TrustPolicy: Send + Sync {
    fn trusts(&self, server_name: &ServerName<'_>, end_entity: &CertificateDer<'_>) -> bool;
}

impl<F> TrustPolicy for F
where
    F: Fn(&ServerName<'_>, &CertificateDer<'_>) -> bool + Send + Sync,
{
    fn trusts(&self, server_name: &ServerName<'_>, end_entity: &CertificateDer<'_>) -> bool {
        self(server_name, end_entity)
    }
}

enum PemSource {
    File(PathBuf),
    Bytes(Vec<u8>),
}

#[derive(Default)]
pub struct CertAuthBuilder {
    certs: Option<PemSource>,
    key: Option<PemSource>,
    extra_roots: Vec<CertificateDer<'static>>,
    policy: Option<Arc<dyn TrustPolicy>>,
}

impl CertAuthBuilder {
    pub fn cert_chain_pem_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.certs = Some(PemSource::File(path.into()));
        self
    }

    pub fn cert_chain_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.certs = Some(PemSource::Bytes(pem.into()));
        self
    }

    pub fn key_pem_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key = Some(PemSource::File(path.into()));
        self
    }

    pub fn key_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.key = Some(PemSource::Bytes(pem.into()));
        self
    }

    /// Trusts `root` in addition to the webpki root set. Useful for
    /// private CAs.
    pub fn extra_root(mut self, root: CertificateDer<'static>) -> Self {
        self.extra_roots.push(root);
        self
    }

    pub fn trust_policy(mut self, policy: Arc<dyn TrustPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn build(self) -> Result<CertAuth, AuthSetupError> {
        let certs = match self.certs.ok_or(AuthSetupError::MissingCertificate)? {
            PemSource::File(path) => CertificateDer::pem_file_iter(&path)?
                .collect::<Result<Vec<_>, _>>()?,
            PemSource::Bytes(pem) => CertificateDer::pem_slice_iter(&pem)
                .collect::<Result<Vec<_>, _>>()?,
        };
        if certs.is_empty() {
            return Err(AuthSetupError::EmptyChain);
        }
        let key = match self.key.ok_or(AuthSetupError::MissingKey)? {
            PemSource::File(path) => PrivateKeyDer::from_pem_file(&path)?,
            PemSource::Bytes(pem) => PrivateKeyDer::from_pem_slice(&pem)?,
        };

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        for root in self.extra_roots {
            roots.add(root)?;
        }
        let roots = Arc::new(roots);

        let builder = ClientConfig::builder();
        let config = match self.policy {
            Some(policy) => {
                let webpki = WebPkiServerVerifier::builder(roots).build()?;
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(PolicyVerifier {
                        webpki,
                        policy,
                    }))
                    .with_client_auth_cert(certs, key)?
            }
            None => builder
                .with_root_certificates(roots)
                .with_client_auth_cert(certs, key)?,
        };

        Ok(CertAuth {
            config: TlsClientConfig {
                client_config: Arc::new(config),
            },
        })
    }
}

/// Mutual-TLS auth strategy. Attaches the prepared [`ClientConfig`] to
/// the request and releases it; the transport does the handshake.
#[derive(Clone, Debug)]
pub struct CertAuth {
    config: TlsClientConfig,
}

impl CertAuth {
    pub fn builder() -> CertAuthBuilder {
        CertAuthBuilder::default()
    }

    pub fn tls_config(&self) -> &TlsClientConfig {
        &self.config
    }
}

impl Auth for CertAuth {
    fn auth(&self, mut request: PreparedRequest) {
        request.set_tls(self.config.clone());
        request.send();
    }
}

// Runs webpki validation first, then the policy. The policy can only
// narrow trust, never widen it.
struct PolicyVerifier {
    webpki: Arc<WebPkiServerVerifier>,
    policy: Arc<dyn TrustPolicy>,
}

impl fmt::Debug for PolicyVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyVerifier").finish_non_exhaustive()
    }
}

impl ServerCertVerifier for PolicyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let verified = self.webpki.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        )?;
        if self.policy.trusts(server_name, end_entity) {
            Ok(verified)
        } else {
            Err(rustls::Error::General(
                "server certificate rejected by trust policy".to_owned(),
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.webpki.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.webpki.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.webpki.supported_verify_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed_pem() -> (String, String) {
        let certified =
            rcgen::generate_simple_self_signed(vec!["localhost".to_owned()]).unwrap();
        (certified.cert.pem(), certified.key_pair.serialize_pem())
    }

    #[test]
    fn builds_a_client_config_from_pem() {
        let (cert, key) = self_signed_pem();
        let auth = CertAuth::builder()
            .cert_chain_pem(cert)
            .key_pem(key)
            .build()
            .unwrap();
        // The config carries a client auth cert resolver.
        assert!(Arc::strong_count(&auth.tls_config().client_config) >= 1);
    }

    #[test]
    fn builds_with_a_trust_policy_and_extra_root() {
        let (cert, key) = self_signed_pem();
        let root = CertificateDer::from_pem_slice(cert.as_bytes()).unwrap();
        let auth = CertAuth::builder()
            .cert_chain_pem(cert)
            .key_pem(key)
            .extra_root(root)
            .trust_policy(Arc::new(
                |_: &ServerName<'_>, _: &CertificateDer<'_>| true,
            ))
            .build();
        assert!(auth.is_ok());
    }

    #[test]
    fn missing_pieces_are_reported() {
        let (cert, key) = self_signed_pem();
        assert!(matches!(
            CertAuth::builder().key_pem(key).build(),
            Err(AuthSetupError::MissingCertificate)
        ));
        assert!(matches!(
            CertAuth::builder().cert_chain_pem(cert).build(),
            Err(AuthSetupError::MissingKey)
        ));
    }

    #[test]
    fn garbage_pem_is_an_error() {
        let result = CertAuth::builder()
            .cert_chain_pem("not a certificate")
            .key_pem("not a key")
            .build();
        assert!(matches!(result, Err(AuthSetupError::Pem(_))));
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = CertAuth::builder()
            .cert_chain_pem_file("/nonexistent/client.pem")
            .key_pem_file("/nonexistent/client.key")
            .build();
        assert!(result.is_err());
    }
}
