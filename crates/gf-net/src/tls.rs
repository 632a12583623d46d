//! TLS settings and the rustls connector.

use crate::connect::BoxedStream;
use gf_core::EmbedError;
use gf_core::EmbedResult;
use std::net::TcpStream;

#[cfg(feature = "tls-rustls")]
use rustls::ClientConfig;
#[cfg(feature = "tls-rustls")]
use rustls::ClientConnection;
#[cfg(feature = "tls-rustls")]
use rustls::RootCertStore;
#[cfg(feature = "tls-rustls")]
use rustls::StreamOwned;
#[cfg(feature = "tls-rustls")]
use rustls::pki_types::ServerName;
#[cfg(feature = "tls-rustls")]
use std::sync::Arc;
#[cfg(feature = "tls-rustls")]
use tracing::warn;

/// Which trust anchors verify server certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustStore {
    /// Embedded Mozilla roots only.
    #[default]
    WebPki,
    /// Embedded roots plus the operating system store (corporate proxies, local CAs).
    WebPkiAndNative,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub trust: TrustStore,
    pub alpn_protocols: Vec<String>,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            trust: TrustStore::default(),
            alpn_protocols: vec!["http/1.1".to_owned()],
        }
    }
}

impl TlsSettings {
    pub fn with_trust(mut self, trust: TrustStore) -> Self {
        self.trust = trust;
        self
    }
}

#[cfg(feature = "tls-rustls")]
pub(crate) fn wrap_stream(
    mut stream: TcpStream,
    host: &str,
    settings: &TlsSettings,
) -> EmbedResult<BoxedStream> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|error| {
            EmbedError::new(
                "net.tls.config_invalid",
                format!("failed to configure TLS versions: {error}"),
            )
        })?
        .with_root_certificates(root_store(settings.trust)?)
        .with_no_client_auth();
    config.alpn_protocols = settings
        .alpn_protocols
        .iter()
        .map(|protocol| protocol.as_bytes().to_vec())
        .collect();

    let server_name = ServerName::try_from(host.to_owned()).map_err(|error| {
        EmbedError::new(
            "net.tls.server_name_invalid",
            format!("invalid TLS server name `{host}`: {error}"),
        )
    })?;
    let mut connection = ClientConnection::new(Arc::new(config), server_name).map_err(|error| {
        EmbedError::new(
            "net.tls.connection_init_failed",
            format!("failed to start TLS for `{host}`: {error}"),
        )
    })?;

    connection.complete_io(&mut stream).map_err(|error| {
        EmbedError::new(
            "net.tls.handshake_failed",
            format!("TLS handshake with `{host}` failed: {error}"),
        )
    })?;

    Ok(Box::new(StreamOwned::new(connection, stream)))
}

#[cfg(not(feature = "tls-rustls"))]
pub(crate) fn wrap_stream(
    _stream: TcpStream,
    host: &str,
    _settings: &TlsSettings,
) -> EmbedResult<BoxedStream> {
    Err(EmbedError::new(
        "net.tls.backend_unavailable",
        format!("cannot reach `{host}` over https; enable `gf-net/tls-rustls`"),
    ))
}

#[cfg(feature = "tls-rustls")]
fn root_store(trust: TrustStore) -> EmbedResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if trust == TrustStore::WebPkiAndNative {
        let native = rustls_native_certs::load_native_certs();
        for error in &native.errors {
            warn!(%error, "skipping unreadable operating-system certificate source");
        }
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        if ignored > 0 {
            warn!(added, ignored, "some operating-system roots could not be parsed");
        }
    }

    if roots.is_empty() {
        return Err(EmbedError::new(
            "net.tls.root_store_empty",
            "no trust anchors available for certificate verification",
        ));
    }
    Ok(roots)
}
