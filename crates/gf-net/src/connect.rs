//! Connection establishment.

use crate::tls;
use crate::tls::TlsSettings;
use crate::url::TargetUrl;
use gf_core::EmbedError;
use gf_core::EmbedResult;
use std::io::Read;
use std::io::Write;
use std::net::SocketAddr;
use std::net::TcpStream;
use std::net::ToSocketAddrs;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Byte stream a request is written to and its response read from.
pub trait Stream: Read + Write {}
impl<T> Stream for T where T: Read + Write {}

pub type BoxedStream = Box<dyn Stream>;

/// Opens one connection per request.
pub trait Connector {
    fn open(&mut self, url: &TargetUrl) -> EmbedResult<BoxedStream>;
}

/// System resolver plus TCP, upgraded to TLS for `https`.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    timeout: Duration,
    tls: TlsSettings,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(TlsSettings::default())
    }
}

impl TcpConnector {
    pub fn new(tls: TlsSettings) -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            tls,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn connect_any(&self, url: &TargetUrl) -> EmbedResult<TcpStream> {
        let query = format!("{}:{}", url.host(), url.port());
        let addresses: Vec<SocketAddr> = query
            .to_socket_addrs()
            .map_err(|error| {
                EmbedError::new(
                    "net.dns.resolve_failed",
                    format!("failed to resolve `{query}`: {error}"),
                )
            })?
            .collect();

        let mut last_error = EmbedError::new(
            "net.dns.no_results",
            format!("resolver returned no addresses for `{query}`"),
        );
        for address in addresses {
            match TcpStream::connect_timeout(&address, self.timeout) {
                Ok(stream) => {
                    self.configure(&stream, address)?;
                    return Ok(stream);
                }
                Err(error) => {
                    debug!(%address, %error, "connection attempt failed");
                    last_error = EmbedError::new(
                        "net.transport.connect_failed",
                        format!("failed to connect to `{address}`: {error}"),
                    );
                }
            }
        }
        Err(last_error)
    }

    fn configure(&self, stream: &TcpStream, address: SocketAddr) -> EmbedResult<()> {
        let timeouts = stream
            .set_read_timeout(Some(self.timeout))
            .and_then(|()| stream.set_write_timeout(Some(self.timeout)))
            .and_then(|()| stream.set_nodelay(true));
        timeouts.map_err(|error| {
            EmbedError::new(
                "net.transport.configure_failed",
                format!("failed to configure socket for `{address}`: {error}"),
            )
        })
    }
}

impl Connector for TcpConnector {
    fn open(&mut self, url: &TargetUrl) -> EmbedResult<BoxedStream> {
        let stream = self.connect_any(url)?;
        if url.is_secure() {
            tls::wrap_stream(stream, url.host(), &self.tls)
        } else {
            Ok(Box::new(stream))
        }
    }
}
