//! TLS connect with ALPN protocol negotiation.

use crate::base::neterror::NetError;
use crate::config::HttpProtocol;
use crate::socket::connectjob::ConnectJob;
use crate::socket::stream::BoxedSocket;
use boring::ssl::{SslConnector, SslConnectorBuilder, SslMethod, SslVerifyMode, SslVersion};
use futures::future::BoxFuture;
use std::time::Duration;

/// Outcome of a TLS handshake: the protocol the server picked via ALPN and
/// the connected secure socket.
#[derive(Debug)]
pub struct Negotiated {
    pub protocol: HttpProtocol,
    pub socket: BoxedSocket,
}

/// Performs a TLS handshake offering `protocols` (in preference order) via
/// ALPN.
pub trait SecureConnector: Send + Sync + 'static {
    fn connect<'a>(
        &'a self,
        hostname: &'a str,
        port: u16,
        protocols: &'a [HttpProtocol],
        tls: &'a TlsConfig,
    ) -> BoxFuture<'a, Result<Negotiated, NetError>>;
}

/// Client TLS settings.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub min_version: Option<SslVersion>,
    pub max_version: Option<SslVersion>,
    pub cipher_list: String,
    pub curves: Vec<String>, // Curve names like "X25519", "P-256"
    pub sigalgs: String,     // OpenSSL sigalgs string
    /// Verify the peer certificate chain and hostname.
    pub reject_unauthorized: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            min_version: Some(SslVersion::TLS1_2),
            max_version: Some(SslVersion::TLS1_3),
            cipher_list:
                "TLS_AES_128_GCM_SHA256:TLS_AES_256_GCM_SHA384:TLS_CHACHA20_POLY1305_SHA256:\
                ECDHE-ECDSA-AES128-GCM-SHA256:ECDHE-RSA-AES128-GCM-SHA256:\
                ECDHE-ECDSA-AES256-GCM-SHA384:ECDHE-RSA-AES256-GCM-SHA384:\
                ECDHE-ECDSA-CHACHA20-POLY1305:ECDHE-RSA-CHACHA20-POLY1305"
                    .to_string(),
            curves: vec!["X25519".to_string(), "P-256".to_string(), "P-384".to_string()],
            sigalgs: "ECDSA+SHA256:RSA-PSS+SHA256:RSA+SHA256:\
                ECDSA+SHA384:RSA-PSS+SHA384:RSA+SHA384:\
                RSA-PSS+SHA512:RSA+SHA512"
                .to_string(),
            reject_unauthorized: true,
        }
    }
}

impl TlsConfig {
    /// Apply this configuration to an SSL connector builder, offering
    /// `protocols` through ALPN.
    pub fn apply_to_builder(
        &self,
        builder: &mut SslConnectorBuilder,
        protocols: &[HttpProtocol],
    ) -> Result<(), NetError> {
        if let Some(min) = self.min_version {
            builder.set_min_proto_version(Some(min)).map_err(|_| NetError::SslProtocolError)?;
        }
        if let Some(max) = self.max_version {
            builder.set_max_proto_version(Some(max)).map_err(|_| NetError::SslProtocolError)?;
        }

        builder.set_cipher_list(&self.cipher_list).map_err(|_| NetError::SslProtocolError)?;

        let alpn = alpn_wire(protocols);
        if !alpn.is_empty() {
            builder.set_alpn_protos(&alpn).map_err(|_| NetError::AlpnNegotiationFailed)?;
        }

        if !self.sigalgs.is_empty() {
            builder.set_sigalgs_list(&self.sigalgs).map_err(|_| NetError::SslProtocolError)?;
        }

        if !self.curves.is_empty() {
            let curves_str = self.curves.join(":");
            builder.set_curves_list(&curves_str).map_err(|_| NetError::SslProtocolError)?;
        }

        if self.reject_unauthorized {
            builder.set_verify(SslVerifyMode::PEER);
        } else {
            builder.set_verify(SslVerifyMode::NONE);
        }

        Ok(())
    }

    /// Check if SNI should be set for this host.
    /// Per RFC 6066, SNI MUST NOT be set for raw IP addresses.
    pub fn should_set_sni(host: &str) -> bool {
        host.parse::<std::net::IpAddr>().is_err()
    }
}

/// Encode protocols as an ALPN wire list (length-prefixed ids).
pub fn alpn_wire(protocols: &[HttpProtocol]) -> Vec<u8> {
    let mut wire = Vec::new();
    for protocol in protocols {
        let id = protocol.alpn_id();
        wire.push(id.len() as u8);
        wire.extend_from_slice(id.as_bytes());
    }
    wire
}

/// Map the server's ALPN selection to a protocol. No selection means the
/// server does not speak ALPN, which implies HTTP/1.1.
pub fn protocol_from_alpn(selected: Option<&[u8]>) -> HttpProtocol {
    match selected {
        Some(b"h2") => HttpProtocol::Http2,
        _ => HttpProtocol::Http1,
    }
}

/// [`SecureConnector`] backed by BoringSSL.
#[derive(Debug, Clone, Default)]
pub struct BoringConnector {
    connect_timeout: Option<Duration>,
}

impl BoringConnector {
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }
}

impl SecureConnector for BoringConnector {
    fn connect<'a>(
        &'a self,
        hostname: &'a str,
        port: u16,
        protocols: &'a [HttpProtocol],
        tls: &'a TlsConfig,
    ) -> BoxFuture<'a, Result<Negotiated, NetError>> {
        Box::pin(async move {
            let stream = ConnectJob::connect_tcp(hostname, port, self.connect_timeout).await?;

            let mut builder =
                SslConnector::builder(SslMethod::tls()).map_err(|_| NetError::SslProtocolError)?;
            tls.apply_to_builder(&mut builder, protocols)?;

            let connector = builder.build();
            let mut config = connector.configure().map_err(|_| NetError::SslProtocolError)?;
            if !TlsConfig::should_set_sni(hostname) {
                config.set_use_server_name_indication(false);
            }
            if !tls.reject_unauthorized {
                config.set_verify_hostname(false);
            }

            let tls_stream =
                tokio_boring::connect(config, hostname, stream).await.map_err(|e| {
                    tracing::debug!(host = %hostname, port, error = ?e, "TLS handshake failed");
                    NetError::SslProtocolError
                })?;

            let protocol = protocol_from_alpn(tls_stream.ssl().selected_alpn_protocol());
            tracing::debug!(host = %hostname, port, ?protocol, "TLS connected");

            Ok(Negotiated { protocol, socket: BoxedSocket::new(tls_stream) })
        })
    }
}
