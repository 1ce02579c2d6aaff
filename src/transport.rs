//! Socket-level request transmission: connect, chunked upload, deadline read.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    sync::Arc,
    time::{Duration, Instant},
};

use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{ring, CryptoProvider},
    pki_types::{CertificateDer, ServerName, UnixTime},
    ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme, StreamOwned,
};

use crate::{chunked::write_chunked, response::decode_response, ClientOptions, DoubaoError, Result};

/// Everything one attempt needs. Built fresh per call, borrowed by the transport.
#[derive(Clone, Copy)]
pub struct Request<'a> {
    pub payload: &'a str,
    /// Full `Authorization` header value.
    pub authorization: &'a str,
    pub options: &'a ClientOptions,
}

/// One request/response round trip.
pub trait Transport {
    fn send(&self, request: &Request<'_>) -> Result<String>;
}

/// A connected byte stream the transport can bound reads on and close.
pub trait Socket: Read + Write {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Best-effort orderly shutdown. The socket is unusable afterwards.
    fn close(&mut self);
}

/// Opens sockets to an endpoint.
pub trait Connector {
    type Socket: Socket;

    fn connect(&self, options: &ClientOptions) -> io::Result<Self::Socket>;
}

impl Socket for TcpStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn close(&mut self) {
        let _ = self.shutdown(Shutdown::Both);
    }
}

impl Socket for StreamOwned<ClientConnection, TcpStream> {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.sock.set_read_timeout(timeout)
    }

    fn close(&mut self) {
        self.conn.send_close_notify();
        let _ = self.conn.complete_io(&mut self.sock);
        let _ = self.sock.shutdown(Shutdown::Both);
    }
}

/// Plain TCP, for local gateways and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainConnector;

impl Connector for PlainConnector {
    type Socket = TcpStream;

    fn connect(&self, options: &ClientOptions) -> io::Result<TcpStream> {
        open_tcp(options)
    }
}

/// TLS over TCP with rustls.
///
/// **Server certificates are not verified.** Any certificate is accepted, so
/// a man-in-the-middle cannot be told apart from the real endpoint. This
/// matches devices that carry no CA bundle; integrators who need
/// authentication must supply their own [`Connector`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TlsConnector;

impl Connector for TlsConnector {
    type Socket = StreamOwned<ClientConnection, TcpStream>;

    fn connect(&self, options: &ClientOptions) -> io::Result<Self::Socket> {
        let config = insecure_client_config().map_err(io::Error::other)?;
        let server_name = ServerName::try_from(options.endpoint.host.clone())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let mut conn = ClientConnection::new(Arc::new(config), server_name)
            .map_err(io::Error::other)?;

        let mut sock = open_tcp(options)?;
        // A silent peer must not stall the handshake past the connect timeout.
        sock.set_read_timeout(Some(connect_timeout(options)))?;
        // Finish the handshake here so a TLS failure counts as a failed connect.
        while conn.is_handshaking() {
            conn.complete_io(&mut sock)?;
        }
        Ok(StreamOwned::new(conn, sock))
    }
}

fn open_tcp(options: &ClientOptions) -> io::Result<TcpStream> {
    let endpoint = &options.endpoint;
    let connect_timeout = connect_timeout(options);

    let mut last_err = None;
    for addr in (endpoint.host.as_str(), endpoint.port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, connect_timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                stream.set_write_timeout(Some(connect_timeout))?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses for {}", endpoint.host),
        )
    }))
}

fn connect_timeout(options: &ClientOptions) -> Duration {
    Duration::from_millis(options.connect_timeout_ms.max(1))
}

fn insecure_client_config() -> std::result::Result<ClientConfig, rustls::Error> {
    let provider = Arc::new(ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();
    Ok(config)
}

/// Skips chain and name checks but still checks handshake signatures, so the
/// session is at least bound to the presented key.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Chunked-upload HTTP/1.1 transport over any [`Connector`].
#[derive(Clone, Debug, Default)]
pub struct HttpTransport<C = TlsConnector> {
    connector: C,
}

impl<C: Connector> HttpTransport<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }
}

impl<C: Connector> Transport for HttpTransport<C> {
    fn send(&self, request: &Request<'_>) -> Result<String> {
        let options = request.options;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "connecting to {}:{}",
            options.endpoint.host,
            options.endpoint.port
        );

        let mut socket = self.connector.connect(options).map_err(|err| {
            #[cfg(feature = "tracing")]
            tracing::warn!("failed to connect: {}", err);
            DoubaoError::Network(err)
        })?;

        let deadline = Duration::from_millis(options.read_timeout_ms);
        let exchanged = write_request(&mut socket, request)
            .map(|_chunks| {
                #[cfg(feature = "tracing")]
                tracing::debug!("sent {} bytes in {} chunks", request.payload.len(), _chunks);
                read_until_closed(&mut socket, deadline)
            });
        socket.close();

        let (raw, waited) = exchanged.map_err(DoubaoError::Network)?;
        if raw.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::warn!("no response received after {:?}", waited);
            return Err(DoubaoError::Timeout {
                waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
            });
        }

        let decoded = decode_response(&raw);

        #[cfg(feature = "tracing")]
        match &decoded {
            Ok(_) => tracing::debug!("parsed response of {} bytes", raw.len()),
            Err(err) => tracing::warn!("response rejected: {}", err),
        }

        decoded
    }
}

fn write_request<S: Socket>(socket: &mut S, request: &Request<'_>) -> io::Result<usize> {
    let options = request.options;
    let head = format!(
        "POST {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Content-Type: application/json\r\n\
         Authorization: {authorization}\r\n\
         Transfer-Encoding: chunked\r\n\
         Connection: close\r\n\
         \r\n",
        path = options.endpoint.path,
        host = options.endpoint.host,
        authorization = request.authorization,
    );
    socket.write_all(head.as_bytes())?;
    write_chunked(
        socket,
        request.payload.as_bytes(),
        options.chunk_size,
        Duration::from_millis(options.chunk_delay_ms),
    )
}

/// Reads until the peer closes, the read fails, or `deadline` elapses, and
/// reports how long that took.
///
/// Each read blocks for at most the time left, so there is no polling.
fn read_until_closed<S: Socket>(socket: &mut S, deadline: Duration) -> (Vec<u8>, Duration) {
    let started = Instant::now();
    let mut response = Vec::new();
    let mut buf = [0u8; 1024];

    loop {
        let remaining = deadline.saturating_sub(started.elapsed());
        if remaining.is_zero() || socket.set_read_timeout(Some(remaining)).is_err() {
            break;
        }
        match socket.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => response.extend_from_slice(&buf[..n]),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            // Timeouts and abrupt closes (e.g. no TLS close_notify) end the read.
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("read ended: {}", _err);
                break;
            }
        }
    }
    (response, started.elapsed())
}
