//! SOCKS5 accept loop.
//!
//! Supports the no-authentication method and the `CONNECT` command for IPv4,
//! IPv6 and domain-name targets (RFC 1928). Other commands are answered with
//! "command not supported". Outbound connections go through the [`Dialer`].

use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use super::coordinator::AcceptLoop;
use super::error::{ProxyError, ProxyResult};
use crate::egress::Dialer;

const VERSION: u8 = 0x05;
const AUTH_NONE: u8 = 0x00;
const AUTH_NO_ACCEPTABLE: u8 = 0xFF;

const CMD_CONNECT: u8 = 0x01;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

const REP_SUCCESS: u8 = 0x00;
const REP_GENERAL_FAILURE: u8 = 0x01;
const REP_NETWORK_UNREACHABLE: u8 = 0x03;
const REP_HOST_UNREACHABLE: u8 = 0x04;
const REP_CONNECTION_REFUSED: u8 = 0x05;
const REP_COMMAND_NOT_SUPPORTED: u8 = 0x07;
const REP_ADDRESS_NOT_SUPPORTED: u8 = 0x08;

/// Destination requested by a SOCKS5 client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAddr {
    /// Host name or IP literal.
    pub host: String,
    /// Destination port.
    pub port: u16,
}

/// SOCKS5 proxy server.
#[derive(Clone)]
pub struct Socks5Server {
    dialer: Dialer,
}

impl Socks5Server {
    /// Server dialing through `dialer`.
    pub fn new(dialer: Dialer) -> Self {
        Self { dialer }
    }

    /// Accept connections on an already bound listener.
    pub async fn serve_listener(self, listener: TcpListener) -> ProxyResult<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("SOCKS5 proxy listening on {}", addr);
        }

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let dialer = self.dialer.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, dialer).await {
                            if e.is_disconnect() {
                                debug!(peer = %peer, "SOCKS5 client went away: {}", e);
                            } else {
                                warn!(peer = %peer, "SOCKS5 connection error: {}", e);
                            }
                        }
                    });
                }
                Err(e) => {
                    warn!("Failed to accept SOCKS5 connection: {}", e);
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    }
}

impl AcceptLoop for Socks5Server {
    fn name(&self) -> &'static str {
        "SOCKS5"
    }

    fn serve(self, addr: String) -> impl Future<Output = ProxyResult<()>> + Send + 'static {
        async move {
            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|source| ProxyError::Bind {
                    protocol: "SOCKS5",
                    addr,
                    source,
                })?;
            self.serve_listener(listener).await
        }
    }
}

/// Run one client session: negotiation, request, relay.
async fn handle_client(mut stream: TcpStream, dialer: Dialer) -> ProxyResult<()> {
    negotiate(&mut stream).await?;

    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    if header[0] != VERSION {
        return Err(ProxyError::Socks5(format!(
            "unexpected request version {}",
            header[0]
        )));
    }

    let target = match read_target(&mut stream, header[3]).await? {
        Some(target) => target,
        None => {
            send_reply(&mut stream, REP_ADDRESS_NOT_SUPPORTED, None).await?;
            return Err(ProxyError::Socks5(format!(
                "unsupported address type {}",
                header[3]
            )));
        }
    };

    if header[1] != CMD_CONNECT {
        send_reply(&mut stream, REP_COMMAND_NOT_SUPPORTED, None).await?;
        return Err(ProxyError::Socks5(format!(
            "unsupported command {}",
            header[1]
        )));
    }

    debug!("SOCKS5 CONNECT to {}:{}", target.host, target.port);

    let mut upstream = match dialer.connect(&target.host, target.port).await {
        Ok(upstream) => upstream,
        Err(e) => {
            send_reply(&mut stream, reply_code(&e), None).await?;
            return Err(ProxyError::UpstreamConnect {
                addr: format!("{}:{}", target.host, target.port),
                message: e.to_string(),
            });
        }
    };

    let bound = upstream.local_addr().ok();
    send_reply(&mut stream, REP_SUCCESS, bound).await?;

    let (sent, received) = tokio::io::copy_bidirectional(&mut stream, &mut upstream).await?;
    debug!(
        "SOCKS5 tunnel to {}:{} closed ({} bytes up, {} bytes down)",
        target.host, target.port, sent, received
    );
    Ok(())
}

/// Method negotiation; only "no authentication" is offered.
async fn negotiate<S>(stream: &mut S) -> ProxyResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut greeting = [0u8; 2];
    stream.read_exact(&mut greeting).await?;
    if greeting[0] != VERSION {
        stream.write_all(&[VERSION, AUTH_NO_ACCEPTABLE]).await?;
        return Err(ProxyError::Socks5(format!(
            "unsupported version {}",
            greeting[0]
        )));
    }

    let mut methods = vec![0u8; greeting[1] as usize];
    stream.read_exact(&mut methods).await?;

    if !methods.contains(&AUTH_NONE) {
        stream.write_all(&[VERSION, AUTH_NO_ACCEPTABLE]).await?;
        return Err(ProxyError::Socks5("no acceptable auth method".to_string()));
    }

    stream.write_all(&[VERSION, AUTH_NONE]).await?;
    Ok(())
}

/// Read the destination. `None` for an unknown address type.
async fn read_target<S>(stream: &mut S, atyp: u8) -> ProxyResult<Option<TargetAddr>>
where
    S: AsyncRead + Unpin,
{
    let host = match atyp {
        ATYP_IPV4 => {
            let mut octets = [0u8; 4];
            stream.read_exact(&mut octets).await?;
            Ipv4Addr::from(octets).to_string()
        }
        ATYP_IPV6 => {
            let mut octets = [0u8; 16];
            stream.read_exact(&mut octets).await?;
            Ipv6Addr::from(octets).to_string()
        }
        ATYP_DOMAIN => {
            let len = stream.read_u8().await? as usize;
            let mut name = vec![0u8; len];
            stream.read_exact(&mut name).await?;
            String::from_utf8(name)
                .map_err(|_| ProxyError::Socks5("domain name is not UTF-8".to_string()))?
        }
        _ => return Ok(None),
    };

    let port = stream.read_u16().await?;
    Ok(Some(TargetAddr { host, port }))
}

/// Write a reply carrying `bound` (or 0.0.0.0:0).
async fn send_reply<S>(stream: &mut S, rep: u8, bound: Option<SocketAddr>) -> ProxyResult<()>
where
    S: AsyncWrite + Unpin,
{
    let bound = bound.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
    let mut reply = vec![VERSION, rep, 0x00];
    match bound {
        SocketAddr::V4(addr) => {
            reply.push(ATYP_IPV4);
            reply.extend_from_slice(&addr.ip().octets());
        }
        SocketAddr::V6(addr) => {
            reply.push(ATYP_IPV6);
            reply.extend_from_slice(&addr.ip().octets());
        }
    }
    reply.extend_from_slice(&bound.port().to_be_bytes());
    stream.write_all(&reply).await?;
    Ok(())
}

fn reply_code(err: &std::io::Error) -> u8 {
    match err.kind() {
        std::io::ErrorKind::ConnectionRefused => REP_CONNECTION_REFUSED,
        std::io::ErrorKind::NetworkUnreachable => REP_NETWORK_UNREACHABLE,
        std::io::ErrorKind::HostUnreachable | std::io::ErrorKind::AddrNotAvailable => {
            REP_HOST_UNREACHABLE
        }
        _ => REP_GENERAL_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn start_proxy() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(Socks5Server::new(Dialer::direct()).serve_listener(listener));
        addr
    }

    async fn start_echo_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let (mut r, mut w) = stream.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            }
        });
        port
    }

    async fn handshake(client: &mut TcpStream) {
        client.write_all(&[5, 1, 0]).await.unwrap();
        let mut resp = [0u8; 2];
        client.read_exact(&mut resp).await.unwrap();
        assert_eq!(resp, [5, 0]);
    }

    #[tokio::test]
    async fn test_connect_ipv4_and_relay() {
        let proxy = start_proxy().await;
        let echo_port = start_echo_server().await;

        let mut client = TcpStream::connect(proxy).await.unwrap();
        handshake(&mut client).await;

        let mut req = vec![5, 1, 0, ATYP_IPV4, 127, 0, 0, 1];
        req.extend_from_slice(&echo_port.to_be_bytes());
        client.write_all(&req).await.unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[0], 5);
        assert_eq!(reply[1], REP_SUCCESS);

        client.write_all(b"through socks5").await.unwrap();
        let mut echoed = [0u8; 14];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"through socks5");
    }

    #[tokio::test]
    async fn test_connect_domain() {
        let proxy = start_proxy().await;
        let echo_port = start_echo_server().await;

        let mut client = TcpStream::connect(proxy).await.unwrap();
        handshake(&mut client).await;

        let domain = b"localhost";
        let mut req = vec![5, 1, 0, ATYP_DOMAIN, domain.len() as u8];
        req.extend_from_slice(domain);
        req.extend_from_slice(&echo_port.to_be_bytes());
        client.write_all(&req).await.unwrap();

        let mut head = [0u8; 4];
        client.read_exact(&mut head).await.unwrap();
        assert_eq!(head[1], REP_SUCCESS);
    }

    #[tokio::test]
    async fn test_bind_command_not_supported() {
        let proxy = start_proxy().await;
        let mut client = TcpStream::connect(proxy).await.unwrap();
        handshake(&mut client).await;

        client
            .write_all(&[5, 2, 0, ATYP_IPV4, 127, 0, 0, 1, 0, 80])
            .await
            .unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], REP_COMMAND_NOT_SUPPORTED);
    }

    #[tokio::test]
    async fn test_unknown_address_type() {
        let proxy = start_proxy().await;
        let mut client = TcpStream::connect(proxy).await.unwrap();
        handshake(&mut client).await;

        client.write_all(&[5, 1, 0, 9]).await.unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], REP_ADDRESS_NOT_SUPPORTED);
    }

    #[tokio::test]
    async fn test_auth_required_by_client_is_rejected() {
        let proxy = start_proxy().await;
        let mut client = TcpStream::connect(proxy).await.unwrap();

        // Only username/password offered.
        client.write_all(&[5, 1, 2]).await.unwrap();
        let mut resp = [0u8; 2];
        client.read_exact(&mut resp).await.unwrap();
        assert_eq!(resp, [5, AUTH_NO_ACCEPTABLE]);
    }

    #[tokio::test]
    async fn test_refused_target() {
        let proxy = start_proxy().await;
        let closed_port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut client = TcpStream::connect(proxy).await.unwrap();
        handshake(&mut client).await;

        let mut req = vec![5, 1, 0, ATYP_IPV4, 127, 0, 0, 1];
        req.extend_from_slice(&closed_port.to_be_bytes());
        client.write_all(&req).await.unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert!(reply[1] == REP_CONNECTION_REFUSED || reply[1] == REP_GENERAL_FAILURE);
    }

    #[tokio::test]
    async fn test_serve_reports_bind_failure() {
        let result = Socks5Server::new(Dialer::direct())
            .serve("not-an-address".to_string())
            .await;
        assert!(matches!(result, Err(ProxyError::Bind { .. })));
    }

    #[test]
    fn test_reply_code_mapping() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(reply_code(&refused), REP_CONNECTION_REFUSED);
        let other = std::io::Error::other("boom");
        assert_eq!(reply_code(&other), REP_GENERAL_FAILURE);
    }
}
