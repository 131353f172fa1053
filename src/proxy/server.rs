//! HTTP proxy accept loop.
//!
//! Uses hyper's HTTP/1.1 server with upgrade support for `CONNECT`. Each
//! client connection is served on its own Tokio task.

use std::future::Future;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use super::connect::{ProxyResponse, handle_connect, handle_http, text_response};
use super::coordinator::AcceptLoop;
use super::error::{ProxyError, ProxyResult};
use crate::egress::Dialer;

/// HTTP/HTTPS proxy server.
#[derive(Clone)]
pub struct HttpProxyServer {
    dialer: Dialer,
}

impl HttpProxyServer {
    /// Server dialing through `dialer`.
    pub fn new(dialer: Dialer) -> Self {
        Self { dialer }
    }

    /// Accept connections on an already bound listener.
    pub async fn serve_listener(self, listener: TcpListener) -> ProxyResult<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("HTTP proxy listening on {}", addr);
        }

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "Accepted HTTP proxy connection");
                    self.spawn_connection_handler(stream);
                }
                Err(e) => {
                    warn!("Failed to accept HTTP connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    fn spawn_connection_handler(&self, stream: TcpStream) {
        let dialer = self.dialer.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, dialer).await {
                if e.is_disconnect() {
                    debug!("Connection ended: {}", e);
                } else {
                    warn!("Connection error: {}", e);
                }
            }
        });
    }
}

impl AcceptLoop for HttpProxyServer {
    fn name(&self) -> &'static str {
        "HTTP"
    }

    fn serve(self, addr: String) -> impl Future<Output = ProxyResult<()>> + Send + 'static {
        async move {
            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|source| ProxyError::Bind {
                    protocol: "HTTP",
                    addr,
                    source,
                })?;
            self.serve_listener(listener).await
        }
    }
}

/// Serve one client connection.
async fn handle_connection(stream: TcpStream, dialer: Dialer) -> ProxyResult<()> {
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let dialer = dialer.clone();
        async move { proxy_request(req, dialer).await }
    });

    http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .serve_connection(io, service)
        .with_upgrades()
        .await
        .map_err(ProxyError::from)
}

/// Dispatch on the request method.
async fn proxy_request(req: Request<Incoming>, dialer: Dialer) -> ProxyResult<ProxyResponse> {
    let result = if req.method() == Method::CONNECT {
        handle_connect(req, dialer).await
    } else {
        handle_http(req, dialer).await
    };

    match result {
        Err(ProxyError::InvalidRequest(message)) => {
            debug!("Rejecting request: {}", message);
            Ok(text_response(StatusCode::BAD_REQUEST, &message))
        }
        other => other,
    }
}
