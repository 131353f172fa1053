//! HTTP proxy request handling.
//!
//! Two request shapes are supported:
//!
//! 1. `CONNECT host:port HTTP/1.1`: the proxy dials the target, answers
//!    `200`, and after the upgrade relays bytes both ways.
//! 2. Absolute-form requests (`GET http://host/path HTTP/1.1`): the proxy
//!    dials the origin, rewrites the request to origin-form and forwards it
//!    over a fresh HTTP/1.1 client connection.
//!
//! Unreachable targets produce `502 Bad Gateway`, malformed requests
//! `400 Bad Request`.

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full, combinators::BoxBody};
use hyper::body::Incoming;
use hyper::header::{CONTENT_TYPE, HOST, HeaderValue};
use hyper::{Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use tracing::{debug, warn};

use super::error::{ProxyError, ProxyResult};
use crate::egress::Dialer;

/// Response type produced by the proxy service.
pub type ProxyResponse = Response<BoxBody<Bytes, hyper::Error>>;

const DEFAULT_CONNECT_PORT: u16 = 443;
const DEFAULT_HTTP_PORT: u16 = 80;

/// Handle a `CONNECT` request.
pub async fn handle_connect(req: Request<Incoming>, dialer: Dialer) -> ProxyResult<ProxyResponse> {
    let authority = req
        .uri()
        .authority()
        .ok_or_else(|| ProxyError::InvalidRequest("missing authority in CONNECT request".into()))?
        .to_string();

    let (host, port) = parse_host_port(&authority, DEFAULT_CONNECT_PORT)?;
    debug!("CONNECT request to {}:{}", host, port);

    // Dial before answering so an unreachable target gets a real status code.
    let mut upstream = match dialer.connect(&host, port).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("CONNECT to {}:{} failed: {}", host, port, e);
            return Ok(bad_gateway(&format!("Cannot reach {}:{}: {}", host, port, e)));
        }
    };

    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                let mut client = TokioIo::new(upgraded);
                match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
                    Ok((sent, received)) => debug!(
                        "Tunnel to {}:{} closed ({} bytes up, {} bytes down)",
                        host, port, sent, received
                    ),
                    Err(e) => debug!("Tunnel to {}:{} ended: {}", host, port, e),
                }
            }
            Err(e) => {
                warn!("HTTP upgrade failed for {}:{}: {}", host, port, e);
            }
        }
    });

    Ok(Response::new(empty_body()))
}

/// Forward a plain (absolute-form) HTTP request.
pub async fn handle_http(req: Request<Incoming>, dialer: Dialer) -> ProxyResult<ProxyResponse> {
    let uri = req.uri();
    let host = uri
        .host()
        .ok_or_else(|| ProxyError::InvalidRequest("missing host in request URI".into()))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = uri.port_u16().unwrap_or(DEFAULT_HTTP_PORT);

    debug!("HTTP proxy request to {}:{}", host, port);

    let stream = match dialer.connect(&host, port).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("HTTP request to {}:{} failed: {}", host, port, e);
            return Ok(bad_gateway(&format!("Cannot reach {}:{}: {}", host, port, e)));
        }
    };

    let (mut sender, conn) = hyper::client::conn::http1::Builder::new()
        .title_case_headers(true)
        .handshake::<_, Incoming>(TokioIo::new(stream))
        .await?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!("Upstream connection ended: {}", e);
        }
    });

    let req = to_origin_form(req)?;
    match sender.send_request(req).await {
        Ok(response) => Ok(response.map(|body| body.boxed())),
        Err(e) => {
            warn!("Forwarding to {}:{} failed: {}", host, port, e);
            Ok(bad_gateway(&format!("Upstream {}:{} failed: {}", host, port, e)))
        }
    }
}

/// Rewrite an absolute-form request for the origin server.
fn to_origin_form(req: Request<Incoming>) -> ProxyResult<Request<Incoming>> {
    let (mut parts, body) = req.into_parts();

    if !parts.headers.contains_key(HOST)
        && let Some(authority) = parts.uri.authority()
    {
        let value = HeaderValue::from_str(authority.as_str())
            .map_err(|e| ProxyError::InvalidRequest(format!("invalid host: {}", e)))?;
        parts.headers.insert(HOST, value);
    }
    parts.headers.remove("proxy-connection");
    parts.headers.remove("proxy-authorization");

    let path = parts
        .uri
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/");
    parts.uri = path
        .parse::<Uri>()
        .map_err(|e| ProxyError::InvalidRequest(format!("invalid path: {}", e)))?;

    Ok(Request::from_parts(parts, body))
}

/// Split `host[:port]`, stripping IPv6 brackets.
///
/// - `example.com:8443` -> ("example.com", 8443)
/// - `example.com` -> ("example.com", `default_port`)
/// - `[::1]:443` -> ("::1", 443)
pub(crate) fn parse_host_port(authority: &str, default_port: u16) -> ProxyResult<(String, u16)> {
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| ProxyError::InvalidRequest(format!("invalid authority: {}", authority)))?;
        let port = match tail.strip_prefix(':') {
            Some(port_str) => parse_port(port_str)?,
            None if tail.is_empty() => default_port,
            None => {
                return Err(ProxyError::InvalidRequest(format!(
                    "invalid authority: {}",
                    authority
                )));
            }
        };
        return Ok((host.to_string(), port));
    }

    match authority.rsplit_once(':') {
        Some((host, port_str)) => Ok((host.to_string(), parse_port(port_str)?)),
        None => Ok((authority.to_string(), default_port)),
    }
}

fn parse_port(port_str: &str) -> ProxyResult<u16> {
    port_str
        .parse::<u16>()
        .map_err(|_| ProxyError::InvalidRequest(format!("invalid port: {}", port_str)))
}

/// Create an empty response body.
pub(crate) fn empty_body() -> BoxBody<Bytes, hyper::Error> {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

/// Create a response body with content.
fn full_body(content: String) -> BoxBody<Bytes, hyper::Error> {
    Full::new(Bytes::from(content))
        .map_err(|never| match never {})
        .boxed()
}

/// Plain-text response with the given status.
pub(crate) fn text_response(status: StatusCode, message: &str) -> ProxyResponse {
    let mut response = Response::new(full_body(message.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

fn bad_gateway(message: &str) -> ProxyResponse {
    text_response(StatusCode::BAD_GATEWAY, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port_with_port() {
        let (host, port) = parse_host_port("api.example.com:443", 443).unwrap();
        assert_eq!(host, "api.example.com");
        assert_eq!(port, 443);
    }

    #[test]
    fn test_parse_host_port_custom_port() {
        let (host, port) = parse_host_port("api.example.com:8443", 443).unwrap();
        assert_eq!(host, "api.example.com");
        assert_eq!(port, 8443);
    }

    #[test]
    fn test_parse_host_port_default() {
        let (_, port) = parse_host_port("api.example.com", 443).unwrap();
        assert_eq!(port, 443);
        let (_, port) = parse_host_port("api.example.com", 80).unwrap();
        assert_eq!(port, 80);
    }

    #[test]
    fn test_parse_host_port_invalid_port() {
        assert!(parse_host_port("api.example.com:invalid", 443).is_err());
        assert!(parse_host_port("api.example.com:70000", 443).is_err());
    }

    #[test]
    fn test_parse_host_port_ipv6() {
        let (host, port) = parse_host_port("[::1]:8443", 443).unwrap();
        assert_eq!(host, "::1");
        assert_eq!(port, 8443);

        let (host, port) = parse_host_port("[::1]", 443).unwrap();
        assert_eq!(host, "::1");
        assert_eq!(port, 443);

        assert!(parse_host_port("[::1", 443).is_err());
    }

    #[test]
    fn test_bad_gateway_response() {
        let response = bad_gateway("nope");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
    }
}
