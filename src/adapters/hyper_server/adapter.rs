use async_trait::async_trait;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::{Bytes, Incoming};
use hyper::ext::ReasonPhrase;
use hyper::header::{HeaderMap, ACCEPT_ENCODING, CONNECTION};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::head::HeadReader;
use crate::domain::format::{beautify_duration, beautify_size};
use crate::domain::relay::write_status;
use crate::domain::{Connection, Destination, Protocol, ProxyError, RelayEngine, Result, CONNECT_FAILED};
use crate::ports::{ConnectionHandler, HttpTransportPort, ProxyBody};

const PROXY_CONNECTION: &str = "proxy-connection";

/// HTTP side of the proxy.
///
/// The first request head decides what happens to the connection: a CONNECT
/// detaches the raw stream and hands it to the relay engine, anything else is
/// served as a forward proxy by hyper's HTTP/1.1 loop. A CONNECT arriving later
/// in that loop is tunneled through a hyper upgrade instead.
#[derive(Clone)]
pub struct HyperProxyAdapter {
    engine: RelayEngine,
    transport: Arc<dyn HttpTransportPort>,
    strip_accept_encoding: bool,
}

impl HyperProxyAdapter {
    pub fn new(engine: RelayEngine, transport: Arc<dyn HttpTransportPort>) -> Self {
        Self {
            engine,
            transport,
            strip_accept_encoding: false,
        }
    }

    pub fn with_strip_accept_encoding(mut self, strip: bool) -> Self {
        self.strip_accept_encoding = strip;
        self
    }

    /// Serve one request of the keep-alive loop. `half_closeable` is the
    /// capability of the client connection underneath hyper.
    pub async fn handle(&self, req: Request<Incoming>, half_closeable: bool) -> Response<ProxyBody> {
        if req.method() == Method::CONNECT {
            return self.upgrade_tunnel(req, half_closeable).await;
        }

        if req.uri().scheme().is_none() || req.uri().authority().is_none() {
            warn!("{}", ProxyError::NotAbsoluteUri(req.uri().to_string()));
            return Response::new(empty_body());
        }

        self.forward(req).await.unwrap_or_else(|e| {
            error!("Proxy error: {}", e);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        })
    }

    async fn forward(&self, req: Request<Incoming>) -> Result<Response<ProxyBody>> {
        let started = Instant::now();
        let host = req.uri().host().unwrap_or_default().to_string();
        info!("{} {}", req.method(), req.uri());

        let (mut parts, body) = req.into_parts();
        strip_hop_headers(&mut parts.headers, self.strip_accept_encoding);
        let request = Request::from_parts(parts, body.boxed());

        let response = self.transport.round_trip(request).await?;
        let (parts, body) = response.into_parts();

        let mut meter = ResponseLog {
            host: host.clone(),
            status: parts.status,
            started,
            size: 0,
        };
        let body = body
            .map_frame(move |frame| {
                if let Some(data) = frame.data_ref() {
                    meter.size += data.len() as u64;
                }
                frame
            })
            .map_err(move |e| {
                warn!("Copy response body from {}: {}", host, e);
                e
            })
            .boxed();

        Ok(Response::from_parts(parts, body))
    }

    /// Dial before answering so a failure still gets its 500. The 200 is
    /// written by hyper, after which the connection is taken over.
    async fn upgrade_tunnel(&self, req: Request<Incoming>, half_closeable: bool) -> Response<ProxyBody> {
        let target = req.uri().to_string();
        debug!("CONNECT {} after a forwarded request", target);
        let destination = match Destination::parse(&target) {
            Ok(destination) => destination,
            Err(e) => {
                warn!("CONNECT {}: {}", target, e);
                return proxy_error_response();
            }
        };
        let upstream = match self.engine.dial(&destination).await {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!("Dial {}: {}", destination, e);
                return proxy_error_response();
            }
        };

        let engine = self.engine.clone();
        tokio::spawn(async move {
            match hyper::upgrade::on(req).await {
                Ok(upgraded) => {
                    let io = TokioIo::new(upgraded);
                    let client = if half_closeable {
                        Connection::half_closeable(io)
                    } else {
                        Connection::plain(io)
                    };
                    engine
                        .relay(client, upstream, &destination, "CONNECT", Protocol::Http)
                        .await;
                }
                Err(e) => error!("Failed to upgrade CONNECT {}: {}", destination, e),
            }
        });

        Response::new(empty_body())
    }

    async fn tunnel(&self, reader: HeadReader, target: &str) -> Result<()> {
        let mut client = reader.detach();
        let destination = match Destination::parse(target) {
            Ok(destination) => destination,
            Err(e) => {
                warn!("CONNECT {}: {}", target, e);
                write_status(&mut client, CONNECT_FAILED).await;
                return Err(e);
            }
        };

        self.engine.connect(client, &destination).await?;
        Ok(())
    }
}

#[async_trait]
impl ConnectionHandler for HyperProxyAdapter {
    async fn serve_conn(&self, conn: Connection) -> Result<()> {
        let mut reader = HeadReader::new(conn);
        let head = match reader.read_head().await {
            Ok(head) => head,
            Err(e) => {
                warn!("Dropping connection: {}", e);
                return Err(e);
            }
        };

        if head.is_connect() {
            return self.tunnel(reader, &head.target).await;
        }

        let conn = reader.into_replay();
        let half_closeable = conn.is_half_closeable();
        let io = TokioIo::new(conn);
        let adapter = self.clone();
        let service = service_fn(move |req| {
            let adapter = adapter.clone();
            async move { Ok::<_, Infallible>(adapter.handle(req, half_closeable).await) }
        });

        // No Date header: a tunnel's 200 must stay a bare status line.
        http1::Builder::new()
            .half_close(true)
            .auto_date_header(false)
            .preserve_header_case(true)
            .title_case_headers(true)
            .serve_connection(io, service)
            .with_upgrades()
            .await
            .map_err(|e| ProxyError::Io(e.to_string()))
    }
}

/// Logs one line per forwarded response once its body has been released.
struct ResponseLog {
    host: String,
    status: StatusCode,
    started: Instant,
    size: u64,
}

impl Drop for ResponseLog {
    fn drop(&mut self) {
        info!(
            "RESPONSE {} {} in {} <-{}",
            self.host,
            self.status.as_u16(),
            beautify_duration(self.started.elapsed()),
            beautify_size(self.size)
        );
    }
}

fn strip_hop_headers(headers: &mut HeaderMap, strip_accept_encoding: bool) {
    headers.remove(PROXY_CONNECTION);
    headers.remove(CONNECTION);
    if strip_accept_encoding {
        headers.remove(ACCEPT_ENCODING);
    }
}

fn empty_body() -> ProxyBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

/// `500 proxy error`, the status a failed CONNECT gets.
fn proxy_error_response() -> Response<ProxyBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .extensions_mut()
        .insert(ReasonPhrase::from_static(b"proxy error"));
    response
}

fn text_response(status: StatusCode, text: &str) -> Response<ProxyBody> {
    let mut response = Response::new(
        Full::new(Bytes::from(text.to_string()))
            .map_err(|never| match never {})
            .boxed(),
    );
    *response.status_mut() = status;
    response
}
