#![cfg(test)]
#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Echoes every byte back, then half-closes once the client has.
pub struct EchoOrigin {
    addr: SocketAddr,
    _handle: JoinHandle<()>,
}

impl EchoOrigin {
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    loop {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                if socket.write_all(&buf[..n]).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    socket.shutdown().await.ok();
                });
            }
        });

        Ok(Self { addr, _handle: handle })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Minimal HTTP origin recording the request line and headers it receives.
pub struct HttpOrigin {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<(String, Vec<(String, String)>)>>>,
    _handle: JoinHandle<()>,
}

impl HttpOrigin {
    pub async fn start(body: &'static str) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = requests.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let seen = seen.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let seen = seen.clone();
                        async move {
                            let headers = req
                                .headers()
                                .iter()
                                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                                .collect();
                            seen.lock().unwrap().push((format!("{} {}", req.method(), req.uri()), headers));

                            let response = Response::builder()
                                .status(200)
                                .header("X-Origin", "e2e")
                                .body(Full::new(Bytes::from_static(body.as_bytes())))
                                .unwrap();
                            Ok::<_, Infallible>(response)
                        }
                    });
                    http1::Builder::new()
                        .title_case_headers(true)
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                        .ok();
                });
            }
        });

        Ok(Self {
            addr,
            requests,
            _handle: handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Request lines and headers seen so far, oldest first.
    pub fn requests(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.requests.lock().unwrap().clone()
    }
}
