use futures::Future;
use hyper::Uri;
use hyper_util::rt::TokioIo;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tower_service::Service;

const DEFAULT_HTTP_PORT: u16 = 80;

/// Opens direct TCP connections to the origin named by a request URI.
#[derive(Clone, Default)]
pub struct HyperConnector {
    connect_timeout: Option<Duration>,
}

impl HyperConnector {
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }
}

impl Service<Uri> for HyperConnector {
    type Response = TokioIo<TcpStream>;
    type Error = std::io::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let connect_timeout = self.connect_timeout;

        Box::pin(async move {
            let host = uri
                .host()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "Missing host"))?
                .trim_start_matches('[')
                .trim_end_matches(']')
                .to_string();
            let port = uri.port_u16().unwrap_or(DEFAULT_HTTP_PORT);

            let connecting = TcpStream::connect((host.as_str(), port));
            let stream = match connect_timeout {
                Some(limit) => match timeout(limit, connecting).await {
                    Ok(res) => res,
                    Err(_) => Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("connect timed out after {:?}", limit),
                    )),
                },
                None => connecting.await,
            };

            match stream {
                Ok(stream) => {
                    stream.set_nodelay(true).ok();
                    Ok(TokioIo::new(stream))
                }
                Err(e) => {
                    log::debug!("Failed to connect to {}:{}: {}", host, port, e);
                    Err(e)
                }
            }
        })
    }
}
