use std::sync::Arc;

use async_trait::async_trait;
use hyper::body::Bytes;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::domain::{Connection, Protocol, ProxyError, Result};
use crate::ports::ConnectionHandler;

/// Read exactly one byte from `conn` and decide which protocol follows.
///
/// The returned connection replays that byte, so whoever reads it next sees
/// the stream exactly as the client sent it.
pub async fn classify(mut conn: Connection) -> Result<(Protocol, Connection)> {
    let mut first = [0u8; 1];
    let n = conn
        .read(&mut first)
        .await
        .map_err(|e| ProxyError::SniffFailed(e.to_string()))?;
    if n == 0 {
        return Err(ProxyError::SniffFailed("peer closed before sending anything".to_string()));
    }

    let protocol = Protocol::from_first_byte(first[0]);
    Ok((protocol, conn.prefixed(Bytes::copy_from_slice(&first))))
}

/// Routes connections of a shared HTTP + SOCKS5 listener.
pub struct Dispatcher {
    socks: Arc<dyn ConnectionHandler>,
    http: Arc<dyn ConnectionHandler>,
}

impl Dispatcher {
    pub fn new(socks: Arc<dyn ConnectionHandler>, http: Arc<dyn ConnectionHandler>) -> Self {
        Self { socks, http }
    }
}

#[async_trait]
impl ConnectionHandler for Dispatcher {
    async fn serve_conn(&self, conn: Connection) -> Result<()> {
        let (protocol, conn) = match classify(conn).await {
            Ok(classified) => classified,
            Err(e) => {
                debug!("Abandoning connection: {}", e);
                return Ok(());
            }
        };

        debug!("Dispatching {} connection", protocol);
        match protocol {
            Protocol::Socks5 => self.socks.serve_conn(conn).await,
            Protocol::Http => self.http.serve_conn(conn).await,
        }
    }
}
