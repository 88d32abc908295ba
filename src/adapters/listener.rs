use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::domain::{Connection, ProxyError, Result};
use crate::ports::ConnectionHandler;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Accept loop handing every connection to one handler on its own task.
pub struct ProxyListener {
    name: &'static str,
    listener: TcpListener,
    handler: Arc<dyn ConnectionHandler>,
}

impl ProxyListener {
    pub async fn bind(name: &'static str, addr: &str, handler: Arc<dyn ConnectionHandler>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ProxyError::Bind(format!("{}: {}", addr, e)))?;
        Ok(Self::from_listener(name, listener, handler))
    }

    pub fn from_listener(name: &'static str, listener: TcpListener, handler: Arc<dyn ConnectionHandler>) -> Self {
        Self {
            name,
            listener,
            handler,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run until a non-transient accept error occurs.
    pub async fn serve(self) -> Result<()> {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Listening for {} on {}", self.name, addr);
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => self.spawn_handler(stream, peer),
                Err(e) if is_transient(&e) => {
                    warn!("{} accept failed, retrying: {}", self.name, e);
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
                Err(e) => {
                    error!("{} accept failed: {}", self.name, e);
                    return Err(ProxyError::Accept(e.to_string()));
                }
            }
        }
    }

    fn spawn_handler(&self, stream: TcpStream, peer: SocketAddr) {
        stream.set_nodelay(true).ok();
        let handler = self.handler.clone();
        tokio::spawn(async move {
            if let Err(e) = handler.serve_conn(Connection::from(stream)).await {
                debug!("{}: {}", peer, e);
            }
        });
    }
}

/// Whether an accept error is worth retrying instead of ending the loop.
pub fn is_transient(err: &io::Error) -> bool {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut => true,
        // EMFILE, ENFILE, ENOBUFS, ENOMEM
        _ => matches!(err.raw_os_error(), Some(24) | Some(23) | Some(105) | Some(12)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct Echo;

    #[async_trait]
    impl ConnectionHandler for Echo {
        async fn serve_conn(&self, mut conn: Connection) -> Result<()> {
            let mut buf = [0u8; 64];
            let n = conn.read(&mut buf).await?;
            conn.write_all(&buf[..n]).await?;
            Ok(())
        }
    }

    #[test]
    fn test_transient_accept_errors() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionAborted)));
        assert!(is_transient(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(is_transient(&io::Error::from_raw_os_error(24)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::InvalidInput)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let result = ProxyListener::bind("test", &addr, Arc::new(Echo)).await;
        assert!(matches!(result, Err(ProxyError::Bind(_))));
    }

    #[tokio::test]
    async fn test_each_connection_is_served() {
        let listener = ProxyListener::bind("test", "127.0.0.1:0", Arc::new(Echo)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(listener.serve());

        for msg in [&b"one"[..], &b"two"[..]] {
            let mut client = TcpStream::connect(addr).await.unwrap();
            client.write_all(msg).await.unwrap();
            let mut buf = vec![0u8; msg.len()];
            client.read_exact(&mut buf).await.unwrap();
            assert_eq!(buf, msg);
        }
    }
}
