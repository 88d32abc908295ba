use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::domain::{Connection, Destination, ProxyError, Result};
use crate::ports::DialerPort;

/// Dials destinations over plain TCP. Every connection it returns supports
/// half-close.
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    connect_timeout: Option<Duration>,
}

impl TcpDialer {
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl DialerPort for TcpDialer {
    async fn dial(&self, destination: &Destination) -> Result<Connection> {
        let connect = TcpStream::connect((destination.host(), destination.port()));
        let stream = match self.connect_timeout {
            Some(limit) => match timeout(limit, connect).await {
                Ok(res) => res,
                Err(_) => Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no answer within {:?}", limit),
                )),
            },
            None => connect.await,
        }
        .map_err(|e| ProxyError::dial(destination, &e))?;

        stream.set_nodelay(true).ok();
        debug!("Dialed {} ({:?})", destination, stream.peer_addr().ok());
        Ok(Connection::from(stream))
    }
}
