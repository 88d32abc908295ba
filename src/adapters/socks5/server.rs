use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::consts::*;
use super::request::{encode_reply, negotiate, read_request, reply_code, SocksRequest};
use crate::adapters::listener::ProxyListener;
use crate::domain::relay::write_status;
use crate::domain::{Connection, Protocol, ProxyError, RelayEngine, Result};
use crate::ports::ConnectionHandler;

/// No-auth SOCKS5 server supporting the CONNECT command only.
#[derive(Clone)]
pub struct Socks5Server {
    engine: RelayEngine,
}

impl Socks5Server {
    pub fn new(engine: RelayEngine) -> Self {
        Self { engine }
    }

    /// Bind `addr` and serve SOCKS5 only. `network` must be `"tcp"`.
    pub async fn listen_and_serve(self, network: &str, addr: &str) -> Result<()> {
        if network != "tcp" {
            return Err(ProxyError::Socks(format!("unsupported network {}", network)));
        }
        ProxyListener::bind("SOCKS5", addr, Arc::new(self)).await?.serve().await
    }
}

#[async_trait]
impl ConnectionHandler for Socks5Server {
    async fn serve_conn(&self, mut conn: Connection) -> Result<()> {
        negotiate(&mut conn).await?;

        let destination = match read_request(&mut conn).await? {
            SocksRequest::Connect(destination) => destination,
            SocksRequest::Unsupported { command, destination } => {
                debug!("SOCKS5 command {:#04x} to {} refused", command, destination);
                write_status(&mut conn, &encode_reply(SOCKS5_REPLY_COMMAND_NOT_SUPPORTED)).await;
                return Err(ProxyError::Socks(format!("unsupported command {:#04x}", command)));
            }
            SocksRequest::UnknownAddressType(addr_type) => {
                write_status(&mut conn, &encode_reply(SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED)).await;
                return Err(ProxyError::Socks(format!("unsupported address type {:#04x}", addr_type)));
            }
        };

        let upstream = match self.engine.dial(&destination).await {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!("Dial {}: {}", destination, e);
                write_status(&mut conn, &encode_reply(reply_code(&e))).await;
                return Err(e);
            }
        };

        conn.write_all(&encode_reply(SOCKS5_REPLY_SUCCEEDED)).await?;
        conn.flush().await?;

        self.engine
            .relay(conn, upstream, &destination, "SOCKS5", Protocol::Socks5)
            .await;
        Ok(())
    }
}
