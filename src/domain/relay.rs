use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::{self, Either};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::pool::{BufferPool, PooledBuffer};
use super::{Connection, ConnectionInfo, Destination, JoinPolicy, Protocol, Result, SessionReport};
use crate::ports::{DialerPort, TrackingPort};

/// Sent once the destination of a CONNECT request has been dialed.
pub const CONNECT_ESTABLISHED: &[u8] = b"HTTP/1.1 200 OK\r\n\r\n";

/// Sent when a CONNECT destination cannot be reached.
pub const CONNECT_FAILED: &[u8] = b"HTTP/1.1 500 proxy error\r\n\r\n";

/// Dials tunnel destinations and pumps bytes between the two ends.
///
/// The engine owns its buffer pool. Clones share the pool, the dialer and the
/// tracker.
#[derive(Clone)]
pub struct RelayEngine {
    dialer: Arc<dyn DialerPort>,
    tracker: Arc<dyn TrackingPort>,
    pool: BufferPool,
    policy: JoinPolicy,
}

impl RelayEngine {
    pub fn new(
        dialer: Arc<dyn DialerPort>,
        tracker: Arc<dyn TrackingPort>,
        pool: BufferPool,
        policy: JoinPolicy,
    ) -> Self {
        Self {
            dialer,
            tracker,
            pool,
            policy,
        }
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub async fn dial(&self, destination: &Destination) -> Result<Connection> {
        self.dialer.dial(destination).await
    }

    /// Serve a CONNECT request on a connection that has already been detached
    /// from its HTTP reader.
    ///
    /// The status line is written on the raw connection: `500` if the dial
    /// fails, otherwise `200` followed by the relayed bytes.
    pub async fn connect(&self, mut client: Connection, destination: &Destination) -> Result<SessionReport> {
        let upstream = match self.dial(destination).await {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!("Dial {}: {}", destination, e);
                write_status(&mut client, CONNECT_FAILED).await;
                return Err(e);
            }
        };

        client.write_all(CONNECT_ESTABLISHED).await?;
        client.flush().await?;

        Ok(self.relay(client, upstream, destination, "CONNECT", Protocol::Http).await)
    }

    /// Exchange bytes between `client` and `upstream` until the join policy
    /// declares the session over.
    pub async fn relay(
        &self,
        client: Connection,
        upstream: Connection,
        destination: &Destination,
        method: &str,
        protocol: Protocol,
    ) -> SessionReport {
        let info = ConnectionInfo::new(method.to_string(), destination.to_string(), protocol);
        let session = TunnelSession::new(info.id, destination.clone());
        if let Err(e) = self.tracker.track_connection(info).await {
            warn!("Tracking {}: {}", destination, e);
        }

        let report = session.run(client, upstream, &self.pool, self.policy).await;
        info!("{}", report);

        self.tracker.close_connection(session.id).await.ok();
        report
    }
}

/// Best-effort status line on a raw connection that carries no HTTP state.
pub async fn write_status(client: &mut Connection, status: &[u8]) {
    if let Err(e) = client.write_all(status).await {
        debug!("Writing status line: {}", e);
        return;
    }
    client.flush().await.ok();
}

/// A client connection paired with a dialed destination.
pub struct TunnelSession {
    pub id: Uuid,
    pub destination: Destination,
    pub started_at: Instant,
    client_to_destination: Arc<AtomicU64>,
    destination_to_client: Arc<AtomicU64>,
}

impl TunnelSession {
    pub fn new(id: Uuid, destination: Destination) -> Self {
        Self {
            id,
            destination,
            started_at: Instant::now(),
            client_to_destination: Arc::new(AtomicU64::new(0)),
            destination_to_client: Arc::new(AtomicU64::new(0)),
        }
    }

    async fn run(&self, client: Connection, upstream: Connection, pool: &BufferPool, policy: JoinPolicy) -> SessionReport {
        let half_close = policy == JoinPolicy::Symmetric;
        let shut_upstream = half_close && upstream.is_half_closeable();
        let shut_client = half_close && client.is_half_closeable();

        let (client_read, client_write) = tokio::io::split(client);
        let (upstream_read, upstream_write) = tokio::io::split(upstream);

        let outbound = spawn_copy(
            format!("client -> {}", self.destination),
            client_read,
            upstream_write,
            shut_upstream,
            pool.get(),
            self.client_to_destination.clone(),
        );
        let inbound = spawn_copy(
            format!("{} -> client", self.destination),
            upstream_read,
            client_write,
            shut_client,
            pool.get(),
            self.destination_to_client.clone(),
        );

        match policy {
            JoinPolicy::Symmetric => {
                let (outbound, inbound) = tokio::join!(outbound, inbound);
                log_join(outbound);
                log_join(inbound);
            }
            JoinPolicy::Asymmetric => match future::select(outbound, inbound).await {
                Either::Left((first, rest)) | Either::Right((first, rest)) => {
                    log_join(first);
                    rest.abort();
                    log_join(rest.await);
                }
            },
        }

        self.report()
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            destination: self.destination.clone(),
            duration: self.started_at.elapsed(),
            client_to_destination: self.client_to_destination.load(Ordering::Acquire),
            destination_to_client: self.destination_to_client.load(Ordering::Acquire),
        }
    }
}

fn log_join(res: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        if !e.is_cancelled() {
            warn!("Relay task failed: {}", e);
        }
    }
}

fn spawn_copy<R, W>(
    label: String,
    mut reader: R,
    mut writer: W,
    half_close: bool,
    mut buf: PooledBuffer,
    counter: Arc<AtomicU64>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let result = copy_counted(&mut reader, &mut writer, &mut buf, &counter).await;
        drop(buf);
        // No in-band error channel exists once the tunnel carries raw bytes.
        if let Err(e) = &result {
            debug!("Copy {}: {}", label, e);
        }
        if half_close {
            if let Err(e) = writer.shutdown().await {
                debug!("Half-close {}: {}", label, e);
            }
        }
        debug!("{} finished after {} bytes", label, counter.load(Ordering::Acquire));
    })
}

async fn copy_counted<R, W>(reader: &mut R, writer: &mut W, buf: &mut [u8], counter: &AtomicU64) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let n = reader.read(buf).await?;
        if n == 0 {
            return writer.flush().await;
        }
        writer.write_all(&buf[..n]).await?;
        counter.fetch_add(n as u64, Ordering::AcqRel);
    }
}
