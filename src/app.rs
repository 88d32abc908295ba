use std::sync::Arc;

use futures::future::try_join_all;
use tracing::info;

use crate::adapters::{
    Dispatcher, HyperConnector, HyperProxyAdapter, HyperTransport, ProxyListener, SessionTracker, Socks5Server,
    TcpDialer,
};
use crate::config::{ListenMode, ProxyConfig};
use crate::domain::{BufferPool, RelayEngine, Result};
use crate::ports::{ConnectionHandler, TrackingPort};

/// Wires the adapters around one relay engine.
///
/// Must be created inside a tokio runtime: the session tracker starts its
/// cleanup task immediately.
pub struct Proxy {
    http: Arc<HyperProxyAdapter>,
    socks: Arc<Socks5Server>,
    tracker: Arc<SessionTracker>,
}

impl Proxy {
    pub fn new(config: &ProxyConfig) -> Self {
        let tracker = Arc::new(SessionTracker::new());
        tracker.start_cleanup();
        let tracker_port: Arc<dyn TrackingPort> = tracker.clone();

        let engine = RelayEngine::new(
            Arc::new(TcpDialer::new(config.dial_timeout())),
            tracker_port,
            BufferPool::new(config.buffer_size, config.pool_capacity),
            config.join_policy,
        );

        let transport = Arc::new(HyperTransport::new(HyperConnector::new(config.dial_timeout())));
        let http = HyperProxyAdapter::new(engine.clone(), transport)
            .with_strip_accept_encoding(config.strip_accept_encoding);

        Self {
            http: Arc::new(http),
            socks: Arc::new(Socks5Server::new(engine)),
            tracker,
        }
    }

    pub fn handler(&self, mode: ListenMode) -> Arc<dyn ConnectionHandler> {
        let handler: Arc<dyn ConnectionHandler> = match mode {
            ListenMode::Mixed => Arc::new(Dispatcher::new(self.socks.clone(), self.http.clone())),
            ListenMode::Http => self.http.clone(),
            ListenMode::Socks5 => self.socks.clone(),
        };
        handler
    }

    pub fn tracker(&self) -> Arc<SessionTracker> {
        self.tracker.clone()
    }

    /// Bind every listener the configuration asks for.
    pub async fn bind(&self, config: &ProxyConfig) -> Result<Vec<ProxyListener>> {
        let mut listeners = Vec::new();
        for endpoint in config.listeners() {
            let listener = ProxyListener::bind(endpoint.mode.name(), &endpoint.addr, self.handler(endpoint.mode)).await?;
            listeners.push(listener);
        }
        Ok(listeners)
    }
}

/// Bind all listeners, then serve until one of them fails.
pub async fn run(config: ProxyConfig) -> Result<()> {
    let proxy = Proxy::new(&config);
    let listeners = proxy.bind(&config).await?;
    info!(
        "Relaying with {:?} join policy and {} byte buffers",
        config.join_policy, config.buffer_size
    );

    try_join_all(listeners.into_iter().map(|listener| listener.serve())).await?;
    Ok(())
}
