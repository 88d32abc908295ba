#![cfg(test)]
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

use duoproxy::adapters::SessionTracker;
use duoproxy::app::Proxy;
use duoproxy::config::{ListenMode, ProxyConfig};

/// A proxy serving on ephemeral ports for the lifetime of the test.
pub struct TestProxyServer {
    addrs: Vec<(ListenMode, SocketAddr)>,
    tracker: Arc<SessionTracker>,
    _server_handles: Vec<JoinHandle<()>>,
}

impl TestProxyServer {
    /// One mixed HTTP+SOCKS5 listener.
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        Self::start_with(ProxyConfig {
            bind: "127.0.0.1:0".to_string(),
            ..Default::default()
        })
        .await
    }

    /// Separate HTTP-only and SOCKS5-only listeners.
    pub async fn start_split() -> Result<Self, Box<dyn std::error::Error>> {
        Self::start_with(ProxyConfig {
            http: Some("127.0.0.1:0".to_string()),
            socks: Some("127.0.0.1:0".to_string()),
            ..Default::default()
        })
        .await
    }

    pub async fn start_with(config: ProxyConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let proxy = Proxy::new(&config);
        let listeners = proxy.bind(&config).await?;

        let mut addrs = Vec::new();
        let mut handles = Vec::new();
        for (endpoint, listener) in config.listeners().into_iter().zip(listeners) {
            addrs.push((endpoint.mode, listener.local_addr()?));
            handles.push(tokio::spawn(async move {
                listener.serve().await.ok();
            }));
        }

        Ok(Self {
            addrs,
            tracker: proxy.tracker(),
            _server_handles: handles,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addrs[0].1
    }

    pub fn addr_for(&self, mode: ListenMode) -> SocketAddr {
        self.addrs
            .iter()
            .find(|(m, _)| *m == mode)
            .map(|(_, addr)| *addr)
            .expect("no listener for mode")
    }

    pub fn tracker(&self) -> Arc<SessionTracker> {
        self.tracker.clone()
    }
}
