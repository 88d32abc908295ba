//! Port doubles shared by adapter unit tests.

use async_trait::async_trait;
use std::io;
use std::sync::Mutex;
use tokio::io::DuplexStream;
use uuid::Uuid;

use crate::domain::{Connection, ConnectionInfo, Destination, ProxyError, Result};
use crate::ports::{DialerPort, TrackingPort};

/// Hands out one in-memory upstream, then fails every later dial with `failure`.
pub struct MockDialer {
    upstream: Mutex<Option<DuplexStream>>,
    failure: io::ErrorKind,
    dialed: Mutex<Vec<String>>,
}

impl MockDialer {
    pub fn new(upstream: Option<DuplexStream>) -> Self {
        Self::failing_with(upstream, io::ErrorKind::ConnectionRefused)
    }

    pub fn failing_with(upstream: Option<DuplexStream>, failure: io::ErrorKind) -> Self {
        Self {
            upstream: Mutex::new(upstream),
            failure,
            dialed: Mutex::new(vec![]),
        }
    }

    pub fn dialed(&self) -> Vec<String> {
        self.dialed.lock().unwrap().clone()
    }
}

#[async_trait]
impl DialerPort for MockDialer {
    async fn dial(&self, destination: &Destination) -> Result<Connection> {
        self.dialed.lock().unwrap().push(destination.to_string());
        match self.upstream.lock().unwrap().take() {
            Some(stream) => Ok(Connection::half_closeable(stream)),
            None => Err(ProxyError::dial(destination, &io::Error::from(self.failure))),
        }
    }
}

pub struct NullTracker;

#[async_trait]
impl TrackingPort for NullTracker {
    async fn track_connection(&self, _info: ConnectionInfo) -> Result<()> {
        Ok(())
    }

    async fn close_connection(&self, _id: Uuid) -> Result<()> {
        Ok(())
    }

    async fn get_active_connections(&self) -> Result<Vec<ConnectionInfo>> {
        Ok(vec![])
    }
}

/// Records the ids of every tracked and closed session.
#[derive(Default)]
pub struct MockTracker {
    pub tracked: Mutex<Vec<Uuid>>,
    pub closed: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl TrackingPort for MockTracker {
    async fn track_connection(&self, info: ConnectionInfo) -> Result<()> {
        self.tracked.lock().unwrap().push(info.id);
        Ok(())
    }

    async fn close_connection(&self, id: Uuid) -> Result<()> {
        self.closed.lock().unwrap().push(id);
        Ok(())
    }

    async fn get_active_connections(&self) -> Result<Vec<ConnectionInfo>> {
        Ok(vec![])
    }
}
