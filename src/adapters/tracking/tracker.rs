use crate::domain::format::beautify_duration;
use crate::domain::{ConnectionInfo, Result};
use crate::ports::TrackingPort;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, info};
use uuid::Uuid;

const CLEANUP_INTERVAL: Duration = Duration::from_millis(250);
const CLOSED_RETENTION: Duration = Duration::from_secs(4);

/// In-memory registry of tunnel sessions
pub struct SessionTracker {
    sessions: Arc<RwLock<Vec<ConnectionInfo>>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Start background task evicting sessions closed for a while
    pub fn start_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let sessions = self.sessions.clone();

        tokio::spawn(async move {
            let mut ticker = interval(CLEANUP_INTERVAL);

            loop {
                ticker.tick().await;
                evict_closed(&mut *sessions.write().await, Instant::now());
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn evict_closed(sessions: &mut Vec<ConnectionInfo>, now: Instant) {
    sessions.retain(|session| match session.closed_at {
        Some(closed_at) => now.duration_since(closed_at) < CLOSED_RETENTION,
        None => true,
    });
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackingPort for SessionTracker {
    async fn track_connection(&self, info: ConnectionInfo) -> Result<()> {
        info!("{} {} (via {})", info.method, info.target, info.protocol);

        self.sessions.write().await.push(info);
        Ok(())
    }

    async fn close_connection(&self, id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.write().await;

        if let Some(session) = sessions.iter_mut().find(|s| s.id == id) {
            session.close();
            debug!(
                "{} {} closed after {}",
                session.method,
                session.target,
                beautify_duration(session.opened_at.elapsed())
            );
        }

        Ok(())
    }

    async fn get_active_connections(&self) -> Result<Vec<ConnectionInfo>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.iter().filter(|s| s.closed_at.is_none()).cloned().collect())
    }
}
