use crate::domain::{ConnectionInfo, Result};
use async_trait::async_trait;
use uuid::Uuid;

/// Port for tracking active sessions
#[async_trait]
pub trait TrackingPort: Send + Sync {
    /// Register a new session
    async fn track_connection(&self, info: ConnectionInfo) -> Result<()>;

    /// Mark a session as closed
    async fn close_connection(&self, id: Uuid) -> Result<()>;

    /// Get all sessions that have not been closed yet
    async fn get_active_connections(&self) -> Result<Vec<ConnectionInfo>>;
}
