use crate::domain::{Connection, Result};
use async_trait::async_trait;

/// Port for anything that takes over a freshly classified client connection
#[async_trait]
pub trait ConnectionHandler: Send + Sync {
    /// Serve every request carried by `conn` until the peer goes away
    async fn serve_conn(&self, conn: Connection) -> Result<()>;
}
