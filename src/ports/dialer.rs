use crate::domain::{Connection, Destination, Result};
use async_trait::async_trait;

/// Port for opening outbound connections to tunnel destinations
#[async_trait]
pub trait DialerPort: Send + Sync {
    /// Dial `destination`, returning a connection tagged with the half-close
    /// capability of the transport actually used
    async fn dial(&self, destination: &Destination) -> Result<Connection>;
}
