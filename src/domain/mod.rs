pub mod connection;
pub mod errors;
pub mod format;
pub mod models;
pub mod pool;
pub mod relay;

pub use connection::{BoxedStream, Connection, DuplexStream, PrefixedStream};
pub use errors::*;
pub use models::*;
pub use pool::BufferPool;
pub use relay::{RelayEngine, CONNECT_ESTABLISHED, CONNECT_FAILED};
