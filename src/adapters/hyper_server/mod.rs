mod adapter;
mod connector;
mod head;
mod http_client;

pub use adapter::HyperProxyAdapter;
pub use connector::HyperConnector;
pub use head::{HeadReader, RequestHead, MAX_HEAD_SIZE};
pub use http_client::HyperTransport;
