pub mod dispatcher;
pub mod hyper_server;
pub mod listener;
pub mod socks5;
pub mod tcp_dialer;
pub mod tracking;

pub use dispatcher::{classify, Dispatcher};
pub use hyper_server::{HyperConnector, HyperProxyAdapter, HyperTransport};
pub use listener::{is_transient, ProxyListener};
pub use socks5::Socks5Server;
pub use tcp_dialer::TcpDialer;
pub use tracking::*;
