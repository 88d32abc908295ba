pub mod dialer;
pub mod handler;
pub mod tracking;
pub mod transport;

pub use dialer::DialerPort;
pub use handler::ConnectionHandler;
pub use tracking::TrackingPort;
pub use transport::{HttpTransportPort, ProxyBody};
