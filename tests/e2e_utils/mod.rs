#![cfg(test)]
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod origin;
pub mod proxy_server;

pub use origin::{EchoOrigin, HttpOrigin};
pub use proxy_server::TestProxyServer;
