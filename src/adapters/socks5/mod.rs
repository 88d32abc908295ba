mod consts;
mod request;
mod server;

pub use request::{reply_code, SocksRequest};
pub use server::Socks5Server;
