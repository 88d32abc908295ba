use crate::domain::Result;
use async_trait::async_trait;
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper::{Request, Response};

pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Port for replaying a forward-proxy request to its origin
#[async_trait]
pub trait HttpTransportPort: Send + Sync {
    /// Send `request` as is and return the origin's response head with a
    /// body that is streamed as the caller polls it
    async fn round_trip(&self, request: Request<ProxyBody>) -> Result<Response<ProxyBody>>;
}
