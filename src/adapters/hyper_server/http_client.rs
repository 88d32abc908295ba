use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::http::uri::Scheme;
use hyper::{Request, Response};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use super::connector::HyperConnector;
use crate::domain::{ProxyError, Result};
use crate::ports::{HttpTransportPort, ProxyBody};

/// Replays forward-proxy requests directly to their origin.
pub struct HyperTransport {
    client: Client<HyperConnector, ProxyBody>,
}

impl HyperTransport {
    pub fn new(connector: HyperConnector) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .http1_title_case_headers(true)
            .http1_preserve_header_case(true)
            .build(connector);
        Self { client }
    }
}

#[async_trait]
impl HttpTransportPort for HyperTransport {
    async fn round_trip(&self, request: Request<ProxyBody>) -> Result<Response<ProxyBody>> {
        if request.uri().scheme() != Some(&Scheme::HTTP) {
            return Err(ProxyError::TransportFailed(format!(
                "unsupported scheme in {}",
                request.uri()
            )));
        }

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ProxyError::TransportFailed(error_chain(&e)))?;

        Ok(response.map(|body| body.boxed()))
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
