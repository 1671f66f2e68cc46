//! Http client backed by reqwest.

use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::header::HeaderMap;
use reqwest::{Request, StatusCode};
use sheetmirror_error::{Result, ResultExt, SheetMirrorError};
use tracing::debug;

use crate::client::{HttpClient, HttpResponse};

#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a client with a per-request timeout.
    pub fn try_new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("sheetmirror/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build http client")?;
        Ok(ReqwestClient { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        ReqwestClient { client }
    }
}

impl HttpClient for ReqwestClient {
    type Response = ReqwestResponse;
    type RequestFuture = BoxFuture<'static, Result<Self::Response>>;

    fn do_request(&self, request: Request) -> Self::RequestFuture {
        debug!(method = %request.method(), url = %request.url(), "http request");
        let client = self.client.clone();
        async move {
            client
                .execute(request)
                .await
                .map(ReqwestResponse)
                .map_err(transport_error)
        }
        .boxed()
    }
}

#[derive(Debug)]
pub struct ReqwestResponse(reqwest::Response);

impl HttpResponse for ReqwestResponse {
    type BytesFuture = BoxFuture<'static, Result<Bytes>>;

    fn status(&self) -> StatusCode {
        self.0.status()
    }

    fn headers(&self) -> &HeaderMap {
        self.0.headers()
    }

    fn bytes(self) -> Self::BytesFuture {
        self.0.bytes().map(|r| r.map_err(transport_error)).boxed()
    }
}

fn transport_error(err: reqwest::Error) -> SheetMirrorError {
    let status = err.status().map(|s| s.as_u16());
    SheetMirrorError::remote(status, format!("http transport error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_with_and_without_timeout() {
        ReqwestClient::try_new(None).unwrap();
        ReqwestClient::try_new(Some(Duration::from_secs(5))).unwrap();
    }
}
