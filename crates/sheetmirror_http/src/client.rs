use std::fmt::Debug;

use bytes::Bytes;
use futures::Future;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Request, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sheetmirror_error::{Result, ResultExt, SheetMirrorError};
use tracing::warn;

pub trait HttpClient: Sync + Send + Debug + Clone + 'static {
    type Response: HttpResponse;
    type RequestFuture: Future<Output = Result<Self::Response>> + Send + Unpin;

    /// Do the request.
    fn do_request(&self, request: Request) -> Self::RequestFuture;
}

pub trait HttpResponse: Send {
    type BytesFuture: Future<Output = Result<Bytes>> + Send + Unpin;

    fn status(&self) -> StatusCode;
    fn headers(&self) -> &HeaderMap;

    /// Read the full response body.
    fn bytes(self) -> Self::BytesFuture;
}

/// Helper to set a json body on this request.
///
/// Overwrites the existing body and 'Content-Type' of the request.
pub fn set_json_body<T>(request: &mut Request, body: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(body).context("Failed to serialize request body to json")?;
    *request.body_mut() = Some(body.into());
    request
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Ok(())
}

/// Helper to set a form body on this request.
///
/// Overwrites the existing body and 'Content-Type' of the request.
pub fn set_form_body<T>(request: &mut Request, body: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let body = serde_urlencoded::to_string(body)
        .context("Failed to serialize request body to url encoded form")?;
    *request.body_mut() = Some(body.into());
    request.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );

    Ok(())
}

pub async fn read_text(resp: impl HttpResponse) -> Result<String> {
    let full = resp.bytes().await?;
    Ok(String::from_utf8_lossy(&full).to_string())
}

/// Read the body of an error response for inclusion in an error message.
///
/// A failure to read the body is logged and described in the returned text
/// so the original status is still reported.
pub async fn read_error_text(resp: impl HttpResponse) -> String {
    let status = resp.status();
    match read_text(resp).await {
        Ok(text) => text,
        Err(e) => {
            warn!(%e, %status, "failed to read error response body");
            format!("failed to read response body: {e}")
        }
    }
}

/// Helper to read a json response.
///
/// This will collect the full response before trying to deserialize it. A
/// body that doesn't match the expected shape is reported as a remote error
/// since the remote side is the one not honoring the contract.
pub async fn read_json<T: DeserializeOwned>(resp: impl HttpResponse) -> Result<T> {
    let status = resp.status();
    let full = resp.bytes().await?;
    serde_json::from_slice(&full).map_err(|e| {
        SheetMirrorError::remote(
            Some(status.as_u16()),
            format!("Failed to deserialize response body as json: {e}"),
        )
    })
}

#[cfg(test)]
pub(crate) mod testutil {
    use futures::future::{Ready, ready};

    use super::*;

    /// Canned response for tests.
    #[derive(Debug, Clone)]
    pub struct StaticResponse {
        pub status: StatusCode,
        pub headers: HeaderMap,
        pub body: Bytes,
        /// Fail reading the body with this message.
        pub body_error: Option<String>,
    }

    impl StaticResponse {
        pub fn json(status: StatusCode, body: serde_json::Value) -> Self {
            StaticResponse {
                status,
                headers: HeaderMap::new(),
                body: Bytes::from(body.to_string()),
                body_error: None,
            }
        }

        /// Response whose body can't be read, like a connection reset midway.
        pub fn broken_body(status: StatusCode, error: &str) -> Self {
            StaticResponse {
                status,
                headers: HeaderMap::new(),
                body: Bytes::new(),
                body_error: Some(error.to_string()),
            }
        }
    }

    impl HttpResponse for StaticResponse {
        type BytesFuture = Ready<Result<Bytes>>;

        fn status(&self) -> StatusCode {
            self.status
        }

        fn headers(&self) -> &HeaderMap {
            &self.headers
        }

        fn bytes(self) -> Self::BytesFuture {
            match self.body_error {
                Some(msg) => ready(Err(SheetMirrorError::remote(None, msg))),
                None => ready(Ok(self.body)),
            }
        }
    }
}
