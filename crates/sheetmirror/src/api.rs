//! Sheets v4 REST implementation of [`SheetsRemote`].

use chrono::{DateTime, TimeDelta, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sheetmirror_error::{Result, SheetMirrorError};
use sheetmirror_http::client::{HttpClient, HttpResponse, read_error_text, read_json, set_json_body};
use sheetmirror_http::reqwest::header::{AUTHORIZATION, HeaderValue};
use sheetmirror_http::{Method, Request, Url};
use tracing::debug;

use crate::address::A1Range;
use crate::options::{MajorDimension, ValueInputOption, ValueRenderOption};
use crate::remote::{Credential, SheetsRemote};
use crate::rest::{
    ApiErrorBody,
    BatchUpdateSpreadsheetRequest,
    BatchUpdateSpreadsheetResponse,
    BatchUpdateValuesRequest,
    BatchUpdateValuesResponse,
    Spreadsheet,
    UpdateValuesResponse,
    ValueRange,
};

pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com/";

/// Talks to the Sheets api through some http client.
#[derive(Debug, Clone)]
pub struct SheetsApi<C: HttpClient> {
    client: C,
    /// Root all `v4/spreadsheets` paths are resolved against.
    base: Url,
}

impl<C: HttpClient> SheetsApi<C> {
    pub fn new(client: C) -> Self {
        let base = Url::parse(DEFAULT_API_BASE).expect("default api base to be a valid url");
        SheetsApi { client, base }
    }

    pub fn with_base(client: C, base: &str) -> Result<Self> {
        let base = Url::parse(base).map_err(|e| {
            SheetMirrorError::validation(format!("Invalid api base url '{base}': {e}"))
        })?;
        if base.cannot_be_a_base() {
            return Err(SheetMirrorError::validation(format!(
                "Api base url '{base}' cannot be a base"
            )));
        }
        Ok(SheetsApi { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Build `{base}/v4/spreadsheets/{segments...}`.
    ///
    /// Each segment is percent encoded on its own, so ranges like
    /// `My Sheet!A1` stay a single path segment.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| SheetMirrorError::validation("Api base url cannot be a base"))?;
            path.pop_if_empty().extend(["v4", "spreadsheets"]).extend(segments);
        }
        Ok(url)
    }

    async fn send<T, B>(
        &self,
        method: Method,
        url: Url,
        credential: &Credential,
        body: Option<&B>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let token = credential
            .access_token
            .as_deref()
            .ok_or_else(|| SheetMirrorError::auth("Credential is not authorized"))?;

        debug!(%method, %url, "sheets request");

        let mut request = Request::new(method, url);
        let header = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| SheetMirrorError::auth("Access token is not a valid header value"))?;
        request.headers_mut().insert(AUTHORIZATION, header);
        if let Some(body) = body {
            set_json_body(&mut request, body)?;
        }

        let resp = self.client.do_request(request).await?;
        let status = resp.status();
        if !status.is_success() {
            let text = read_error_text(resp).await;
            return Err(remote_error(status.as_u16(), &text));
        }

        read_json(resp).await
    }
}

/// Turn an error response into a remote error, preferring the message from
/// Google's error envelope.
fn remote_error(status: u16, body: &str) -> SheetMirrorError {
    let message = match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(body) => match body.error.status {
            Some(code) => format!("{code}: {}", body.error.message),
            None => body.error.message,
        },
        Err(_) if body.is_empty() => "no response body".to_string(),
        Err(_) => body.to_string(),
    };
    SheetMirrorError::remote(Some(status), message)
}

/// Absolute expiry of a token valid for `expires_in` seconds from `now`.
///
/// Lifetimes that don't fit a timestamp are treated as unknown.
fn token_expiry(now: DateTime<Utc>, expires_in: Option<u64>) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(expires_in?).ok()?;
    now.checked_add_signed(TimeDelta::try_seconds(secs)?)
}

impl<C: HttpClient> SheetsRemote for SheetsApi<C> {
    fn authorize<'a>(&'a self, credential: &'a Credential) -> BoxFuture<'a, Result<Credential>> {
        async move {
            let token = credential
                .account
                .fetch_access_token(&self.client, &credential.scopes)
                .await?;
            let expires_at = token_expiry(Utc::now(), token.expires_in);
            Ok(credential.with_token(token.access_token, Some(token.token_type), expires_at))
        }
        .boxed()
    }

    fn get_spreadsheet_metadata<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        credential: &'a Credential,
    ) -> BoxFuture<'a, Result<Spreadsheet>> {
        async move {
            let mut url = self.url(&[spreadsheet_id])?;
            url.query_pairs_mut()
                .append_pair("includeGridData", "false");
            self.send(Method::GET, url, credential, None::<&()>).await
        }
        .boxed()
    }

    fn get_spreadsheet_full<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        credential: &'a Credential,
        include_grid_data: bool,
    ) -> BoxFuture<'a, Result<Spreadsheet>> {
        async move {
            let mut url = self.url(&[spreadsheet_id])?;
            url.query_pairs_mut()
                .append_pair("includeGridData", if include_grid_data { "true" } else { "false" });
            self.send(Method::GET, url, credential, None::<&()>).await
        }
        .boxed()
    }

    fn get_values<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        range: &'a A1Range,
        credential: &'a Credential,
        major_dimension: MajorDimension,
        value_render_option: ValueRenderOption,
    ) -> BoxFuture<'a, Result<ValueRange>> {
        async move {
            let mut url = self.url(&[spreadsheet_id, "values", range.as_str()])?;
            url.query_pairs_mut()
                .append_pair("majorDimension", major_dimension.as_str())
                .append_pair("valueRenderOption", value_render_option.as_str());
            self.send(Method::GET, url, credential, None::<&()>).await
        }
        .boxed()
    }

    fn update_values<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        range: &'a A1Range,
        credential: &'a Credential,
        value_input_option: ValueInputOption,
        payload: &'a ValueRange,
    ) -> BoxFuture<'a, Result<UpdateValuesResponse>> {
        async move {
            let mut url = self.url(&[spreadsheet_id, "values", range.as_str()])?;
            url.query_pairs_mut()
                .append_pair("valueInputOption", value_input_option.as_str());
            self.send(Method::PUT, url, credential, Some(payload)).await
        }
        .boxed()
    }

    fn batch_update_values<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        credential: &'a Credential,
        value_input_option: ValueInputOption,
        data: &'a [ValueRange],
    ) -> BoxFuture<'a, Result<BatchUpdateValuesResponse>> {
        async move {
            let url = self.url(&[spreadsheet_id, "values:batchUpdate"])?;
            let body = BatchUpdateValuesRequest {
                value_input_option,
                data: data.to_vec(),
            };
            self.send(Method::POST, url, credential, Some(&body)).await
        }
        .boxed()
    }

    fn batch_update_spreadsheet<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        credential: &'a Credential,
        requests: &'a [serde_json::Value],
    ) -> BoxFuture<'a, Result<BatchUpdateSpreadsheetResponse>> {
        async move {
            let url = self.url(&[&format!("{spreadsheet_id}:batchUpdate")])?;
            let body = BatchUpdateSpreadsheetRequest {
                requests: requests.to_vec(),
            };
            self.send(Method::POST, url, credential, Some(&body)).await
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use bytes::Bytes;
    use futures::future::{Ready, ready};
    use parking_lot::Mutex;
    use serde_json::json;
    use sheetmirror_http::{HeaderMap, StatusCode};
    use sheetmirror_http::google::credentials::ServiceAccount;

    use super::*;

    #[derive(Debug, Clone)]
    struct CannedResponse {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
        body_error: Option<String>,
    }

    impl HttpResponse for CannedResponse {
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

    #[derive(Debug, Clone)]
    struct SentRequest {
        method: Method,
        url: String,
        authorization: Option<String>,
        body: Option<serde_json::Value>,
    }

    /// Records requests and replays queued responses in order.
    #[derive(Debug, Clone, Default)]
    struct RecordingClient {
        sent: Arc<Mutex<Vec<SentRequest>>>,
        responses: Arc<Mutex<VecDeque<CannedResponse>>>,
    }

    impl RecordingClient {
        fn respond(&self, status: StatusCode, body: serde_json::Value) {
            self.responses.lock().push_back(CannedResponse {
                status,
                headers: HeaderMap::new(),
                body: Bytes::from(body.to_string()),
                body_error: None,
            });
        }

        fn respond_unreadable(&self, status: StatusCode, error: &str) {
            self.responses.lock().push_back(CannedResponse {
                status,
                headers: HeaderMap::new(),
                body: Bytes::new(),
                body_error: Some(error.to_string()),
            });
        }

        fn sent(&self) -> Vec<SentRequest> {
            self.sent.lock().clone()
        }
    }

    impl HttpClient for RecordingClient {
        type Response = CannedResponse;
        type RequestFuture = Ready<Result<CannedResponse>>;

        fn do_request(&self, request: Request) -> Self::RequestFuture {
            let body = request
                .body()
                .and_then(|b| b.as_bytes())
                .map(|b| serde_json::from_slice(b).unwrap());
            self.sent.lock().push(SentRequest {
                method: request.method().clone(),
                url: request.url().to_string(),
                authorization: request
                    .headers()
                    .get(AUTHORIZATION)
                    .map(|v| v.to_str().unwrap().to_string()),
                body,
            });
            let resp = self
                .responses
                .lock()
                .pop_front()
                .expect("a queued response");
            ready(Ok(resp))
        }
    }

    fn authorized() -> Credential {
        Credential::new(ServiceAccount::new("a@b.c", "k"), Vec::new()).with_token(
            "ya29.abc",
            None,
            None,
        )
    }

    fn spreadsheet_body() -> serde_json::Value {
        json!({
            "spreadsheetId": "sid",
            "properties": {"title": "T"},
            "sheets": [{"properties": {"sheetId": 0, "title": "Sheet1",
                "gridProperties": {"rowCount": 10, "columnCount": 2}}}],
        })
    }

    #[tokio::test]
    async fn metadata_request() {
        let client = RecordingClient::default();
        client.respond(StatusCode::OK, spreadsheet_body());
        let api = SheetsApi::new(client.clone());

        let sheet = api
            .get_spreadsheet_metadata("sid", &authorized())
            .await
            .unwrap();
        assert_eq!("sid", sheet.spreadsheet_id);

        let sent = client.sent();
        assert_eq!(1, sent.len());
        assert_eq!(Method::GET, sent[0].method);
        assert_eq!(
            "https://sheets.googleapis.com/v4/spreadsheets/sid?includeGridData=false",
            sent[0].url
        );
        assert_eq!(Some("Bearer ya29.abc"), sent[0].authorization.as_deref());
        assert!(sent[0].body.is_none());
    }

    #[tokio::test]
    async fn full_request_with_custom_base() {
        let client = RecordingClient::default();
        client.respond(StatusCode::OK, spreadsheet_body());
        let api = SheetsApi::with_base(client.clone(), "http://localhost:8080/sheets/").unwrap();

        api.get_spreadsheet_full("sid", &authorized(), true)
            .await
            .unwrap();
        assert_eq!(
            "http://localhost:8080/sheets/v4/spreadsheets/sid?includeGridData=true",
            client.sent()[0].url
        );
    }

    #[tokio::test]
    async fn values_request_encodes_range() {
        let client = RecordingClient::default();
        client.respond(
            StatusCode::OK,
            json!({"range": "'My Sheet'!A1:B2", "majorDimension": "COLUMNS", "values": [["a"]]}),
        );
        let api = SheetsApi::new(client.clone());
        let range = A1Range::parse("'My Sheet'!A1:B2").unwrap();

        let vr = api
            .get_values(
                "sid",
                &range,
                &authorized(),
                MajorDimension::Columns,
                ValueRenderOption::Formula,
            )
            .await
            .unwrap();
        assert_eq!(vec![vec![json!("a")]], vr.values);
        assert_eq!(
            "https://sheets.googleapis.com/v4/spreadsheets/sid/values/'My%20Sheet'!A1:B2?majorDimension=COLUMNS&valueRenderOption=FORMULA",
            client.sent()[0].url
        );
    }

    #[tokio::test]
    async fn update_request() {
        let client = RecordingClient::default();
        client.respond(
            StatusCode::OK,
            json!({"spreadsheetId": "sid", "updatedRange": "Sheet1!A1", "updatedCells": 1}),
        );
        let api = SheetsApi::new(client.clone());
        let range = A1Range::parse("Sheet1!A1").unwrap();
        let payload = ValueRange::new(&range, MajorDimension::Rows, vec![vec![json!("x")]]);

        let resp = api
            .update_values("sid", &range, &authorized(), ValueInputOption::UserEntered, &payload)
            .await
            .unwrap();
        assert_eq!(Some(1), resp.updated_cells);

        let sent = client.sent();
        assert_eq!(Method::PUT, sent[0].method);
        assert_eq!(
            "https://sheets.googleapis.com/v4/spreadsheets/sid/values/Sheet1!A1?valueInputOption=USER_ENTERED",
            sent[0].url
        );
        assert_eq!(
            Some(json!({"range": "Sheet1!A1", "majorDimension": "ROWS", "values": [["x"]]})),
            sent[0].body
        );
    }

    #[tokio::test]
    async fn batch_requests() {
        let client = RecordingClient::default();
        client.respond(StatusCode::OK, json!({"spreadsheetId": "sid", "totalUpdatedCells": 3}));
        client.respond(StatusCode::OK, json!({"spreadsheetId": "sid", "replies": [{}]}));
        let api = SheetsApi::new(client.clone());

        let data = vec![ValueRange::new(
            &A1Range::parse("A1").unwrap(),
            MajorDimension::Rows,
            vec![vec![json!(1), json!(2), json!(3)]],
        )];
        let resp = api
            .batch_update_values("sid", &authorized(), ValueInputOption::Raw, &data)
            .await
            .unwrap();
        assert_eq!(Some(3), resp.total_updated_cells);

        let requests = vec![json!({"updateSpreadsheetProperties": {
            "properties": {"title": "Renamed"}, "fields": "title"}})];
        let resp = api
            .batch_update_spreadsheet("sid", &authorized(), &requests)
            .await
            .unwrap();
        assert_eq!(1, resp.replies.len());

        let sent = client.sent();
        assert_eq!(
            "https://sheets.googleapis.com/v4/spreadsheets/sid/values:batchUpdate",
            sent[0].url
        );
        assert_eq!(
            Some(json!({"valueInputOption": "RAW", "data": [
                {"range": "A1", "majorDimension": "ROWS", "values": [[1, 2, 3]]}
            ]})),
            sent[0].body
        );
        assert_eq!(
            "https://sheets.googleapis.com/v4/spreadsheets/sid:batchUpdate",
            sent[1].url
        );
        assert_eq!(Some(json!({"requests": requests})), sent[1].body);
    }

    #[tokio::test]
    async fn error_envelope_becomes_remote_error() {
        let client = RecordingClient::default();
        client.respond(
            StatusCode::NOT_FOUND,
            json!({"error": {"code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND"}}),
        );
        let api = SheetsApi::new(client);

        let err = api
            .get_spreadsheet_metadata("missing", &authorized())
            .await
            .unwrap_err();
        match err {
            SheetMirrorError::Remote { status, message } => {
                assert_eq!(Some(404), status);
                assert_eq!("NOT_FOUND: Requested entity was not found.", message);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unauthorized_credential_is_rejected_locally() {
        let client = RecordingClient::default();
        let api = SheetsApi::new(client.clone());
        let cred = Credential::new(ServiceAccount::new("a@b.c", "k"), Vec::new());

        let err = api.get_spreadsheet_metadata("sid", &cred).await.unwrap_err();
        assert!(matches!(err, SheetMirrorError::Auth(_)));
        assert!(client.sent().is_empty());
    }

    #[test]
    fn remote_error_plain_body() {
        let err = remote_error(502, "Bad Gateway");
        assert_eq!(Some(502), err.status());
        assert!(err.to_string().ends_with("Bad Gateway"));

        let err = remote_error(500, "");
        assert!(err.to_string().ends_with("no response body"));
    }

    #[tokio::test]
    async fn unreadable_error_body_keeps_status() {
        let client = RecordingClient::default();
        client.respond_unreadable(StatusCode::SERVICE_UNAVAILABLE, "connection reset");
        let api = SheetsApi::new(client);

        let err = api
            .get_spreadsheet_metadata("sid", &authorized())
            .await
            .unwrap_err();
        assert_eq!(Some(503), err.status());
        assert!(err.to_string().contains("connection reset"), "{err}");
    }

    #[test]
    fn token_expiry_bounds() {
        let now = Utc::now();
        assert_eq!(
            Some(now + TimeDelta::seconds(3600)),
            token_expiry(now, Some(3600))
        );
        assert_eq!(None, token_expiry(now, None));
        assert_eq!(None, token_expiry(now, Some(u64::MAX)));
        assert_eq!(None, token_expiry(now, Some(i64::MAX as u64)));
        assert_eq!(None, token_expiry(now, Some(9_000_000_000_000_000)));
    }

    #[test]
    fn invalid_base() {
        SheetsApi::with_base(RecordingClient::default(), "not a url").unwrap_err();
        SheetsApi::with_base(RecordingClient::default(), "mailto:someone@example.com").unwrap_err();
    }
}
