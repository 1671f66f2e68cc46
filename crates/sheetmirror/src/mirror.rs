//! Cached view of one remote spreadsheet.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::Value;
use sheetmirror_error::{Result, SheetMirrorError};
use sheetmirror_http::google::credentials::ServiceAccount;
use sheetmirror_http::reqwest_client::ReqwestClient;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::address::A1Range;
use crate::api::SheetsApi;
use crate::config::MirrorConfig;
use crate::flatten::flatten;
use crate::gate::{CredentialGate, CredentialStatus};
use crate::options::{MajorDimension, OneOrMany, ValueInputOption, ValueRenderOption, ValueUpdate};
use crate::remote::{Credential, SheetsRemote};
use crate::rest::{
    BatchUpdateSpreadsheetResponse,
    BatchUpdateValuesResponse,
    Spreadsheet,
    UpdateValuesResponse,
    ValueRange,
};
use crate::snapshot::SpreadsheetSnapshot;

/// Result of the last successful fetch.
#[derive(Debug)]
struct Cached {
    snapshot: SpreadsheetSnapshot,
    raw: Spreadsheet,
}

/// Client for a single spreadsheet.
///
/// Every operation makes sure the credential is authorized first. Fetches
/// replace the cached snapshot wholesale, updates never touch it.
#[derive(Debug)]
pub struct SheetMirror<R: SheetsRemote> {
    spreadsheet_id: String,
    remote: R,
    gate: CredentialGate,
    /// Held from the fetch request until the snapshot is replaced, serializing
    /// fetches.
    fetch_lock: Mutex<()>,
    /// Only ever locked briefly, never across an await.
    cache: RwLock<Option<Cached>>,
    timeout: Option<Duration>,
}

impl SheetMirror<SheetsApi<ReqwestClient>> {
    /// Mirror talking to the api over http as described by `conf`.
    pub fn from_config(conf: &MirrorConfig) -> Result<Self> {
        let account = conf.service_account()?;
        let client = ReqwestClient::try_new(conf.request_timeout())?;
        let api = SheetsApi::with_base(client, &conf.api_base)?;

        let mirror = SheetMirror::new(&conf.spreadsheet_id, account, conf.scopes.clone(), api)?;
        Ok(mirror.with_timeout(conf.request_timeout()))
    }
}

impl<R: SheetsRemote> SheetMirror<R> {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        account: ServiceAccount,
        scopes: Vec<String>,
        remote: R,
    ) -> Result<Self> {
        let spreadsheet_id = spreadsheet_id.into();
        if spreadsheet_id.trim().is_empty() {
            return Err(SheetMirrorError::validation("Spreadsheet id cannot be empty"));
        }

        Ok(SheetMirror {
            spreadsheet_id,
            remote,
            gate: CredentialGate::new(account, scopes),
            fetch_lock: Mutex::new(()),
            cache: RwLock::new(None),
            timeout: None,
        })
    }

    /// Bound every remote call, authorization included. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn gate(&self) -> &CredentialGate {
        &self.gate
    }

    pub async fn credential_status(&self) -> CredentialStatus {
        self.gate.status().await
    }

    /// Snapshot from the last successful fetch, if any. Doesn't wait for
    /// in-flight fetches.
    pub fn snapshot(&self) -> Option<SpreadsheetSnapshot> {
        self.cache.read().as_ref().map(|c| c.snapshot.clone())
    }

    /// Unflattened response of the last successful fetch, if any.
    pub fn last_response(&self) -> Option<Spreadsheet> {
        self.cache.read().as_ref().map(|c| c.raw.clone())
    }

    pub async fn ensure_authenticated(&self) -> Result<Credential> {
        self.bounded(self.gate.ensure_authenticated(&self.remote))
            .await
    }

    /// Fetch properties and worksheet dimensions, no cell contents.
    pub async fn fetch_metadata(&self) -> Result<SpreadsheetSnapshot> {
        let credential = self.ensure_authenticated().await?;

        let _fetch = self.fetch_lock.lock().await;
        debug!(spreadsheet_id = %self.spreadsheet_id, "fetching metadata");
        let resp = self
            .bounded(
                self.remote
                    .get_spreadsheet_metadata(&self.spreadsheet_id, &credential),
            )
            .await?;

        Ok(self.replace_cached(resp))
    }

    /// Fetch the full spreadsheet, cell contents included when
    /// `include_grid_data` is set.
    pub async fn fetch_all(&self, include_grid_data: bool) -> Result<SpreadsheetSnapshot> {
        let credential = self.ensure_authenticated().await?;

        let _fetch = self.fetch_lock.lock().await;
        debug!(spreadsheet_id = %self.spreadsheet_id, include_grid_data, "fetching spreadsheet");
        let resp = self
            .bounded(self.remote.get_spreadsheet_full(
                &self.spreadsheet_id,
                &credential,
                include_grid_data,
            ))
            .await?;

        Ok(self.replace_cached(resp))
    }

    /// Fetch the raw values of one range. Leaves the snapshot alone.
    pub async fn fetch_values(
        &self,
        range: &A1Range,
        major_dimension: MajorDimension,
        value_render_option: ValueRenderOption,
    ) -> Result<ValueRange> {
        let credential = self.ensure_authenticated().await?;

        debug!(spreadsheet_id = %self.spreadsheet_id, %range, %major_dimension, %value_render_option, "fetching values");
        self.bounded(self.remote.get_values(
            &self.spreadsheet_id,
            range,
            &credential,
            major_dimension,
            value_render_option,
        ))
        .await
    }

    /// Write each value into the matching range, one request per pair.
    ///
    /// Requests run concurrently and resolve independently, the returned
    /// outcomes are in input order. Errors without issuing anything if the
    /// number of ranges and values differ.
    pub async fn update_values(
        &self,
        ranges: impl Into<OneOrMany<A1Range>>,
        values: impl Into<OneOrMany<Value>>,
    ) -> Result<Vec<Result<UpdateValuesResponse>>> {
        let ranges = ranges.into();
        let values = values.into();
        if ranges.len() != values.len() {
            return Err(SheetMirrorError::validation(format!(
                "Got {} ranges but {} values",
                ranges.len(),
                values.len()
            )));
        }

        let credential = self.ensure_authenticated().await?;

        let payloads: Vec<_> = ranges
            .into_vec()
            .into_iter()
            .zip(values.into_vec())
            .map(|(range, value)| {
                let payload = ValueRange::new(&range, MajorDimension::Rows, vec![vec![value]]);
                (range, payload)
            })
            .collect();

        let credential = &credential;
        let updates = payloads.iter().map(|(range, payload)| async move {
            debug!(spreadsheet_id = %self.spreadsheet_id, %range, "updating values");
            let res = self
                .bounded(self.remote.update_values(
                    &self.spreadsheet_id,
                    range,
                    credential,
                    ValueInputOption::UserEntered,
                    payload,
                ))
                .await;
            if let Err(e) = &res {
                warn!(%e, spreadsheet_id = %self.spreadsheet_id, %range, "update failed");
            }
            res
        });

        Ok(join_all(updates).await)
    }

    /// Apply all updates in a single request. The batch succeeds or fails as
    /// a whole.
    pub async fn batch_update_values(
        &self,
        updates: impl Into<OneOrMany<ValueUpdate>>,
        major_dimension: MajorDimension,
        value_input_option: ValueInputOption,
    ) -> Result<BatchUpdateValuesResponse> {
        let data: Vec<_> = updates
            .into()
            .into_vec()
            .into_iter()
            .map(|update| ValueRange::new(&update.range, major_dimension, vec![update.values]))
            .collect();

        let credential = self.ensure_authenticated().await?;

        debug!(spreadsheet_id = %self.spreadsheet_id, updates = data.len(), %value_input_option, "batch updating values");
        self.bounded(self.remote.batch_update_values(
            &self.spreadsheet_id,
            &credential,
            value_input_option,
            &data,
        ))
        .await
    }

    /// Apply structural changes (renames, locale, ...) in a single request.
    pub async fn update_metadata(
        &self,
        requests: Vec<Value>,
    ) -> Result<BatchUpdateSpreadsheetResponse> {
        let credential = self.ensure_authenticated().await?;

        debug!(spreadsheet_id = %self.spreadsheet_id, requests = requests.len(), "updating metadata");
        self.bounded(self.remote.batch_update_spreadsheet(
            &self.spreadsheet_id,
            &credential,
            &requests,
        ))
        .await
    }

    fn replace_cached(&self, raw: Spreadsheet) -> SpreadsheetSnapshot {
        let snapshot = flatten(&raw);
        debug!(spreadsheet_id = %snapshot.spreadsheet_id, worksheets = snapshot.worksheets.len(), "replacing snapshot");
        *self.cache.write() = Some(Cached {
            snapshot: snapshot.clone(),
            raw,
        });
        snapshot
    }

    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, fut)
                .await
                .map_err(|_| SheetMirrorError::Timeout(timeout))?,
            None => fut.await,
        }
    }
}
