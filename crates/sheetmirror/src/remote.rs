//! The remote spreadsheet api as seen by the mirror.

use std::fmt::{self, Debug};

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::BoxFuture;
use sheetmirror_error::Result;
use sheetmirror_http::google::credentials::ServiceAccount;

use crate::address::A1Range;
use crate::options::{MajorDimension, ValueInputOption, ValueRenderOption};
use crate::rest::{
    BatchUpdateSpreadsheetResponse,
    BatchUpdateValuesResponse,
    Spreadsheet,
    UpdateValuesResponse,
    ValueRange,
};

/// Authorization handle for one client.
///
/// Holds the identity material it was built from and, once authorized, the
/// access token. Never written to disk.
#[derive(Clone)]
pub struct Credential {
    pub account: ServiceAccount,
    pub scopes: Vec<String>,
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Build an unauthorized handle from identity material.
    pub fn new(account: ServiceAccount, scopes: Vec<String>) -> Self {
        Credential {
            account,
            scopes,
            access_token: None,
            token_type: None,
            expires_at: None,
        }
    }

    pub fn client_email(&self) -> &str {
        &self.account.client_email
    }

    pub fn private_key(&self) -> &str {
        &self.account.private_key
    }

    /// Whether this handle carries an access token.
    pub fn is_authorized(&self) -> bool {
        self.access_token.is_some()
    }

    /// Whether the token is past its expiry, or will be within `skew` of
    /// `now`. Tokens without a known expiry never expire.
    pub fn is_expired(&self, now: DateTime<Utc>, skew: TimeDelta) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - skew <= now,
            None => false,
        }
    }

    /// Same identity and scopes without the token.
    pub fn without_token(&self) -> Self {
        Credential::new(self.account.clone(), self.scopes.clone())
    }

    /// Copy of this handle carrying the given token.
    pub fn with_token(
        &self,
        access_token: impl Into<String>,
        token_type: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Credential {
            account: self.account.clone(),
            scopes: self.scopes.clone(),
            access_token: Some(access_token.into()),
            token_type,
            expires_at,
        }
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("account", &self.account)
            .field("scopes", &self.scopes)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Remote spreadsheet api.
///
/// Every method is a single round-trip. Implementations must not retry.
pub trait SheetsRemote: Sync + Send + Debug {
    /// Exchange identity material for an authorized credential.
    fn authorize<'a>(&'a self, credential: &'a Credential) -> BoxFuture<'a, Result<Credential>>;

    /// Spreadsheet properties and worksheet dimensions, no cell contents.
    fn get_spreadsheet_metadata<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        credential: &'a Credential,
    ) -> BoxFuture<'a, Result<Spreadsheet>>;

    fn get_spreadsheet_full<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        credential: &'a Credential,
        include_grid_data: bool,
    ) -> BoxFuture<'a, Result<Spreadsheet>>;

    fn get_values<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        range: &'a A1Range,
        credential: &'a Credential,
        major_dimension: MajorDimension,
        value_render_option: ValueRenderOption,
    ) -> BoxFuture<'a, Result<ValueRange>>;

    fn update_values<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        range: &'a A1Range,
        credential: &'a Credential,
        value_input_option: ValueInputOption,
        payload: &'a ValueRange,
    ) -> BoxFuture<'a, Result<UpdateValuesResponse>>;

    fn batch_update_values<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        credential: &'a Credential,
        value_input_option: ValueInputOption,
        data: &'a [ValueRange],
    ) -> BoxFuture<'a, Result<BatchUpdateValuesResponse>>;

    fn batch_update_spreadsheet<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        credential: &'a Credential,
        requests: &'a [serde_json::Value],
    ) -> BoxFuture<'a, Result<BatchUpdateSpreadsheetResponse>>;
}
