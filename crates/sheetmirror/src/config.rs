//! Loading mirror settings from files and the environment.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use sheetmirror_error::{Result, ResultExt, SheetMirrorError};
use sheetmirror_http::google::SPREADSHEETS_SCOPE;
use sheetmirror_http::google::credentials::ServiceAccount;

use crate::api::DEFAULT_API_BASE;

const PREFIX: &str = "SHEETMIRROR";
const SEPARATOR: &str = "__";

/// Configuration for a single mirrored spreadsheet. Items from the config file
/// can be overridden with environment variables prefixed with `SHEETMIRROR__`,
/// e.g. `SHEETMIRROR__SPREADSHEET_ID`. `SHEETMIRROR__SCOPES` takes a comma
/// separated list.
#[derive(Clone, Deserialize)]
pub struct MirrorConfig {
    pub spreadsheet_id: String,
    /// Path to a json service account key file. Takes precedence over the
    /// inline identity fields.
    #[serde(default)]
    pub service_account_path: Option<PathBuf>,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
    /// Overrides the token endpoint of the service account.
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Zero disables the timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_scopes() -> Vec<String> {
    vec![SPREADSHEETS_SCOPE.to_string()]
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl fmt::Debug for MirrorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorConfig")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("service_account_path", &self.service_account_path)
            .field("client_email", &self.client_email)
            .field("private_key", &self.private_key.as_ref().map(|_| "***"))
            .field("token_uri", &self.token_uri)
            .field("scopes", &self.scopes)
            .field("api_base", &self.api_base)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl MirrorConfig {
    /// Config with defaults for everything but the spreadsheet id. Identity
    /// material still needs to be provided.
    pub fn new(spreadsheet_id: impl Into<String>) -> Self {
        MirrorConfig {
            spreadsheet_id: spreadsheet_id.into(),
            service_account_path: None,
            client_email: None,
            private_key: None,
            token_uri: None,
            scopes: default_scopes(),
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    /// Load from an optional toml file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_builder(Self::base(path))
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Base builder reading `path` (if given) followed by all environment
    /// variables prefixed with `SHEETMIRROR__`.
    pub fn base(path: Option<&Path>) -> ConfigBuilder<DefaultState> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        builder.add_source(Self::environment())
    }

    pub(crate) fn environment() -> Environment {
        Environment::with_prefix(PREFIX)
            .separator(SEPARATOR)
            .ignore_empty(true)
            .keep_prefix(false)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("scopes")
    }

    /// Identity material, either read from the key file or from the inline
    /// fields.
    pub fn service_account(&self) -> Result<ServiceAccount> {
        let mut account = match &self.service_account_path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).context_fn(|| {
                    format!("Failed to read service account key '{}'", path.display())
                })?;
                ServiceAccount::try_from_str(&contents)?
            }
            None => match (&self.client_email, &self.private_key) {
                (Some(email), Some(key)) => ServiceAccount::new(email, key),
                _ => {
                    return Err(SheetMirrorError::auth(
                        "No service account configured, set 'service_account_path' or both 'client_email' and 'private_key'",
                    ));
                }
            },
        };

        if let Some(token_uri) = &self.token_uri {
            account.token_uri = token_uri.clone();
        }
        account.validate()?;

        Ok(account)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
