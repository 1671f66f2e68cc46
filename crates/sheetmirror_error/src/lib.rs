//! Error taxonomy for talking to a remote spreadsheet.

use std::error::Error;
use std::time::Duration;

pub type Result<T, E = SheetMirrorError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum SheetMirrorError {
    /// Identity material missing or invalid, or the authorization round-trip
    /// was rejected.
    #[error("authorization failed: {0}")]
    Auth(String),

    /// Caller supplied arguments with the wrong shape.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// Failure surfaced by the remote api for a specific call.
    ///
    /// `status` is `None` when the request never produced an http response
    /// (connection refused, dns, ...).
    #[error("remote error{}: {message}", format_status(.status))]
    Remote {
        status: Option<u16>,
        message: String,
    },

    #[error("remote call did not complete within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("{msg}: {source}")]
    Internal {
        msg: String,
        source: Box<dyn Error + Send + Sync>,
    },
}

impl SheetMirrorError {
    pub fn auth(msg: impl Into<String>) -> Self {
        SheetMirrorError::Auth(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        SheetMirrorError::Validation(msg.into())
    }

    pub fn remote(status: Option<u16>, msg: impl Into<String>) -> Self {
        SheetMirrorError::Remote {
            status,
            message: msg.into(),
        }
    }

    /// Http status of a remote failure, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            SheetMirrorError::Remote { status, .. } => *status,
            _ => None,
        }
    }
}

fn format_status(status: &Option<u16>) -> String {
    match status {
        Some(status) => format!(" (status {status})"),
        None => String::new(),
    }
}

/// Attach a message to an arbitrary error, turning it into an internal error.
pub trait ResultExt<T> {
    fn context(self, msg: &'static str) -> Result<T>;

    fn context_fn<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Error + Send + Sync + 'static,
{
    fn context(self, msg: &'static str) -> Result<T> {
        self.map_err(|e| SheetMirrorError::Internal {
            msg: msg.to_string(),
            source: Box::new(e),
        })
    }

    fn context_fn<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| SheetMirrorError::Internal {
            msg: f(),
            source: Box::new(e),
        })
    }
}
