//! Async client for a single Google spreadsheet.
//!
//! [`SheetMirror`] authorizes lazily through a [`CredentialGate`], talks to
//! the api through a [`SheetsRemote`] and keeps the last fetched spreadsheet
//! as a flat [`SpreadsheetSnapshot`].

pub mod address;
pub mod api;
pub mod config;
pub mod flatten;
pub mod gate;
pub mod mirror;
pub mod options;
pub mod remote;
pub mod rest;
pub mod snapshot;

pub use address::A1Range;
pub use api::SheetsApi;
pub use config::MirrorConfig;
pub use gate::{CredentialGate, CredentialState, CredentialStatus};
pub use mirror::SheetMirror;
pub use options::{MajorDimension, OneOrMany, ValueInputOption, ValueRenderOption, ValueUpdate};
pub use remote::{Credential, SheetsRemote};
pub use sheetmirror_error::{Result, SheetMirrorError};
pub use snapshot::{Cell, SpreadsheetSnapshot, WorksheetMeta};
