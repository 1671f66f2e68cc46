//! Request options and update payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::A1Range;

/// Whether values are laid out by rows or by columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MajorDimension {
    #[default]
    Rows,
    Columns,
}

impl MajorDimension {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rows => "ROWS",
            Self::Columns => "COLUMNS",
        }
    }
}

/// How fetched values are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueRenderOption {
    #[default]
    FormattedValue,
    UnformattedValue,
    Formula,
}

impl ValueRenderOption {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FormattedValue => "FORMATTED_VALUE",
            Self::UnformattedValue => "UNFORMATTED_VALUE",
            Self::Formula => "FORMULA",
        }
    }
}

/// How written values are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueInputOption {
    /// Parsed as if typed into the ui (formulas, dates, numbers).
    #[default]
    UserEntered,
    /// Stored as-is.
    Raw,
}

impl ValueInputOption {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UserEntered => "USER_ENTERED",
            Self::Raw => "RAW",
        }
    }
}

macro_rules! impl_display_as_str {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

impl_display_as_str!(MajorDimension, ValueRenderOption, ValueInputOption);

/// One row of values written starting at `range`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueUpdate {
    pub range: A1Range,
    pub values: Vec<serde_json::Value>,
}

impl ValueUpdate {
    pub fn new<V>(range: A1Range, values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<serde_json::Value>,
    {
        ValueUpdate {
            range,
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Either a single item or a sequence of them.
#[derive(Debug, Clone, PartialEq)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(items: Vec<T>) -> Self {
        OneOrMany::Many(items)
    }
}

impl From<A1Range> for OneOrMany<A1Range> {
    fn from(range: A1Range) -> Self {
        OneOrMany::One(range)
    }
}

impl From<ValueUpdate> for OneOrMany<ValueUpdate> {
    fn from(update: ValueUpdate) -> Self {
        OneOrMany::One(update)
    }
}

impl From<serde_json::Value> for OneOrMany<serde_json::Value> {
    fn from(value: serde_json::Value) -> Self {
        OneOrMany::One(value)
    }
}

impl From<&str> for OneOrMany<serde_json::Value> {
    fn from(value: &str) -> Self {
        OneOrMany::One(serde_json::Value::String(value.to_string()))
    }
}
