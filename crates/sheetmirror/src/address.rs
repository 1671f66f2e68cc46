//! Range addresses in A1 notation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sheetmirror_error::{Result, SheetMirrorError};

/// A validated range address such as `Sheet1!A1:C10`, `'My Sheet'!B:B`,
/// `A1` or a bare sheet/named range `Sheet1`.
///
/// Validation only rejects shapes the remote api could never accept. Whether
/// the referenced sheet exists is still up to the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct A1Range {
    raw: String,
    /// Byte offset of the '!' separating sheet and area, if any.
    bang: Option<usize>,
}

impl A1Range {
    pub fn parse(s: &str) -> Result<Self> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(SheetMirrorError::validation("Range must not be empty"));
        }
        if raw.chars().any(|c| c.is_control()) {
            return Err(SheetMirrorError::validation(format!(
                "Range contains control characters: {raw:?}"
            )));
        }

        let bang = raw.rfind('!');
        match bang {
            Some(idx) => {
                let sheet = &raw[..idx];
                let area = &raw[idx + 1..];
                validate_sheet_name(sheet, raw)?;
                if !is_valid_area(area) {
                    return Err(SheetMirrorError::validation(format!(
                        "Invalid cell area '{area}' in range '{raw}'"
                    )));
                }
            }
            None => {
                // Either a plain area ("A1:B2") or a sheet/named range. Quoted
                // names still need to be balanced.
                if raw.starts_with('\'') {
                    validate_sheet_name(raw, raw)?;
                }
            }
        }

        Ok(A1Range {
            raw: raw.to_string(),
            bang,
        })
    }

    /// Sheet portion of the range, unquoted.
    pub fn sheet(&self) -> Option<&str> {
        let sheet = &self.raw[..self.bang?];
        Some(
            sheet
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
                .unwrap_or(sheet),
        )
    }

    /// Area portion of the range (everything after the '!').
    pub fn area(&self) -> &str {
        match self.bang {
            Some(idx) => &self.raw[idx + 1..],
            None => &self.raw,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn validate_sheet_name(sheet: &str, raw: &str) -> Result<()> {
    if sheet.is_empty() {
        return Err(SheetMirrorError::validation(format!(
            "Missing sheet name in range '{raw}'"
        )));
    }
    if sheet.starts_with('\'') && (sheet.len() < 3 || !sheet.ends_with('\'')) {
        return Err(SheetMirrorError::validation(format!(
            "Unbalanced quotes in sheet name of range '{raw}'"
        )));
    }
    Ok(())
}

fn is_valid_area(area: &str) -> bool {
    let mut parts = area.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(start), None, None) => is_valid_cell_ref(start),
        (Some(start), Some(end), None) => is_valid_cell_ref(start) && is_valid_cell_ref(end),
        _ => false,
    }
}

/// Column letters and/or row digits, each optionally anchored with '$'.
fn is_valid_cell_ref(s: &str) -> bool {
    let s = s.strip_prefix('$').unwrap_or(s);
    let letters = s.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    let rest = &s[letters..];
    let rest = if letters > 0 {
        rest.strip_prefix('$').unwrap_or(rest)
    } else {
        rest
    };
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();

    (letters > 0 || digits > 0) && digits == rest.len()
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for A1Range {
    type Err = SheetMirrorError;

    fn from_str(s: &str) -> Result<Self> {
        A1Range::parse(s)
    }
}

impl TryFrom<&str> for A1Range {
    type Error = SheetMirrorError;

    fn try_from(s: &str) -> Result<Self> {
        A1Range::parse(s)
    }
}

impl Serialize for A1Range {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for A1Range {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        A1Range::parse(&s).map_err(serde::de::Error::custom)
    }
}
