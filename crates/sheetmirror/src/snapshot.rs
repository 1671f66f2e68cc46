use serde::Serialize;

/// Local copy of a remote spreadsheet as of the last fetch.
///
/// `data[i]` holds the populated cells of `worksheets[i]`. When the fetch did
/// not include grid contents, `data` is [`SpreadsheetSnapshot::no_grid_data`]
/// instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpreadsheetSnapshot {
    pub spreadsheet_id: String,
    pub title: String,
    pub worksheets: Vec<WorksheetMeta>,
    pub data: Vec<Vec<Cell>>,
}

impl SpreadsheetSnapshot {
    /// Marker stored in `data` when no grid contents were fetched: a single
    /// empty cell sequence.
    pub fn no_grid_data() -> Vec<Vec<Cell>> {
        vec![Vec::new()]
    }

    pub fn worksheet(&self, title: &str) -> Option<&WorksheetMeta> {
        self.worksheets.iter().find(|w| w.title == title)
    }

    /// Populated cells of the worksheet at `idx`.
    pub fn cells(&self, idx: usize) -> &[Cell] {
        self.data.get(idx).map(Vec::as_slice).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorksheetMeta {
    pub id: i64,
    pub title: String,
    pub row_count: u64,
    pub col_count: u64,
}

/// A cell with a formatted value. Positions are zero based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Cell {
    pub value: String,
    pub row: usize,
    pub col: usize,
}
