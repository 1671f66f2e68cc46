//! Reshape the nested grid response into flat per-worksheet cell lists.

use crate::rest::{Sheet, Spreadsheet};
use crate::snapshot::{Cell, SpreadsheetSnapshot, WorksheetMeta};

/// Flatten a spreadsheet response into a snapshot.
///
/// Worksheet metadata is always projected. Cell data is only read when the
/// first worksheet carries a grid data block; otherwise `data` is the
/// no-grid-data marker regardless of what later worksheets contain.
pub fn flatten(resp: &Spreadsheet) -> SpreadsheetSnapshot {
    let worksheets = resp.sheets.iter().map(worksheet_meta).collect();

    // Only worksheet 0 decides whether grid data is present.
    let data = match resp.sheets.first() {
        Some(first) if first.data.is_some() => resp.sheets.iter().map(flatten_sheet).collect(),
        _ => SpreadsheetSnapshot::no_grid_data(),
    };

    SpreadsheetSnapshot {
        spreadsheet_id: resp.spreadsheet_id.clone(),
        title: resp.properties.title.clone(),
        worksheets,
        data,
    }
}

fn worksheet_meta(sheet: &Sheet) -> WorksheetMeta {
    let grid = sheet.properties.grid_properties.unwrap_or_default();
    WorksheetMeta {
        id: sheet.properties.sheet_id,
        title: sheet.properties.title.clone(),
        row_count: grid.row_count,
        col_count: grid.column_count,
    }
}

/// Cells with a formatted value from the first grid block, in row-major
/// order. Row and column indices count every entry, including dropped ones.
fn flatten_sheet(sheet: &Sheet) -> Vec<Cell> {
    let rows = sheet
        .data
        .as_ref()
        .and_then(|blocks| blocks.first())
        .and_then(|block| block.row_data.as_ref());

    let Some(rows) = rows else {
        return Vec::new();
    };

    rows.iter()
        .enumerate()
        .filter_map(|(row, row_data)| row_data.values.as_ref().map(|cells| (row, cells)))
        .flat_map(|(row, cells)| {
            cells.iter().enumerate().filter_map(move |(col, cell)| {
                cell.formatted_value.as_ref().map(|value| Cell {
                    value: value.clone(),
                    row,
                    col,
                })
            })
        })
        .collect()
}
