use std::path::Path;

use calamine::{DataType, Range, Reader, Xlsx, open_workbook};

use crate::timesheet::tools::error::{Result, ToolError};

/// Sheet rows the portal writes above the column labels.
pub const EXPORT_HEADER_OFFSET: usize = 3;

/// Raw contents of the first sheet of an exported workbook: the label row and
/// every row below it, all rendered as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactTable {
    /// File name or other label used in log lines and rejections.
    pub source: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ArtifactTable {
    pub fn new(source: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            source: source.into(),
            headers,
            rows,
        }
    }
}

/// Reads the first worksheet of `path`, taking the labels from sheet row
/// `header_offset` (zero-based).
pub fn read_artifact(path: &Path, header_offset: usize) -> Result<ArtifactTable> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ToolError::InvalidWorkbook("workbook has no sheets".into()))?
        .map_err(ToolError::from)?;

    let source = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let (headers, rows) = split_range(&range, header_offset);
    Ok(ArtifactTable::new(source, headers, rows))
}

/// Splits a used range into labels and data rows.
///
/// calamine ranges start at the first non-empty cell, so the offset is
/// translated from absolute sheet rows to range rows.
fn split_range(range: &Range<DataType>, header_offset: usize) -> (Vec<String>, Vec<Vec<String>>) {
    let start_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    if range.is_empty() || start_row > header_offset {
        return (Vec::new(), Vec::new());
    }

    let mut rows = range.rows().skip(header_offset - start_row);
    let headers = match rows.next() {
        Some(labels) => labels.iter().map(|cell| cell_to_string(Some(cell))).collect(),
        None => Vec::new(),
    };
    let data = rows
        .map(|row| row.iter().map(|cell| cell_to_string(Some(cell))).collect())
        .collect();
    (headers, data)
}

fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.clone(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string(),
        Some(DataType::DateTime(serial)) => clock_text(*serial),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Time-formatted cells are stored as fractions of a day; render them as
/// `H:MM` so they parse as clock durations.
fn clock_text(serial: f64) -> String {
    let minutes = (serial * 24.0 * 60.0).round().max(0.0) as i64;
    format!("{}:{:02}", minutes / 60, minutes % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_text_handles_multi_day_durations() {
        assert_eq!(clock_text(0.0), "0:00");
        assert_eq!(clock_text(2.5 / 24.0), "2:30");
        assert_eq!(clock_text(1.25), "30:00");
    }

    #[test]
    fn numeric_cells_render_without_trailing_zeroes() {
        assert_eq!(cell_to_string(Some(&DataType::Float(8.0))), "8");
        assert_eq!(cell_to_string(Some(&DataType::Float(7.5))), "7.5");
        assert_eq!(cell_to_string(Some(&DataType::Empty)), "");
    }

    #[test]
    fn offset_is_measured_from_the_top_of_the_sheet() {
        let mut range: Range<DataType> = Range::new((1, 0), (5, 1));
        range.set_value((1, 0), DataType::String("Timesheet report".into()));
        range.set_value((3, 0), DataType::String("Employee".into()));
        range.set_value((3, 1), DataType::String("Time".into()));
        range.set_value((4, 0), DataType::String("Ann".into()));
        range.set_value((4, 1), DataType::String("1:00".into()));

        let (headers, rows) = split_range(&range, 3);

        assert_eq!(headers, vec!["Employee", "Time"]);
        assert_eq!(rows[0], vec!["Ann", "1:00"]);
        assert_eq!(rows.len(), 2);
    }
}
