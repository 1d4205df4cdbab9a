use std::path::Path;

use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook};

use crate::timesheet::tools::error::Result;

const HEADER_FILL: u32 = 0x4F81BD;
const BAND_FILL: u32 = 0xDCE6F1;

/// A table that will be materialised as a single Excel sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTable {
    pub sheet_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SheetTable {
    /// Display width of each column: the widest cell plus padding.
    fn column_widths(&self) -> Vec<f64> {
        self.columns
            .iter()
            .enumerate()
            .map(|(col_idx, header)| {
                let widest = self
                    .rows
                    .iter()
                    .filter_map(|row| row.get(col_idx))
                    .map(|cell| cell.chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0);
                (widest + 2) as f64
            })
            .collect()
    }
}

/// Writes `table` as a styled report: highlighted and frozen header row,
/// banded data rows, thin borders, fitted columns and an autofilter.
pub fn write_report(path: &Path, table: &SheetTable) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(&table.sheet_name)?;

    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_FILL))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_border(FormatBorder::Thin);
    let plain_format = Format::new().set_border(FormatBorder::Thin);
    let banded_format = Format::new()
        .set_background_color(Color::RGB(BAND_FILL))
        .set_border(FormatBorder::Thin);

    for (col_idx, header) in table.columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col_idx as u16, header, &header_format)?;
    }

    for (row_idx, row) in table.rows.iter().enumerate() {
        let sheet_row = (row_idx + 1) as u32;
        // Sheet rows 2, 4, ... in one-based numbering.
        let format = if row_idx % 2 == 0 {
            &banded_format
        } else {
            &plain_format
        };
        for (col_idx, cell) in row.iter().enumerate() {
            worksheet.write_string_with_format(sheet_row, col_idx as u16, cell, format)?;
        }
    }

    for (col_idx, width) in table.column_widths().into_iter().enumerate() {
        worksheet.set_column_width(col_idx as u16, width)?;
    }

    worksheet.set_freeze_panes(1, 0)?;

    let col_end = (table.columns.len() as u16).saturating_sub(1);
    let row_end = table.rows.len() as u32;
    worksheet.autofilter(0, 0, row_end, col_end)?;

    workbook.save(path)?;
    Ok(())
}
