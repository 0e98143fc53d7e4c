use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::config::CellCoords;
use crate::sheet::CellValue;

pub struct ExportReport {
    pub cells: usize,
    pub last_row: u32,
    pub last_col: u32,
}

/// Write the sheet's cells to `path` as a single-worksheet workbook, each cell
/// at the same row/column it occupies on the sheet.
pub fn export_cells(cells: &[(CellCoords, CellValue)], sheet_name: &str, path: &Path) -> Result<ExportReport> {
    let mut workbook = Workbook::new();
    let mut report = ExportReport {
        cells: 0,
        last_row: 0,
        last_col: 0,
    };
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(sheet_name)?;
        for (at, value) in cells {
            if write_cell(sheet, *at, value)? {
                report.cells += 1;
                report.last_row = report.last_row.max(at.row);
                report.last_col = report.last_col.max(at.col);
            }
        }
    }
    workbook
        .save(path)
        .with_context(|| format!("save workbook {}", path.display()))?;
    Ok(report)
}

fn write_cell(worksheet: &mut Worksheet, at: CellCoords, value: &CellValue) -> Result<bool> {
    // Sheet coordinates are 1-based, the workbook's are 0-based.
    let (Some(row), Some(col)) = (at.row.checked_sub(1), at.col.checked_sub(1)) else {
        tracing::warn!("skipping cell outside the sheet at row {} col {}", at.row, at.col);
        return Ok(false);
    };
    let col = u16::try_from(col).with_context(|| format!("column {} too wide", at.col))?;
    match value {
        CellValue::Empty => return Ok(false),
        CellValue::Text(s) => {
            worksheet
                .write_string(row, col, s)
                .with_context(|| format!("write cell {}", at.a1()))?;
        }
        CellValue::Int(v) => {
            worksheet
                .write_number(row, col, *v as f64)
                .with_context(|| format!("write cell {}", at.a1()))?;
        }
    }
    Ok(true)
}
