use calamine::{Data, Reader, open_workbook_auto};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::CrmError;
use crate::record::{Record, Value, field_names};

pub const EXPORT_SHEET: &str = "Sheet1";

fn ensure_exists(path: &Path) -> Result<(), CrmError> {
    if path.exists() {
        Ok(())
    } else {
        Err(CrmError::FileNotFound(path.to_path_buf()))
    }
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::Float(f) => Value::Number(*f),
        Data::Int(i) => Value::Number(*i as f64),
        Data::Bool(b) => Value::Bool(*b),
        // Dates stay serial numbers, callers decide how to read them.
        Data::DateTime(dt) => Value::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::Text(s.clone()),
    }
}

pub fn sheet_names(path: &Path) -> Result<Vec<String>, CrmError> {
    ensure_exists(path)?;
    let workbook = open_workbook_auto(path)?;
    Ok(workbook.sheet_names())
}

/// Header names with blanks named `__EMPTY` and repeats suffixed `_1`, `_2`, ...
fn unique_headers(header_row: &[Data]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut headers: Vec<String> = Vec::with_capacity(header_row.len());
    for cell in header_row {
        let base = match cell_to_value(cell).to_text() {
            h if h.is_empty() => "__EMPTY".to_string(),
            h => h,
        };
        let mut name = base.clone();
        while let Some(count) = seen.get_mut(&name) {
            *count += 1;
            name = format!("{base}_{count}");
        }
        seen.insert(name.clone(), 0);
        headers.push(name);
    }
    headers
}

/// Read `sheet` into records, one per non-blank row below the header row.
pub fn load_sheet(path: &Path, sheet: &str) -> Result<Vec<Record>, CrmError> {
    ensure_exists(path)?;
    let mut workbook = open_workbook_auto(path)?;
    let names = workbook.sheet_names();
    if !names.iter().any(|n| n == sheet) {
        return Err(CrmError::SheetNotFound {
            path: path.to_path_buf(),
            sheet: sheet.to_string(),
            available: names,
        });
    }

    let range = workbook.worksheet_range(sheet)?;
    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Vec::new());
    };

    let headers = unique_headers(header_row);

    let records: Vec<Record> = rows
        .filter_map(|row| {
            let mut record = Record::new();
            for (header, cell) in headers.iter().zip(row.iter()) {
                let value = cell_to_value(cell);
                if !value.is_null() {
                    record.insert(header.clone(), value);
                }
            }
            (!record.is_empty()).then_some(record)
        })
        .collect();

    debug!("Loaded {} records from {:?}[{}]", records.len(), path, sheet);
    Ok(records)
}

fn fill_sheet(
    book: &mut umya_spreadsheet::Spreadsheet,
    sheet: &str,
    records: &[Record],
) -> Result<(), CrmError> {
    let worksheet = book
        .new_sheet(sheet)
        .map_err(|e| CrmError::Spreadsheet(e.to_string()))?;

    let headers = field_names(records);
    for (col, header) in headers.iter().enumerate() {
        worksheet
            .get_cell_mut((col as u32 + 1, 1))
            .set_value_string(header.clone());
    }

    for (row, record) in records.iter().enumerate() {
        let row = row as u32 + 2;
        for (col, header) in headers.iter().enumerate() {
            let cell = (col as u32 + 1, row);
            match record.value(header) {
                Value::Null => {}
                Value::Bool(b) => {
                    worksheet.get_cell_mut(cell).set_value_bool(*b);
                }
                Value::Number(n) => {
                    worksheet.get_cell_mut(cell).set_value_number(*n);
                }
                Value::Text(s) => {
                    worksheet.get_cell_mut(cell).set_value_string(s.clone());
                }
            }
        }
    }
    Ok(())
}

/// Write `records` into `sheet`, replacing that sheet when the workbook already exists.
pub fn write_sheet(path: &Path, sheet: &str, records: &[Record]) -> Result<(), CrmError> {
    let mut book = if path.exists() {
        let mut book = umya_spreadsheet::reader::xlsx::read(path)?;
        if book.get_sheet_by_name(sheet).is_some() {
            book.remove_sheet_by_name(sheet)
                .map_err(|e| CrmError::Spreadsheet(e.to_string()))?;
        }
        book
    } else {
        umya_spreadsheet::new_file_empty_worksheet()
    };

    fill_sheet(&mut book, sheet, records)?;
    umya_spreadsheet::writer::xlsx::write(&book, path)?;
    info!("Wrote {} records to {:?}[{}]", records.len(), path, sheet);
    Ok(())
}

/// Fresh workbook with a single sheet, returns the written path.
pub fn export_records(
    dir: &Path,
    file_name: &str,
    records: &[Record],
) -> Result<PathBuf, CrmError> {
    let path = dir.join(file_name);
    let mut book = umya_spreadsheet::new_file_empty_worksheet();
    fill_sheet(&mut book, EXPORT_SHEET, records)?;
    umya_spreadsheet::writer::xlsx::write(&book, &path)?;
    info!("Exported {} records to {:?}", records.len(), path);
    Ok(path)
}
