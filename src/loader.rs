use polars::prelude::*;
use rayon::prelude::*;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use crate::domain::CrmError;
use crate::excel;
use crate::record::{Record, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
enum FileType {
    CSV,
    PARQUET,
    XLSX,
    ARROW,
}

#[derive(Debug)]
pub struct FileInfo {
    pub path: PathBuf,
    pub file_size: u64,
    file_type: FileType,
}

/// A report opened from disk.
#[derive(Debug)]
pub struct LoadedFile {
    pub name: String,
    pub records: Vec<Record>,
}

fn detect_file_type(path: &Path) -> Result<FileType, CrmError> {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_uppercase())
        .as_deref()
    {
        Some("CSV") => Ok(FileType::CSV),
        Some("PARQUET") | Some("PQ") => Ok(FileType::PARQUET),
        Some("XLSX") | Some("XLS") => Ok(FileType::XLSX),
        Some("ARROW") | Some("IPC") | Some("FEATHER") => Ok(FileType::ARROW),
        _ => Err(CrmError::UnknownFileType),
    }
}

pub fn get_file_info(path: PathBuf) -> Result<FileInfo, CrmError> {
    let metadata = fs::metadata(&path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => CrmError::FileNotFound(path.clone()),
        ErrorKind::PermissionDenied => CrmError::PermissionDenied,
        _ => CrmError::IoError(e),
    })?;
    if !metadata.is_file() {
        return Err(CrmError::LoadingFailed("Not a file!".into()));
    }
    let file_type = detect_file_type(&path)?;

    Ok(FileInfo {
        path,
        file_size: metadata.len(),
        file_type,
    })
}

/// Open a local report. `sheet` picks the workbook sheet, the first one otherwise.
pub fn load_file(path: PathBuf, sheet: Option<&str>) -> Result<LoadedFile, CrmError> {
    let file_info = get_file_info(path)?;
    let start_time = Instant::now();

    let records = match file_info.file_type {
        FileType::XLSX => {
            let sheet = match sheet {
                Some(s) => s.to_string(),
                None => excel::sheet_names(&file_info.path)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| CrmError::LoadingFailed("Workbook has no sheets".into()))?,
            };
            excel::load_sheet(&file_info.path, &sheet)?
        }
        FileType::CSV => frame_to_records(load_csv(&file_info.path)?.collect()?)?,
        FileType::PARQUET => frame_to_records(load_parquet(&file_info.path)?.collect()?)?,
        FileType::ARROW => frame_to_records(load_arrow(&file_info.path)?.collect()?)?,
    };

    info!(
        "Loading {:?} ({} bytes) took {}ms ...",
        file_info.path,
        file_info.file_size,
        start_time.elapsed().as_millis()
    );

    let name = file_info
        .path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("???")
        .to_string();
    Ok(LoadedFile { name, records })
}

fn load_csv(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyCsvReader::new(PlPath::Local(path.into()))
        .with_has_header(true)
        .finish()
}

fn load_parquet(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyFrame::scan_parquet(PlPath::Local(path.into()), ScanArgsParquet::default())
}

fn load_arrow(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyFrame::scan_ipc(
        PlPath::Local(path.into()),
        polars::io::ipc::IpcScanOptions,
        UnifiedScanArgs::default(),
    )
}

fn is_numeric_type(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

// Each column is converted in its own rayon task, rows are stitched afterwards.
fn load_column(df: &DataFrame, col_name: &str) -> Result<Vec<Value>, PolarsError> {
    let column = df.column(col_name)?;
    let dtype = column.dtype().clone();

    let values = if is_numeric_type(&dtype) {
        let cast = column.cast(&DataType::Float64)?;
        cast.f64()?
            .into_iter()
            .map(|v| v.map(Value::Number).unwrap_or(Value::Null))
            .collect()
    } else if dtype == DataType::Boolean {
        column
            .bool()?
            .into_iter()
            .map(|v| v.map(Value::Bool).unwrap_or(Value::Null))
            .collect()
    } else {
        let cast = column.cast(&DataType::String)?;
        cast.str()?
            .into_iter()
            .map(|v| v.map(|s| Value::Text(s.to_string())).unwrap_or(Value::Null))
            .collect()
    };
    Ok(values)
}

fn frame_to_records(df: DataFrame) -> Result<Vec<Record>, CrmError> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();

    let columns: Result<Vec<Vec<Value>>, PolarsError> = names
        .par_iter()
        .map(|name| load_column(&df, name))
        .collect();
    let columns = columns?;

    let records = (0..df.height())
        .map(|row| {
            let mut record = Record::with_capacity(names.len());
            for (name, column) in names.iter().zip(columns.iter()) {
                record.insert(name.clone(), column[row].clone());
            }
            record
        })
        .collect::<Vec<Record>>();
    debug!("Converted frame with {} columns to {} records", names.len(), records.len());
    Ok(records)
}
