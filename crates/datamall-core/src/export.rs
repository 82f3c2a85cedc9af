use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde_json::Value;
use tracing::info;

use crate::client::Record;
use crate::dataset::BusDataset;
use crate::error::DataMallError;
use crate::period::ReportPeriod;

/// `<label>_<YYYYMM>.csv`, stamped with the month containing `today`.
pub fn csv_file_name(dataset: BusDataset, today: NaiveDate) -> String {
    format!(
        "{}_{}.csv",
        dataset.label(),
        ReportPeriod::containing(today).stamp()
    )
}

/// Write `records` under `dir` using the dataset's column order and return the file path.
///
/// The CSV is staged next to its destination and only renamed into place once every row
/// has been written, so a schema mismatch leaves no partial file behind.
pub fn write_dataset_csv(
    dir: &Path,
    dataset: BusDataset,
    records: &[Record],
    today: NaiveDate,
) -> Result<PathBuf, DataMallError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(csv_file_name(dataset, today));
    let temp_path = path.with_extension("csv.tmp");

    let result = write_rows(&temp_path, dataset, records);
    if let Err(err) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }
    fs::rename(&temp_path, &path)?;

    info!(dataset = dataset.sub_path(), rows = records.len(), path = %path.display(), "CSV written");
    Ok(path)
}

fn write_rows(path: &Path, dataset: BusDataset, records: &[Record]) -> Result<(), DataMallError> {
    let columns = dataset.columns();
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(columns)?;

    let mut row = Vec::with_capacity(columns.len());
    for (index, record) in records.iter().enumerate() {
        row.clear();
        for &column in columns {
            let value = record
                .get(column)
                .ok_or(DataMallError::SchemaMismatch {
                    dataset: dataset.sub_path(),
                    column,
                    row: index,
                })?;
            row.push(render_cell(value));
        }
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        nested => nested.to_string(),
    }
}
