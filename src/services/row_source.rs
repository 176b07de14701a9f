use std::collections::HashMap;
use std::path::Path;

use bytes::Bytes;
use reqwest::Client;

use crate::error::AppError;

/// One source row: column name to raw cell value, exactly as read.
pub type Row = HashMap<String, String>;

/// All rows of one tabular source. The first record of the source defines
/// the column ordering, carried here since `Row` itself is unordered.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Load a tabular source into memory. Accepts a local CSV path or a signed
/// `http(s)` URL (uploads may live behind object storage).
pub async fn load_rows(path: &str) -> Result<RowSet, AppError> {
    if path.starts_with("http://") || path.starts_with("https://") {
        let data = load_file_from_url(path).await?;
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(data.as_ref());
        read_rows(reader)
    } else {
        if !Path::new(path).exists() {
            return Err(AppError::SourceNotFound(format!("File not found: {}", path)));
        }
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;
        read_rows(reader)
    }
}

fn read_rows<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<RowSet, AppError> {
    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let row: Row = columns
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), record.get(idx).unwrap_or("").to_string()))
            .collect();
        rows.push(row);
    }

    Ok(RowSet { columns, rows })
}

async fn load_file_from_url(url: &str) -> Result<Bytes, AppError> {
    let client = Client::new();
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::FileProcessingError(format!("Failed to fetch file: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::SourceNotFound(
            format!("Failed to fetch file. Status: {}", response.status())
        ));
    }

    response
        .bytes()
        .await
        .map_err(|e| AppError::FileProcessingError(format!("Failed to read response bytes: {}", e)))
}
