use std::fs;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use crate::domain::{COLUMNS, Row};
use crate::error::VizError;

/// A user-selected CSV file, checked and loaded before it is submitted.
#[derive(Debug, Clone)]
pub struct UploadFile {
    name: String,
    bytes: Vec<u8>,
}

impl UploadFile {
    pub fn from_path(path: Option<&Path>) -> Result<Self, VizError> {
        let path = path.ok_or_else(|| VizError::Validation("no file selected".to_string()))?;
        if !path.is_file() {
            return Err(VizError::Validation(format!(
                "not a readable file: {}",
                path.display()
            )));
        }
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .ok_or_else(|| VizError::Validation("file name is not valid UTF-8".to_string()))?
            .to_string();
        check_csv_name(&name)?;
        let bytes = fs::read(path)
            .map_err(|err| VizError::Filesystem(format!("read {}: {err}", path.display())))?;
        debug!(file = %name, size = bytes.len(), "loaded upload file");
        Ok(Self { name, bytes })
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, VizError> {
        let name = name.into();
        check_csv_name(&name)?;
        Ok(Self { name, bytes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn rows(&self) -> Result<Vec<Row>, VizError> {
        parse_rows(self.bytes.as_slice())
    }
}

fn check_csv_name(name: &str) -> Result<(), VizError> {
    if name.trim().is_empty() {
        return Err(VizError::Validation("no file selected".to_string()));
    }
    let is_csv = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if !is_csv {
        return Err(VizError::Validation("file must be a CSV".to_string()));
    }
    Ok(())
}

/// Parses equipment rows from CSV text.
///
/// Columns are located by header name, so order and extra columns do not
/// matter. Cell text is kept as-is; only numeric cells are trimmed.
pub fn parse_rows<R: Read>(reader: R) -> Result<Vec<Row>, VizError> {
    let mut reader = ReaderBuilder::new().trim(Trim::Headers).from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|err| VizError::InvalidCsv(err.to_string()))?
        .clone();
    let positions = column_positions(&headers)?;

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let fallback_line = index as u64 + 2;
        let record = record.map_err(|err| VizError::InvalidRow {
            line: err
                .position()
                .map(|pos| pos.line())
                .unwrap_or(fallback_line),
            message: err.to_string(),
        })?;
        let line = record
            .position()
            .map(|pos| pos.line())
            .unwrap_or(fallback_line);
        let cell = |column: usize| record.get(positions[column]).unwrap_or("");
        let row = Row::from_cells(cell(0), cell(1), cell(2), cell(3), cell(4))
            .map_err(|message| VizError::InvalidRow { line, message })?;
        rows.push(row);
    }
    debug!(rows = rows.len(), "parsed equipment csv");
    Ok(rows)
}

fn column_positions(headers: &StringRecord) -> Result<[usize; 5], VizError> {
    let names: Vec<&str> = headers
        .iter()
        .map(|header| header.trim_start_matches('\u{feff}'))
        .collect();
    let mut positions = [0usize; 5];
    for (slot, column) in positions.iter_mut().zip(COLUMNS) {
        *slot = names
            .iter()
            .position(|name| *name == column)
            .ok_or_else(|| {
                VizError::InvalidCsv(format!("CSV must contain columns: {}", COLUMNS.join(", ")))
            })?;
    }
    Ok(positions)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn columns_found_by_name() {
        let csv = "Type,Temperature,Equipment Name,Pressure,Flowrate,Notes\nPump,110,Pump-1,5.2,120,ok\n";
        let rows = parse_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Pump-1");
        assert_eq!(rows[0].flowrate, 120.0);
        assert_eq!(rows[0].temperature, 110.0);
    }

    #[test]
    fn missing_column_is_rejected() {
        let err = parse_rows("Equipment Name,Type,Flowrate\nP,Pump,1\n".as_bytes()).unwrap_err();
        assert_matches!(err, VizError::InvalidCsv(message) if message.contains("Temperature"));
    }

    #[test]
    fn bad_number_reports_line() {
        let csv = "Equipment Name,Type,Flowrate,Pressure,Temperature\nA,Pump,1,2,3\nB,Pump,x,2,3\n";
        let err = parse_rows(csv.as_bytes()).unwrap_err();
        assert_matches!(err, VizError::InvalidRow { line: 3, .. });
    }

    #[test]
    fn non_csv_name_is_rejected() {
        let err = UploadFile::from_bytes("readings.xlsx", Vec::new()).unwrap_err();
        assert_matches!(err, VizError::Validation(message) if message == "file must be a CSV");
        assert!(UploadFile::from_bytes("READINGS.CSV", Vec::new()).is_ok());
    }
}
