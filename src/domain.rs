use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregates;
use crate::error::VizError;

/// Column headers of the equipment CSV, in display order.
pub const COLUMNS: [&str; 5] = [
    "Equipment Name",
    "Type",
    "Flowrate",
    "Pressure",
    "Temperature",
];

/// One equipment reading.
///
/// On the wire a row is keyed by the CSV headers. The backend re-reads the
/// stored CSV to build `csv_data`, so numeric cells usually arrive as strings;
/// both strings and numbers are accepted, but they must be finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RowRecord")]
pub struct Row {
    #[serde(rename = "Equipment Name")]
    pub name: String,
    #[serde(rename = "Type")]
    pub equipment_type: String,
    #[serde(rename = "Flowrate")]
    pub flowrate: f64,
    #[serde(rename = "Pressure")]
    pub pressure: f64,
    #[serde(rename = "Temperature")]
    pub temperature: f64,
}

impl Row {
    pub fn new(
        name: impl Into<String>,
        equipment_type: impl Into<String>,
        flowrate: f64,
        pressure: f64,
        temperature: f64,
    ) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("equipment name is empty".to_string());
        }
        for (field, value) in [
            ("Flowrate", flowrate),
            ("Pressure", pressure),
            ("Temperature", temperature),
        ] {
            if !value.is_finite() {
                return Err(format!("{field} is not a finite number"));
            }
        }
        Ok(Self {
            name,
            equipment_type: equipment_type.into(),
            flowrate,
            pressure,
            temperature,
        })
    }

    /// Builds a row from raw CSV cells, in [`COLUMNS`] order.
    pub fn from_cells(
        name: &str,
        equipment_type: &str,
        flowrate: &str,
        pressure: &str,
        temperature: &str,
    ) -> Result<Self, String> {
        Self::new(
            name,
            equipment_type,
            parse_measure("Flowrate", flowrate)?,
            parse_measure("Pressure", pressure)?,
            parse_measure("Temperature", temperature)?,
        )
    }
}

fn parse_measure(field: &str, text: &str) -> Result<f64, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(format!("{field} is missing"));
    }
    let value = trimmed
        .parse::<f64>()
        .map_err(|_| format!("{field} is not a number: {trimmed:?}"))?;
    if !value.is_finite() {
        return Err(format!("{field} is not a finite number: {trimmed:?}"));
    }
    Ok(value)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Cell {
    Number(f64),
    Text(String),
}

impl Cell {
    fn into_measure(self, field: &str) -> Result<f64, String> {
        match self {
            Cell::Number(value) if value.is_finite() => Ok(value),
            Cell::Number(_) => Err(format!("{field} is not a finite number")),
            Cell::Text(text) => parse_measure(field, &text),
        }
    }
}

#[derive(Deserialize)]
struct RowRecord {
    #[serde(rename = "Equipment Name")]
    name: String,
    #[serde(rename = "Type")]
    equipment_type: String,
    #[serde(rename = "Flowrate")]
    flowrate: Cell,
    #[serde(rename = "Pressure")]
    pressure: Cell,
    #[serde(rename = "Temperature")]
    temperature: Cell,
}

impl TryFrom<RowRecord> for Row {
    type Error = String;

    fn try_from(record: RowRecord) -> Result<Self, Self::Error> {
        Row::new(
            record.name,
            record.equipment_type,
            record.flowrate.into_measure("Flowrate")?,
            record.pressure.into_measure("Pressure")?,
            record.temperature.into_measure("Temperature")?,
        )
    }
}

/// Server-assigned dataset identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(u64);

impl DatasetId {
    pub fn new(value: u64) -> Result<Self, VizError> {
        if value == 0 {
            return Err(VizError::InvalidDatasetId(value.to_string()));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = VizError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(VizError::InvalidDatasetId(value.to_string()));
        }
        let parsed = trimmed
            .parse::<u64>()
            .map_err(|_| VizError::InvalidDatasetId(value.to_string()))?;
        Self::new(parsed).map_err(|_| VizError::InvalidDatasetId(value.to_string()))
    }
}

/// Dataset metadata plus its aggregates, without rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub id: DatasetId,
    pub name: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub aggregates: Aggregates,
}

/// A stored dataset including every row, in CSV order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(flatten)]
    pub summary: DatasetSummary,
    #[serde(rename = "csv_data", default)]
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn id(&self) -> DatasetId {
        self.summary.id
    }

    pub fn name(&self) -> &str {
        &self.summary.name
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_dataset_id() {
        let id: DatasetId = " 42 ".parse().unwrap();
        assert_eq!(id.get(), 42);
        assert_matches!("0".parse::<DatasetId>(), Err(VizError::InvalidDatasetId(_)));
        assert_matches!("-3".parse::<DatasetId>(), Err(VizError::InvalidDatasetId(_)));
        assert_matches!("abc".parse::<DatasetId>(), Err(VizError::InvalidDatasetId(_)));
    }

    #[test]
    fn row_accepts_numeric_strings() {
        let row: Row = serde_json::from_str(
            r#"{"Equipment Name":"Pump-1","Type":"Pump","Flowrate":"120","Pressure":5.2,"Temperature":" 110 "}"#,
        )
        .unwrap();
        assert_eq!(row.flowrate, 120.0);
        assert_eq!(row.pressure, 5.2);
        assert_eq!(row.temperature, 110.0);
    }

    #[test]
    fn row_rejects_non_numeric() {
        let err = serde_json::from_str::<Row>(
            r#"{"Equipment Name":"Pump-1","Type":"Pump","Flowrate":"fast","Pressure":5.2,"Temperature":110}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Flowrate"));
    }

    #[test]
    fn row_rejects_blank_name_and_nan() {
        assert!(Row::new("  ", "Pump", 1.0, 1.0, 1.0).is_err());
        assert!(Row::from_cells("P", "Pump", "NaN", "1", "1").is_err());
        assert!(Row::from_cells("P", "Pump", "", "1", "1").is_err());
    }
}
