//! Chart series, tables and summary cards derived from a dataset. Nothing in
//! here touches the network or the filesystem.

use serde::Serialize;

use crate::aggregate::Aggregates;
use crate::domain::{COLUMNS, Row};

pub const AVERAGE_CATEGORIES: [&str; 3] = ["Flowrate", "Pressure", "Temperature"];
pub const FALLBACK_REPORT_NAME: &str = "report.pdf";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub label: String,
    pub categories: Vec<String>,
    pub values: Vec<f64>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Each value as a percentage of the total, for pie-style labels.
    pub fn shares(&self) -> Vec<f64> {
        let total = self.total();
        if total == 0.0 {
            return vec![0.0; self.values.len()];
        }
        self.values
            .iter()
            .map(|value| value / total * 100.0)
            .collect()
    }

    pub fn points(&self) -> impl Iterator<Item = (&str, f64)> {
        self.categories
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub averages: Series,
    pub type_distribution: Series,
}

pub fn to_chart_series(aggregates: &Aggregates) -> ChartSeries {
    let averages = Series {
        label: "Average Values".to_string(),
        categories: AVERAGE_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        values: vec![
            aggregates.avg_flowrate,
            aggregates.avg_pressure,
            aggregates.avg_temperature,
        ],
    };
    let type_distribution = Series {
        label: "Equipment Count by Type".to_string(),
        categories: aggregates.type_distribution.keys().cloned().collect(),
        values: aggregates
            .type_distribution
            .values()
            .map(|count| *count as f64)
            .collect(),
    };
    ChartSeries {
        averages,
        type_distribution,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub fn to_table(rows: &[Row]) -> Table {
    Table {
        headers: COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows: rows
            .iter()
            .map(|row| {
                vec![
                    row.name.clone(),
                    row.equipment_type.clone(),
                    format_number(row.flowrate),
                    format_number(row.pressure),
                    format_number(row.temperature),
                ]
            })
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    pub title: &'static str,
    pub value: String,
}

pub fn summary_cards(aggregates: &Aggregates) -> Vec<Card> {
    vec![
        Card {
            title: "Total Equipment",
            value: aggregates.total_count.to_string(),
        },
        Card {
            title: "Avg Flowrate",
            value: format_value(aggregates.avg_flowrate),
        },
        Card {
            title: "Avg Pressure",
            value: format_value(aggregates.avg_pressure),
        },
        Card {
            title: "Avg Temperature",
            value: format_value(aggregates.avg_temperature),
        },
    ]
}

/// Two-decimal display of an average.
pub fn format_value(value: f64) -> String {
    format!("{value:.2}")
}

/// Shortest display of a reading: integers without a fraction.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

pub fn report_filename(dataset_name: &str) -> String {
    let name = dataset_name.trim();
    if name.is_empty() {
        return FALLBACK_REPORT_NAME.to_string();
    }
    format!("{name}_report.pdf")
}
