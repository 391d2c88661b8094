use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::Row;

/// Row count per equipment type, keyed by the type string exactly as given.
pub type TypeDistribution = IndexMap<String, u64>;

const AVERAGE_TOLERANCE: f64 = 0.005;

/// Count, per-parameter averages and type histogram over a row sequence.
///
/// Averages of an empty sequence are `0.0`; the backend sends `null` in that
/// case, which deserializes to the same value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregates {
    pub total_count: u64,
    #[serde(deserialize_with = "zero_if_null")]
    pub avg_flowrate: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub avg_pressure: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub avg_temperature: f64,
    #[serde(default)]
    pub type_distribution: TypeDistribution,
}

impl Aggregates {
    /// Averages rounded to two decimals, as the backend stores them.
    pub fn rounded(&self) -> Self {
        Self {
            avg_flowrate: round2(self.avg_flowrate),
            avg_pressure: round2(self.avg_pressure),
            avg_temperature: round2(self.avg_temperature),
            ..self.clone()
        }
    }

    /// Counts and distribution compare exactly (in any key order), averages
    /// within half a hundredth.
    pub fn matches(&self, other: &Aggregates) -> bool {
        self.total_count == other.total_count
            && self.type_distribution == other.type_distribution
            && close(self.avg_flowrate, other.avg_flowrate)
            && close(self.avg_pressure, other.avg_pressure)
            && close(self.avg_temperature, other.avg_temperature)
    }

    pub fn distribution_total(&self) -> u64 {
        self.type_distribution.values().sum()
    }
}

pub fn aggregate(rows: &[Row]) -> Aggregates {
    let mut flowrate = 0.0;
    let mut pressure = 0.0;
    let mut temperature = 0.0;
    let mut type_distribution = TypeDistribution::new();

    for row in rows {
        flowrate += row.flowrate;
        pressure += row.pressure;
        temperature += row.temperature;
        *type_distribution
            .entry(row.equipment_type.clone())
            .or_insert(0) += 1;
    }

    if rows.is_empty() {
        return Aggregates::default();
    }

    let count = rows.len() as f64;
    Aggregates {
        total_count: rows.len() as u64,
        avg_flowrate: flowrate / count,
        avg_pressure: pressure / count,
        avg_temperature: temperature / count,
        type_distribution,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn close(left: f64, right: f64) -> bool {
    (left - right).abs() <= AVERAGE_TOLERANCE + f64::EPSILON * left.abs().max(right.abs())
}

fn zero_if_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}
