use serde::{Deserialize, Serialize};

use crate::error::{DashboardError, Result};
use crate::models::{AggregationConfig, FilterConfig, RawRecord};

pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Document used for export, import and persistence
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateBundle {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub records: Vec<RawRecord>,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

impl StateBundle {
    pub fn new(records: Vec<RawRecord>, filter: FilterConfig, aggregation: AggregationConfig) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            records,
            filter,
            aggregation,
        }
    }

    /// Parses and validates a bundle without touching any state
    pub fn parse(json: &str) -> Result<Self> {
        let bundle: StateBundle =
            serde_json::from_str(json).map_err(|e| DashboardError::Import(e.to_string()))?;

        if bundle.schema_version > SCHEMA_VERSION {
            return Err(DashboardError::UnsupportedSchema {
                found: bundle.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        bundle
            .aggregation
            .validate()
            .map_err(|e| DashboardError::Import(e.to_string()))?;

        Ok(bundle)
    }
}

/// Which table to render as CSV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportView {
    Raw,
    TimeSeries,
    Category,
    Distribution,
}

fn cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Renders rows as comma-separated text.
///
/// The header is the key list of the first row. Values are not quoted or
/// escaped, so embedded commas will shift columns.
pub fn to_csv<T: Serialize>(rows: &[T]) -> Result<String> {
    let values = rows
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let Some(serde_json::Value::Object(first)) = values.first() else {
        return Ok(String::new());
    };

    let header = first.keys().cloned().collect::<Vec<_>>().join(",");
    let lines = values.iter().map(|row| match row {
        serde_json::Value::Object(map) => map.values().map(cell).collect::<Vec<_>>().join(","),
        other => cell(other),
    });

    let mut out = header;
    for line in lines {
        out.push('\n');
        out.push_str(&line);
    }
    Ok(out)
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// File name stem used for downloads, e.g. `dashboard-export-2024-05-01T10-00-00-raw`
pub fn export_filename(view: &str) -> String {
    let stamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S");
    format!("dashboard-export-{}-{}", stamp, view)
}
