use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One observation produced by the data feed
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    pub time: String,
    pub value: f64,
    pub category: String,
    pub region: String,
    pub product_line: String,
}

/// Record selection criteria. Empty sets place no restriction.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterConfig {
    /// Inclusive `(start, end)` bound over time labels, compared as strings
    pub time_range: Option<(String, String)>,
    pub categories: BTreeSet<String>,
    pub regions: BTreeSet<String>,
    pub product_lines: BTreeSet<String>,
}

impl FilterConfig {
    pub fn is_empty(&self) -> bool {
        self.time_range.is_none()
            && self.categories.is_empty()
            && self.regions.is_empty()
            && self.product_lines.is_empty()
    }
}

/// A field of [`RawRecord`] that records can be grouped by.
///
/// Names outside the known four deserialize to `Unknown` and group every
/// record into a single `"Unknown"` bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Dimension {
    Time,
    Category,
    Region,
    ProductLine,
    Unknown(String),
}

pub const UNKNOWN_BUCKET: &str = "Unknown";

impl Dimension {
    pub const KNOWN: [Dimension; 4] = [
        Dimension::Time,
        Dimension::Category,
        Dimension::Region,
        Dimension::ProductLine,
    ];

    pub fn name(&self) -> &str {
        match self {
            Dimension::Time => "time",
            Dimension::Category => "category",
            Dimension::Region => "region",
            Dimension::ProductLine => "productLine",
            Dimension::Unknown(name) => name,
        }
    }

    /// Value of this dimension on `record`
    pub fn value_of<'a>(&self, record: &'a RawRecord) -> &'a str {
        match self {
            Dimension::Time => &record.time,
            Dimension::Category => &record.category,
            Dimension::Region => &record.region,
            Dimension::ProductLine => &record.product_line,
            Dimension::Unknown(_) => UNKNOWN_BUCKET,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Dimension::Unknown(_))
    }

    /// Closest known dimension name by edit distance, for unknown dimensions only
    pub fn suggestion(&self) -> Option<&'static str> {
        let Dimension::Unknown(name) = self else {
            return None;
        };
        let lowered = name.to_lowercase();
        ["time", "category", "region", "productLine"]
            .into_iter()
            .min_by_key(|known| strsim::levenshtein(&lowered, &known.to_lowercase()))
    }
}

impl From<String> for Dimension {
    fn from(name: String) -> Self {
        match name.as_str() {
            "time" => Dimension::Time,
            "category" => Dimension::Category,
            "region" => Dimension::Region,
            "productLine" => Dimension::ProductLine,
            _ => Dimension::Unknown(name),
        }
    }
}

impl From<&str> for Dimension {
    fn from(name: &str) -> Self {
        Dimension::from(name.to_string())
    }
}

impl From<Dimension> for String {
    fn from(dimension: Dimension) -> Self {
        dimension.name().to_string()
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reduction applied to the values of one group
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[default]
    Sum,
    Avg,
    Max,
    Min,
}

impl Operator {
    /// Reduce a non-empty slice of values
    pub fn reduce(self, values: &[f64]) -> f64 {
        match self {
            Operator::Sum => values.iter().sum(),
            Operator::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Operator::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Operator::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct AggregationConfig {
    pub group_by: Vec<Dimension>,
    #[serde(alias = "aggregation", default)]
    pub operator: Operator,
}

impl AggregationConfig {
    pub fn new(group_by: Vec<Dimension>, operator: Operator) -> Self {
        Self { group_by, operator }
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.group_by.is_empty() {
            return Err(crate::error::DashboardError::InvalidConfig(
                "groupBy needs at least one dimension".to_string(),
            ));
        }
        Ok(())
    }

    pub fn groups_by(&self, dimension: &Dimension) -> bool {
        self.group_by.contains(dimension)
    }

    pub fn unknown_dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.group_by.iter().filter(|d| !d.is_known())
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            group_by: vec![Dimension::Time, Dimension::Category, Dimension::Region],
            operator: Operator::Sum,
        }
    }
}

/// One time bucket of the line chart; columns are keyed by secondary group value
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct TimeSeriesRow {
    pub time: String,
    #[serde(flatten)]
    pub columns: serde_json::Map<String, serde_json::Value>,
}

impl TimeSeriesRow {
    pub fn value(&self, column: &str) -> Option<f64> {
        self.columns.get(column).and_then(|v| v.as_f64())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CategoryTotal {
    pub category: String,
    pub value: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DistributionSlice {
    pub name: String,
    pub value: f64,
    pub percentage: f64,
}

/// Presentation-shaped aggregates, always replaced as a whole
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DerivedViews {
    pub time_series: Vec<TimeSeriesRow>,
    pub category_totals: Vec<CategoryTotal>,
    pub distribution: Vec<DistributionSlice>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Blue,
}

/// Flags read by the presentation layer
#[derive(Debug, Serialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UiFlags {
    pub loading: bool,
    pub error: Option<String>,
    pub theme: Theme,
    pub retry_count: u32,
}

/// API Response
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_names_round_trip() {
        for dimension in Dimension::KNOWN {
            let name: String = dimension.clone().into();
            assert_eq!(Dimension::from(name), dimension);
        }
    }

    #[test]
    fn test_unknown_dimension_groups_into_unknown_bucket() {
        let record = RawRecord {
            time: "10:00:00".to_string(),
            value: 1.0,
            category: "A".to_string(),
            region: "North".to_string(),
            product_line: "Line 1".to_string(),
        };
        let dimension = Dimension::from("colour");
        assert!(!dimension.is_known());
        assert_eq!(dimension.value_of(&record), UNKNOWN_BUCKET);
        assert_eq!(Dimension::from("regoin").suggestion(), Some("region"));
        assert_eq!(Dimension::Category.suggestion(), None);
    }

    #[test]
    fn test_aggregation_config_accepts_source_field_name() {
        let config: AggregationConfig =
            serde_json::from_str(r#"{"groupBy":["category","productLine"],"aggregation":"avg"}"#)
                .unwrap();
        assert_eq!(config.group_by, vec![Dimension::Category, Dimension::ProductLine]);
        assert_eq!(config.operator, Operator::Avg);

        let empty = AggregationConfig::new(vec![], Operator::Sum);
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_operator_reduce() {
        let values = [10.0, 5.0];
        assert_eq!(Operator::Sum.reduce(&values), 15.0);
        assert_eq!(Operator::Avg.reduce(&values), 7.5);
        assert_eq!(Operator::Max.reduce(&values), 10.0);
        assert_eq!(Operator::Min.reduce(&values), 5.0);
    }
}
