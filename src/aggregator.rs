use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;
use xxhash_rust::xxh3::Xxh3;

use crate::cache::LruCache;
use crate::models::{
    AggregationConfig, CategoryTotal, DerivedViews, Dimension, DistributionSlice, Operator,
    RawRecord, TimeSeriesRow,
};

/// Column name used on time series rows when there is no secondary dimension
pub const SINGLE_SERIES_COLUMN: &str = "value";

/// Key the time label occupies on a serialized time series row
pub const TIME_COLUMN: &str = "time";

/// One bucket of records sharing the same dimension values, reduced to a number
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub key: Vec<String>,
    pub value: f64,
}

/// Groups records by the tuple of `dimensions` values and reduces each group.
///
/// Groups come back in first-seen order, which drives default chart ordering.
pub fn group(records: &[RawRecord], dimensions: &[Dimension], operator: Operator) -> Vec<Group> {
    let mut index: HashMap<Vec<&str>, usize> = HashMap::new();
    let mut buckets: Vec<(Vec<&str>, Vec<f64>)> = Vec::new();

    for record in records {
        let key: Vec<&str> = dimensions.iter().map(|d| d.value_of(record)).collect();
        match index.get(&key) {
            Some(&slot) => buckets[slot].1.push(record.value),
            None => {
                index.insert(key.clone(), buckets.len());
                buckets.push((key, vec![record.value]));
            }
        }
    }

    buckets
        .into_iter()
        .map(|(key, values)| Group {
            key: key.into_iter().map(str::to_string).collect(),
            value: operator.reduce(&values),
        })
        .collect()
}

fn time_series(records: &[RawRecord], config: &AggregationConfig) -> Vec<TimeSeriesRow> {
    if !config.groups_by(&Dimension::Time) {
        return Vec::new();
    }

    let mut dimensions = vec![Dimension::Time];
    if let Some(secondary) = config.group_by.iter().find(|d| **d != Dimension::Time) {
        dimensions.push(secondary.clone());
    }

    let groups = group(records, &dimensions, config.operator);

    // A secondary value equal to the time key is renamed with trailing
    // underscores until it is distinct from every other column
    let taken: HashSet<&str> = groups
        .iter()
        .filter_map(|g| g.key.get(1).map(String::as_str))
        .collect();
    let mut time_alias = format!("{TIME_COLUMN}_");
    while taken.contains(time_alias.as_str()) {
        time_alias.push('_');
    }

    let mut rows: Vec<TimeSeriesRow> = Vec::new();
    let mut by_time: HashMap<String, usize> = HashMap::new();

    for group in groups.iter() {
        let mut key = group.key.iter();
        let time = key.next().cloned().unwrap_or_default();
        let column = match key.next() {
            Some(value) if value == TIME_COLUMN => time_alias.clone(),
            Some(value) => value.clone(),
            None => SINGLE_SERIES_COLUMN.to_string(),
        };

        // Groups sharing a time value merge into one row
        let slot = *by_time.entry(time.clone()).or_insert_with(|| {
            rows.push(TimeSeriesRow {
                time,
                columns: serde_json::Map::new(),
            });
            rows.len() - 1
        });
        rows[slot]
            .columns
            .insert(column, serde_json::Value::from(group.value));
    }

    rows
}

fn category_totals(records: &[RawRecord], config: &AggregationConfig) -> Vec<CategoryTotal> {
    if !config.groups_by(&Dimension::Category) {
        return Vec::new();
    }
    group(records, &[Dimension::Category], config.operator)
        .into_iter()
        .map(|g| CategoryTotal {
            category: g.key.into_iter().next().unwrap_or_default(),
            value: g.value,
        })
        .collect()
}

fn distribution(records: &[RawRecord], config: &AggregationConfig) -> Vec<DistributionSlice> {
    let dimension = if config.groups_by(&Dimension::Region) {
        Dimension::Region
    } else if config.groups_by(&Dimension::ProductLine) {
        Dimension::ProductLine
    } else {
        return Vec::new();
    };

    let groups = group(records, &[dimension], config.operator);
    let total: f64 = groups.iter().map(|g| g.value).sum();

    groups
        .into_iter()
        .map(|g| DistributionSlice {
            name: g.key.into_iter().next().unwrap_or_default(),
            value: g.value,
            percentage: if total != 0.0 { (g.value / total) * 100.0 } else { 0.0 },
        })
        .collect()
}

/// Builds all three views from already-filtered records, bypassing the cache
pub fn compute(records: &[RawRecord], config: &AggregationConfig) -> DerivedViews {
    DerivedViews {
        time_series: time_series(records, config),
        category_totals: category_totals(records, config),
        distribution: distribution(records, config),
    }
}

/// Cache key over the aggregation config, the input length and the input content
pub fn cache_key(records: &[RawRecord], config: &AggregationConfig) -> String {
    let mut hasher = Xxh3::new();
    for record in records {
        for field in [&record.time, &record.category, &record.region, &record.product_line] {
            hasher.update(field.as_bytes());
            hasher.update(&[0]);
        }
        hasher.update(&record.value.to_bits().to_le_bytes());
    }

    let config_json = serde_json::to_string(config).unwrap_or_default();
    format!(
        "aggregate_{}_{}_{:016x}",
        config_json,
        records.len(),
        hasher.digest()
    )
}

/// Memoizing front for [`compute`]
pub struct Aggregator {
    cache: LruCache<String, DerivedViews>,
    hits: u64,
    misses: u64,
}

impl Aggregator {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            cache: LruCache::new(cache_capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn aggregate(&mut self, records: &[RawRecord], config: &AggregationConfig) -> DerivedViews {
        let key = cache_key(records, config);

        if let Some(views) = self.cache.get(&key) {
            self.hits += 1;
            debug!(records = records.len(), "aggregation cache hit");
            return views;
        }

        self.misses += 1;
        debug!(records = records.len(), group_by = ?config.group_by, "aggregation cache miss");
        let views = compute(records, config);
        self.cache.set(key, views.clone());
        views
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.size()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}
