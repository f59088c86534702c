use crate::models::{FilterConfig, RawRecord};

/// True when `record` satisfies every active predicate of `config`
pub fn matches(record: &RawRecord, config: &FilterConfig) -> bool {
    // Time labels compare as strings, which only orders within a single day
    if let Some((start, end)) = &config.time_range {
        if record.time.as_str() < start.as_str() || record.time.as_str() > end.as_str() {
            return false;
        }
    }

    if !config.categories.is_empty() && !config.categories.contains(&record.category) {
        return false;
    }

    if !config.regions.is_empty() && !config.regions.contains(&record.region) {
        return false;
    }

    if !config.product_lines.is_empty() && !config.product_lines.contains(&record.product_line) {
        return false;
    }

    true
}

/// Records passing `config`, in their original order
pub fn apply(records: &[RawRecord], config: &FilterConfig) -> Vec<RawRecord> {
    if config.is_empty() {
        return records.to_vec();
    }
    records
        .iter()
        .filter(|record| matches(record, config))
        .cloned()
        .collect()
}
