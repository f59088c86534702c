use std::time::{Duration, Instant};

use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregator::Aggregator;
use crate::config::DashboardConfig;
use crate::error::{DashboardError, Result};
use crate::export::{self, ExportView, StateBundle};
use crate::filter;
use crate::history::{HistoryRecord, RingLog, Snapshot};
use crate::models::{AggregationConfig, DerivedViews, FilterConfig, RawRecord, Theme, UiFlags};

/// Owns the record set and everything derived from it.
///
/// Every mutation that can change the derived views recomputes them before
/// returning, so a reader never sees views that disagree with the records
/// and configuration they were built from.
pub struct DashboardStore {
    records: Vec<RawRecord>,
    max_records: usize,
    filter: FilterConfig,
    aggregation: AggregationConfig,
    views: DerivedViews,
    aggregator: Aggregator,
    snapshots: RingLog<Snapshot>,
    history: RingLog<HistoryRecord>,
    ui: UiFlags,
    slow_recompute: Duration,
}

/// Logs each unrecognised `groupBy` entry with its closest known name
fn warn_unknown_dimensions(aggregation: &AggregationConfig) -> Vec<String> {
    aggregation
        .unknown_dimensions()
        .map(|unknown| {
            warn!(
                dimension = unknown.name(),
                suggestion = unknown.suggestion(),
                "unknown groupBy dimension, records fall into the Unknown bucket"
            );
            unknown.name().to_string()
        })
        .collect()
}

impl DashboardStore {
    pub fn new(config: &DashboardConfig) -> Self {
        Self {
            records: Vec::new(),
            max_records: config.max_records.max(1),
            filter: FilterConfig::default(),
            aggregation: AggregationConfig::default(),
            views: DerivedViews::default(),
            aggregator: Aggregator::new(config.cache_capacity),
            snapshots: RingLog::new(config.snapshot_capacity),
            history: RingLog::new(config.history_capacity),
            ui: UiFlags {
                loading: true,
                ..Default::default()
            },
            slow_recompute: config.slow_recompute(),
        }
    }

    /// Store starting from `records`, trimmed to the most recent `max_records`
    pub fn with_records(config: &DashboardConfig, records: Vec<RawRecord>) -> Self {
        let mut store = Self::new(config);
        store.records = records;
        store.trim();
        store.recompute();
        store
    }

    /// Store restored from a persisted bundle
    pub fn from_bundle(config: &DashboardConfig, bundle: StateBundle) -> Self {
        let mut store = Self::new(config);
        store.records = bundle.records;
        store.filter = bundle.filter;
        warn_unknown_dimensions(&bundle.aggregation);
        store.aggregation = bundle.aggregation;
        store.trim();
        store.recompute();
        store
    }

    fn trim(&mut self) {
        if self.records.len() > self.max_records {
            let excess = self.records.len() - self.max_records;
            self.records.drain(..excess);
        }
    }

    fn recompute(&mut self) {
        let started = Instant::now();
        let filtered = filter::apply(&self.records, &self.filter);
        self.views = self.aggregator.aggregate(&filtered, &self.aggregation);
        self.ui.loading = false;

        let elapsed = started.elapsed();
        if elapsed > self.slow_recompute {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                records = self.records.len(),
                "slow view recomputation"
            );
        }
    }

    fn log_action(&mut self, action: &str, payload: serde_json::Value) {
        self.history.push(HistoryRecord::new(action, payload));
    }

    // Readers

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn filtered_records(&self) -> Vec<RawRecord> {
        filter::apply(&self.records, &self.filter)
    }

    pub fn views(&self) -> &DerivedViews {
        &self.views
    }

    pub fn filter_config(&self) -> &FilterConfig {
        &self.filter
    }

    pub fn aggregation_config(&self) -> &AggregationConfig {
        &self.aggregation
    }

    pub fn ui(&self) -> &UiFlags {
        &self.ui
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.to_vec()
    }

    pub fn history(&self) -> Vec<HistoryRecord> {
        self.history.to_vec()
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    // Mutations that recompute the views

    /// Appends one record, evicting the oldest once the bound is exceeded
    pub fn add_record(&mut self, record: RawRecord) {
        self.records.push(record);
        self.trim();
        self.recompute();
    }

    pub fn set_filter_config(&mut self, filter: FilterConfig) {
        info!(?filter, "filter updated");
        self.log_action("filter", serde_json::to_value(&filter).unwrap_or_default());
        self.filter = filter;
        self.recompute();
    }

    pub fn set_aggregation_config(&mut self, aggregation: AggregationConfig) -> Result<()> {
        aggregation.validate()?;
        warn_unknown_dimensions(&aggregation);

        info!(group_by = ?aggregation.group_by, operator = ?aggregation.operator, "aggregation updated");
        self.log_action("aggregation", serde_json::to_value(&aggregation).unwrap_or_default());
        self.aggregation = aggregation;
        self.recompute();
        Ok(())
    }

    /// Replaces records and configuration from a JSON bundle.
    ///
    /// On any failure the current state is kept and the error flag is set.
    pub fn import_data(&mut self, json: &str) -> Result<()> {
        let bundle = match StateBundle::parse(json) {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!(error = %e, "import rejected");
                self.ui.error = Some(e.to_string());
                return Err(e);
            }
        };

        let count = bundle.records.len();
        let unknown = warn_unknown_dimensions(&bundle.aggregation);
        self.records = bundle.records;
        self.filter = bundle.filter;
        self.aggregation = bundle.aggregation;
        self.trim();
        self.recompute();
        self.ui.error = None;

        info!(records = count, "data imported");
        self.log_action(
            "import",
            serde_json::json!({ "records": count, "unknownDimensions": unknown }),
        );
        Ok(())
    }

    pub fn restore_snapshot(&mut self, id: Uuid) -> Result<()> {
        let snapshot = self
            .snapshots
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| DashboardError::SnapshotNotFound(id.to_string()))?;

        self.records = snapshot.data;
        self.trim();
        self.recompute();

        info!(%id, name = %snapshot.name, "snapshot restored");
        self.log_action(
            "restore",
            serde_json::json!({ "id": id, "name": snapshot.name }),
        );
        Ok(())
    }

    /// Drops all records, cached views and the filter
    pub fn clear_data(&mut self) {
        self.records.clear();
        self.filter = FilterConfig::default();
        self.aggregator.clear_cache();
        self.recompute();
        self.log_action("clear", serde_json::Value::Null);
    }

    // Snapshot and export

    pub fn save_snapshot(&mut self, name: impl Into<String>) -> Snapshot {
        let snapshot = Snapshot::new(name, self.records.clone());
        info!(id = %snapshot.id, name = %snapshot.name, records = snapshot.data.len(), "snapshot saved");
        if let Some(dropped) = self.snapshots.push(snapshot.clone()) {
            info!(id = %dropped.id, "oldest snapshot dropped");
        }
        self.log_action(
            "save",
            serde_json::json!({ "id": snapshot.id, "name": snapshot.name }),
        );
        snapshot
    }

    pub fn bundle(&self) -> StateBundle {
        StateBundle::new(self.records.clone(), self.filter.clone(), self.aggregation.clone())
    }

    /// Pretty JSON bundle accepted by [`DashboardStore::import_data`]
    pub fn export_data(&self) -> Result<String> {
        export::to_json(&self.bundle())
    }

    pub fn export_records_json(&self) -> Result<String> {
        export::to_json(&self.records)
    }

    pub fn export_views_json(&self) -> Result<String> {
        export::to_json(&self.views)
    }

    pub fn export_csv(&self, view: ExportView) -> Result<String> {
        match view {
            ExportView::Raw => export::to_csv(&self.records),
            ExportView::TimeSeries => export::to_csv(&self.views.time_series),
            ExportView::Category => export::to_csv(&self.views.category_totals),
            ExportView::Distribution => export::to_csv(&self.views.distribution),
        }
    }

    // UI flags

    pub fn set_theme(&mut self, theme: Theme) {
        self.ui.theme = theme;
    }

    /// Clears the error flag and the retry counter
    pub fn clear_error(&mut self) {
        self.ui.error = None;
        self.ui.retry_count = 0;
    }

    pub fn record_feed_failure(&mut self, message: impl Into<String>) {
        self.ui.retry_count = self.ui.retry_count.saturating_add(1);
        self.ui.error = Some(message.into());
    }

    pub fn record_feed_success(&mut self) {
        self.clear_error();
    }
}
