//! End-to-end checks across the store, the feed and local persistence.

use std::sync::{Arc, Mutex};

use chrono::{Duration, Local};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::NamedTempFile;

use crate::aggregator;
use crate::config::DashboardConfig;
use crate::filter;
use crate::generator::{seed_records, DataFeed};
use crate::models::FilterConfig;
use crate::persistence::StateRepository;
use crate::scheduler::{lock, tick_once};
use crate::store::DashboardStore;

fn seeded_store(config: &DashboardConfig) -> DashboardStore {
    let mut rng = StdRng::seed_from_u64(42);
    let records = seed_records(&mut rng, config.seed_records, Local::now(), Duration::seconds(5));
    DashboardStore::with_records(config, records)
}

#[test]
fn test_seeded_store_has_consistent_views() {
    let config = DashboardConfig::default();
    let store = seeded_store(&config);

    assert_eq!(store.records().len(), config.seed_records);
    let fresh = aggregator::compute(store.records(), store.aggregation_config());
    assert_eq!(store.views(), &fresh);

    // Category totals add up to the sum of all values
    let total: f64 = store.records().iter().map(|r| r.value).sum();
    let by_category: f64 = store.views().category_totals.iter().map(|c| c.value).sum();
    assert!((total - by_category).abs() < 1e-9);
}

#[test]
fn test_state_survives_restart() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();
    let config = DashboardConfig::default();

    let exported = {
        let mut store = seeded_store(&config);
        store.set_filter_config(FilterConfig {
            categories: ["A".to_string(), "C".to_string()].into(),
            ..Default::default()
        });
        let repo = StateRepository::open(&path).unwrap();
        repo.save_state(&store.bundle()).unwrap();
        store.export_data().unwrap()
    };

    // Simulated restart
    let repo = StateRepository::open(&path).unwrap();
    let bundle = repo.load_state().unwrap().unwrap();
    let restored = DashboardStore::from_bundle(&config, bundle);

    let mut imported = DashboardStore::new(&config);
    imported.import_data(&exported).unwrap();

    assert_eq!(restored.records(), imported.records());
    assert_eq!(restored.filter_config(), imported.filter_config());
    assert_eq!(restored.views(), imported.views());

    let expected = aggregator::compute(
        &filter::apply(restored.records(), restored.filter_config()),
        restored.aggregation_config(),
    );
    assert_eq!(restored.views(), &expected);
}

#[test]
fn test_feed_ticks_respect_record_bound() {
    let config = DashboardConfig {
        max_records: 5,
        ..Default::default()
    };
    let store = Arc::new(Mutex::new(DashboardStore::new(&config)));
    let feed = Arc::new(Mutex::new(DataFeed::new(StdRng::seed_from_u64(5), 0.0, 3)));

    for _ in 0..8 {
        tick_once(&store, &feed);
    }

    let store = lock(&store);
    assert_eq!(store.records().len(), 5);
    assert!(store.ui().error.is_none());
    assert_eq!(store.ui().retry_count, 0);
}
