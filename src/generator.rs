//! Synthetic data source standing in for a live feed.

use chrono::{DateTime, Duration, Local};
use rand::seq::IndexedRandom;
use rand::Rng;

use crate::error::{DashboardError, Result};
use crate::models::RawRecord;

pub const CATEGORIES: [&str; 4] = ["A", "B", "C", "D"];
pub const REGIONS: [&str; 4] = ["North", "South", "East", "West"];
pub const PRODUCT_LINES: [&str; 3] = ["Line 1", "Line 2", "Line 3"];

/// Label format for record times; string order matches time order within a day
pub const TIME_LABEL_FORMAT: &str = "%H:%M:%S";

pub fn time_label(at: DateTime<Local>) -> String {
    at.format(TIME_LABEL_FORMAT).to_string()
}

fn pick<R: Rng + ?Sized>(rng: &mut R, options: &[&'static str]) -> String {
    options.choose(rng).copied().unwrap_or_default().to_string()
}

/// One randomly attributed record stamped with `time`
pub fn generate_record<R: Rng + ?Sized>(rng: &mut R, time: String) -> RawRecord {
    RawRecord {
        time,
        value: rng.random_range(10..110) as f64,
        category: pick(rng, &CATEGORIES),
        region: pick(rng, &REGIONS),
        product_line: pick(rng, &PRODUCT_LINES),
    }
}

/// `count` records ending at `now`, spaced `step` apart, oldest first.
///
/// Offsets that fall outside the representable range are stamped `now`.
pub fn seed_records<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    now: DateTime<Local>,
    step: Duration,
) -> Vec<RawRecord> {
    (0..count)
        .map(|i| {
            let at = i32::try_from(count - 1 - i)
                .ok()
                .and_then(|n| step.checked_mul(n))
                .and_then(|back| now.checked_sub_signed(back))
                .unwrap_or(now);
            generate_record(rng, time_label(at))
        })
        .collect()
}

/// Polls the synthetic source; each poll fails with probability `failure_rate`
pub struct DataFeed<R> {
    rng: R,
    failure_rate: f64,
    max_retries: u32,
}

/// Result of one feed tick
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub record: RawRecord,
    /// Failed polls before this record was produced
    pub failed_attempts: u32,
}

impl<R: Rng> DataFeed<R> {
    pub fn new(rng: R, failure_rate: f64, max_retries: u32) -> Self {
        Self {
            rng,
            failure_rate: failure_rate.clamp(0.0, 1.0),
            max_retries,
        }
    }

    fn poll_once(&mut self, time: &str) -> Option<RawRecord> {
        if self.rng.random_bool(self.failure_rate) {
            return None;
        }
        Some(generate_record(&mut self.rng, time.to_string()))
    }

    /// One tick: the initial poll plus up to `max_retries` retries
    pub fn next_record(&mut self, time: &str) -> Result<Delivery> {
        let attempts = self.max_retries + 1;
        for attempt in 0..attempts {
            if let Some(record) = self.poll_once(time) {
                return Ok(Delivery {
                    record,
                    failed_attempts: attempt,
                });
            }
        }
        Err(DashboardError::SourceUnavailable { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use chrono::TimeZone;
    use rand::SeedableRng;

    #[test]
    fn test_generated_records_use_known_attributes() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let record = generate_record(&mut rng, "10:00:00".to_string());
            assert!((10.0..110.0).contains(&record.value));
            assert!(CATEGORIES.contains(&record.category.as_str()));
            assert!(REGIONS.contains(&record.region.as_str()));
            assert!(PRODUCT_LINES.contains(&record.product_line.as_str()));
        }
    }

    #[test]
    fn test_seed_records_are_time_ordered() {
        let mut rng = StdRng::seed_from_u64(1);
        let now = Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let records = seed_records(&mut rng, 5, now, Duration::seconds(5));

        assert_eq!(records.len(), 5);
        assert_eq!(records[0].time, "11:59:40");
        assert_eq!(records[4].time, "12:00:00");
        assert!(records.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[test]
    fn test_seed_records_with_unrepresentable_offsets_stay_at_now() {
        let mut rng = StdRng::seed_from_u64(1);
        let now = Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let records = seed_records(&mut rng, 3, now, Duration::days(100_000_000));

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.time == "12:00:00"));
    }

    #[test]
    fn test_feed_always_failing_reports_attempts() {
        let mut feed = DataFeed::new(StdRng::seed_from_u64(3), 1.0, 3);
        match feed.next_record("10:00:00") {
            Err(DashboardError::SourceUnavailable { attempts }) => assert_eq!(attempts, 4),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_feed_never_failing_delivers_first_try() {
        let mut feed = DataFeed::new(StdRng::seed_from_u64(3), 0.0, 3);
        let delivery = feed.next_record("10:00:00").unwrap();
        assert_eq!(delivery.failed_attempts, 0);
        assert_eq!(delivery.record.time, "10:00:00");
    }
}
