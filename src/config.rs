use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DashboardError, Result};

/// Longest accepted feed interval, one day
pub const MAX_TICK_INTERVAL_MS: u64 = 86_400_000;

/// Runtime settings for the store, the data feed and the HTTP feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    /// Most recent records kept; older ones are evicted first
    pub max_records: usize,
    /// Size of the synthetic record set created at startup
    pub seed_records: usize,
    pub cache_capacity: usize,
    pub snapshot_capacity: usize,
    pub history_capacity: usize,
    pub tick_interval_ms: u64,
    /// Chance that one feed poll fails
    pub failure_rate: f64,
    /// Extra polls attempted within a tick after a failure
    pub max_retries: u32,
    pub debounce_ms: u64,
    pub throttle_ms: u64,
    /// Recomputations slower than this are logged
    pub slow_recompute_ms: u64,
    pub db_path: PathBuf,
    pub bind_addr: SocketAddr,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            max_records: 100,
            seed_records: 20,
            cache_capacity: 10,
            snapshot_capacity: 10,
            history_capacity: 10,
            tick_interval_ms: 5000,
            failure_rate: 0.05,
            max_retries: 3,
            debounce_ms: 300,
            throttle_ms: 1000,
            slow_recompute_ms: 100,
            db_path: PathBuf::from("dashboard.db"),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, target: &mut T) -> Result<()> {
    let key = format!("DASHBOARD_{}", name.to_uppercase());
    if let Some(raw) = lookup(&key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| DashboardError::InvalidConfig(format!("{key}={raw:?} is not valid")))?;
    }
    Ok(())
}

impl DashboardConfig {
    /// Defaults overridden by `DASHBOARD_<FIELD>` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        parse_var(&lookup, "max_records", &mut config.max_records)?;
        parse_var(&lookup, "seed_records", &mut config.seed_records)?;
        parse_var(&lookup, "cache_capacity", &mut config.cache_capacity)?;
        parse_var(&lookup, "snapshot_capacity", &mut config.snapshot_capacity)?;
        parse_var(&lookup, "history_capacity", &mut config.history_capacity)?;
        parse_var(&lookup, "tick_interval_ms", &mut config.tick_interval_ms)?;
        parse_var(&lookup, "failure_rate", &mut config.failure_rate)?;
        parse_var(&lookup, "max_retries", &mut config.max_retries)?;
        parse_var(&lookup, "debounce_ms", &mut config.debounce_ms)?;
        parse_var(&lookup, "throttle_ms", &mut config.throttle_ms)?;
        parse_var(&lookup, "slow_recompute_ms", &mut config.slow_recompute_ms)?;
        parse_var(&lookup, "db_path", &mut config.db_path)?;
        parse_var(&lookup, "bind_addr", &mut config.bind_addr)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_records == 0 {
            return Err(DashboardError::InvalidConfig("max_records must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(DashboardError::InvalidConfig(
                "failure_rate must be within [0, 1]".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 || self.tick_interval_ms > MAX_TICK_INTERVAL_MS {
            return Err(DashboardError::InvalidConfig(format!(
                "tick_interval_ms must be within 1..={MAX_TICK_INTERVAL_MS}"
            )));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn slow_recompute(&self) -> Duration {
        Duration::from_millis(self.slow_recompute_ms)
    }
}
