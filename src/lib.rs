//! Live analytics dashboard core: a bounded record set, filtering and
//! group-by aggregation with a memoized result cache, snapshots, export and
//! import, plus the timers and HTTP feed that drive it.

pub mod aggregator;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod generator;
pub mod history;
pub mod models;
pub mod persistence;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod tests;

pub use error::{DashboardError, Result};
