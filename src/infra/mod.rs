//! Infrastructure - configuration, reference data, and metrics
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults)
//! - `places` - Known-places reference table (CSV loading, built-in fallback)
//! - `metrics` - Lock-free pipeline counters

pub mod config;
pub mod metrics;
pub mod places;

// Re-export commonly used types
pub use config::{Config, RoutingMode, StrategyKind};
pub use metrics::{Metrics, MetricsSummary};
pub use places::PlaceTable;
