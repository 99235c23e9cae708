//! Infrastructure layer
//!
//! Configuration, logging and metrics.

mod config;
mod logging;
mod metrics;

pub use config::{Config, SourceConfig};
pub use logging::init_logging;
pub use metrics::{MetricsCollector, RunMetrics};
