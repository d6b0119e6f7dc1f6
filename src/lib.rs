/// Error types for sampling sessions and configuration
pub mod error;

/// Raw records, normalized vectors, and the fixed counter set
pub mod samples;

/// Counter source driving the sampling utility
pub mod collectors;

/// Stats aggregator with stall detection
pub mod aggregator;

/// Configuration management
pub mod config;

/// Public sampling entry point
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use error::{CollectorError, ConfigError};
pub use samples::{Counter, RawRecord, StatVector};
pub use session::StatsSession;
