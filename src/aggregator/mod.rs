/// Stats aggregator with stall detection
pub mod stats_aggregator;

pub use stats_aggregator::{
    parse_field, parse_percentages, SessionEnd, StatsAggregator, RECORD_BUFFER,
};
