/// Counter source driving the performance counter utility
pub mod counter_source;

pub use counter_source::{split_record, CounterSource};
