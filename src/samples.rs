//! Sample types shared by the counter source and the stats aggregator
//!
//! A [`RawRecord`] is one line of counter utility output split on commas.
//! A [`StatVector`] is the normalized form handed to the caller, one fraction
//! per [`Counter`].

use serde::{Deserialize, Serialize};

/// One line of counter output, split on commas but otherwise untouched
///
/// Field 0 is the sample timestamp; the remaining fields are quoted
/// percentages in the order the counters were requested.
pub type RawRecord = Vec<String>;

/// The fixed performance counters sampled by a stats session
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Counter {
    /// Total processor busy time
    Cpu,
    /// Committed memory in use
    Memory,
    /// Page file usage
    Swap,
    /// Physical disk busy time
    Disk,
}

impl Counter {
    /// All counters, in the order their values appear in a [`StatVector`]
    pub const ALL: [Counter; 4] = [Counter::Cpu, Counter::Memory, Counter::Swap, Counter::Disk];

    /// Performance counter path passed to the sampling utility
    pub fn path(self) -> &'static str {
        match self {
            Counter::Cpu => r"\Processor(_Total)\% Processor Time",
            Counter::Memory => r"\Memory\% Committed Bytes In Use",
            Counter::Swap => r"\Paging file(_Total)\% Usage",
            Counter::Disk => r"\PhysicalDisk(_Total)\% Disk Time",
        }
    }

    /// Short label used in log lines and rendered output
    pub fn label(self) -> &'static str {
        match self {
            Counter::Cpu => "CPU",
            Counter::Memory => "Mem",
            Counter::Swap => "Swap",
            Counter::Disk => "Disk",
        }
    }

    /// Position of this counter's value in a [`StatVector`]
    pub fn index(self) -> usize {
        match self {
            Counter::Cpu => 0,
            Counter::Memory => 1,
            Counter::Swap => 2,
            Counter::Disk => 3,
        }
    }
}

/// Normalized utilization values, one per counter
///
/// Each value is the raw percentage divided by 100. Values are not clamped,
/// so a counter reporting more than 100% yields a value above 1.0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct StatVector(Vec<f64>);

impl StatVector {
    /// A vector of `width` zeros
    pub fn zeroed(width: usize) -> Self {
        Self(vec![0.0; width])
    }

    pub fn from_values(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn into_values(self) -> Vec<f64> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value for `counter`, if the vector is wide enough to hold it
    pub fn get(&self, counter: Counter) -> Option<f64> {
        self.0.get(counter.index()).copied()
    }

    /// True when every value is exactly zero
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_order_matches_index() {
        for (i, counter) in Counter::ALL.iter().enumerate() {
            assert_eq!(counter.index(), i);
        }
    }

    #[test]
    fn test_counter_paths() {
        let paths: Vec<&str> = Counter::ALL.iter().map(|c| c.path()).collect();
        assert_eq!(
            paths,
            vec![
                r"\Processor(_Total)\% Processor Time",
                r"\Memory\% Committed Bytes In Use",
                r"\Paging file(_Total)\% Usage",
                r"\PhysicalDisk(_Total)\% Disk Time",
            ]
        );
    }

    #[test]
    fn test_zeroed_vector() {
        let zeros = StatVector::zeroed(4);
        assert_eq!(zeros.len(), 4);
        assert!(zeros.is_zero());
        assert_eq!(zeros.get(Counter::Disk), Some(0.0));
    }

    #[test]
    fn test_get_out_of_range() {
        let narrow = StatVector::from_values(vec![0.5]);
        assert_eq!(narrow.get(Counter::Cpu), Some(0.5));
        assert_eq!(narrow.get(Counter::Memory), None);
    }

    #[test]
    fn test_stat_vector_serializes_as_array() {
        let stats = StatVector::from_values(vec![0.25, 0.5, 0.0, 1.5]);
        assert_eq!(serde_json::to_string(&stats).unwrap(), "[0.25,0.5,0.0,1.5]");
    }

    #[test]
    fn test_counter_serialization() {
        assert_eq!(serde_json::to_string(&Counter::Cpu).unwrap(), "\"cpu\"");
        assert_eq!(serde_json::to_string(&Counter::Swap).unwrap(), "\"swap\"");
    }
}
