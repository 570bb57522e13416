use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Topic information reported next to the counters. Some aggregators list the
/// topics they have seen, others only report how many there are.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Topics {
    Count(u64),
    Names(BTreeSet<String>),
}

impl fmt::Display for Topics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topics::Count(count) => write!(f, "{}", count),
            Topics::Names(names) => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                write!(f, "{}", names.join(","))
            }
        }
    }
}

/// Point-in-time copy of the aggregator's cumulative counters.
///
/// Every counter is required: a snapshot missing one cannot be reconciled.
/// Extra fields such as `uptime_seconds` are ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub unique_processed: u64,
    pub duplicate_dropped: u64,
    pub topics: Topics,
}

impl StatsSnapshot {
    pub fn from_slice(body: &[u8]) -> Result<StatsSnapshot, serde_json::Error> {
        serde_json::from_slice(body)
    }
}
