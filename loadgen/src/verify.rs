//! Reconciliation of the aggregator's counters against what was generated.
//!
//! Everything here is a pure function of two [`StatsSnapshot`]s and the run's
//! expectations: nothing is fetched and nothing is mutated.
use std::fmt;

use thiserror::Error;

use crate::rate::Rate;
use crate::stats::{StatsSnapshot, Topics};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum VerifyError {
    #[error("counter {counter} went backwards from {pre} to {post}, was the aggregator reset?")]
    CounterRegressed {
        counter: &'static str,
        pre: u64,
        post: u64,
    },
    #[error(
        "data integrity violation: received {received} events but classified \
         {unique} unique + {duplicates} duplicate"
    )]
    Inconsistent {
        received: u64,
        unique: u64,
        duplicates: u64,
    },
}

/// Acknowledged traffic, split the way a deduplicating aggregator sees it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SentTally {
    pub events: u64,
    /// First acknowledged copy of each event id.
    pub originals: u64,
    /// Later acknowledged copies of an id.
    pub duplicates: u64,
}

impl SentTally {
    /// Duplicate share of what was sent, warm-up shortfall included.
    pub fn duplicate_rate(&self) -> Option<f64> {
        ratio(self.duplicates, self.events)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Expectations {
    pub duplicate_rate: Rate,
    /// Allowed absolute deviation of the observed duplicate rate.
    pub tolerance: Rate,
    pub sent: Option<SentTally>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CounterDeltas {
    pub received: u64,
    pub unique_processed: u64,
    pub duplicate_dropped: u64,
}

#[derive(Clone, Debug)]
pub struct Reconciliation {
    pub deltas: CounterDeltas,
    pub topics: Topics,
    pub expectations: Expectations,
}

pub fn reconcile(
    pre: &StatsSnapshot,
    post: &StatsSnapshot,
    expectations: Expectations,
) -> Result<Reconciliation, VerifyError> {
    let deltas = CounterDeltas {
        received: delta("received", pre.received, post.received)?,
        unique_processed: delta(
            "unique_processed",
            pre.unique_processed,
            post.unique_processed,
        )?,
        duplicate_dropped: delta(
            "duplicate_dropped",
            pre.duplicate_dropped,
            post.duplicate_dropped,
        )?,
    };

    Ok(Reconciliation {
        deltas,
        topics: post.topics.clone(),
        expectations,
    })
}

fn delta(counter: &'static str, pre: u64, post: u64) -> Result<u64, VerifyError> {
    post.checked_sub(pre)
        .ok_or(VerifyError::CounterRegressed { counter, pre, post })
}

fn ratio(part: u64, whole: u64) -> Option<f64> {
    if whole == 0 {
        None
    } else {
        Some(part as f64 / whole as f64)
    }
}

impl Reconciliation {
    /// Every received event was classified exactly once.
    pub fn is_consistent(&self) -> bool {
        let classified = self
            .deltas
            .unique_processed
            .checked_add(self.deltas.duplicate_dropped);
        classified == Some(self.deltas.received)
    }

    /// Fails on a classification mismatch. Rate deviation never fails here.
    pub fn check(&self) -> Result<(), VerifyError> {
        if self.is_consistent() {
            Ok(())
        } else {
            Err(VerifyError::Inconsistent {
                received: self.deltas.received,
                unique: self.deltas.unique_processed,
                duplicates: self.deltas.duplicate_dropped,
            })
        }
    }

    /// `Δdup / Δreceived`, undefined when nothing was received.
    pub fn observed_rate(&self) -> Option<f64> {
        ratio(self.deltas.duplicate_dropped, self.deltas.received)
    }

    /// The rate the observed one should be compared against: what was really
    /// sent when a tally is known, so cold-cache batches do not count as
    /// deviation, otherwise the configured rate.
    pub fn expected_rate(&self) -> f64 {
        self.expectations
            .sent
            .and_then(|sent| sent.duplicate_rate())
            .unwrap_or(self.expectations.duplicate_rate.value())
    }

    pub fn rate_deviation(&self) -> Option<f64> {
        self.observed_rate()
            .map(|observed| (observed - self.expected_rate()).abs())
    }

    pub fn rate_within_tolerance(&self) -> Option<bool> {
        self.rate_deviation()
            .map(|deviation| deviation <= self.expectations.tolerance.value())
    }
}

fn percent(rate: Option<f64>) -> String {
    match rate {
        Some(rate) => format!("{:.1}%", rate * 100.0),
        None => "n/a".to_string(),
    }
}

impl fmt::Display for Reconciliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deltas = &self.deltas;
        writeln!(f, "Verification:")?;
        writeln!(f, "  Received: +{}", deltas.received)?;
        writeln!(f, "  Unique: +{}", deltas.unique_processed)?;
        writeln!(f, "  Duplicates: +{}", deltas.duplicate_dropped)?;
        writeln!(f, "  Topics: {}", self.topics)?;
        writeln!(
            f,
            "  Unique + Duplicates: {}",
            u128::from(deltas.unique_processed) + u128::from(deltas.duplicate_dropped)
        )?;
        writeln!(
            f,
            "  Match: {}",
            if self.is_consistent() { "yes" } else { "NO" }
        )?;
        writeln!(
            f,
            "  Expected duplicate rate: {}",
            self.expectations.duplicate_rate
        )?;
        if let Some(sent) = self.expectations.sent {
            writeln!(
                f,
                "  Generated duplicate rate: {}",
                percent(sent.duplicate_rate())
            )?;
            writeln!(
                f,
                "  Events sent: {} ({} originals, {} duplicates)",
                sent.events, sent.originals, sent.duplicates
            )?;
            if sent.events != deltas.received {
                writeln!(
                    f,
                    "  Sent vs received: {} sent, {} received",
                    sent.events, deltas.received
                )?;
            }
        }
        write!(f, "  Actual duplicate rate: {}", percent(self.observed_rate()))?;
        match self.rate_within_tolerance() {
            Some(true) => write!(f, " (within {})", self.expectations.tolerance),
            Some(false) => write!(
                f,
                " (outside {} of {})",
                self.expectations.tolerance,
                percent(Some(self.expected_rate()))
            ),
            None => Ok(()),
        }
    }
}
