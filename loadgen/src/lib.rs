//! Synthetic traffic for an event aggregator that deduplicates by `event_id`.
//!
//! Batches mix fresh events with late redeliveries of earlier ones at a
//! controlled rate, and the aggregator's counters are reconciled against that
//! mix once the run has drained.
pub mod aggregator;
pub mod api;
pub mod batch;
pub mod cache;
pub mod config;
pub mod event;
pub mod generator;
pub mod metrics;
pub mod rate;
pub mod run;
pub mod stats;
pub mod time;
pub mod verify;
