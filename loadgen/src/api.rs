use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::Event;

#[derive(Debug, Serialize)]
pub struct PublishRequest<'a> {
    pub events: &'a [Event],
}

/// Acknowledgment of a published batch. Only `queued` is required.
#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PublishAck {
    pub queued: u64,
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to send batch: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("batch rejected with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("acknowledgment is missing the queued count: {0}")]
    InvalidAck(String),
}

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("failed to fetch stats: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("stats request rejected with status {0}")]
    Rejected(StatusCode),
    #[error("malformed stats snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum HealthError {
    #[error("aggregator unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("aggregator reported unhealthy with status {0}")]
    Unhealthy(StatusCode),
    #[error("aggregator did not become healthy within {0:?}")]
    TimedOut(std::time::Duration),
}
