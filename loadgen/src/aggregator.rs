use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use tracing::{debug, info};

use crate::api::{HealthError, PublishAck, PublishError, PublishRequest, StatsError};
use crate::event::Event;
use crate::stats::StatsSnapshot;

/// The service under test, seen through its publish, stats and health endpoints.
#[async_trait]
pub trait Aggregator {
    async fn health(&self) -> Result<(), HealthError>;
    async fn publish(&self, events: &[Event]) -> Result<PublishAck, PublishError>;
    async fn stats(&self) -> Result<StatsSnapshot, StatsError>;
}

#[derive(Clone)]
pub struct HttpAggregator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAggregator {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent("dedup-loadgen")
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Aggregator for HttpAggregator {
    async fn health(&self) -> Result<(), HealthError> {
        let response = self.client.get(self.url("/health")).send().await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(HealthError::Unhealthy(status)),
        }
    }

    async fn publish(&self, events: &[Event]) -> Result<PublishAck, PublishError> {
        let response = self
            .client
            .post(self.url("/publish"))
            .json(&PublishRequest { events })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected { status, body });
        }

        let body = response.bytes().await?;
        serde_json::from_slice::<PublishAck>(&body)
            .map_err(|_| PublishError::InvalidAck(String::from_utf8_lossy(&body).into_owned()))
    }

    async fn stats(&self) -> Result<StatsSnapshot, StatsError> {
        let response = self.client.get(self.url("/stats")).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StatsError::Rejected(status));
        }

        let body = response.bytes().await?;
        Ok(StatsSnapshot::from_slice(&body)?)
    }
}

/// Poll `health` until the aggregator reports healthy or `timeout` elapses.
///
/// A single check never runs past the overall deadline, whatever the client's
/// request timeout.
pub async fn wait_until_healthy<A: Aggregator + ?Sized>(
    aggregator: &A,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), HealthError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut interval = tokio::time::interval(poll_interval);

    loop {
        interval.tick().await;

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, aggregator.health()).await {
            Ok(Ok(())) => {
                info!("aggregator is healthy");
                return Ok(());
            }
            Ok(Err(error)) => debug!("aggregator not ready yet: {}", error),
            Err(_) => debug!("health check still pending at the deadline"),
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(HealthError::TimedOut(timeout));
        }
    }
}
