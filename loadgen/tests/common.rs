#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Once};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use envconfig::Envconfig;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use loadgen::config::Config;

pub static DEFAULT_CONFIG: Lazy<Config> = Lazy::new(|| {
    let env = HashMap::from([
        ("TOTAL_EVENTS".to_string(), "2000".to_string()),
        ("BATCH_SIZE".to_string(), "100".to_string()),
        ("VIRTUAL_USERS".to_string(), "4".to_string()),
        ("PAUSE_BETWEEN_BATCHES".to_string(), "0".to_string()),
        ("SETTLE_DELAY".to_string(), "0".to_string()),
        ("REQUEST_TIMEOUT".to_string(), "5000".to_string()),
        ("HEALTH_TIMEOUT".to_string(), "2000".to_string()),
        ("HEALTH_POLL_INTERVAL".to_string(), "50".to_string()),
        ("SEED".to_string(), "1234".to_string()),
    ]);
    Config::init_from_hashmap(&env).unwrap()
});

static TRACING_INIT: Once = Once::new();
pub fn setup_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_writer(tracing_subscriber::fmt::TestWriter::new())
            .init()
    });
}

/// How the mock aggregator misbehaves.
#[derive(Clone, Copy, Debug, Default)]
pub struct Faults {
    pub unhealthy: bool,
    /// Reject every n-th publish with a 503, counting nothing.
    pub reject_every: Option<u64>,
    pub malformed_stats: bool,
    pub stats_status: Option<StatusCode>,
    /// Count this many extra events as received without classifying them.
    pub lose_events: u64,
}

#[derive(Default)]
struct Counters {
    publishes: u64,
    received: u64,
    unique_processed: u64,
    duplicate_dropped: u64,
    seen: HashSet<(String, String)>,
    topics: BTreeSet<String>,
}

#[derive(Clone)]
struct MockState {
    faults: Faults,
    counters: Arc<Mutex<Counters>>,
}

/// In-process aggregator that deduplicates on `(topic, event_id)`.
pub struct MockAggregator {
    pub addr: SocketAddr,
    counters: Arc<Mutex<Counters>>,
}

impl MockAggregator {
    pub async fn start() -> Self {
        Self::with_faults(Faults::default()).await
    }

    pub async fn with_faults(faults: Faults) -> Self {
        let counters = Arc::new(Mutex::new(Counters::default()));
        let state = MockState {
            faults,
            counters: counters.clone(),
        };

        let app = Router::new()
            .route("/health", get(health))
            .route("/stats", get(stats))
            .route("/publish", post(publish))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("could not bind mock aggregator");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("mock aggregator failed")
        });

        Self { addr, counters }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn received(&self) -> u64 {
        self.counters.lock().unwrap().received
    }

    pub fn publishes(&self) -> u64 {
        self.counters.lock().unwrap().publishes
    }
}

async fn health(State(state): State<MockState>) -> Response {
    if state.faults.unhealthy {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "starting"})),
        )
            .into_response()
    } else {
        Json(json!({"status": "healthy"})).into_response()
    }
}

async fn stats(State(state): State<MockState>) -> Response {
    if let Some(status) = state.faults.stats_status {
        return status.into_response();
    }
    if state.faults.malformed_stats {
        return Json(json!({"received": "lots", "unique_processed": 1})).into_response();
    }

    let counters = state.counters.lock().unwrap();
    Json(json!({
        "received": counters.received,
        "unique_processed": counters.unique_processed,
        "duplicate_dropped": counters.duplicate_dropped,
        "topics": counters.topics,
        "uptime_seconds": 1.5,
        "status": "running",
    }))
    .into_response()
}

async fn publish(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    let mut counters = state.counters.lock().unwrap();
    counters.publishes += 1;

    if let Some(every) = state.faults.reject_every {
        if counters.publishes % every == 0 {
            return (StatusCode::SERVICE_UNAVAILABLE, "queue full").into_response();
        }
    }

    let Some(events) = body["events"].as_array() else {
        return (StatusCode::BAD_REQUEST, "missing events").into_response();
    };

    for event in events {
        let topic = event["topic"].as_str().unwrap_or_default().to_string();
        let event_id = event["event_id"].as_str().unwrap_or_default().to_string();

        counters.received += 1;
        counters.topics.insert(topic.clone());
        if counters.seen.insert((topic, event_id)) {
            counters.unique_processed += 1;
        } else {
            counters.duplicate_dropped += 1;
        }
    }
    counters.received += state.faults.lose_events;

    (
        StatusCode::ACCEPTED,
        Json(json!({"queued": events.len()})),
    )
        .into_response()
}
