use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use metrics::counter;
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregator::Aggregator;
use crate::batch::BatchComposer;
use crate::config::Config;
use crate::event::Event;
use crate::rate::Rate;
use crate::time::TimeSource;
use crate::verify::SentTally;

/// How much load to generate and how to spread it over virtual users.
#[derive(Clone, Debug)]
pub struct LoadPlan {
    pub virtual_users: usize,
    pub batch_size: usize,
    pub duplicate_rate: Rate,
    /// Event budget shared by all users. The last batch may be smaller.
    pub total_events: usize,
    /// Wall-clock cap; users stop claiming batches once it has passed.
    pub duration: Duration,
    pub pause: Duration,
    pub seed: Option<u64>,
}

impl LoadPlan {
    pub fn from_config(config: &Config) -> Self {
        Self {
            virtual_users: config.virtual_users.get(),
            batch_size: config.batch_size.get(),
            duplicate_rate: config.duplicate_rate,
            total_events: config.total_events.get(),
            duration: config.run_duration.0,
            pause: config.pause_between_batches.0,
            seed: config.seed,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RunError {
    #[error("no events were published, {failed_batches} batches failed")]
    NothingPublished { failed_batches: u64 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Batches acknowledged by the aggregator.
    pub batches: u64,
    pub events: u64,
    /// Acknowledged events whose id had not been acknowledged before. An
    /// original whose batch was rejected turns into one of these when a later
    /// redelivery of it is accepted.
    pub originals: u64,
    /// Acknowledged events whose id had already been acknowledged.
    pub duplicates: u64,
    /// Duplicates asked for, including those a cold cache could not provide.
    pub requested_duplicates: u64,
    pub failed_batches: u64,
    pub failed_events: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Acknowledged traffic, the baseline the aggregator's counters are held to.
    pub fn sent(&self) -> SentTally {
        SentTally {
            events: self.events,
            originals: self.originals,
            duplicates: self.duplicates,
        }
    }

    /// Share of publish attempts that failed.
    pub fn error_rate(&self) -> f64 {
        let attempts = self.batches + self.failed_batches;
        if attempts == 0 {
            0.0
        } else {
            self.failed_batches as f64 / attempts as f64
        }
    }

    /// A run that published nothing has nothing to verify.
    pub fn ensure_published(&self) -> Result<(), RunError> {
        if self.events > 0 {
            Ok(())
        } else {
            Err(RunError::NothingPublished {
                failed_batches: self.failed_batches,
            })
        }
    }

    pub fn events_per_second(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds > 0.0 {
            self.events as f64 / seconds
        } else {
            0.0
        }
    }
}

#[derive(Default)]
struct RunCounters {
    attempts: AtomicU64,
    batches: AtomicU64,
    events: AtomicU64,
    originals: AtomicU64,
    duplicates: AtomicU64,
    requested_duplicates: AtomicU64,
    failed_batches: AtomicU64,
    failed_events: AtomicU64,
}

struct Shared<T> {
    composer: Arc<BatchComposer<T>>,
    aggregator: Arc<dyn Aggregator + Send + Sync>,
    plan: LoadPlan,
    budget: AtomicUsize,
    deadline: Instant,
    counters: RunCounters,
    /// Ids acknowledged so far, mirroring the aggregator's deduplication.
    delivered: Mutex<HashSet<String>>,
}

impl<T> Shared<T> {
    /// Take up to one batch worth of events from the budget, 0 once it is spent.
    fn claim(&self) -> usize {
        let batch_size = self.plan.batch_size;
        self.budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                if left == 0 || batch_size == 0 {
                    None
                } else {
                    Some(left - left.min(batch_size))
                }
            })
            .map(|left| left.min(batch_size))
            .unwrap_or(0)
    }

    /// Record an acknowledged batch. Returns how many of its events are first
    /// deliveries and how many repeat an id already delivered.
    fn record_delivery(&self, events: &[Event]) -> (u64, u64) {
        let mut delivered = self.delivered.lock().unwrap_or_else(PoisonError::into_inner);
        let firsts = events
            .iter()
            .filter(|event| delivered.insert(event.event_id.clone()))
            .count() as u64;
        (firsts, events.len() as u64 - firsts)
    }
}

/// Drives `virtual_users` concurrent generate/publish loops against one aggregator.
///
/// All users share the composer, hence the generator's id counter and the
/// rolling cache. Publish outcomes are tallied but never influence what is
/// generated next.
pub struct LoadRun<T> {
    composer: Arc<BatchComposer<T>>,
    aggregator: Arc<dyn Aggregator + Send + Sync>,
    plan: LoadPlan,
}

impl<T: TimeSource + Send + Sync + 'static> LoadRun<T> {
    pub fn new(
        composer: Arc<BatchComposer<T>>,
        aggregator: Arc<dyn Aggregator + Send + Sync>,
        plan: LoadPlan,
    ) -> Self {
        Self {
            composer,
            aggregator,
            plan,
        }
    }

    /// Run until the event budget is spent or the duration has passed.
    ///
    /// Dropping the returned future aborts every virtual user.
    pub async fn run(&self) -> RunSummary {
        let started = Instant::now();
        let shared = Arc::new(Shared {
            composer: self.composer.clone(),
            aggregator: self.aggregator.clone(),
            plan: self.plan.clone(),
            budget: AtomicUsize::new(self.plan.total_events),
            deadline: started + self.plan.duration,
            counters: RunCounters::default(),
            delivered: Mutex::new(HashSet::new()),
        });

        info!(
            virtual_users = self.plan.virtual_users,
            total_events = self.plan.total_events,
            batch_size = self.plan.batch_size,
            duplicate_rate = %self.plan.duplicate_rate,
            "starting load run"
        );

        let mut users = JoinSet::new();
        for user in 0..self.plan.virtual_users {
            users.spawn(virtual_user(shared.clone(), user));
        }
        while let Some(result) = users.join_next().await {
            if let Err(error) = result {
                warn!("virtual user stopped abnormally: {}", error);
            }
        }

        let counters = &shared.counters;
        let summary = RunSummary {
            batches: counters.batches.load(Ordering::SeqCst),
            events: counters.events.load(Ordering::SeqCst),
            originals: counters.originals.load(Ordering::SeqCst),
            duplicates: counters.duplicates.load(Ordering::SeqCst),
            requested_duplicates: counters.requested_duplicates.load(Ordering::SeqCst),
            failed_batches: counters.failed_batches.load(Ordering::SeqCst),
            failed_events: counters.failed_events.load(Ordering::SeqCst),
            elapsed: started.elapsed(),
        };

        info!(
            batches = summary.batches,
            events = summary.events,
            duplicates = summary.duplicates,
            generated = self.composer.generator().generated(),
            cached = self.composer.cache().len(),
            failed_batches = summary.failed_batches,
            elapsed = ?summary.elapsed,
            events_per_second = summary.events_per_second(),
            "load run completed"
        );

        summary
    }
}

fn user_rng(seed: Option<u64>, user: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(user as u64)),
        None => StdRng::from_entropy(),
    }
}

async fn virtual_user<T: TimeSource>(shared: Arc<Shared<T>>, user: usize) {
    let mut rng = user_rng(shared.plan.seed, user);
    let counters = &shared.counters;

    while Instant::now() < shared.deadline {
        let size = shared.claim();
        if size == 0 {
            break;
        }

        let batch = shared
            .composer
            .generate_batch(&mut rng, size, shared.plan.duplicate_rate);
        counters
            .requested_duplicates
            .fetch_add(batch.requested_duplicates as u64, Ordering::SeqCst);

        if batch.is_empty() {
            debug!(user, "nothing to publish, cache is still cold");
        } else {
            let attempt = counters.attempts.fetch_add(1, Ordering::SeqCst) + 1;

            match shared.aggregator.publish(&batch.events).await {
                Ok(ack) => {
                    if ack.queued != batch.len() as u64 {
                        warn!(
                            user,
                            queued = ack.queued,
                            sent = batch.len(),
                            "aggregator queued a different number of events than sent"
                        );
                    }
                    let (firsts, repeats) = shared.record_delivery(&batch.events);
                    counters.batches.fetch_add(1, Ordering::SeqCst);
                    counters
                        .events
                        .fetch_add(batch.len() as u64, Ordering::SeqCst);
                    counters.originals.fetch_add(firsts, Ordering::SeqCst);
                    counters.duplicates.fetch_add(repeats, Ordering::SeqCst);
                    counter!("loadgen_batches_published_total").increment(1);
                    counter!("loadgen_events_published_total").increment(batch.len() as u64);
                }
                Err(error) => {
                    counters.failed_batches.fetch_add(1, Ordering::SeqCst);
                    counters
                        .failed_events
                        .fetch_add(batch.len() as u64, Ordering::SeqCst);
                    counter!("loadgen_publish_errors_total").increment(1);
                    warn!(user, attempt, "failed to publish batch: {}", error);
                }
            }

            if attempt % 10 == 0 {
                info!(
                    "progress: {}/{} events sent, {} failed batches",
                    counters.events.load(Ordering::SeqCst),
                    shared.plan.total_events,
                    counters.failed_batches.load(Ordering::SeqCst)
                );
            }
        }

        if !shared.plan.pause.is_zero() {
            tokio::time::sleep(shared.plan.pause).await;
        }
    }
}
