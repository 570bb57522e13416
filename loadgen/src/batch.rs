use std::sync::Arc;

use metrics::{counter, histogram};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::cache::RollingCache;
use crate::event::Event;
use crate::generator::EventGenerator;
use crate::rate::Rate;
use crate::time::TimeSource;

/// A shuffled batch, plus what it is made of.
///
/// `requested_duplicates` can exceed `duplicates` while the cache is still
/// empty; the batch is then shorter than the size that was asked for.
#[derive(Debug, Clone)]
pub struct ComposedBatch {
    pub events: Vec<Event>,
    pub originals: usize,
    pub duplicates: usize,
    pub requested_duplicates: usize,
}

impl ComposedBatch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Duplicates that could not be produced for lack of cached originals.
    pub fn shortfall(&self) -> usize {
        self.requested_duplicates - self.duplicates
    }
}

/// Mixes fresh originals with redeliveries of cached ones.
pub struct BatchComposer<T> {
    generator: Arc<EventGenerator<T>>,
    cache: Arc<RollingCache>,
}

impl<T: TimeSource> BatchComposer<T> {
    pub fn new(generator: Arc<EventGenerator<T>>, cache: Arc<RollingCache>) -> Self {
        Self { generator, cache }
    }

    pub fn generate_batch<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        size: usize,
        rate: Rate,
    ) -> ComposedBatch {
        let requested_duplicates = rate.duplicates_for(size);
        let originals = size - requested_duplicates;
        let mut events = Vec::with_capacity(size);

        // Duplicates need a cache warmed by earlier batches; this batch's own
        // originals do not count.
        let warm = !self.cache.is_empty();

        for _ in 0..originals {
            let event = self.generator.generate_event(rng);
            self.cache.admit(&event, rng);
            events.push(event);
        }

        if warm {
            for _ in 0..requested_duplicates {
                match self.cache.sample(rng) {
                    Some(original) => {
                        events.push(original.redeliver(self.generator.timesource().now()))
                    }
                    None => break,
                }
            }
        }
        let duplicates = events.len() - originals;

        events.shuffle(rng);

        counter!("loadgen_duplicates_generated_total").increment(duplicates as u64);
        histogram!("loadgen_batch_size").record(events.len() as f64);

        let batch = ComposedBatch {
            events,
            originals,
            duplicates,
            requested_duplicates,
        };
        if batch.shortfall() > 0 {
            tracing::debug!(
                requested_duplicates,
                duplicates,
                "rolling cache empty, batch is short of duplicates"
            );
        }
        batch
    }

    pub fn cache(&self) -> &RollingCache {
        &self.cache
    }

    pub fn generator(&self) -> &EventGenerator<T> {
        &self.generator
    }
}
