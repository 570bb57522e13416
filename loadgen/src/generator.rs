use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use rand::Rng;

use crate::event::{pick, Event, PayloadSchema, SOURCES, TOPICS};
use crate::time::{unix_millis, TimeSource};

/// Produces original events. Shared by every virtual user of a run: the id
/// counter is atomic, and randomness is supplied by the caller.
pub struct EventGenerator<T> {
    timesource: T,
    counter: AtomicU64,
}

impl<T: TimeSource> EventGenerator<T> {
    pub fn new(timesource: T) -> Self {
        Self {
            timesource,
            counter: AtomicU64::new(0),
        }
    }

    pub fn generate_event<R: Rng + ?Sized>(&self, rng: &mut R) -> Event {
        let topic = pick(rng, TOPICS);
        let source = pick(rng, SOURCES);
        let timestamp = self.timesource.now();

        counter!("loadgen_events_generated_total").increment(1);

        Event {
            topic: topic.to_string(),
            event_id: self.next_event_id(rng, unix_millis(timestamp)),
            timestamp,
            source: source.to_string(),
            payload: PayloadSchema::for_topic(topic).generate(rng),
        }
    }

    /// Event ids look like `<unix millis>-<8 hex chars>-<counter>`. The counter
    /// alone makes ids unique within this generator; the other parts keep ids
    /// from separate runs against the same aggregator apart.
    fn next_event_id<R: Rng + ?Sized>(&self, rng: &mut R, millis: i128) -> String {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let random = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
        let mut buffer = uuid::Uuid::encode_buffer();
        let simple = random.simple().encode_lower(&mut buffer);

        format!("{}-{}-{}", millis, &simple[..8], sequence)
    }

    /// Number of events generated so far.
    pub fn generated(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    pub fn timesource(&self) -> &T {
        &self.timesource
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::event::PayloadSchema;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicI64;
    use time::OffsetDateTime;

    /// Clock that moves forward one millisecond per reading.
    pub(crate) struct SteppingTime {
        millis: AtomicI64,
    }

    impl SteppingTime {
        pub(crate) fn starting_at(millis: i64) -> Self {
            Self {
                millis: AtomicI64::new(millis),
            }
        }
    }

    impl TimeSource for SteppingTime {
        fn now(&self) -> OffsetDateTime {
            let millis = self.millis.fetch_add(1, Ordering::SeqCst);
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
                .expect("timestamp in range")
        }
    }

    /// Clock frozen at one instant, so every id shares the same time prefix.
    pub(crate) struct FrozenTime;

    impl TimeSource for FrozenTime {
        fn now(&self) -> OffsetDateTime {
            OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp in range")
        }
    }

    #[test]
    fn event_fields_come_from_fixed_sets() {
        let generator = EventGenerator::new(SteppingTime::starting_at(1_700_000_000_000));
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..200 {
            let event = generator.generate_event(&mut rng);
            assert!(TOPICS.contains(&event.topic.as_str()));
            assert!(SOURCES.contains(&event.source.as_str()));
            assert_eq!(event.payload.schema(), PayloadSchema::for_topic(&event.topic));
        }
        assert_eq!(generator.generated(), 200);
    }

    #[test]
    fn event_id_format() {
        let generator = EventGenerator::new(FrozenTime);
        let mut rng = StdRng::seed_from_u64(2);

        let first = generator.generate_event(&mut rng);
        let second = generator.generate_event(&mut rng);

        let parts: Vec<&str> = first.event_id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "1700000000000");
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(parts[2], "1");
        assert!(second.event_id.ends_with("-2"));
    }

    #[test]
    fn ids_are_unique_with_a_frozen_clock_and_a_replayed_rng() {
        // Same seed for every call: time and random parts repeat, the counter does not.
        let generator = EventGenerator::new(FrozenTime);
        let mut ids = HashSet::new();

        for _ in 0..10_000 {
            let mut rng = StdRng::seed_from_u64(42);
            assert!(ids.insert(generator.generate_event(&mut rng).event_id));
        }
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let generator = EventGenerator::new(FrozenTime);
        let per_thread = 5_000;

        let ids: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8u64)
                .map(|thread| {
                    let generator = &generator;
                    scope.spawn(move || {
                        let mut rng = StdRng::seed_from_u64(thread);
                        (0..per_thread)
                            .map(|_| generator.generate_event(&mut rng).event_id)
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect()
        });

        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(ids.len(), 8 * per_thread);
        assert_eq!(unique.len(), ids.len());
        assert_eq!(generator.generated(), 8 * per_thread as u64);
    }
}
