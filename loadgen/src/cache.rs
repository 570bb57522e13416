use std::str::FromStr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::event::Event;

/// How originals are admitted once the cache is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Admit until full, then stop. Nothing is ever evicted.
    #[default]
    FillOnce,
    /// Keep a uniform sample of every original offered so far (Algorithm R).
    Reservoir,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseCachePolicyError(pub String);

impl FromStr for CachePolicy {
    type Err = ParseCachePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fill_once" | "fill-once" => Ok(CachePolicy::FillOnce),
            "reservoir" => Ok(CachePolicy::Reservoir),
            other => Err(ParseCachePolicyError(other.to_owned())),
        }
    }
}

struct Slots {
    events: Vec<Event>,
    /// Originals offered over the cache lifetime, admitted or not.
    offered: u64,
}

/// Bounded store of originals that duplicates are sampled from.
///
/// Shared by all virtual users of a run. Admission happens under the write
/// lock, so the length never exceeds `capacity` whatever the number of
/// concurrent writers, and readers only ever see whole events.
pub struct RollingCache {
    capacity: usize,
    policy: CachePolicy,
    slots: RwLock<Slots>,
}

impl RollingCache {
    pub fn new(capacity: usize, policy: CachePolicy) -> Self {
        Self {
            capacity,
            policy,
            slots: RwLock::new(Slots {
                events: Vec::with_capacity(capacity),
                offered: 0,
            }),
        }
    }

    /// Offer a freshly generated original. Returns whether it was stored.
    pub fn admit<R: Rng + ?Sized>(&self, event: &Event, rng: &mut R) -> bool {
        let mut slots = self.write();
        slots.offered += 1;

        if slots.events.len() < self.capacity {
            slots.events.push(event.clone());
            return true;
        }

        match self.policy {
            CachePolicy::FillOnce => false,
            CachePolicy::Reservoir => {
                let slot = rng.gen_range(0..slots.offered);
                match usize::try_from(slot) {
                    Ok(slot) if slot < self.capacity => {
                        slots.events[slot] = event.clone();
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    /// Uniformly pick one cached original, if any.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Event> {
        self.read().events.choose(rng).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Ids currently held, in slot order.
    pub fn event_ids(&self) -> Vec<String> {
        self.read()
            .events
            .iter()
            .map(|event| event.event_id.clone())
            .collect()
    }

    // A panicking writer cannot leave a half-pushed event behind, so a
    // poisoned lock still guards a consistent vector.
    fn read(&self) -> RwLockReadGuard<'_, Slots> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slots> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }
}
