//! Sequence allocator
//!
//! Hands out the consecutive number of a folio, strictly increasing from 1
//! per (channel, year). The counter lives in the store:
//! - when the store offers an atomic increment, one call allocates
//! - otherwise read, compare-and-swap, and retry with jittered exponential
//!   backoff until `allocation.max_attempts` is spent
//!
//! A lost swap never yields a number, so values are never duplicated.

use crate::config::AllocationConfig;
use crate::error::{DeskError, DeskResult};
use buzon_model::{Channel, Year};
use buzon_store::{CounterKey, CounterStore, Datastore};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Allocates consecutive numbers from store-backed counters
#[derive(Debug)]
pub struct SequenceAllocator<S: ?Sized = dyn Datastore> {
    store: Arc<S>,
    config: AllocationConfig,
}

impl<S: ?Sized> Clone for SequenceAllocator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config,
        }
    }
}

impl<S: CounterStore + ?Sized> SequenceAllocator<S> {
    #[must_use]
    pub fn new(store: Arc<S>, config: AllocationConfig) -> Self {
        Self { store, config }
    }

    /// Allocate the next consecutive for `(channel, year)`
    ///
    /// # Errors
    /// [`DeskError::AllocationContention`] when every optimistic attempt
    /// lost its swap, [`DeskError::Storage`] on store failure
    pub fn allocate(&self, channel: Channel, year: Year) -> DeskResult<u64> {
        let key = CounterKey::new(channel, year);
        let value = if self.store.supports_atomic_increment() {
            self.store.increment_counter(key)?
        } else {
            self.allocate_optimistic(key)?
        };
        tracing::debug!(channel = %channel, year = %year, value, "allocated consecutive");
        Ok(value)
    }

    fn allocate_optimistic(&self, key: CounterKey) -> DeskResult<u64> {
        let attempts = self.config.max_attempts;
        for attempt in 1..=attempts {
            let current = self.store.load_counter(key)?;
            let candidate = current.unwrap_or(1);
            if self.store.compare_and_swap_counter(key, current, candidate + 1)? {
                return Ok(candidate);
            }
            tracing::debug!(channel = %key.channel, year = %key.year, attempt, "counter swap lost");
            if attempt < attempts {
                std::thread::sleep(self.jittered_backoff(attempt));
            }
        }

        tracing::warn!(channel = %key.channel, year = %key.year, attempts, "allocation contention");
        Err(DeskError::AllocationContention {
            channel: key.channel,
            year: key.year,
            attempts,
        })
    }

    /// Half the ceiling fixed, half random
    fn jittered_backoff(&self, attempt: u32) -> Duration {
        let ceiling = self.config.backoff_ceiling(attempt);
        let half = ceiling / 2;
        let jitter_ceiling = u64::try_from((ceiling - half).as_micros()).unwrap_or(u64::MAX);
        half + Duration::from_micros(rand::rng().random_range(0..=jitter_ceiling))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buzon_store::InMemoryStore;
    use std::collections::HashSet;
    use std::thread;

    fn year() -> Year {
        Year::new(2025).unwrap()
    }

    fn run_concurrently(allocator: &SequenceAllocator<InMemoryStore>, threads: usize, each: usize) -> Vec<u64> {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let allocator = allocator.clone();
                thread::spawn(move || {
                    (0..each)
                        .map(|_| allocator.allocate(Channel::Digital, year()).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        all
    }

    #[test]
    fn atomic_path_is_gapless_under_concurrency() {
        let allocator = SequenceAllocator::new(Arc::new(InMemoryStore::new()), AllocationConfig::default());
        let all = run_concurrently(&allocator, 10, 12);
        assert_eq!(all, (1..=120).collect::<Vec<_>>());
    }

    #[test]
    fn optimistic_path_never_duplicates() {
        let store = Arc::new(InMemoryStore::new().without_atomic_increment());
        let config = AllocationConfig {
            max_attempts: 10_000,
            base_backoff_ms: 0,
            max_backoff_ms: 1,
        };
        let allocator = SequenceAllocator::new(store, config);
        let all = run_concurrently(&allocator, 10, 12);
        assert_eq!(all, (1..=120).collect::<Vec<_>>());
    }

    #[test]
    fn keys_are_independent() {
        let allocator = SequenceAllocator::new(Arc::new(InMemoryStore::new()), AllocationConfig::default());
        let digital: HashSet<u64> = (0..3)
            .map(|_| allocator.allocate(Channel::Digital, year()).unwrap())
            .collect();
        assert_eq!(allocator.allocate(Channel::Physical, year()).unwrap(), 1);
        assert_eq!(allocator.allocate(Channel::Digital, Year::new(2026).unwrap()).unwrap(), 1);
        assert_eq!(digital, HashSet::from([1, 2, 3]));
    }

    #[test]
    fn backoff_stays_within_ceiling() {
        let allocator = SequenceAllocator::new(Arc::new(InMemoryStore::new()), AllocationConfig::default());
        for attempt in 1..10 {
            let ceiling = allocator.config.backoff_ceiling(attempt);
            let delay = allocator.jittered_backoff(attempt);
            assert!(delay >= ceiling / 2 && delay <= ceiling, "{delay:?} vs {ceiling:?}");
        }
    }
}
