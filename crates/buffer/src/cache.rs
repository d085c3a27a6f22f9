use common::{DbError, DbResult};
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use std::{sync::Arc, thread, time::Duration};

const LOAD_POLL: Duration = Duration::from_millis(1);

/// Loads and writes back the resources managed by a [`RefCache`].
///
/// Both hooks run without the cache lock held, so they may block on I/O.
pub trait CacheSource: Send + Sync {
    type Item: Send + Sync;

    /// Materializes the resource for `key`.
    fn load(&self, key: u64) -> DbResult<Self::Item>;

    /// Called once the last reference is released.
    fn evict(&self, item: &Self::Item) -> DbResult<()>;
}

#[derive(Debug)]
struct Slot<T> {
    key: u64,
    item: Arc<T>,
    refs: usize,
}

#[derive(Debug)]
struct CacheState<T> {
    slots: Vec<Option<Slot<T>>>,
    free: Vec<usize>,
    index: HashMap<u64, usize>,
    // Keys with a load or an eviction in progress.
    in_flight: HashSet<u64>,
}

impl<T> CacheState<T> {
    fn occupy(&mut self, slot: Slot<T>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        }
    }
}

/// Reference-counted cache over an arena of slots.
pub struct RefCache<S: CacheSource> {
    source: S,
    capacity: usize,
    state: Mutex<CacheState<S::Item>>,
}

impl<S: CacheSource> RefCache<S> {
    /// Creates a cache holding at most `capacity` resources at once.
    pub fn new(source: S, capacity: usize) -> Self {
        Self {
            source,
            capacity,
            state: Mutex::new(CacheState {
                slots: Vec::with_capacity(capacity),
                free: Vec::new(),
                index: HashMap::with_capacity(capacity),
                in_flight: HashSet::new(),
            }),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Returns the resource for `key`, loading it if it is not resident.
    ///
    /// Fails with [`DbError::CacheFull`] when every slot is taken.
    pub fn get(&self, key: u64) -> DbResult<Arc<S::Item>> {
        loop {
            let mut state = self.state.lock();
            if state.in_flight.contains(&key) {
                drop(state);
                thread::sleep(LOAD_POLL);
                continue;
            }

            if let Some(&idx) = state.index.get(&key) {
                let Some(slot) = state.slots[idx].as_mut() else {
                    return Err(DbError::Storage(format!(
                        "cache slot {idx} for key {key} is empty"
                    )));
                };
                slot.refs += 1;
                return Ok(Arc::clone(&slot.item));
            }

            if state.index.len() + state.in_flight.len() >= self.capacity {
                tracing::warn!(key, capacity = self.capacity, "cache.full");
                return Err(DbError::CacheFull);
            }
            state.in_flight.insert(key);
            break;
        }

        let loaded = self.source.load(key);

        let mut state = self.state.lock();
        state.in_flight.remove(&key);
        let item = Arc::new(loaded?);
        let idx = state.occupy(Slot {
            key,
            item: Arc::clone(&item),
            refs: 1,
        });
        state.index.insert(key, idx);
        Ok(item)
    }

    /// Drops one reference to `key`; the last one evicts the resource.
    pub fn release(&self, key: u64) -> DbResult<()> {
        let item = {
            let mut state = self.state.lock();
            let Some(&idx) = state.index.get(&key) else {
                return Err(DbError::Storage(format!(
                    "release of non-resident key {key}"
                )));
            };
            let Some(slot) = state.slots[idx].as_mut() else {
                return Err(DbError::Storage(format!(
                    "cache slot {idx} for key {key} is empty"
                )));
            };
            slot.refs -= 1;
            if slot.refs > 0 {
                return Ok(());
            }
            let Some(slot) = state.slots[idx].take() else {
                return Err(DbError::Storage(format!(
                    "cache slot {idx} for key {key} is empty"
                )));
            };
            state.free.push(idx);
            state.index.remove(&key);
            state.in_flight.insert(key);
            slot.item
        };

        let result = self.source.evict(&item);
        self.state.lock().in_flight.remove(&key);
        result
    }

    /// Evicts every resident resource regardless of reference counts.
    pub fn close(&self) -> DbResult<()> {
        let drained: Vec<Slot<S::Item>> = {
            let mut state = self.state.lock();
            state.index.clear();
            state.free.clear();
            state.slots.drain(..).flatten().collect()
        };

        let mut first_err = None;
        for slot in drained {
            if let Err(e) = self.source.evict(&slot.item) {
                tracing::error!(key = slot.key, error = %e, "cache.evict_failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Number of resources currently resident.
    pub fn resident(&self) -> usize {
        self.state.lock().index.len()
    }

    /// Current reference count for `key`, if resident.
    pub fn ref_count(&self, key: u64) -> Option<usize> {
        let state = self.state.lock();
        let idx = *state.index.get(&key)?;
        state.slots[idx].as_ref().map(|slot| slot.refs)
    }
}
