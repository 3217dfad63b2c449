use std::sync::Arc;

use parking_lot::Mutex;
use parking_lot::RwLock;
use tracing::debug;
use tracing::warn;

use super::RawStat;

/// A worker thread's private counter region.
///
/// Only the owning thread increments its slots; aggregation reads them
/// from any thread.
#[derive(Debug)]
pub struct CounterSlab {
    slots: Box<[RawStat]>,
}

impl CounterSlab {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| RawStat::default()).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn slot(
        &self,
        idx: usize,
    ) -> Option<&RawStat> {
        self.slots.get(idx)
    }
}

/// Capability that hands out per-thread counter space.
///
/// `allocate` reserves the same range in every worker's slab and returns its
/// offset; `for_each_slab` visits every live worker's slab.
pub trait ThreadLocalCounterAllocator: Send + Sync + 'static {
    fn allocate(
        &self,
        num_stats: usize,
    ) -> Option<usize>;

    fn for_each_slab(
        &self,
        f: &mut dyn FnMut(&CounterSlab),
    );
}

/// Fixed pool of worker slabs.
///
/// Each attached thread gets one slab of `slab_capacity` slots; at most
/// `max_threads` may attach.
#[derive(Debug)]
pub struct FixedPoolAllocator {
    max_threads: usize,
    slab_capacity: usize,
    reserved: Mutex<usize>,
    slabs: RwLock<Vec<Arc<CounterSlab>>>,
}

impl FixedPoolAllocator {
    pub fn new(
        max_threads: usize,
        slab_capacity: usize,
    ) -> Self {
        Self {
            max_threads,
            slab_capacity,
            reserved: Mutex::new(0),
            slabs: RwLock::new(Vec::with_capacity(max_threads)),
        }
    }

    /// Gives the calling worker its own slab, or `None` once the pool is full.
    pub fn attach_thread(&self) -> Option<Arc<CounterSlab>> {
        let mut slabs = self.slabs.write();
        if slabs.len() >= self.max_threads {
            warn!("counter pool exhausted: {} threads attached", slabs.len());
            return None;
        }
        let slab = Arc::new(CounterSlab::new(self.slab_capacity));
        slabs.push(slab.clone());
        debug!("attached worker slab #{}", slabs.len());
        Some(slab)
    }

    pub fn live_threads(&self) -> usize {
        self.slabs.read().len()
    }
}

impl ThreadLocalCounterAllocator for FixedPoolAllocator {
    fn allocate(
        &self,
        num_stats: usize,
    ) -> Option<usize> {
        let mut reserved = self.reserved.lock();
        if *reserved + num_stats > self.slab_capacity {
            return None;
        }
        let offset = *reserved;
        *reserved += num_stats;
        Some(offset)
    }

    fn for_each_slab(
        &self,
        f: &mut dyn FnMut(&CounterSlab),
    ) {
        for slab in self.slabs.read().iter() {
            f(slab);
        }
    }
}
