//! Raw-stat aggregation
//!
//! High-frequency counters are incremented on a worker thread's own slab
//! without any locking. A periodic sync folds the per-thread totals into one
//! canonical slot per counter; the canonical slot is shared with the stat
//! record bound to that counter.

mod allocator;
pub use allocator::*;


use std::fmt;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::trace;

use crate::constants::HRTIME_MSECOND;
use crate::constants::HRTIME_SECOND;
use crate::DataType;
use crate::RecordValue;
use crate::RegistryError;
use crate::Result;

/// One aggregation slot.
#[derive(Debug, Default)]
pub struct RawStat {
    sum: AtomicI64,
    count: AtomicI64,
    last_sum: AtomicI64,
    last_count: AtomicI64,
    version: AtomicU32,
}

/// Plain copy of a [`RawStat`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawStatValues {
    pub sum: i64,
    pub count: i64,
    pub last_sum: i64,
    pub last_count: i64,
    pub version: u32,
}

impl RawStat {
    pub fn values(&self) -> RawStatValues {
        RawStatValues {
            sum: self.sum.load(Ordering::Acquire),
            count: self.count.load(Ordering::Acquire),
            last_sum: self.last_sum.load(Ordering::Acquire),
            last_count: self.last_count.load(Ordering::Acquire),
            version: self.version.load(Ordering::Acquire),
        }
    }

    pub(crate) fn store(
        &self,
        v: &RawStatValues,
    ) {
        self.sum.store(v.sum, Ordering::Release);
        self.count.store(v.count, Ordering::Release);
        self.last_sum.store(v.last_sum, Ordering::Release);
        self.last_count.store(v.last_count, Ordering::Release);
        self.version.store(v.version, Ordering::Release);
    }

    pub fn sum(&self) -> i64 {
        self.sum.load(Ordering::Acquire)
    }

    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Acquire)
    }

    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Acquire)
    }

    pub(crate) fn set_version(
        &self,
        version: u32,
    ) {
        self.version.store(version, Ordering::Release);
    }

    pub(crate) fn set_sum(
        &self,
        v: i64,
    ) {
        self.sum.store(v, Ordering::Release);
    }

    pub(crate) fn set_count(
        &self,
        v: i64,
    ) {
        self.count.store(v, Ordering::Release);
    }

    pub(crate) fn clear_last(&self) {
        self.last_sum.store(0, Ordering::Release);
        self.last_count.store(0, Ordering::Release);
    }

    fn add(
        &self,
        sum: i64,
        count: i64,
    ) {
        self.sum.fetch_add(sum, Ordering::AcqRel);
        self.count.fetch_add(count, Ordering::AcqRel);
    }
}

/// How a synced `(sum, count)` pair becomes the record's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawStatSyncKind {
    Sum,
    Count,
    /// sum / count
    Avg,
    /// Mean of nanosecond readings, in seconds
    HrTimeAvg,
    /// Mean of nanosecond readings, in milliseconds
    MHrTimeAvg,
    /// Mean of millisecond readings, in seconds
    MsecsAvgToSeconds,
    /// Millisecond total, in seconds
    IntMsecsToFloatSeconds,
}

impl RawStatSyncKind {
    pub fn apply(
        self,
        data_type: DataType,
        sum: i64,
        count: i64,
    ) -> RecordValue {
        let mean = || {
            if count == 0 {
                0.0
            } else {
                sum as f64 / count as f64
            }
        };
        match self {
            RawStatSyncKind::Sum => RecordValue::from_i64(data_type, sum),
            RawStatSyncKind::Count => RecordValue::from_i64(data_type, count),
            RawStatSyncKind::Avg => RecordValue::from_f64(data_type, mean()),
            RawStatSyncKind::HrTimeAvg => RecordValue::from_f64(data_type, mean() / HRTIME_SECOND),
            RawStatSyncKind::MHrTimeAvg => RecordValue::from_f64(data_type, mean() / HRTIME_MSECOND),
            RawStatSyncKind::MsecsAvgToSeconds => RecordValue::from_f64(data_type, mean() / 1000.0),
            RawStatSyncKind::IntMsecsToFloatSeconds => RecordValue::from_f64(data_type, sum as f64 / 1000.0),
        }
    }
}

/// Counter block for one statistics namespace.
///
/// `offset` is where this block's counters start inside every worker slab.
/// Each counter id owns a canonical global slot which may be rebound to the
/// raw slot of a stat record.
pub struct RawStatBlock {
    offset: usize,
    max_stats: usize,
    global: Box<[ArcSwap<RawStat>]>,
    allocator: Arc<dyn ThreadLocalCounterAllocator>,
    mutex: Mutex<()>,
}

impl fmt::Debug for RawStatBlock {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("RawStatBlock")
            .field("offset", &self.offset)
            .field("max_stats", &self.max_stats)
            .finish()
    }
}

impl RawStatBlock {
    pub fn allocate(
        allocator: Arc<dyn ThreadLocalCounterAllocator>,
        max_stats: usize,
    ) -> Result<Arc<Self>> {
        let offset = allocator
            .allocate(max_stats)
            .ok_or(RegistryError::CounterSpaceExhausted)?;
        trace!("raw stat block of {} counters at offset {}", max_stats, offset);

        Ok(Arc::new(Self {
            offset,
            max_stats,
            global: (0..max_stats)
                .map(|_| ArcSwap::from_pointee(RawStat::default()))
                .collect(),
            allocator,
            mutex: Mutex::new(()),
        }))
    }

    pub fn max_stats(&self) -> usize {
        self.max_stats
    }

    fn check(
        &self,
        id: usize,
    ) -> Result<()> {
        if id >= self.max_stats {
            return Err(RegistryError::RawStatOutOfRange {
                id,
                max_stats: self.max_stats,
            }
            .into());
        }
        Ok(())
    }

    fn local<'a>(
        &self,
        slab: &'a CounterSlab,
        id: usize,
    ) -> Result<&'a RawStat> {
        self.check(id)?;
        slab.slot(self.offset + id).ok_or_else(|| {
            RegistryError::RawStatOutOfRange {
                id,
                max_stats: self.max_stats,
            }
            .into()
        })
    }

    /// Hot path: `sum += incr`, `count += 1` on the caller's own slab.
    pub fn increment(
        &self,
        slab: &CounterSlab,
        id: usize,
        incr: i64,
    ) -> Result<()> {
        self.local(slab, id)?.add(incr, 1);
        Ok(())
    }

    pub fn decrement(
        &self,
        slab: &CounterSlab,
        id: usize,
        decr: i64,
    ) -> Result<()> {
        self.local(slab, id)?.add(-decr, 1);
        Ok(())
    }

    pub fn increment_sum(
        &self,
        slab: &CounterSlab,
        id: usize,
        incr: i64,
    ) -> Result<()> {
        self.local(slab, id)?.add(incr, 0);
        Ok(())
    }

    pub fn increment_count(
        &self,
        slab: &CounterSlab,
        id: usize,
        incr: i64,
    ) -> Result<()> {
        self.local(slab, id)?.add(0, incr);
        Ok(())
    }

    /// Current canonical slot for `id`.
    pub fn global(
        &self,
        id: usize,
    ) -> Result<Arc<RawStat>> {
        self.check(id)?;
        Ok(self.global[id].load_full())
    }

    /// Points the canonical slot of `id` at a record's raw slot.
    pub(crate) fn bind_global(
        &self,
        id: usize,
        raw: Arc<RawStat>,
    ) -> Result<()> {
        self.check(id)?;
        self.global[id].store(raw);
        Ok(())
    }

    fn thread_totals(
        &self,
        id: usize,
    ) -> (i64, i64) {
        let idx = self.offset + id;
        let mut sum = 0i64;
        let mut count = 0i64;
        self.allocator.for_each_slab(&mut |slab| {
            if let Some(slot) = slab.slot(idx) {
                sum = sum.wrapping_add(slot.sum());
                count = count.wrapping_add(slot.count());
            }
        });
        (sum, count)
    }

    /// Folds the delta since the previous sync into the canonical slot.
    pub fn sync_to_global(
        &self,
        id: usize,
    ) -> Result<RawStatValues> {
        self.check(id)?;
        let _guard = self.mutex.lock();
        Ok(self.sync_locked(id))
    }

    fn sync_locked(
        &self,
        id: usize,
    ) -> RawStatValues {
        let global = self.global[id].load();
        let (total_sum, total_count) = self.thread_totals(id);

        let delta_sum = total_sum - global.last_sum.load(Ordering::Acquire);
        let delta_count = total_count - global.last_count.load(Ordering::Acquire);
        global.add(delta_sum, delta_count);
        global.last_sum.store(total_sum, Ordering::Release);
        global.last_count.store(total_count, Ordering::Release);

        global.values()
    }

    /// Live `(sum, count)`: the canonical slot plus increments not yet synced.
    pub fn get_total(
        &self,
        id: usize,
    ) -> Result<(i64, i64)> {
        self.check(id)?;
        let global = self.global[id].load();
        let (thread_sum, thread_count) = self.thread_totals(id);
        let v = global.values();
        let sum = v.sum + (thread_sum - v.last_sum);
        let count = v.count + (thread_count - v.last_count);
        Ok((sum.max(0), count))
    }

    pub fn get_sum(
        &self,
        id: usize,
    ) -> Result<i64> {
        Ok(self.get_total(id)?.0)
    }

    pub fn get_count(
        &self,
        id: usize,
    ) -> Result<i64> {
        Ok(self.get_total(id)?.1)
    }

    fn zero_locals(
        &self,
        id: usize,
        sum: bool,
        count: bool,
    ) {
        let idx = self.offset + id;
        self.allocator.for_each_slab(&mut |slab| {
            if let Some(slot) = slab.slot(idx) {
                if sum {
                    slot.sum.store(0, Ordering::Release);
                }
                if count {
                    slot.count.store(0, Ordering::Release);
                }
            }
        });
    }

    pub fn clear(
        &self,
        id: usize,
    ) -> Result<()> {
        self.check(id)?;
        let _guard = self.mutex.lock();
        self.clear_locked(id);
        Ok(())
    }

    fn clear_locked(
        &self,
        id: usize,
    ) {
        let global = self.global[id].load();
        global.sum.store(0, Ordering::Release);
        global.count.store(0, Ordering::Release);
        global.clear_last();
        self.zero_locals(id, true, true);
    }

    pub fn clear_sum(
        &self,
        id: usize,
    ) -> Result<()> {
        self.set_sum(id, 0)
    }

    pub fn clear_count(
        &self,
        id: usize,
    ) -> Result<()> {
        self.set_count(id, 0)
    }

    /// Clears the sum everywhere, then stores `v` in the canonical slot.
    pub fn set_sum(
        &self,
        id: usize,
        v: i64,
    ) -> Result<()> {
        self.check(id)?;
        let _guard = self.mutex.lock();
        let global = self.global[id].load();
        global.last_sum.store(0, Ordering::Release);
        self.zero_locals(id, true, false);
        global.set_sum(v);
        Ok(())
    }

    /// Clears the count everywhere, then stores `v` in the canonical slot.
    pub fn set_count(
        &self,
        id: usize,
        v: i64,
    ) -> Result<()> {
        self.check(id)?;
        let _guard = self.mutex.lock();
        let global = self.global[id].load();
        global.last_count.store(0, Ordering::Release);
        self.zero_locals(id, false, true);
        global.set_count(v);
        Ok(())
    }

    /// Adds directly to the canonical slot, bypassing thread-local slabs.
    pub fn increment_global(
        &self,
        id: usize,
        sum: i64,
        count: i64,
    ) -> Result<()> {
        self.check(id)?;
        self.global[id].load().add(sum, count);
        Ok(())
    }

    /// Sync step for a bound record.
    ///
    /// A non-zero `record_version` different from what the slot last saw
    /// means the record was reset: the counter is cleared instead of merged
    /// and adopts the new version. Returns the resulting canonical values.
    pub(crate) fn sync_versioned(
        &self,
        id: usize,
        record_version: u32,
    ) -> Result<(bool, RawStatValues)> {
        self.check(id)?;
        let _guard = self.mutex.lock();
        let global = self.global[id].load();
        if record_version != 0 && record_version != global.version() {
            self.clear_locked(id);
            global.set_version(record_version);
            return Ok((true, global.values()));
        }
        Ok((false, self.sync_locked(id)))
    }
}
