use std::sync::Arc;

use tracing::trace;
use tracing::warn;

use super::Registry;
use crate::DataType;
use crate::PersistType;
use crate::RawStatBlock;
use crate::RawStatSync;
use crate::RawStatSyncKind;
use crate::Record;
use crate::RecordCategory;
use crate::RecordMeta;
use crate::RecordState;
use crate::RecordValue;
use crate::RegistryError;
use crate::Result;
use crate::SyncFlags;

impl Registry {
    /// Registers a stat backed by counter `id` of `block`.
    ///
    /// The block's canonical slot for `id` becomes the record's raw slot, so
    /// a value restored from a snapshot keeps accumulating. `kind` decides how
    /// each periodic sync turns the slot into the record's value.
    #[allow(clippy::too_many_arguments)]
    pub fn register_raw_stat(
        &self,
        block: &Arc<RawStatBlock>,
        category: RecordCategory,
        name: &str,
        data_type: DataType,
        persist: PersistType,
        id: usize,
        kind: RawStatSyncKind,
    ) -> Result<Arc<Record>> {
        if id >= block.max_stats() {
            return Err(RegistryError::RawStatOutOfRange {
                id,
                max_stats: block.max_stats(),
            }
            .into());
        }

        let record = self.register_stat(category, name, RecordValue::zero(data_type), persist)?;

        let mut guard = record.lock();
        let RecordState {
            version,
            rsb_id,
            meta,
            ..
        } = &mut *guard;
        let RecordMeta::Stat(meta) = meta else {
            return Err(RegistryError::NotStatRecord(name.to_string()).into());
        };

        if meta.sync.is_some() {
            warn!("raw stat {} registered twice, replacing its sync binding", name);
        }
        meta.raw.clear_last();
        meta.raw.set_version(*version);
        block.bind_global(id, meta.raw.clone())?;
        meta.sync = Some(RawStatSync {
            block: block.clone(),
            id,
            kind,
        });
        *rsb_id = Some(id);
        drop(guard);

        Ok(record)
    }

    /// Folds every bound raw-stat counter into its record.
    ///
    /// A record whose version moved since the last sync has its counter
    /// cleared instead. Every visited record is queued for disk and peer
    /// sync. Returns the number of records visited.
    pub fn exec_raw_stat_sync(&self) -> usize {
        let mut synced = 0;

        for record in self.records() {
            let mut state = record.lock();
            let Some(sync) = state.meta.as_stat().and_then(|meta| meta.sync.clone()) else {
                continue;
            };

            match sync.block.sync_versioned(sync.id, state.version) {
                Ok((true, _)) => {
                    trace!("raw stat {} cleared for version {}", record.name(), state.version);
                }
                Ok((false, values)) => {
                    let value = sync.kind.apply(state.data_type, values.sum, values.count);
                    state.set_value(value);
                }
                Err(e) => {
                    warn!("raw stat sync failed for {}: {}", record.name(), e);
                    continue;
                }
            }
            state.sync_flags |= SyncFlags::REQUIRED;
            synced += 1;
        }

        synced
    }
}
