//! Record
//!
//! A single named entry of the registry: category, data type, current value,
//! default, version, sync flags and category-specific metadata, guarded by the
//! record's own lock.

mod meta;
mod value;
pub use meta::*;
pub use value::*;

#[cfg(test)]
mod record_test;

use parking_lot::Mutex;
use parking_lot::MutexGuard;

use crate::RawStatValues;

/// Mutable part of a record, protected by [`Record`]'s lock.
#[derive(Debug)]
pub struct RecordState {
    pub category: RecordCategory,
    pub data_type: DataType,
    pub value: RecordValue,
    pub default_value: RecordValue,
    /// Bumped on every reset-to-default
    pub version: u32,
    /// False until explicitly registered, even if a value was restored
    pub registered: bool,
    pub sync_flags: SyncFlags,
    /// Index within the raw-stat block, once bound
    pub rsb_id: Option<usize>,
    pub meta: RecordMeta,
}

impl RecordState {
    /// Replaces the current value, returning whether it changed.
    pub(crate) fn set_value(
        &mut self,
        value: RecordValue,
    ) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        true
    }

    /// Switches the stored data type; old-typed storage is zeroed first.
    pub(crate) fn retype(
        &mut self,
        data_type: DataType,
    ) {
        self.value = RecordValue::zero(data_type);
        self.default_value = RecordValue::zero(data_type);
        self.data_type = data_type;
    }

    pub fn is_config(&self) -> bool {
        self.category.is_config()
    }

    pub fn is_stat(&self) -> bool {
        self.category.is_stat()
    }
}

/// A named entry in the registry table.
///
/// The name is fixed at creation; everything else lives behind the record's
/// lock. Records are never destroyed once allocated.
#[derive(Debug)]
pub struct Record {
    name: String,
    slot: usize,
    state: Mutex<RecordState>,
}

impl Record {
    pub(crate) fn new(
        slot: usize,
        name: &str,
        state: RecordState,
    ) -> Self {
        Self {
            name: name.to_string(),
            slot,
            state: Mutex::new(state),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of the record in the table
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RecordState> {
        self.state.lock()
    }

    /// Consistent owned copy of the record, taken under its lock.
    pub fn image(&self) -> RecordImage {
        let state = self.lock();
        RecordImage::capture(&self.name, &state)
    }
}

/// Owned, lock-free copy of a record's transferable shape.
///
/// This is what travels inside envelopes and snapshots; callbacks and raw-stat
/// bindings are process-local and never part of it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordImage {
    pub name: String,
    pub category: RecordCategory,
    pub data_type: DataType,
    pub value: RecordValue,
    pub default_value: RecordValue,
    pub version: u32,
    pub registered: bool,
    pub sync_flags: SyncFlags,
    pub rsb_id: Option<usize>,
    pub meta: MetaImage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetaImage {
    Stat {
        persist: PersistType,
        raw: RawStatValues,
    },
    Config {
        update_type: UpdateType,
        update_required: UpdateScope,
        check_type: CheckType,
        check_expr: Option<String>,
        access: AccessType,
        source: SourceType,
    },
}

impl RecordImage {
    pub(crate) fn capture(
        name: &str,
        state: &RecordState,
    ) -> Self {
        let meta = match &state.meta {
            RecordMeta::Stat(m) => MetaImage::Stat {
                persist: m.persist,
                raw: m.raw.values(),
            },
            RecordMeta::Config(m) => MetaImage::Config {
                update_type: m.update_type,
                update_required: m.update_required,
                check_type: m.check_type,
                check_expr: m.check_expr.clone(),
                access: m.access,
                source: m.source,
            },
        };
        Self {
            name: name.to_string(),
            category: state.category,
            data_type: state.data_type,
            value: state.value.clone(),
            default_value: state.default_value.clone(),
            version: state.version,
            registered: state.registered,
            sync_flags: state.sync_flags,
            rsb_id: state.rsb_id,
            meta,
        }
    }

    /// Minimal image carrying just a value, used for forwarded SET/RESET.
    pub fn ephemeral(
        category: RecordCategory,
        name: &str,
        value: RecordValue,
    ) -> Self {
        let meta = if category.is_stat() {
            MetaImage::Stat {
                persist: PersistType::Persistent,
                raw: RawStatValues::default(),
            }
        } else {
            MetaImage::Config {
                update_type: UpdateType::None,
                update_required: UpdateScope::empty(),
                check_type: CheckType::None,
                check_expr: None,
                access: AccessType::Default,
                source: SourceType::Default,
            }
        };
        Self {
            name: name.to_string(),
            category,
            data_type: value.data_type(),
            default_value: RecordValue::zero(value.data_type()),
            value,
            version: 0,
            registered: false,
            sync_flags: SyncFlags::empty(),
            rsb_id: None,
            meta,
        }
    }

    pub fn persist(&self) -> Option<PersistType> {
        match &self.meta {
            MetaImage::Stat { persist, .. } => Some(*persist),
            MetaImage::Config { .. } => None,
        }
    }

    pub fn raw(&self) -> Option<RawStatValues> {
        match &self.meta {
            MetaImage::Stat { raw, .. } => Some(*raw),
            MetaImage::Config { .. } => None,
        }
    }

    /// Source of a config image; stats report `Default`.
    pub fn source(&self) -> SourceType {
        match &self.meta {
            MetaImage::Config { source, .. } => *source,
            MetaImage::Stat { .. } => SourceType::Default,
        }
    }
}
