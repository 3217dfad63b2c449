//! Records registry
//!
//! Owns the fixed-capacity table of records and the name index. Structure is
//! guarded by one reader/writer lock; each record's value and metadata by the
//! record's own lock. The structural lock is always released before a record
//! lock is taken.
//!
//! Whether a mutation is applied here or forwarded to the peer process is
//! decided by the [`ProcessRole`] and the record's category.

mod config_text;
mod lookup;
mod ownership;
mod peer;
mod raw_sync;
mod update;
pub use config_text::*;
pub use lookup::*;
pub use ownership::*;

#[cfg(test)]
mod update_test;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use parking_lot::RwLock;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::AccessType;
use crate::CategoryMask;
use crate::CheckType;
use crate::ConfigMeta;
use crate::DataType;
use crate::EnvelopeTransport;
use crate::Error;
use crate::MetaImage;
use crate::PersistType;
use crate::RawStatValues;
use crate::Record;
use crate::RecordCategory;
use crate::RecordImage;
use crate::RecordMeta;
use crate::RecordState;
use crate::RecordValue;
use crate::RegistryConfig;
use crate::RegistryError;
use crate::Result;
use crate::SourceType;
use crate::StatMeta;
use crate::SyncFlags;
use crate::UpdateScope;
use crate::UpdateType;

/// Registration parameters of a configuration record.
#[derive(Debug, Clone, Default)]
pub struct ConfigSpec {
    pub update_type: UpdateType,
    pub check_type: CheckType,
    pub check_expr: Option<String>,
    pub access: AccessType,
    pub source: SourceType,
}

impl ConfigSpec {
    fn to_meta(&self) -> ConfigMeta {
        let mut meta = ConfigMeta::new(self.source);
        meta.update_type = self.update_type;
        meta.check_type = self.check_type;
        meta.check_expr = self.check_expr.clone();
        meta.access = self.access;
        meta
    }
}

#[derive(Default)]
struct Table {
    records: Vec<Arc<Record>>,
    index: HashMap<String, usize>,
}

/// One value update, local or forwarded.
pub(crate) struct SetRequest<'a> {
    pub category: Option<RecordCategory>,
    pub name: &'a str,
    pub value: RecordValue,
    pub raw: Option<RawStatValues>,
    pub source: SourceType,
    pub inc_version: bool,
}

pub struct Registry {
    role: ProcessRole,
    capacity: usize,
    table: RwLock<Table>,
    transport: RwLock<Option<Arc<dyn EnvelopeTransport>>>,
    config_contents: Mutex<ConfigContents>,
}

impl fmt::Debug for Registry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Registry")
            .field("role", &self.role)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl Registry {
    pub fn new(
        role: ProcessRole,
        capacity: usize,
    ) -> Self {
        Self {
            role,
            capacity,
            table: RwLock::new(Table {
                records: Vec::with_capacity(capacity),
                index: HashMap::with_capacity(capacity),
            }),
            transport: RwLock::new(None),
            config_contents: Mutex::new(ConfigContents::default()),
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(config.role, config.max_records)
    }

    pub fn role(&self) -> ProcessRole {
        self.role
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.table.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Installs the channel used to reach the peer process.
    pub fn attach_transport(
        &self,
        transport: Arc<dyn EnvelopeTransport>,
    ) {
        *self.transport.write() = Some(transport);
    }

    pub(crate) fn transport(&self) -> Option<Arc<dyn EnvelopeTransport>> {
        self.transport.read().clone()
    }

    pub(crate) fn owns(
        &self,
        category: RecordCategory,
    ) -> bool {
        self.role.owns(category)
    }

    // -
    // Table access

    pub(crate) fn find(
        &self,
        name: &str,
    ) -> Option<Arc<Record>> {
        let table = self.table.read();
        table.index.get(name).map(|slot| table.records[*slot].clone())
    }

    fn find_or_not_found(
        &self,
        name: &str,
    ) -> Result<Arc<Record>> {
        self.find(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()).into())
    }

    pub(crate) fn record_at(
        &self,
        slot: usize,
    ) -> Option<Arc<Record>> {
        self.table.read().records.get(slot).cloned()
    }

    /// Point-in-time list of every record, in slot order.
    pub(crate) fn records(&self) -> Vec<Arc<Record>> {
        self.table.read().records.clone()
    }

    /// Returns the record named `name`, creating it from `build` when absent.
    ///
    /// The new record is fully initialized before it becomes visible. The
    /// flag is true when this call created it.
    pub(crate) fn insert_with(
        &self,
        name: &str,
        build: impl FnOnce() -> RecordState,
    ) -> Result<(Arc<Record>, bool)> {
        let mut table = self.table.write();
        if let Some(slot) = table.index.get(name) {
            return Ok((table.records[*slot].clone(), false));
        }
        if table.records.len() >= self.capacity {
            warn!("cannot allocate record {}: table full ({} records)", name, self.capacity);
            return Err(RegistryError::CapacityExceeded {
                name: name.to_string(),
                capacity: self.capacity,
            }
            .into());
        }

        let slot = table.records.len();
        let record = Arc::new(Record::new(slot, name, build()));
        table.records.push(record.clone());
        table.index.insert(name.to_string(), slot);
        Ok((record, true))
    }

    // -
    // Registration

    /// Registers a statistics record.
    ///
    /// An existing record keeps its current value unless the data type
    /// changed, or the stat turned from persistent to non-persistent; in
    /// both cases the value falls back to `default`.
    pub fn register_stat(
        &self,
        category: RecordCategory,
        name: &str,
        default: RecordValue,
        persist: PersistType,
    ) -> Result<Arc<Record>> {
        if !category.is_stat() {
            return Err(RegistryError::NotStatRecord(name.to_string()).into());
        }

        let (record, created) = self.insert_with(name, || RecordState {
            category,
            data_type: default.data_type(),
            value: default.clone(),
            default_value: default.clone(),
            version: 0,
            registered: true,
            sync_flags: SyncFlags::empty(),
            rsb_id: None,
            meta: RecordMeta::Stat(StatMeta::new(persist)),
        })?;

        let forward = {
            let mut state = record.lock();
            if !created {
                reconcile(name, &mut state, category, &default)?;
                let RecordState { value, meta, .. } = &mut *state;
                if let RecordMeta::Stat(meta) = meta {
                    if meta.persist == PersistType::Persistent && persist == PersistType::NonPersistent {
                        debug!("resetting formerly persisted stat {} to its default", name);
                        *value = default.clone();
                    }
                    meta.persist = persist;
                }
            }
            self.mark_registered(name, &mut state)
        };

        if let Some(image) = forward {
            self.send_register(image)?;
        }
        Ok(record)
    }

    /// Registers a configuration record.
    ///
    /// Re-registration refreshes the update, check and access metadata and
    /// keeps the value, the source and any update callbacks.
    pub fn register_config(
        &self,
        category: RecordCategory,
        name: &str,
        default: RecordValue,
        spec: ConfigSpec,
    ) -> Result<Arc<Record>> {
        if !category.is_config() {
            return Err(RegistryError::NotConfigRecord(name.to_string()).into());
        }

        let (record, created) = self.insert_with(name, || RecordState {
            category,
            data_type: default.data_type(),
            value: default.clone(),
            default_value: default.clone(),
            version: 0,
            registered: true,
            sync_flags: SyncFlags::empty(),
            rsb_id: None,
            meta: RecordMeta::Config(spec.to_meta()),
        })?;

        let forward = {
            let mut state = record.lock();
            if !created {
                reconcile(name, &mut state, category, &default)?;
                if let Some(meta) = state.meta.as_config_mut() {
                    meta.update_type = spec.update_type;
                    meta.check_type = spec.check_type;
                    meta.check_expr = spec.check_expr.clone();
                    meta.access = spec.access;
                }
            }
            self.mark_registered(name, &mut state)
        };

        if let Some(image) = forward {
            self.send_register(image)?;
        }
        Ok(record)
    }

    /// Owned records are queued for the next push; others are announced to
    /// the owner, whose image is returned for sending.
    fn mark_registered(
        &self,
        name: &str,
        state: &mut RecordState,
    ) -> Option<RecordImage> {
        if self.owns(state.category) {
            state.sync_flags |= SyncFlags::PEER;
            None
        } else {
            Some(RecordImage::capture(name, state))
        }
    }

    // -
    // Mutation

    /// Applies `req` if this process owns the record, forwards it otherwise.
    ///
    /// An unknown name is created unregistered, which needs a category.
    pub(crate) fn apply_set(
        &self,
        req: SetRequest<'_>,
    ) -> Result<()> {
        let record = match self.find(req.name) {
            Some(record) => record,
            None => {
                let category = req
                    .category
                    .ok_or_else(|| RegistryError::MissingCategory(req.name.to_string()))?;
                let owned = self.owns(category);
                let (record, created) = self.insert_with(req.name, || {
                    let mut meta = RecordMeta::for_category(category, req.source);
                    if let (RecordMeta::Stat(meta), Some(raw)) = (&mut meta, req.raw) {
                        meta.raw.set_sum(raw.sum);
                        meta.raw.set_count(raw.count);
                    }
                    RecordState {
                        category,
                        data_type: req.value.data_type(),
                        value: req.value.clone(),
                        default_value: RecordValue::zero(req.value.data_type()),
                        version: 0,
                        registered: false,
                        sync_flags: if owned { SyncFlags::PEER } else { SyncFlags::empty() },
                        rsb_id: None,
                        meta,
                    }
                })?;
                if created {
                    if !owned {
                        self.send_set(record.image())?;
                    }
                    return Ok(());
                }
                record
            }
        };

        let forward = {
            let mut state = record.lock();
            if self.owns(state.category) {
                apply_owned(&mut state, &req)?;
                None
            } else {
                Some(forward_image(state.category, &req))
            }
        };
        if let Some(image) = forward {
            self.send_set(image)?;
        }
        Ok(())
    }

    /// Sets an existing record's value.
    pub fn set(
        &self,
        name: &str,
        value: RecordValue,
        source: SourceType,
    ) -> Result<()> {
        self.apply_set(SetRequest {
            category: None,
            name,
            value,
            raw: None,
            source,
            inc_version: false,
        })
    }

    /// Sets a value, creating an unregistered record of `category` if the
    /// name is unknown.
    pub fn set_record(
        &self,
        category: RecordCategory,
        name: &str,
        value: RecordValue,
        source: SourceType,
    ) -> Result<()> {
        self.apply_set(SetRequest {
            category: Some(category),
            name,
            value,
            raw: None,
            source,
            inc_version: false,
        })
    }

    pub fn set_int(
        &self,
        name: &str,
        v: i64,
    ) -> Result<()> {
        self.set(name, RecordValue::Int(v), SourceType::Explicit)
    }

    pub fn set_float(
        &self,
        name: &str,
        v: f64,
    ) -> Result<()> {
        self.set(name, RecordValue::Float(v), SourceType::Explicit)
    }

    pub fn set_counter(
        &self,
        name: &str,
        v: i64,
    ) -> Result<()> {
        self.set(name, RecordValue::Counter(v), SourceType::Explicit)
    }

    pub fn set_string(
        &self,
        name: &str,
        v: Option<&str>,
    ) -> Result<()> {
        self.set(name, RecordValue::String(v.map(str::to_string)), SourceType::Explicit)
    }

    /// Parses `text` into the record's current data type, then sets it.
    pub fn set_converted(
        &self,
        name: &str,
        text: &str,
        source: SourceType,
    ) -> Result<()> {
        let data_type = self.data_type_of(name)?;
        let value = parse_value(name, data_type, text)?;
        self.set(name, value, source)
    }

    /// Like [`Registry::set_converted`], after running the record's
    /// validity check.
    pub fn set_validated(
        &self,
        name: &str,
        text: &str,
        source: SourceType,
    ) -> Result<()> {
        let valid = self.lookup(name, |state| state.meta.as_config().map(|meta| meta.validate(text)))?;
        match valid {
            None => Err(RegistryError::NotConfigRecord(name.to_string()).into()),
            Some(false) => Err(RegistryError::InvalidValue {
                name: name.to_string(),
                value: text.to_string(),
            }
            .into()),
            Some(true) => self.set_converted(name, text, source),
        }
    }

    /// Entry point for configuration readers: one discovered key/value.
    ///
    /// Unknown names are created unregistered. `inc_version` asks the next
    /// config text sync to bump the configuration version.
    pub fn consume_config_entry(
        &self,
        category: RecordCategory,
        data_type: DataType,
        name: &str,
        text: &str,
        source: SourceType,
        inc_version: bool,
    ) -> Result<()> {
        let value = parse_value(name, data_type, text)?;
        self.apply_set(SetRequest {
            category: Some(category),
            name,
            value,
            raw: None,
            source,
            inc_version,
        })
    }

    /// Restores a record's default and bumps its version.
    ///
    /// Records owned elsewhere are reset by sending the owner a RESET.
    pub fn reset_to_default(
        &self,
        name: &str,
    ) -> Result<()> {
        let record = self.find_or_not_found(name)?;
        let forward = {
            let mut state = record.lock();
            if self.owns(state.category) {
                reset_owned(&mut state);
                None
            } else {
                let mut image = RecordImage::capture(name, &state);
                image.value = state.default_value.clone();
                Some(image)
            }
        };
        if let Some(image) = forward {
            self.send_reset(image)?;
        }
        Ok(())
    }

    /// Resets every non-string stat of `category` (all stat categories when
    /// `None`). Non-persistent stats are skipped unless asked for.
    pub fn reset_stats(
        &self,
        category: Option<RecordCategory>,
        include_non_persistent: bool,
    ) -> Result<usize> {
        let mut reset = 0;
        for record in self.records() {
            let eligible = {
                let state = record.lock();
                let persist_ok = match state.meta.as_stat() {
                    Some(meta) => include_non_persistent || meta.persist == PersistType::Persistent,
                    None => false,
                };
                persist_ok
                    && state.data_type != DataType::String
                    && category.map_or(true, |c| c == state.category)
            };
            if eligible {
                self.reset_to_default(record.name())?;
                reset += 1;
            }
        }
        Ok(reset)
    }

    /// Re-queues a record for disk and peer sync without touching its value.
    pub fn set_sync_required(
        &self,
        name: &str,
    ) -> Result<()> {
        let record = self.find_or_not_found(name)?;
        let mut state = record.lock();
        state.sync_flags |= SyncFlags::REQUIRED;
        if let Some(meta) = state.meta.as_config_mut() {
            meta.update_required = UpdateScope::all();
        }
        Ok(())
    }

    // -
    // Reads

    /// Current value of a registered record of type `expected`.
    pub fn get(
        &self,
        name: &str,
        expected: DataType,
    ) -> Result<RecordValue> {
        let record = self.find_or_not_found(name)?;
        let state = record.lock();
        if !state.registered {
            return Err(RegistryError::NotFound(name.to_string()).into());
        }
        if state.data_type != expected {
            return Err(RegistryError::TypeMismatch {
                name: name.to_string(),
                expected,
                actual: state.data_type,
            }
            .into());
        }
        Ok(state.value.clone())
    }

    pub fn get_int(
        &self,
        name: &str,
    ) -> Result<i64> {
        Ok(self.get(name, DataType::Int)?.as_i64().unwrap_or_default())
    }

    pub fn get_counter(
        &self,
        name: &str,
    ) -> Result<i64> {
        Ok(self.get(name, DataType::Counter)?.as_i64().unwrap_or_default())
    }

    pub fn get_float(
        &self,
        name: &str,
    ) -> Result<f64> {
        Ok(self.get(name, DataType::Float)?.as_f64().unwrap_or_default())
    }

    pub fn get_string(
        &self,
        name: &str,
    ) -> Result<Option<String>> {
        match self.get(name, DataType::String)? {
            RecordValue::String(s) => Ok(s),
            _ => Ok(None),
        }
    }

    /// Runs `f` on one record under its lock.
    pub fn lookup<T>(
        &self,
        name: &str,
        f: impl FnOnce(&RecordState) -> T,
    ) -> Result<T> {
        let record = self.find_or_not_found(name)?;
        let state = record.lock();
        Ok(f(&state))
    }

    pub fn is_registered(
        &self,
        name: &str,
    ) -> bool {
        self.lookup(name, |state| state.registered).unwrap_or(false)
    }

    pub fn data_type_of(
        &self,
        name: &str,
    ) -> Result<DataType> {
        self.lookup(name, |state| state.data_type)
    }

    pub fn category_of(
        &self,
        name: &str,
    ) -> Result<RecordCategory> {
        self.lookup(name, |state| state.category)
    }

    pub fn persistence_of(
        &self,
        name: &str,
    ) -> Result<PersistType> {
        self.lookup(name, |state| state.meta.as_stat().map(|meta| meta.persist))?
            .ok_or_else(|| RegistryError::NotStatRecord(name.to_string()).into())
    }

    pub fn source_of(
        &self,
        name: &str,
    ) -> Result<SourceType> {
        self.config_meta_field(name, |meta| meta.source)
    }

    pub fn update_type_of(
        &self,
        name: &str,
    ) -> Result<UpdateType> {
        self.config_meta_field(name, |meta| meta.update_type)
    }

    pub fn access_of(
        &self,
        name: &str,
    ) -> Result<AccessType> {
        self.config_meta_field(name, |meta| meta.access)
    }

    fn config_meta_field<T>(
        &self,
        name: &str,
        f: impl FnOnce(&ConfigMeta) -> T,
    ) -> Result<T> {
        self.lookup(name, |state| state.meta.as_config().map(f))?
            .ok_or_else(|| RegistryError::NotConfigRecord(name.to_string()).into())
    }

    // -
    // Diagnostics

    /// Logs every config record that holds a value nobody registered.
    pub fn warn_if_unregistered(&self) -> usize {
        let mut count = 0;
        for record in self.records() {
            let state = record.lock();
            if state.is_config() && !state.registered {
                warn!("unrecognized configuration value '{}'", record.name());
                count += 1;
            }
        }
        count
    }

    pub fn dump_records(
        &self,
        mask: CategoryMask,
    ) {
        for record in self.records() {
            let state = record.lock();
            if !mask.matches(state.category) {
                continue;
            }
            info!(
                "{} {} {} {} (registered: {}, version: {}, flags: {:?})",
                state.category.label(),
                record.name(),
                state.data_type.label(),
                state.value,
                state.registered,
                state.version,
                state.sync_flags
            );
        }
    }
}

/// Re-registration in place. The super-category may never flip; only the
/// concrete category, type and default follow the new registration.
fn reconcile(
    name: &str,
    state: &mut RecordState,
    category: RecordCategory,
    default: &RecordValue,
) -> Result<()> {
    if state.category.is_config() != category.is_config() {
        error!(
            "record {} re-registered as {:?}, previously {:?}",
            name, category, state.category
        );
        return Err(Error::Fatal(format!(
            "record {name} cannot change from {:?} to {:?}",
            state.category, category
        )));
    }

    state.category = category;
    if state.data_type != default.data_type() {
        debug!(
            "record {} changes type {:?} -> {:?}",
            name,
            state.data_type,
            default.data_type()
        );
        state.retype(default.data_type());
        state.value = default.clone();
    }
    state.default_value = default.clone();
    state.registered = true;
    state.version = 0;
    Ok(())
}

fn apply_owned(
    state: &mut RecordState,
    req: &SetRequest<'_>,
) -> Result<()> {
    if state.data_type != req.value.data_type() {
        return Err(RegistryError::TypeMismatch {
            name: req.name.to_string(),
            expected: req.value.data_type(),
            actual: state.data_type,
        }
        .into());
    }

    if state.set_value(req.value.clone()) {
        state.sync_flags |= SyncFlags::REQUIRED;
        if req.inc_version {
            state.sync_flags |= SyncFlags::BUMP_VERSION;
        }
        if let Some(meta) = state.meta.as_config_mut() {
            meta.update_required = UpdateScope::all();
        }
    }

    match &mut state.meta {
        RecordMeta::Config(meta) => meta.source = req.source,
        RecordMeta::Stat(meta) => {
            if let Some(raw) = req.raw {
                meta.raw.set_sum(raw.sum);
                meta.raw.set_count(raw.count);
            }
        }
    }
    Ok(())
}

fn reset_owned(state: &mut RecordState) {
    state.version = state.version.wrapping_add(1);
    state.value = state.default_value.clone();
    state.sync_flags |= SyncFlags::REQUIRED;
    match &mut state.meta {
        RecordMeta::Stat(meta) => {
            meta.raw.set_sum(0);
            meta.raw.set_count(0);
        }
        RecordMeta::Config(meta) => meta.update_required = UpdateScope::all(),
    }
}

fn forward_image(
    category: RecordCategory,
    req: &SetRequest<'_>,
) -> RecordImage {
    let mut image = RecordImage::ephemeral(category, req.name, req.value.clone());
    match &mut image.meta {
        MetaImage::Stat { raw, .. } => {
            if let Some(values) = req.raw {
                *raw = values;
            }
        }
        MetaImage::Config { source, .. } => *source = req.source,
    }
    image
}

fn parse_value(
    name: &str,
    data_type: DataType,
    text: &str,
) -> Result<RecordValue> {
    RecordValue::parse(data_type, text).ok_or_else(|| {
        RegistryError::InvalidValue {
            name: name.to_string(),
            value: text.to_string(),
        }
        .into()
    })
}
