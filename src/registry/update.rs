//! Config update callbacks and the periodic sweep that fires them.

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::Registry;
use crate::DataType;
use crate::RecordMeta;
use crate::RecordState;
use crate::RecordValue;
use crate::RegistryError;
use crate::Result;
use crate::UpdateCallback;
use crate::UpdateScope;
use crate::UpdateType;

impl Registry {
    /// Appends a callback to a config record's update list.
    ///
    /// Callbacks run under the record's lock: they may read other records
    /// but must not touch their own.
    pub fn register_update_callback(
        &self,
        name: &str,
        callback: impl Fn(&str, &RecordValue) + Send + Sync + 'static,
    ) -> Result<()> {
        let callback: UpdateCallback = Arc::new(callback);
        let record = self
            .find(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        let mut state = record.lock();
        match state.meta.as_config_mut() {
            Some(meta) => {
                meta.callbacks.push(callback);
                Ok(())
            }
            None => Err(RegistryError::NotConfigRecord(name.to_string()).into()),
        }
    }

    /// Fires callbacks of every config record pending an update in `scope`,
    /// clears that scope, and returns the most severe update type seen.
    pub fn exec_config_update_callbacks(
        &self,
        scope: UpdateScope,
    ) -> UpdateType {
        let mut max = UpdateType::None;

        for record in self.records() {
            let mut guard = record.lock();
            let RecordState { value, meta, .. } = &mut *guard;
            let RecordMeta::Config(meta) = meta else {
                continue;
            };
            if !meta.update_required.intersects(scope) {
                continue;
            }

            max = max.max(meta.update_type);
            debug!(
                "running {} update callbacks for {}",
                meta.callbacks.len(),
                record.name()
            );
            for callback in &meta.callbacks {
                callback(record.name(), value);
            }
            meta.update_required.remove(scope);
        }

        max
    }

    fn expect_type(
        &self,
        name: &str,
        expected: DataType,
    ) -> Result<RecordValue> {
        let (data_type, value) = self.lookup(name, |state| (state.data_type, state.value.clone()))?;
        if data_type != expected {
            return Err(RegistryError::TypeMismatch {
                name: name.to_string(),
                expected,
                actual: data_type,
            }
            .into());
        }
        Ok(value)
    }

    /// Keeps `cell` equal to an Int config record.
    pub fn link_int(
        &self,
        name: &str,
        cell: Arc<AtomicI64>,
    ) -> Result<()> {
        self.link_integer(name, DataType::Int, cell)
    }

    /// Keeps `cell` equal to a Counter config record.
    pub fn link_counter(
        &self,
        name: &str,
        cell: Arc<AtomicI64>,
    ) -> Result<()> {
        self.link_integer(name, DataType::Counter, cell)
    }

    fn link_integer(
        &self,
        name: &str,
        data_type: DataType,
        cell: Arc<AtomicI64>,
    ) -> Result<()> {
        let current = self.expect_type(name, data_type)?;
        cell.store(current.as_i64().unwrap_or_default(), Ordering::Release);
        self.register_update_callback(name, move |_, value| {
            if let Some(v) = value.as_i64() {
                cell.store(v, Ordering::Release);
            }
        })
    }

    /// Keeps `cell` equal to a Float config record.
    pub fn link_float(
        &self,
        name: &str,
        cell: Arc<RwLock<f64>>,
    ) -> Result<()> {
        let current = self.expect_type(name, DataType::Float)?;
        *cell.write() = current.as_f64().unwrap_or_default();
        self.register_update_callback(name, move |_, value| {
            if let Some(v) = value.as_f64() {
                *cell.write() = v;
            }
        })
    }

    /// Keeps `cell` equal to a String config record; null maps to `None`.
    pub fn link_string(
        &self,
        name: &str,
        cell: Arc<RwLock<Option<String>>>,
    ) -> Result<()> {
        let current = self.expect_type(name, DataType::String)?;
        *cell.write() = current.as_str().map(str::to_string);
        self.register_update_callback(name, move |_, value| {
            *cell.write() = value.as_str().map(str::to_string);
        })
    }
}
