//! Stats snapshot and config text persistence.
//!
//! The stats snapshot is a 5-byte build version header followed by one
//! envelope holding every persistent stat. A snapshot from another build is
//! deleted on read and treated as absent.

mod config_file;
pub use config_file::*;


use std::fs::File;
use std::io::ErrorKind;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::constants::VERSION_HEADER_LEN;
use crate::metrics::SNAPSHOT_VERSION_MISMATCH;
use crate::metrics::SNAPSHOT_WRITES;
use crate::Envelope;
use crate::MessageType;
use crate::PersistType;
use crate::RecordImage;
use crate::RecordMeta;
use crate::RecordState;
use crate::Registry;
use crate::Result;
use crate::StorageError;
use crate::SyncFlags;

/// `'V'`, the characters at positions 0, 2 and 4 of `version`, `NUL`.
///
/// For a dotted `major.minor.patch` version with single digit parts that is
/// one digit per part. Missing characters are zero bytes.
pub fn version_header(version: &str) -> [u8; VERSION_HEADER_LEN] {
    let b = version.as_bytes();
    let at = |i: usize| b.get(i).copied().unwrap_or(0);
    [b'V', at(0), at(2), at(4), 0]
}

fn path_error(
    path: &Path,
    source: std::io::Error,
) -> StorageError {
    StorageError::PathError {
        path: path.to_path_buf(),
        source,
    }
}

/// Location and build version of the stats snapshot.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    path: PathBuf,
    header: [u8; VERSION_HEADER_LEN],
}

impl StatsSnapshot {
    /// Snapshot stamped with this crate's build version.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_version(path, env!("CARGO_PKG_VERSION"))
    }

    pub fn with_version(
        path: impl Into<PathBuf>,
        version: &str,
    ) -> Self {
        Self {
            path: path.into(),
            header: version_header(version),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes every persistent stat. Only processes that persist write;
    /// returns whether a file was written.
    pub fn write(
        &self,
        registry: &Registry,
    ) -> Result<bool> {
        if !registry.role().persists() {
            return Ok(false);
        }

        let mut envelope = Envelope::new(MessageType::Null);
        for record in registry.records() {
            let state = record.lock();
            let persistent = matches!(
                state.meta.as_stat(),
                Some(meta) if meta.persist == PersistType::Persistent
            );
            if persistent {
                envelope.marshal(&RecordImage::capture(record.name(), &state));
            }
        }

        let mut file = File::create(&self.path).map_err(|e| path_error(&self.path, e))?;
        file.write_all(&self.header)
            .and_then(|_| file.write_all(&envelope.to_bytes()))
            .and_then(|_| file.sync_all())
            .map_err(|e| path_error(&self.path, e))?;

        SNAPSHOT_WRITES.inc();
        debug!(
            "wrote {} persistent stats to {}",
            envelope.entries(),
            self.path.display()
        );
        Ok(true)
    }

    /// Fails with `IncompatibleSnapshotVersion` unless `bytes` starts with
    /// this build's version header.
    pub(crate) fn check_header(
        &self,
        bytes: &[u8],
    ) -> Result<()> {
        if bytes.len() < VERSION_HEADER_LEN || bytes[..VERSION_HEADER_LEN] != self.header {
            return Err(StorageError::IncompatibleSnapshotVersion {
                path: self.path.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Applies a previously written snapshot. Returns how many records were
    /// restored; a missing, foreign or unreadable snapshot restores none.
    pub fn restore(
        &self,
        registry: &Registry,
    ) -> Result<usize> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no stats snapshot at {}", self.path.display());
                return Ok(0);
            }
            Err(e) => return Err(path_error(&self.path, e).into()),
        };

        if let Err(e) = self.check_header(&bytes) {
            warn!("{}: written by an incompatible build, discarding", e);
            SNAPSHOT_VERSION_MISMATCH.inc();
            std::fs::remove_file(&self.path).map_err(|e| path_error(&self.path, e))?;
            return Ok(0);
        }

        let envelope = match Envelope::from_bytes(&bytes[VERSION_HEADER_LEN..]) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("unreadable stats snapshot {}: {}", self.path.display(), e);
                return Ok(0);
            }
        };

        let mut restored = 0;
        for image in &envelope {
            if image.name.is_empty() {
                continue;
            }
            match restore_one(registry, &image) {
                Ok(true) => restored += 1,
                Ok(false) => {}
                Err(e) => warn!("could not restore {}: {}", image.name, e),
            }
        }

        info!("restored {} stats from {}", restored, self.path.display());
        Ok(restored)
    }
}

/// Restores one image. Unregistered names take the value speculatively;
/// registered stats only if still persistent and of the same type.
fn restore_one(
    registry: &Registry,
    image: &RecordImage,
) -> Result<bool> {
    if !image.category.is_stat() {
        return Ok(false);
    }

    let (record, created) = registry.insert_with(&image.name, || RecordState {
        category: image.category,
        data_type: image.data_type,
        value: image.value.clone(),
        default_value: image.default_value.clone(),
        version: image.version,
        registered: false,
        sync_flags: SyncFlags::empty(),
        rsb_id: None,
        meta: {
            let mut meta = RecordMeta::for_category(image.category, image.source());
            if let (Some(stat), Some(persist), Some(raw)) = (meta.as_stat_mut(), image.persist(), image.raw()) {
                stat.persist = persist;
                stat.raw.set_sum(raw.sum);
                stat.raw.set_count(raw.count);
            }
            meta
        },
    })?;
    if created {
        return Ok(true);
    }

    let mut state = record.lock();
    let RecordState {
        registered,
        data_type,
        value,
        meta,
        ..
    } = &mut *state;
    let RecordMeta::Stat(stat) = meta else {
        warn!("snapshot holds stat {} but it is registered as config", image.name);
        return Ok(false);
    };
    if *registered && stat.persist == PersistType::NonPersistent {
        return Ok(false);
    }
    if *data_type != image.data_type {
        debug!(
            "skipping {} from snapshot: type {:?} is now {:?}",
            image.name, image.data_type, data_type
        );
        return Ok(false);
    }

    *value = image.value.clone();
    if let Some(raw) = image.raw() {
        stat.raw.set_sum(raw.sum);
        stat.raw.set_count(raw.count);
    }
    Ok(true)
}
