use std::collections::HashSet;
use std::fmt::Write;

use tracing::debug;

use super::Registry;
use crate::RecordCategory;
use crate::SyncFlags;

/// Names that have ever been written to the config text, in first-write
/// order.
#[derive(Debug, Default)]
pub(crate) struct ConfigContents {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl ConfigContents {
    fn add(
        &mut self,
        name: &str,
    ) {
        if self.seen.insert(name.to_string()) {
            self.order.push(name.to_string());
        }
    }
}

/// Rendered config text and whether the config version must be bumped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigTextSync {
    pub text: String,
    pub inc_version: bool,
    /// Records whose disk flag was taken, with whether they carried a
    /// version bump
    pub(crate) taken: Vec<(String, bool)>,
}

impl Registry {
    /// Collects config records pending a disk write and renders the full
    /// config text, one `CATEGORY name TYPE value` line per record.
    ///
    /// Returns `None` when nothing changed or this process does not persist.
    pub fn sync_config_text(&self) -> Option<ConfigTextSync> {
        if !self.role.persists() {
            return None;
        }

        let mut taken = Vec::new();
        let mut inc_version = false;
        let mut contents = self.config_contents.lock();

        for record in self.records() {
            let mut state = record.lock();
            if !state.is_config() || !state.sync_flags.contains(SyncFlags::DISK) {
                continue;
            }
            state.sync_flags.remove(SyncFlags::DISK);
            let bump = state.sync_flags.contains(SyncFlags::BUMP_VERSION);
            if bump {
                state.sync_flags.remove(SyncFlags::BUMP_VERSION);
                if state.category != RecordCategory::LocalConfig {
                    inc_version = true;
                }
            }
            contents.add(record.name());
            taken.push((record.name().to_string(), bump));
        }

        if taken.is_empty() {
            return None;
        }

        let mut text = String::new();
        for name in &contents.order {
            let Some(record) = self.find(name) else {
                continue;
            };
            let state = record.lock();
            let _ = writeln!(
                text,
                "{} {} {} {}",
                state.category.label(),
                name,
                state.data_type.label(),
                state.value
            );
        }
        debug!(
            "config text holds {} records (inc_version: {})",
            contents.order.len(),
            inc_version
        );

        Some(ConfigTextSync {
            text,
            inc_version,
            taken,
        })
    }

    /// Puts back the flags taken by `sync_config_text` after the text
    /// failed to reach disk, so the next pass writes it again.
    pub fn restore_config_text_flags(
        &self,
        sync: &ConfigTextSync,
    ) {
        for (name, bump) in &sync.taken {
            let Some(record) = self.find(name) else {
                continue;
            };
            let mut state = record.lock();
            state.sync_flags |= SyncFlags::DISK;
            if *bump {
                state.sync_flags |= SyncFlags::BUMP_VERSION;
            }
        }
        debug!("{} config records pending disk sync again", sync.taken.len());
    }
}
