//! Periodic drivers
//!
//! Background tokio tasks that keep a registry moving: raw-stat aggregation,
//! the config update sweep for the role's scope, and remote sync (peer push
//! plus on-disk snapshots). Every task exits when the shutdown watch fires.


use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval_at;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::write_config_file;
use crate::PersistenceConfig;
use crate::Registry;
use crate::StatsSnapshot;
use crate::SyncConfig;
use crate::UpdateType;

/// Outcome of one remote sync pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RemoteSyncReport {
    pub pushed: bool,
    pub snapshot_written: bool,
    pub config_written: bool,
    /// A non-local config change asked for a configuration version bump
    pub inc_version: bool,
}

/// Pushes pending records to the peer, then writes the stats snapshot and
/// the config text if anything changed. Failures are logged; each step runs
/// regardless of the others. Config records stay pending until their text
/// is on disk.
pub fn remote_sync_once(
    registry: &Registry,
    snapshot: &StatsSnapshot,
    config_path: &Path,
) -> RemoteSyncReport {
    let mut report = RemoteSyncReport::default();

    match registry.send_push() {
        Ok(pushed) => report.pushed = pushed,
        Err(e) => warn!("peer push failed: {}", e),
    }

    match snapshot.write(registry) {
        Ok(written) => report.snapshot_written = written,
        Err(e) => warn!("stats snapshot write failed: {}", e),
    }

    if let Some(sync) = registry.sync_config_text() {
        match write_config_file(config_path, &sync.text) {
            Ok(()) => {
                report.config_written = true;
                report.inc_version = sync.inc_version;
            }
            Err(e) => {
                warn!("config file write failed: {}", e);
                registry.restore_config_text_flags(&sync);
            }
        }
    }

    trace!("remote sync: {:?}", report);
    report
}

/// Handles of the running background tasks.
#[derive(Debug)]
pub struct RecordsSyncer {
    handles: Vec<JoinHandle<()>>,
}

impl RecordsSyncer {
    /// Spawns the periodic tasks on the current tokio runtime.
    pub fn start(
        registry: Arc<Registry>,
        sync: &SyncConfig,
        persistence: &PersistenceConfig,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        let snapshot = StatsSnapshot::new(persistence.stats_snapshot_path());
        let config_path: PathBuf = persistence.config_path();
        info!(
            "starting records sync tasks (role: {:?}, snapshot: {})",
            registry.role(),
            snapshot.path().display()
        );

        let raw_stats = {
            let registry = registry.clone();
            spawn_periodic(
                "raw_stat_sync",
                sync.raw_stat_sync_interval(),
                shutdown.clone(),
                move || {
                    let synced = registry.exec_raw_stat_sync();
                    trace!("synced {} raw stats", synced);
                },
            )
        };

        let config_updates = {
            let registry = registry.clone();
            let scope = registry.role().update_scope();
            spawn_periodic(
                "config_update",
                sync.config_update_interval(),
                shutdown.clone(),
                move || {
                    let update = registry.exec_config_update_callbacks(scope);
                    if update > UpdateType::Dynamic {
                        info!("configuration change needs {:?}", update);
                    }
                },
            )
        };

        let remote = spawn_periodic("remote_sync", sync.remote_sync_interval(), shutdown, move || {
            let report = remote_sync_once(&registry, &snapshot, &config_path);
            if report.inc_version {
                info!("configuration version bump requested");
            }
        });

        Self {
            handles: vec![raw_stats, config_updates, remote],
        }
    }

    /// Applies every envelope arriving on `rx` until the channel closes or
    /// shutdown fires.
    pub fn spawn_receiver(
        &mut self,
        registry: Arc<Registry>,
        mut rx: UnboundedReceiver<Vec<u8>>,
        mut shutdown: watch::Receiver<()>,
    ) {
        self.handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = rx.recv() => match msg {
                        Some(bytes) => {
                            if let Err(e) = registry.receive_bytes(&bytes) {
                                warn!("dropping envelope from peer: {}", e);
                            }
                        }
                        None => {
                            debug!("peer channel closed");
                            break;
                        }
                    },
                    _ = shutdown.changed() => {
                        debug!("receiver task stopping");
                        break;
                    }
                }
            }
        }));
    }

    /// Waits for every task to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("records sync task crashed: {:?}", e);
            }
        }
    }
}

fn spawn_periodic(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<()>,
    mut tick: impl FnMut() + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => tick(),
                _ = shutdown.changed() => {
                    debug!("{} task stopping", name);
                    break;
                }
            }
        }
    })
}
