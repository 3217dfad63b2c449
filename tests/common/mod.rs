use std::path::Path;
use std::sync::Arc;

use records::ChannelTransport;
use records::PersistenceConfig;
use records::ProcessRole;
use records::RecordsSyncer;
use records::Registry;
use records::SyncConfig;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;

pub const MAX_RECORDS: usize = 256;

/// A registry with its peer link and the receiver the peer drains.
pub struct Process {
    pub registry: Arc<Registry>,
    pub inbox: Option<UnboundedReceiver<Vec<u8>>>,
}

/// Creates a manager and a server whose transports point at each other.
pub fn linked_processes() -> (Process, Process) {
    let manager = Arc::new(Registry::new(ProcessRole::Manager, MAX_RECORDS));
    let server = Arc::new(Registry::new(ProcessRole::Server, MAX_RECORDS));

    let (manager_tx, server_inbox) = ChannelTransport::pair();
    let (server_tx, manager_inbox) = ChannelTransport::pair();
    manager.attach_transport(Arc::new(manager_tx));
    server.attach_transport(Arc::new(server_tx));

    (
        Process {
            registry: manager,
            inbox: Some(manager_inbox),
        },
        Process {
            registry: server,
            inbox: Some(server_inbox),
        },
    )
}

/// Starts the periodic tasks of `process` plus a receiver draining its
/// inbox. Snapshots land in `dir`.
pub fn start_process(
    process: &mut Process,
    dir: &Path,
    shutdown: watch::Receiver<()>,
) -> RecordsSyncer {
    let mut syncer = RecordsSyncer::start(
        process.registry.clone(),
        &SyncConfig::default(),
        &persistence_in(dir),
        shutdown.clone(),
    );
    let inbox = process.inbox.take().expect("inbox already taken");
    syncer.spawn_receiver(process.registry.clone(), inbox, shutdown);
    syncer
}

pub fn persistence_in(dir: &Path) -> PersistenceConfig {
    PersistenceConfig {
        snapshot_dir: dir.to_path_buf(),
        ..Default::default()
    }
}
