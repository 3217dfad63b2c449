use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use records::gather_metrics;
use records::ConfigSpec;
use records::DataType;
use records::FixedPoolAllocator;
use records::PersistType;
use records::RawStatBlock;
use records::RawStatSyncKind;
use records::RecordCategory;
use records::RecordValue;
use records::SyncConfig;
use tempfile::tempdir;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::common::linked_processes;
use crate::common::start_process;

const PORT: &str = "proxy.config.http.server_port";
const HITS: &str = "proxy.process.http.completed_requests";

fn cycles(n: u32) -> Duration {
    SyncConfig::default().remote_sync_interval() * n + Duration::from_millis(10)
}

#[tokio::test(start_paused = true)]
async fn manager_and_server_converge() {
    let manager_dir = tempdir().unwrap();
    let server_dir = tempdir().unwrap();
    let (mut manager, mut server) = linked_processes();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let manager_tasks = start_process(&mut manager, manager_dir.path(), shutdown_rx.clone());
    let server_tasks = start_process(&mut server, server_dir.path(), shutdown_rx);

    // configuration belongs to the manager; the server pulls it
    manager
        .registry
        .register_config(
            RecordCategory::Config,
            PORT,
            RecordValue::Int(8080),
            ConfigSpec::default(),
        )
        .unwrap();
    server.registry.send_pull_request().unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(server.registry.get_int(PORT).unwrap(), 8080);

    let port = Arc::new(AtomicI64::new(0));
    server.registry.link_int(PORT, port.clone()).unwrap();

    // process stats belong to the server and are counted per thread
    let pool = Arc::new(FixedPoolAllocator::new(2, 16));
    let block = RawStatBlock::allocate(pool.clone(), 1).unwrap();
    server
        .registry
        .register_raw_stat(
            &block,
            RecordCategory::ProcessStat,
            HITS,
            DataType::Int,
            PersistType::Persistent,
            0,
            RawStatSyncKind::Sum,
        )
        .unwrap();
    let slab = pool.attach_thread().unwrap();
    for _ in 0..25 {
        block.increment(&slab, 0, 1).unwrap();
    }

    sleep(cycles(2)).await;
    assert_eq!(server.registry.get_int(HITS).unwrap(), 25);
    assert_eq!(manager.registry.get_int(HITS).unwrap(), 25);

    // a config change on the manager reaches the server's linked value
    manager.registry.set_int(PORT, 8443).unwrap();
    sleep(cycles(2)).await;
    assert_eq!(server.registry.get_int(PORT).unwrap(), 8443);
    assert_eq!(port.load(Ordering::Acquire), 8443);
    let config_text = std::fs::read_to_string(manager_dir.path().join("records.config")).unwrap();
    assert!(config_text.contains("CONFIG proxy.config.http.server_port INT 8443"));

    // a config change made on the server is forwarded to the manager
    server.registry.set_int(PORT, 9000).unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(manager.registry.get_int(PORT).unwrap(), 9000);
    assert_eq!(server.registry.get_int(PORT).unwrap(), 8443);
    sleep(cycles(1)).await;
    assert_eq!(server.registry.get_int(PORT).unwrap(), 9000);

    // only the manager persists stats
    assert!(manager_dir.path().join("records.snap").exists());
    assert!(!server_dir.path().join("records.snap").exists());

    assert!(gather_metrics().contains("records_envelopes_sent"));

    shutdown_tx.send(()).unwrap();
    manager_tasks.join().await;
    server_tasks.join().await;
}

#[tokio::test(start_paused = true)]
async fn manager_reset_of_server_stat_restarts_counting() {
    let manager_dir = tempdir().unwrap();
    let server_dir = tempdir().unwrap();
    let (mut manager, mut server) = linked_processes();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let manager_tasks = start_process(&mut manager, manager_dir.path(), shutdown_rx.clone());
    let server_tasks = start_process(&mut server, server_dir.path(), shutdown_rx);

    let pool = Arc::new(FixedPoolAllocator::new(1, 8));
    let block = RawStatBlock::allocate(pool.clone(), 1).unwrap();
    server
        .registry
        .register_raw_stat(
            &block,
            RecordCategory::ProcessStat,
            HITS,
            DataType::Int,
            PersistType::Persistent,
            0,
            RawStatSyncKind::Sum,
        )
        .unwrap();
    let slab = pool.attach_thread().unwrap();
    for _ in 0..40 {
        block.increment(&slab, 0, 1).unwrap();
    }
    sleep(cycles(2)).await;
    assert_eq!(manager.registry.get_int(HITS).unwrap(), 40);

    manager.registry.reset_to_default(HITS).unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(server.registry.get_int(HITS).unwrap(), 0);
    // the next raw sync sees the new version and clears the counter
    sleep(cycles(1)).await;
    assert_eq!(block.get_sum(0).unwrap(), 0);

    for _ in 0..3 {
        block.increment(&slab, 0, 1).unwrap();
    }
    sleep(cycles(2)).await;
    assert_eq!(server.registry.get_int(HITS).unwrap(), 3);
    assert_eq!(manager.registry.get_int(HITS).unwrap(), 3);

    shutdown_tx.send(()).unwrap();
    manager_tasks.join().await;
    server_tasks.join().await;
}
