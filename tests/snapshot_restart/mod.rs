use std::sync::Arc;

use records::DataType;
use records::FixedPoolAllocator;
use records::PersistType;
use records::ProcessRole;
use records::RawStatBlock;
use records::RawStatSyncKind;
use records::RecordCategory;
use records::RecordsConfig;
use records::Registry;
use records::StatsSnapshot;
use tempfile::tempdir;

use crate::common::persistence_in;

const HITS: &str = "proxy.process.http.completed_requests";
const ACTIVE: &str = "proxy.process.http.current_connections";

/// One process lifetime: registers the stats, counts, syncs and snapshots.
fn run_process(
    snapshot: &StatsSnapshot,
    hits: usize,
) -> Registry {
    let config = RecordsConfig::default();
    let registry = Registry::from_config(&config.registry);
    assert_eq!(registry.role(), ProcessRole::Standalone);
    snapshot.restore(&registry).unwrap();

    let pool = Arc::new(FixedPoolAllocator::new(1, 8));
    let block = RawStatBlock::allocate(pool.clone(), 2).unwrap();
    registry
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
    registry
        .register_raw_stat(
            &block,
            RecordCategory::ProcessStat,
            ACTIVE,
            DataType::Int,
            PersistType::NonPersistent,
            1,
            RawStatSyncKind::Sum,
        )
        .unwrap();

    let slab = pool.attach_thread().unwrap();
    for _ in 0..hits {
        block.increment(&slab, 0, 1).unwrap();
        block.increment(&slab, 1, 1).unwrap();
    }
    registry.exec_raw_stat_sync();
    assert!(snapshot.write(&registry).unwrap());
    registry
}

#[test]
fn persistent_stats_survive_restart() {
    let dir = tempdir().unwrap();
    let snapshot = StatsSnapshot::new(persistence_in(dir.path()).stats_snapshot_path());

    let first = run_process(&snapshot, 25);
    assert_eq!(first.get_int(HITS).unwrap(), 25);
    assert_eq!(first.get_int(ACTIVE).unwrap(), 25);

    let second = run_process(&snapshot, 5);
    assert_eq!(second.get_int(HITS).unwrap(), 30);
    // non-persistent stats start over
    assert_eq!(second.get_int(ACTIVE).unwrap(), 5);
}

#[test]
fn snapshot_from_another_build_is_ignored() {
    let dir = tempdir().unwrap();
    let path = persistence_in(dir.path()).stats_snapshot_path();

    run_process(&StatsSnapshot::with_version(&path, "0.0.1"), 25);
    assert!(path.exists());

    let upgraded = StatsSnapshot::with_version(&path, "0.0.2");
    let registry = run_process(&upgraded, 5);
    assert_eq!(registry.get_int(HITS).unwrap(), 5);
}
