//! Shared fixtures for unit tests.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::ChannelTransport;
use crate::ConfigSpec;
use crate::Envelope;
use crate::PersistType;
use crate::ProcessRole;
use crate::RecordCategory;
use crate::RecordValue;
use crate::Registry;

pub(crate) const TEST_CAPACITY: usize = 64;

pub(crate) fn standalone() -> Registry {
    Registry::new(ProcessRole::Standalone, TEST_CAPACITY)
}

/// A manager and a server wired to each other over channels.
pub(crate) struct LinkedPair {
    pub manager: Arc<Registry>,
    pub server: Arc<Registry>,
    /// Envelopes sent by the server, to be applied by the manager
    pub to_manager: UnboundedReceiver<Vec<u8>>,
    /// Envelopes sent by the manager, to be applied by the server
    pub to_server: UnboundedReceiver<Vec<u8>>,
}

impl LinkedPair {
    pub(crate) fn new() -> Self {
        let manager = Arc::new(Registry::new(ProcessRole::Manager, TEST_CAPACITY));
        let server = Arc::new(Registry::new(ProcessRole::Server, TEST_CAPACITY));

        let (manager_tx, to_server) = ChannelTransport::pair();
        let (server_tx, to_manager) = ChannelTransport::pair();
        manager.attach_transport(Arc::new(manager_tx));
        server.attach_transport(Arc::new(server_tx));

        Self {
            manager,
            server,
            to_manager,
            to_server,
        }
    }

    /// Applies everything the server has sent so far.
    pub(crate) fn deliver_to_manager(&mut self) -> usize {
        drain(&mut self.to_manager, &self.manager)
    }

    /// Applies everything the manager has sent so far.
    pub(crate) fn deliver_to_server(&mut self) -> usize {
        drain(&mut self.to_server, &self.server)
    }
}

/// Applies every queued envelope to `registry`; returns the envelope count.
pub(crate) fn drain(
    rx: &mut UnboundedReceiver<Vec<u8>>,
    registry: &Registry,
) -> usize {
    let mut delivered = 0;
    while let Ok(bytes) = rx.try_recv() {
        registry.receive_bytes(&bytes).expect("apply envelope");
        delivered += 1;
    }
    delivered
}

/// Every queued envelope, decoded.
pub(crate) fn collect(rx: &mut UnboundedReceiver<Vec<u8>>) -> Vec<Envelope> {
    let mut out = Vec::new();
    while let Ok(bytes) = rx.try_recv() {
        out.push(Envelope::from_bytes(&bytes).expect("decode envelope"));
    }
    out
}

pub(crate) fn register_int_config(
    registry: &Registry,
    name: &str,
    default: i64,
) {
    registry
        .register_config(
            RecordCategory::Config,
            name,
            RecordValue::Int(default),
            ConfigSpec::default(),
        )
        .expect("register config");
}

pub(crate) fn register_int_stat(
    registry: &Registry,
    category: RecordCategory,
    name: &str,
    persist: PersistType,
) {
    registry
        .register_stat(category, name, RecordValue::Int(0), persist)
        .expect("register stat");
}
