use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::error;


lazy_static! {
    pub static ref ENVELOPES_SENT: IntCounterVec = IntCounterVec::new(
        Opts::new("records_envelopes_sent", "Envelopes handed to the peer transport"),
        &["msg_type"]
    )
    .expect("metric can not be created");

    pub static ref ENVELOPES_RECEIVED: IntCounterVec = IntCounterVec::new(
        Opts::new("records_envelopes_received", "Envelopes applied from the peer"),
        &["msg_type"]
    )
    .expect("metric can not be created");

    pub static ref ENVELOPE_BYTES_SENT: IntCounter =
        IntCounter::new("records_envelope_bytes_sent", "Encoded envelope bytes sent to the peer")
            .expect("metric can not be created");

    pub static ref CORRUPT_ENVELOPES: IntCounter =
        IntCounter::new("records_corrupt_envelopes", "Envelope decodes cut short by a bad element")
            .expect("metric can not be created");

    pub static ref SNAPSHOT_WRITES: IntCounter =
        IntCounter::new("records_snapshot_writes", "Stats snapshots written to disk")
            .expect("metric can not be created");

    pub static ref SNAPSHOT_VERSION_MISMATCH: IntCounter = IntCounter::new(
        "records_snapshot_version_mismatch",
        "Stats snapshots discarded for a build version mismatch"
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        register_custom_metrics(&registry);
        registry
    };
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ENVELOPES_SENT.clone()),
        Box::new(ENVELOPES_RECEIVED.clone()),
        Box::new(ENVELOPE_BYTES_SENT.clone()),
        Box::new(CORRUPT_ENVELOPES.clone()),
        Box::new(SNAPSHOT_WRITES.clone()),
        Box::new(SNAPSHOT_VERSION_MISMATCH.clone()),
    ];
    for c in collectors {
        if let Err(e) = registry.register(c) {
            error!("collector can not be registered: {:?}", e);
        }
    }
}

/// Text exposition of every registry metric.
pub fn gather_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode metrics: {:?}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
