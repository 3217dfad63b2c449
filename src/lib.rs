//! Shared registry of typed configuration and statistics records for a
//! multi-process proxy.
//!
//! A [`Registry`] holds named records in a fixed-capacity table. Each process
//! owns a subset of record categories; mutations of records owned elsewhere
//! travel to the owner as [`Envelope`]s over an [`EnvelopeTransport`].
//! Statistics are accumulated in per-thread counters ([`RawStatBlock`]) and
//! folded into their records by a periodic sync, and persistent stats survive
//! restarts through a [`StatsSnapshot`].

mod codec;
mod config;
pub(crate) mod constants;
mod errors;
mod metrics;
mod persistence;
mod record;
mod registry;
mod stats;
mod tasks;
mod transport;

pub use codec::*;
pub use config::*;
pub use errors::*;
pub use metrics::gather_metrics;
pub use persistence::*;
pub use record::*;
pub use registry::*;
pub use stats::*;
pub use tasks::*;
pub use transport::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
