//! Peer transport
//!
//! The registry hands finished envelopes to an [`EnvelopeTransport`]; how the
//! bytes reach the other process is the transport's business.

#[cfg(test)]
mod transport_test;

#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tracing::trace;

use crate::metrics::ENVELOPES_SENT;
use crate::metrics::ENVELOPE_BYTES_SENT;
use crate::Envelope;
use crate::Result;
use crate::TransportError;

#[cfg_attr(test, automock)]
pub trait EnvelopeTransport: Send + Sync + 'static {
    fn send(
        &self,
        envelope: Envelope,
    ) -> Result<()>;
}

/// In-process transport over an unbounded channel of encoded envelopes.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelTransport {
    /// Returns the sending half and the receiver the peer drains.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EnvelopeTransport for ChannelTransport {
    fn send(
        &self,
        envelope: Envelope,
    ) -> Result<()> {
        let msg_type = envelope.msg_type();
        let bytes = envelope.to_bytes();
        let len = bytes.len();

        self.tx
            .send(bytes)
            .map_err(|_| TransportError::ChannelClosed { msg_type })?;

        trace!("sent {:?} envelope ({} bytes)", msg_type, len);
        ENVELOPES_SENT.with_label_values(&[msg_type.label()]).inc();
        ENVELOPE_BYTES_SENT.inc_by(len as u64);
        Ok(())
    }
}

/// Drops every envelope; for processes without a peer.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl EnvelopeTransport for NullTransport {
    fn send(
        &self,
        envelope: Envelope,
    ) -> Result<()> {
        trace!("dropping {:?} envelope", envelope.msg_type());
        Ok(())
    }
}
