//! Peer protocol: building outbound envelopes and applying inbound ones.

use std::sync::Arc;

use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use super::ConfigSpec;
use super::Registry;
use super::SetRequest;
use crate::metrics::ENVELOPES_RECEIVED;
use crate::Envelope;
use crate::MessageType;
use crate::MetaImage;
use crate::PersistType;
use crate::Record;
use crate::RecordImage;
use crate::RecordMeta;
use crate::RecordState;
use crate::Result;
use crate::SyncFlags;

impl Registry {
    /// Hands an envelope to the attached transport. Without one the
    /// envelope is dropped.
    pub(crate) fn send(
        &self,
        envelope: Envelope,
    ) -> Result<()> {
        match self.transport() {
            Some(transport) => transport.send(envelope),
            None => {
                debug!(
                    "no peer transport attached, dropping {:?} envelope of {} records",
                    envelope.msg_type(),
                    envelope.entries()
                );
                Ok(())
            }
        }
    }

    fn send_one(
        &self,
        msg_type: MessageType,
        image: RecordImage,
    ) -> Result<()> {
        trace!("sending {:?} for {}", msg_type, image.name);
        let mut envelope = Envelope::new(msg_type);
        envelope.marshal(&image);
        self.send(envelope)
    }

    pub(crate) fn send_set(
        &self,
        image: RecordImage,
    ) -> Result<()> {
        self.send_one(MessageType::Set, image)
    }

    pub(crate) fn send_reset(
        &self,
        image: RecordImage,
    ) -> Result<()> {
        self.send_one(MessageType::Reset, image)
    }

    pub(crate) fn send_register(
        &self,
        image: RecordImage,
    ) -> Result<()> {
        self.send_one(MessageType::Register, image)
    }

    /// Sends every owned record awaiting peer sync.
    ///
    /// Returns whether anything was sent. The peer flag is cleared as each
    /// record is marshalled and restored if the send fails.
    pub fn send_push(&self) -> Result<bool> {
        let mut envelope = Envelope::new(MessageType::Push);
        let mut pushed: Vec<Arc<Record>> = Vec::new();

        for record in self.records() {
            let mut state = record.lock();
            if !self.owns(state.category) || !state.sync_flags.contains(SyncFlags::PEER) {
                continue;
            }
            envelope.marshal(&RecordImage::capture(record.name(), &state));
            state.sync_flags.remove(SyncFlags::PEER);
            drop(state);
            pushed.push(record);
        }

        if envelope.is_empty() {
            return Ok(false);
        }

        debug!("pushing {} records", envelope.entries());
        if let Err(e) = self.send(envelope) {
            for record in pushed {
                record.lock().sync_flags |= SyncFlags::PEER;
            }
            return Err(e);
        }
        Ok(true)
    }

    /// Asks the peer for a full dump of what it owns.
    pub fn send_pull_request(&self) -> Result<()> {
        self.send(Envelope::new(MessageType::PullReq))
    }

    /// Full dump answering a pull request: owned records, plus stats that
    /// are unregistered or non-persistent here. Always sent, even empty.
    ///
    /// Records that were awaiting peer sync stay pending if the send fails.
    pub fn send_pull_ack(&self) -> Result<()> {
        let mut envelope = Envelope::new(MessageType::PullAck);
        let mut taken: Vec<Arc<Record>> = Vec::new();

        for record in self.records() {
            let mut state = record.lock();
            let include = self.owns(state.category)
                || match state.meta.as_stat() {
                    Some(meta) => !state.registered || meta.persist == PersistType::NonPersistent,
                    None => false,
                };
            if !include {
                continue;
            }
            envelope.marshal(&RecordImage::capture(record.name(), &state));
            if state.sync_flags.contains(SyncFlags::PEER) {
                state.sync_flags.remove(SyncFlags::PEER);
                drop(state);
                taken.push(record);
            }
        }

        debug!("answering pull request with {} records", envelope.entries());
        if let Err(e) = self.send(envelope) {
            for record in taken {
                record.lock().sync_flags |= SyncFlags::PEER;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Applies an inbound envelope. Returns how many elements were applied;
    /// elements that fail are logged and skipped.
    pub fn receive(
        &self,
        envelope: &Envelope,
    ) -> Result<usize> {
        let msg_type = envelope.msg_type();
        ENVELOPES_RECEIVED.with_label_values(&[msg_type.label()]).inc();
        trace!("received {:?} envelope with {} entries", msg_type, envelope.entries());

        if msg_type == MessageType::PullReq {
            self.send_pull_ack()?;
            return Ok(0);
        }

        let mut applied = 0;
        for image in envelope {
            let name = image.name.clone();
            let outcome = match msg_type {
                MessageType::Set => self.apply_remote_set(image),
                MessageType::Reset => self.apply_remote_reset(image),
                MessageType::Register => self.apply_remote_register(image),
                MessageType::Push | MessageType::PullAck => self.force_insert(image),
                MessageType::Null | MessageType::PullReq => Ok(()),
            };
            match outcome {
                Ok(()) => applied += 1,
                Err(e) => warn!("failed to apply {:?} for {}: {}", msg_type, name, e),
            }
        }
        Ok(applied)
    }

    /// Decodes raw bytes from the transport and applies them.
    pub fn receive_bytes(
        &self,
        bytes: &[u8],
    ) -> Result<usize> {
        let envelope = Envelope::from_bytes(bytes)?;
        self.receive(&envelope)
    }

    fn apply_remote_set(
        &self,
        image: RecordImage,
    ) -> Result<()> {
        let source = image.source();
        let raw = image.raw();
        self.apply_set(SetRequest {
            category: Some(image.category),
            name: &image.name,
            value: image.value,
            raw,
            source,
            inc_version: false,
        })
    }

    fn apply_remote_reset(
        &self,
        image: RecordImage,
    ) -> Result<()> {
        if image.category.is_stat() {
            return self.reset_to_default(&image.name);
        }
        self.apply_remote_set(image)
    }

    fn apply_remote_register(
        &self,
        image: RecordImage,
    ) -> Result<()> {
        match image.meta {
            MetaImage::Stat { persist, .. } => {
                self.register_stat(image.category, &image.name, image.default_value, persist)?;
            }
            MetaImage::Config {
                update_type,
                check_type,
                check_expr,
                access,
                source,
                ..
            } => {
                let spec = ConfigSpec {
                    update_type,
                    check_type,
                    check_expr,
                    access,
                    source,
                };
                self.register_config(image.category, &image.name, image.default_value, spec)?;
            }
        }
        Ok(())
    }

    /// Mirrors a peer's record verbatim, creating it if needed. Pending
    /// update scopes travel with config records, so local callbacks fire on
    /// the next sweep.
    ///
    /// A record whose super-category differs from the image is left alone.
    pub(crate) fn force_insert(
        &self,
        image: RecordImage,
    ) -> Result<()> {
        let (record, created) = self.insert_with(&image.name, || {
            let mut state = RecordState {
                category: image.category,
                data_type: image.data_type,
                value: image.value.clone(),
                default_value: image.default_value.clone(),
                version: image.version,
                registered: image.registered,
                sync_flags: SyncFlags::empty(),
                rsb_id: image.rsb_id,
                meta: RecordMeta::for_category(image.category, image.source()),
            };
            overwrite_meta(&mut state, &image);
            state
        })?;
        if created {
            return Ok(());
        }

        let mut state = record.lock();
        if state.category.is_config() != image.category.is_config() {
            error!(
                "ignoring {} from peer: category {:?} conflicts with local {:?}",
                image.name, image.category, state.category
            );
            return Ok(());
        }
        state.category = image.category;
        if state.data_type != image.data_type {
            state.retype(image.data_type);
        }
        state.value = image.value.clone();
        state.default_value = image.default_value.clone();
        state.registered = image.registered;
        state.version = image.version;
        // a local raw-stat binding keeps its own slot
        if !state.meta.as_stat().is_some_and(|meta| meta.sync.is_some()) {
            state.rsb_id = image.rsb_id;
        }
        overwrite_meta(&mut state, &image);
        Ok(())
    }
}

fn overwrite_meta(
    state: &mut RecordState,
    image: &RecordImage,
) {
    match (&mut state.meta, &image.meta) {
        (RecordMeta::Stat(meta), MetaImage::Stat { persist, raw }) => {
            meta.persist = *persist;
            meta.raw.set_sum(raw.sum);
            meta.raw.set_count(raw.count);
        }
        (
            RecordMeta::Config(meta),
            MetaImage::Config {
                update_type,
                update_required,
                check_type,
                check_expr,
                access,
                source,
            },
        ) => {
            meta.update_required = *update_required;
            meta.update_type = *update_type;
            meta.check_type = *check_type;
            meta.check_expr = check_expr.clone();
            meta.access = *access;
            meta.source = *source;
        }
        _ => {}
    }
}

