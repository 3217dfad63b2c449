//! Message envelope codec
//!
//! An envelope is a typed, growable byte buffer holding a sequence of record
//! elements. The same bytes travel between processes and land on disk as the
//! stats snapshot body.
//!
//! ```text
//! +------------------------------ header (24 bytes) -------------------------------+
//! | msg_type u32 | o_start u32 | o_write u32 | o_end u32 | entries u32 | pad u32 |
//! +--------------------------------------------------------------------------------+
//! | magic u32 | next u32 | field list ... | zero pad to 8 |   element 0
//! | magic u32 | next u32 | field list ... | zero pad to 8 |   element 1
//! ```
//!
//! `next` is the absolute offset of the following element. Decoding stops at
//! the first element whose magic or offset does not check out.

mod element;

#[cfg(test)]
mod codec_test;

use tracing::warn;

use crate::constants::ELEMENT_ALIGN;
use crate::constants::ELEMENT_HEADER_LEN;
use crate::constants::ELEMENT_MAGIC;
use crate::constants::ENVELOPE_HEADER_LEN;
use crate::constants::ENVELOPE_INITIAL_SIZE;
use crate::metrics::CORRUPT_ENVELOPES;
use crate::RecordImage;
use crate::Result;
use crate::StorageError;

/// Kind of an inter-process envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Null,
    /// Owner must apply the carried value
    Set,
    /// Owner must reset the record to its default
    Reset,
    /// Owner must register the carried record
    Register,
    /// Owner's state pushed to the peer
    Push,
    /// Ask the peer for a full copy of its owned records
    PullReq,
    /// Answer to a pull request
    PullAck,
}

impl MessageType {
    pub fn label(self) -> &'static str {
        match self {
            MessageType::Null => "null",
            MessageType::Set => "set",
            MessageType::Reset => "reset",
            MessageType::Register => "register",
            MessageType::Push => "push",
            MessageType::PullReq => "pull_req",
            MessageType::PullAck => "pull_ack",
        }
    }

    fn to_wire(self) -> u32 {
        match self {
            MessageType::Null => 0,
            MessageType::Set => 1,
            MessageType::Reset => 2,
            MessageType::Register => 3,
            MessageType::Push => 4,
            MessageType::PullReq => 5,
            MessageType::PullAck => 6,
        }
    }

    fn from_wire(v: u32) -> Option<Self> {
        Some(match v {
            0 => MessageType::Null,
            1 => MessageType::Set,
            2 => MessageType::Reset,
            3 => MessageType::Register,
            4 => MessageType::Push,
            5 => MessageType::PullReq,
            6 => MessageType::PullAck,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    msg_type: MessageType,
    buf: Vec<u8>,
    o_write: usize,
    entries: u32,
}

fn align_up(n: usize) -> usize {
    (n + ELEMENT_ALIGN - 1) & !(ELEMENT_ALIGN - 1)
}

fn read_u32(
    buf: &[u8],
    at: usize,
) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(b)
}

fn write_u32(
    buf: &mut [u8],
    at: usize,
    v: u32,
) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

impl Envelope {
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            buf: vec![0; ENVELOPE_HEADER_LEN + ENVELOPE_INITIAL_SIZE],
            o_write: ENVELOPE_HEADER_LEN,
            entries: 0,
        }
    }

    pub fn msg_type(&self) -> MessageType {
        self.msg_type
    }

    pub fn entries(&self) -> u32 {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Bytes in use, header included.
    pub fn len(&self) -> usize {
        self.o_write
    }

    /// Allocated size of the buffer.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Appends one record as a new element, growing the buffer by doubling.
    pub fn marshal(
        &mut self,
        image: &RecordImage,
    ) {
        let body = element::encode(image);
        let required = align_up(ELEMENT_HEADER_LEN + body.len());

        let mut size = self.buf.len();
        while self.o_write + required > size {
            size *= 2;
        }
        if size != self.buf.len() {
            self.buf.resize(size, 0);
        }

        let at = self.o_write;
        let next = at + required;
        write_u32(&mut self.buf, at, ELEMENT_MAGIC);
        write_u32(&mut self.buf, at + 4, next as u32);
        let body_at = at + ELEMENT_HEADER_LEN;
        self.buf[body_at..body_at + body.len()].copy_from_slice(&body);
        self.buf[body_at + body.len()..next].fill(0);

        self.o_write = next;
        self.entries += 1;
    }

    /// Iterates the elements in append order. Each call starts from the
    /// first element.
    pub fn iter(&self) -> EnvelopeIter<'_> {
        EnvelopeIter {
            envelope: self,
            cursor: ENVELOPE_HEADER_LEN,
            remaining: self.entries,
        }
    }

    /// Wire form: header followed by the used part of the buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.buf[..self.o_write].to_vec();
        write_u32(&mut out, 0, self.msg_type.to_wire());
        write_u32(&mut out, 4, ENVELOPE_HEADER_LEN as u32);
        write_u32(&mut out, 8, self.o_write as u32);
        write_u32(&mut out, 12, self.o_write as u32);
        write_u32(&mut out, 16, self.entries);
        write_u32(&mut out, 20, 0);
        out
    }

    /// Parses the wire form. Element contents are only checked while
    /// iterating.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ENVELOPE_HEADER_LEN {
            return Err(StorageError::CorruptEnvelope(format!("short header: {} bytes", bytes.len())).into());
        }
        let raw_type = read_u32(bytes, 0);
        let msg_type = MessageType::from_wire(raw_type)
            .ok_or_else(|| StorageError::CorruptEnvelope(format!("unknown message type {raw_type}")))?;
        let o_start = read_u32(bytes, 4) as usize;
        if o_start != ENVELOPE_HEADER_LEN {
            return Err(StorageError::CorruptEnvelope(format!("unexpected start offset {o_start}")).into());
        }
        let o_end = (read_u32(bytes, 12) as usize).min(bytes.len());
        let o_write = (read_u32(bytes, 8) as usize).clamp(o_start, o_end.max(o_start));
        let entries = read_u32(bytes, 16);

        Ok(Self {
            msg_type,
            buf: bytes[..o_write].to_vec(),
            o_write,
            entries,
        })
    }
}

impl<'a> IntoIterator for &'a Envelope {
    type Item = RecordImage;
    type IntoIter = EnvelopeIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Yields decoded elements until the recorded count is reached or an element
/// fails validation.
pub struct EnvelopeIter<'a> {
    envelope: &'a Envelope,
    cursor: usize,
    remaining: u32,
}

impl EnvelopeIter<'_> {
    fn stop(
        &mut self,
        reason: &str,
    ) -> Option<RecordImage> {
        warn!(
            "stop decoding {:?} envelope at offset {}: {}",
            self.envelope.msg_type, self.cursor, reason
        );
        CORRUPT_ENVELOPES.inc();
        self.remaining = 0;
        None
    }
}

impl Iterator for EnvelopeIter<'_> {
    type Item = RecordImage;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let buf = &self.envelope.buf;
        let limit = self.envelope.o_write;
        let at = self.cursor;

        if at + ELEMENT_HEADER_LEN > limit {
            return self.stop("element header past end of data");
        }
        if read_u32(buf, at) != ELEMENT_MAGIC {
            return self.stop("bad magic");
        }
        let next = read_u32(buf, at + 4) as usize;
        if next <= at + ELEMENT_HEADER_LEN || next > limit {
            return self.stop("bad next offset");
        }

        match element::decode(&buf[at + ELEMENT_HEADER_LEN..next]) {
            Ok(image) => {
                self.cursor = next;
                self.remaining -= 1;
                Some(image)
            }
            Err(e) => self.stop(&e.to_string()),
        }
    }
}
