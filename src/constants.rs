// -
// Envelope layout

/// Magic stamped at the head of every envelope element
pub(crate) const ELEMENT_MAGIC: u32 = 0xF00D_F00D;

/// Every element (header + body + payloads) is padded to this alignment
pub(crate) const ELEMENT_ALIGN: usize = 8;

/// Element header: magic (u32) + absolute offset of the next element (u32)
pub(crate) const ELEMENT_HEADER_LEN: usize = 8;

/// Envelope header: msg_type, o_start, o_write, o_end, entries (u32 each),
/// padded to [`ELEMENT_ALIGN`]
pub(crate) const ENVELOPE_HEADER_LEN: usize = 24;

/// Initial payload capacity of a freshly allocated envelope
pub(crate) const ENVELOPE_INITIAL_SIZE: usize = 1024;

// -
// Snapshot

/// `'V'`, three build version characters, `NUL`
pub(crate) const VERSION_HEADER_LEN: usize = 5;

/// Suffix of the temporary file used for atomic config-file replacement
pub(crate) const TMP_FILENAME_EXT: &str = ".tmp";

// -
// Raw stats

/// High resolution ticks per second (nanoseconds)
pub(crate) const HRTIME_SECOND: f64 = 1_000_000_000.0;

/// High resolution ticks per millisecond
pub(crate) const HRTIME_MSECOND: f64 = 1_000_000.0;

/// Configuration environment prefix
pub(crate) const CONFIG_ENV_PREFIX: &str = "RECORDS";
