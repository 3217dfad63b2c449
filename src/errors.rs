//! Records Registry Error Hierarchy
//!
//! Defines the error types surfaced by the registry, categorized by the layer
//! that produced them: table/index operations, storage (snapshots and config
//! files), inter-process transport, and configuration loading.

use std::path::PathBuf;

use config::ConfigError;

use crate::DataType;
use crate::MessageType;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (storage, transport)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Table and index level failures
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    // Storage layer
    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),

    // Inter-process transport
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Unknown name, or a name that has a value but was never registered
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Requested type differs from the stored type
    #[error("Record {name} holds {actual:?}, requested {expected:?}")]
    TypeMismatch {
        name: String,
        expected: DataType,
        actual: DataType,
    },

    /// The table is at its fixed maximum size
    #[error("Cannot allocate record {name}: table is full ({capacity} records)")]
    CapacityExceeded { name: String, capacity: usize },

    /// Operation only applies to Config/LocalConfig records
    #[error("Record {0} is not a configuration record")]
    NotConfigRecord(String),

    /// Operation only applies to statistics records
    #[error("Record {0} is not a statistics record")]
    NotStatRecord(String),

    /// Lookup pattern failed to compile
    #[error("Invalid record pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Textual value could not be converted or failed its validity check
    #[error("Invalid value {value:?} for record {name}")]
    InvalidValue { name: String, value: String },

    /// Implicit creation needs both a category and a data type
    #[error("Record {0} does not exist and no category was supplied")]
    MissingCategory(String),

    /// Raw-stat id outside the block's capacity
    #[error("Raw stat id {id} out of range for block of {max_stats}")]
    RawStatOutOfRange { id: usize, max_stats: usize },

    /// Thread-local counter space could not be reserved
    #[error("Thread-local counter allocator exhausted")]
    CounterSpaceExhausted,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures during snapshot/config file operations
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// I/O failure with the path it happened on
    #[error("Error occurred at path: {path}")]
    PathError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Snapshot written by an incompatible build
    #[error("Incompatible snapshot version at {path}")]
    IncompatibleSnapshotVersion { path: PathBuf },

    /// Envelope header could not be decoded
    #[error("Corrupt envelope: {0}")]
    CorruptEnvelope(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The receiving side of the peer channel has gone away
    #[error("Peer channel closed while sending {msg_type:?}")]
    ChannelClosed { msg_type: MessageType },
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::System(SystemError::Transport(e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::System(SystemError::Storage(StorageError::IoError(e)))
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::Registry(RegistryError::InvalidPattern(e))
    }
}
