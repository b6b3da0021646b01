use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CombError {
    #[error("Duplicate key")]
    DuplicateKey,

    #[error("Key not found")]
    KeyNotFound,

    #[error("Collection is closed")]
    CollectionClosed,

    #[error("Collection is read-only")]
    CollectionReadOnly,

    #[error("Collection is already open")]
    CollectionAlreadyOpen,

    #[error("Collection has not been loaded")]
    CollectionNotLoaded,

    #[error("Database is closed")]
    DatabaseClosed,

    #[error("Database is read-only")]
    DatabaseReadOnly,

    #[error("Invalid database name: {0:?}")]
    InvalidDatabaseName(String),

    #[error("Serialization failed: {0}")]
    SerializationFailure(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailure(String),

    #[error("Storage failure: {0}")]
    StorageFailure(#[from] io::Error),

    #[error("Decryption failed")]
    DecryptionFailure,

    #[error("Encryption is enabled but no password was supplied")]
    EncryptionConfigMissing,

    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Unsupported file format version: {0}")]
    UnsupportedVersion(u16),

    #[error("Corrupted collection file: {0}")]
    CorruptedFile(String),

    #[error("Collection {0:?} is already open with different key/value types")]
    CollectionTypeMismatch(String),

    #[error("Write pipeline is shut down")]
    PipelineShutDown,
}

pub type Result<T> = std::result::Result<T, CombError>;

/// What `add` does when the key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateKeyBehavior {
    #[default]
    FailWithError,
    Upsert,
    ReturnFalse,
}

/// What `update`/`remove` do when the key is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyNotFoundBehavior {
    #[default]
    FailWithError,
    ReturnFalse,
}

/// Whether a governed failure class surfaces or is swallowed into a
/// boolean `false` return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureBehavior {
    #[default]
    FailWithError,
    ReturnFalse,
}

impl CombError {
    /// Whether the error is one of the lifecycle kinds that always surface
    /// regardless of the configured failure behaviors.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            CombError::CollectionClosed
                | CombError::CollectionReadOnly
                | CombError::CollectionAlreadyOpen
                | CombError::CollectionNotLoaded
                | CombError::DatabaseClosed
                | CombError::DatabaseReadOnly
                | CombError::InvalidDatabaseName(_)
        )
    }
}
