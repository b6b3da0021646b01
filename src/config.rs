//! Configuration for databases and collections.
//!
//! `Options` carries every knob a collection honors; `Options::builder()`
//! gives the fluent form. A `Database` clones one `Options` into each
//! collection it opens.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::constants::DEFAULT_FILE_EXTENSION;
use crate::error::{DuplicateKeyBehavior, FailureBehavior, KeyNotFoundBehavior};

/// How a `(key, value)` pair is framed into payload bytes. Pinned into the
/// file header on creation; authoritative on re-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Serializer {
    /// Compact binary framing with variable-length integers.
    #[default]
    BinaryContractless = 0,
    /// Binary framing with fixed-width integers, for schema-stable records.
    BinaryContract = 1,
    /// UTF-8 JSON object `{"k": …, "v": …}`.
    JsonUtf8 = 2,
}

impl Serializer {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Serializer::BinaryContractless),
            1 => Some(Serializer::BinaryContract),
            2 => Some(Serializer::JsonUtf8),
            _ => None,
        }
    }

    /// Compression is applied inside the binary framings only.
    pub fn supports_compression(self) -> bool {
        !matches!(self, Serializer::JsonUtf8)
    }
}

/// Which write path feeds the collection file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferMode {
    /// Every operation hits the file before returning.
    #[default]
    Disabled,
    /// Operations are queued and applied FIFO by one background worker.
    Buffered,
    /// Serialization/compression/encryption run on a bounded worker pool;
    /// a sequencer restores submission order before the file is touched.
    ParallelBuffered,
}

/// Digest used by PBKDF2 when deriving the AES key and IV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyDerivation {
    Sha1,
    #[default]
    Sha256,
    Sha512,
}

/// Maps a value-type name to the file-name stem used when a collection is
/// opened without an explicit name.
pub type FileNameFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Per-database / per-collection options.
#[derive(Clone)]
pub struct Options {
    // -------------------------------------------------------------------
    // File placement
    // -------------------------------------------------------------------
    /// Directory under which `<database_name>/` is created.
    pub base_directory: PathBuf,

    /// Database name; must be non-empty and `[A-Za-z0-9_ ]` only.
    pub database_name: String,

    /// Extension of collection files.
    pub file_extension: String,

    // -------------------------------------------------------------------
    // Format
    // -------------------------------------------------------------------
    pub serializer: Serializer,

    /// Compression inside the binary framings. Ignored for `JsonUtf8`.
    pub compression_enabled: bool,

    pub encryption_enabled: bool,
    pub encryption_password: Option<String>,
    pub encryption_algorithm: KeyDerivation,

    // -------------------------------------------------------------------
    // Write path
    // -------------------------------------------------------------------
    pub buffer_mode: BufferMode,

    /// Size of the transformation worker pool (parallel mode only).
    pub max_parallelism: usize,

    /// Skip the intermediate writer flushes between the payload write and
    /// the state-byte commit.
    pub buffered_writes: bool,

    // -------------------------------------------------------------------
    // Modes
    // -------------------------------------------------------------------
    /// Never open a file; the collection is a concurrent map.
    pub memory_only: bool,

    /// Open the file read-only; every mutating operation fails.
    pub read_only: bool,

    // -------------------------------------------------------------------
    // Behaviors
    // -------------------------------------------------------------------
    pub add_duplicate_key_behavior: DuplicateKeyBehavior,
    pub bulk_add_duplicate_key_behavior: DuplicateKeyBehavior,
    pub update_key_not_found_behavior: KeyNotFoundBehavior,
    pub remove_key_not_found_behavior: KeyNotFoundBehavior,
    pub storage_failure_behavior: FailureBehavior,
    pub serialization_failure_behavior: FailureBehavior,
    pub deserialization_failure_behavior: FailureBehavior,

    /// Collection-name generator for `Database::collection_of`.
    pub file_name_fn: Option<FileNameFn>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            base_directory: PathBuf::from("."),
            database_name: "combdb".to_string(),
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
            serializer: Serializer::default(),
            compression_enabled: false,
            encryption_enabled: false,
            encryption_password: None,
            encryption_algorithm: KeyDerivation::default(),
            buffer_mode: BufferMode::default(),
            max_parallelism: num_cpus::get().clamp(
                crate::constants::DEFAULT_MAX_PARALLELISM,
                crate::constants::MAX_TRANSFORM_WORKERS,
            ),
            buffered_writes: false,
            memory_only: false,
            read_only: false,
            add_duplicate_key_behavior: DuplicateKeyBehavior::default(),
            bulk_add_duplicate_key_behavior: DuplicateKeyBehavior::default(),
            update_key_not_found_behavior: KeyNotFoundBehavior::default(),
            remove_key_not_found_behavior: KeyNotFoundBehavior::default(),
            storage_failure_behavior: FailureBehavior::default(),
            serialization_failure_behavior: FailureBehavior::default(),
            deserialization_failure_behavior: FailureBehavior::default(),
            file_name_fn: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("base_directory", &self.base_directory)
            .field("database_name", &self.database_name)
            .field("file_extension", &self.file_extension)
            .field("serializer", &self.serializer)
            .field("compression_enabled", &self.compression_enabled)
            .field("encryption_enabled", &self.encryption_enabled)
            .field("encryption_algorithm", &self.encryption_algorithm)
            .field("buffer_mode", &self.buffer_mode)
            .field("max_parallelism", &self.max_parallelism)
            .field("buffered_writes", &self.buffered_writes)
            .field("memory_only", &self.memory_only)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl Options {
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::new()
    }

    /// Resolve the collection name for a value type through `file_name_fn`.
    pub(crate) fn generated_name(&self, type_name: &str) -> String {
        let stem = type_name.rsplit("::").next().unwrap_or(type_name);
        match &self.file_name_fn {
            Some(f) => f(stem),
            None => stem.to_string(),
        }
    }
}

/// Fluent builder for [`Options`].
///
/// ```rust
/// use combdb::{Options, BufferMode};
///
/// let options = Options::builder()
///     .base_directory("/tmp/comb-data")
///     .database_name("game_state")
///     .buffer_mode(BufferMode::ParallelBuffered)
///     .max_parallelism(8)
///     .build();
/// ```
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: Options::default(),
        }
    }

    pub fn base_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.base_directory = dir.into();
        self
    }

    pub fn database_name(mut self, name: impl Into<String>) -> Self {
        self.options.database_name = name.into();
        self
    }

    pub fn file_extension(mut self, ext: impl Into<String>) -> Self {
        self.options.file_extension = ext.into();
        self
    }

    pub fn serializer(mut self, serializer: Serializer) -> Self {
        self.options.serializer = serializer;
        self
    }

    pub fn compression(mut self, enabled: bool) -> Self {
        self.options.compression_enabled = enabled;
        self
    }

    /// Enable encryption with the given password.
    pub fn encryption(mut self, password: impl Into<String>) -> Self {
        self.options.encryption_enabled = true;
        self.options.encryption_password = Some(password.into());
        self
    }

    pub fn encryption_algorithm(mut self, algorithm: KeyDerivation) -> Self {
        self.options.encryption_algorithm = algorithm;
        self
    }

    pub fn buffer_mode(mut self, mode: BufferMode) -> Self {
        self.options.buffer_mode = mode;
        self
    }

    pub fn max_parallelism(mut self, workers: usize) -> Self {
        self.options.max_parallelism = workers.max(1);
        self
    }

    pub fn buffered_writes(mut self, enabled: bool) -> Self {
        self.options.buffered_writes = enabled;
        self
    }

    pub fn memory_only(mut self, enabled: bool) -> Self {
        self.options.memory_only = enabled;
        self
    }

    pub fn read_only(mut self, enabled: bool) -> Self {
        self.options.read_only = enabled;
        self
    }

    pub fn add_duplicate_key_behavior(mut self, behavior: DuplicateKeyBehavior) -> Self {
        self.options.add_duplicate_key_behavior = behavior;
        self
    }

    pub fn bulk_add_duplicate_key_behavior(mut self, behavior: DuplicateKeyBehavior) -> Self {
        self.options.bulk_add_duplicate_key_behavior = behavior;
        self
    }

    pub fn update_key_not_found_behavior(mut self, behavior: KeyNotFoundBehavior) -> Self {
        self.options.update_key_not_found_behavior = behavior;
        self
    }

    pub fn remove_key_not_found_behavior(mut self, behavior: KeyNotFoundBehavior) -> Self {
        self.options.remove_key_not_found_behavior = behavior;
        self
    }

    pub fn storage_failure_behavior(mut self, behavior: FailureBehavior) -> Self {
        self.options.storage_failure_behavior = behavior;
        self
    }

    pub fn serialization_failure_behavior(mut self, behavior: FailureBehavior) -> Self {
        self.options.serialization_failure_behavior = behavior;
        self
    }

    pub fn deserialization_failure_behavior(mut self, behavior: FailureBehavior) -> Self {
        self.options.deserialization_failure_behavior = behavior;
        self
    }

    pub fn file_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.options.file_name_fn = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Options {
        self.options
    }
}

impl Default for OptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
