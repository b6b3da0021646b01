// Size units
pub const KB: usize = 1024;
pub const MB: usize = 1024 * KB;

// On-disk header layout (little-endian throughout)
pub const HEADER_SIZE: usize = 36;
pub const HEADER_VERSION: u16 = 1;
pub const HEADER_VERSION_OFFSET: usize = 0;
pub const HEADER_SERIALIZER_OFFSET: usize = 2;
pub const HEADER_FLAGS_OFFSET: usize = 3;
pub const HEADER_SALT_OFFSET: usize = 4;
pub const HEADER_CHECKSUM_OFFSET: usize = 20;

// Format flag bits
pub const FLAG_ENCRYPTED: u8 = 0b0000_0001;
pub const FLAG_COMPRESSED: u8 = 0b0000_0010;

// Encryption parameters
pub const SALT_SIZE: usize = 16;
pub const CHECKSUM_SIZE: usize = 16;
pub const AES_KEY_SIZE: usize = 32;
pub const AES_IV_SIZE: usize = 16;
pub const PBKDF2_ITERATIONS: u32 = 1000;
// Number of leading salt bytes the header checksum commits to.
pub const CHECKSUM_PLAIN_LEN: usize = 2;

// Slot framing: state byte + 4-byte payload length
pub const SLOT_FRAME_SIZE: u32 = 5;
pub const SLOT_STATE_SIZE: usize = 1;
pub const SLOT_LENGTH_SIZE: usize = 4;

/// State byte of a slot. The two-phase commit writes `Pending` first and
/// patches it to `Allocated`; the load scanner reclaims anything that never
/// made it past `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    Unallocated = 0,
    Allocated = 1,
    Deleted = 2,
    Pending = 3,
}

impl SlotState {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(SlotState::Unallocated),
            1 => Some(SlotState::Allocated),
            2 => Some(SlotState::Deleted),
            3 => Some(SlotState::Pending),
            _ => None,
        }
    }
}

// Payload limits
pub const MAX_PAYLOAD_SIZE: usize = 256 * MB;

// Defaults
pub const DEFAULT_FILE_EXTENSION: &str = "comb";
pub const DEFAULT_MAX_PARALLELISM: usize = 8;
pub const MAX_TRANSFORM_WORKERS: usize = 16;

// Buffer pool size classes (powers of two, capped per class)
pub const POOL_MIN_CLASS: usize = 256;
pub const POOL_CLASS_COUNT: usize = 12;
pub const POOL_PER_CLASS_CAP: usize = 64;

// Load-scan read buffering
pub const SCAN_BUFFER_SIZE: usize = 64 * KB;

// Zeroing is done in bounded chunks so a huge payload does not pin one
// allocation per removal.
pub const ZERO_CHUNK_SIZE: usize = 64 * KB;
