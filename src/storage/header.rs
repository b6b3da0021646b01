//! The fixed 36-byte header at the start of every collection file.
//!
//! Layout (little-endian):
//!
//! | Offset | Size | Field |
//! |--------|------|---------------------------------------------|
//! | 0      | 2    | format version (current = 1)                |
//! | 2      | 1    | serializer tag                              |
//! | 3      | 1    | flags (bit0 encrypted, bit1 compressed)     |
//! | 4      | 16   | encryption salt (zero when not encrypted)   |
//! | 20     | 16   | checksum = encrypt(salt[0..2])              |
//!
//! On re-open the header is authoritative for the serializer and format
//! flags; the supplied password must decrypt the checksum back to the
//! leading salt bytes.

use rand::RngCore;

use crate::codec::crypto::Encryptor;
use crate::config::{Options, Serializer};
use crate::constants::*;
use crate::error::{CombError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub serializer: Serializer,
    pub encrypted: bool,
    pub compressed: bool,
    pub salt: [u8; SALT_SIZE],
    pub checksum: [u8; CHECKSUM_SIZE],
}

impl Header {
    /// Build a fresh header for a newly created collection file, generating
    /// a salt and deriving the collection's encryptor when encryption is on.
    pub fn synthesize(options: &Options) -> Result<(Self, Option<Encryptor>)> {
        let mut salt = [0u8; SALT_SIZE];
        let mut checksum = [0u8; CHECKSUM_SIZE];

        let encryptor = if options.encryption_enabled {
            let password = options
                .encryption_password
                .as_deref()
                .filter(|p| !p.is_empty())
                .ok_or(CombError::EncryptionConfigMissing)?;
            rand::rng().fill_bytes(&mut salt);
            let enc = Encryptor::derive(password, &salt, options.encryption_algorithm);
            checksum = enc.checksum(&salt);
            Some(enc)
        } else {
            None
        };

        let header = Self {
            version: HEADER_VERSION,
            serializer: options.serializer,
            encrypted: options.encryption_enabled,
            compressed: options.compression_enabled && options.serializer.supports_compression(),
            salt,
            checksum,
        };
        Ok((header, encryptor))
    }

    /// Reconcile an existing header with the supplied options: verify the
    /// password against the stored checksum and hand back the encryptor.
    /// The header's serializer and flags win over the options.
    pub fn reconcile(&self, options: &Options) -> Result<Option<Encryptor>> {
        if self.version != HEADER_VERSION {
            return Err(CombError::UnsupportedVersion(self.version));
        }

        if !self.encrypted {
            return Ok(None);
        }

        let password = options
            .encryption_password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(CombError::EncryptionConfigMissing)?;
        let enc = Encryptor::derive(password, &self.salt, options.encryption_algorithm);
        enc.verify_checksum(&self.checksum, &self.salt)?;
        Ok(Some(enc))
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[HEADER_VERSION_OFFSET..HEADER_VERSION_OFFSET + 2]
            .copy_from_slice(&self.version.to_le_bytes());
        buf[HEADER_SERIALIZER_OFFSET] = self.serializer.tag();
        let mut flags = 0u8;
        if self.encrypted {
            flags |= FLAG_ENCRYPTED;
        }
        if self.compressed {
            flags |= FLAG_COMPRESSED;
        }
        buf[HEADER_FLAGS_OFFSET] = flags;
        buf[HEADER_SALT_OFFSET..HEADER_SALT_OFFSET + SALT_SIZE].copy_from_slice(&self.salt);
        buf[HEADER_CHECKSUM_OFFSET..HEADER_CHECKSUM_OFFSET + CHECKSUM_SIZE]
            .copy_from_slice(&self.checksum);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(CombError::CorruptedFile(format!(
                "header truncated: {} bytes",
                buf.len()
            )));
        }

        let version = u16::from_le_bytes([buf[0], buf[1]]);
        if version != HEADER_VERSION {
            return Err(CombError::UnsupportedVersion(version));
        }

        let serializer = Serializer::from_tag(buf[HEADER_SERIALIZER_OFFSET]).ok_or_else(|| {
            CombError::CorruptedFile(format!(
                "unknown serializer tag {}",
                buf[HEADER_SERIALIZER_OFFSET]
            ))
        })?;

        let flags = buf[HEADER_FLAGS_OFFSET];
        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&buf[HEADER_SALT_OFFSET..HEADER_SALT_OFFSET + SALT_SIZE]);
        let mut checksum = [0u8; CHECKSUM_SIZE];
        checksum
            .copy_from_slice(&buf[HEADER_CHECKSUM_OFFSET..HEADER_CHECKSUM_OFFSET + CHECKSUM_SIZE]);

        Ok(Self {
            version,
            serializer,
            encrypted: flags & FLAG_ENCRYPTED != 0,
            compressed: flags & FLAG_COMPRESSED != 0,
            salt,
            checksum,
        })
    }
}
