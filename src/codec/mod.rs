//! Payload codec: serialize → compress → encrypt on the way to the file,
//! and the reverse on the way back.
//!
//! Which stages are active is pinned in the collection header; the codec is
//! immutable after construction and safe to share across the transform
//! worker pool.

pub mod compress;
pub mod crypto;
pub mod serializer;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Serializer;
use crate::error::Result;
use crate::utils::pool::BufferPool;
use crypto::Encryptor;

pub struct Codec {
    serializer: Serializer,
    compression: bool,
    encryptor: Option<Encryptor>,
    pool: BufferPool,
}

impl Codec {
    pub fn new(serializer: Serializer, compression: bool, encryptor: Option<Encryptor>) -> Self {
        Self {
            serializer,
            compression: compression && serializer.supports_compression(),
            encryptor,
            pool: BufferPool::new(),
        }
    }

    pub fn serializer(&self) -> Serializer {
        self.serializer
    }

    pub fn is_compressed(&self) -> bool {
        self.compression
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryptor.is_some()
    }

    /// Encode one record to the bytes written into a slot payload.
    pub fn encode<K, V>(&self, key: &K, value: &V) -> Result<Vec<u8>>
    where
        K: Serialize,
        V: Serialize,
    {
        let mut frame = self.pool.acquire(64);
        if let Err(e) = serializer::serialize_pair_into(self.serializer, key, value, &mut frame) {
            self.pool.release(frame);
            return Err(e);
        }

        let staged = if self.compression {
            let compressed = compress::compress(&frame);
            self.pool.release(frame);
            compressed
        } else {
            frame
        };

        match &self.encryptor {
            Some(enc) => {
                let cipher = enc.encrypt(&staged);
                self.pool.release(staged);
                Ok(cipher)
            }
            None => Ok(staged),
        }
    }

    /// Decode one slot payload back into a record.
    pub fn decode<K, V>(&self, bytes: &[u8]) -> Result<(K, V)>
    where
        K: DeserializeOwned,
        V: DeserializeOwned,
    {
        let decrypted = match &self.encryptor {
            Some(enc) => Some(enc.decrypt(bytes)?),
            None => None,
        };
        let body = decrypted.as_deref().unwrap_or(bytes);

        let decompressed = if self.compression {
            Some(compress::decompress(body)?)
        } else {
            None
        };
        let body = decompressed.as_deref().unwrap_or(body);

        serializer::deserialize_pair(self.serializer, body)
    }

    /// Drop pooled scratch buffers. Called on flush and close.
    pub fn shrink(&self) {
        self.pool.clear();
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("serializer", &self.serializer)
            .field("compression", &self.compression)
            .field("encrypted", &self.encryptor.is_some())
            .finish()
    }
}
