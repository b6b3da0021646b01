//! Pair framing: a `(key, value)` record to bytes and back, per the
//! serializer pinned in the collection header.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::Serializer;
use crate::error::{CombError, Result};

/// Textual framing used by [`Serializer::JsonUtf8`].
#[derive(Serialize, Deserialize)]
struct PairFrame<K, V> {
    k: K,
    v: V,
}

pub fn serialize_pair<K, V>(serializer: Serializer, key: &K, value: &V) -> Result<Vec<u8>>
where
    K: Serialize,
    V: Serialize,
{
    let mut out = Vec::new();
    serialize_pair_into(serializer, key, value, &mut out)?;
    Ok(out)
}

/// Serialize into a caller-supplied buffer so the encode path can recycle
/// scratch allocations.
pub fn serialize_pair_into<K, V>(
    serializer: Serializer,
    key: &K,
    value: &V,
    out: &mut Vec<u8>,
) -> Result<()>
where
    K: Serialize,
    V: Serialize,
{
    match serializer {
        Serializer::BinaryContractless => {
            bincode::serde::encode_into_std_write((key, value), out, bincode::config::standard())
                .map_err(|e| CombError::SerializationFailure(e.to_string()))?;
        }
        Serializer::BinaryContract => {
            bincode::serde::encode_into_std_write(
                (key, value),
                out,
                bincode::config::standard().with_fixed_int_encoding(),
            )
            .map_err(|e| CombError::SerializationFailure(e.to_string()))?;
        }
        Serializer::JsonUtf8 => {
            serde_json::to_writer(out, &PairFrame { k: key, v: value })
                .map_err(|e| CombError::SerializationFailure(e.to_string()))?;
        }
    }
    Ok(())
}

pub fn deserialize_pair<K, V>(serializer: Serializer, bytes: &[u8]) -> Result<(K, V)>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    match serializer {
        Serializer::BinaryContractless => {
            let ((key, value), _) =
                bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                    .map_err(|e| CombError::DeserializationFailure(e.to_string()))?;
            Ok((key, value))
        }
        Serializer::BinaryContract => {
            let ((key, value), _) = bincode::serde::decode_from_slice(
                bytes,
                bincode::config::standard().with_fixed_int_encoding(),
            )
            .map_err(|e| CombError::DeserializationFailure(e.to_string()))?;
            Ok((key, value))
        }
        Serializer::JsonUtf8 => {
            let frame: PairFrame<K, V> = serde_json::from_slice(bytes)
                .map_err(|e| CombError::DeserializationFailure(e.to_string()))?;
            Ok((frame.k, frame.v))
        }
    }
}
