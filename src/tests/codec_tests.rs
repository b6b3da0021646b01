use serde::{Deserialize, Serialize};

use crate::codec::crypto::Encryptor;
use crate::codec::Codec;
use crate::config::{KeyDerivation, Serializer};
use crate::error::CombError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Doc {
    name: String,
    tags: Vec<String>,
    hp: i32,
}

fn doc() -> Doc {
    Doc {
        name: "torch-bearer".to_string(),
        tags: vec!["npc".to_string(), "dungeon_3".to_string()],
        hp: 40,
    }
}

fn encryptor() -> Encryptor {
    Encryptor::derive("open-sesame", b"fedcba9876543210", KeyDerivation::Sha256)
}

#[test]
fn test_round_trip_binary_contractless() {
    let codec = Codec::new(Serializer::BinaryContractless, false, None);

    let payload = codec.encode(&7u64, &doc()).unwrap();
    let (key, value): (u64, Doc) = codec.decode(&payload).unwrap();

    assert_eq!(key, 7);
    assert_eq!(value, doc());
}

#[test]
fn test_round_trip_binary_contract() {
    let codec = Codec::new(Serializer::BinaryContract, false, None);

    let payload = codec.encode(&7u64, &doc()).unwrap();
    let (key, value): (u64, Doc) = codec.decode(&payload).unwrap();

    assert_eq!(key, 7);
    assert_eq!(value, doc());
}

#[test]
fn test_round_trip_json() {
    let codec = Codec::new(Serializer::JsonUtf8, false, None);

    let payload = codec.encode(&7u64, &doc()).unwrap();
    // The textual framing is a {k, v} object.
    let text = std::str::from_utf8(&payload).unwrap();
    assert!(text.contains("\"k\":7"));
    assert!(text.contains("torch-bearer"));

    let (key, value): (u64, Doc) = codec.decode(&payload).unwrap();
    assert_eq!(key, 7);
    assert_eq!(value, doc());
}

#[test]
fn test_round_trip_compressed() {
    let codec = Codec::new(Serializer::BinaryContractless, true, None);
    assert!(codec.is_compressed());

    let big = Doc {
        name: "x".repeat(4096),
        tags: vec!["tag".to_string(); 64],
        hp: 1,
    };
    let payload = codec.encode(&1u64, &big).unwrap();

    let plain = Codec::new(Serializer::BinaryContractless, false, None);
    let uncompressed = plain.encode(&1u64, &big).unwrap();
    assert!(payload.len() < uncompressed.len());

    let (_, value): (u64, Doc) = codec.decode(&payload).unwrap();
    assert_eq!(value, big);
}

#[test]
fn test_compression_ignored_for_json() {
    let codec = Codec::new(Serializer::JsonUtf8, true, None);
    assert!(!codec.is_compressed());
}

#[test]
fn test_round_trip_encrypted() {
    let codec = Codec::new(Serializer::BinaryContractless, false, Some(encryptor()));
    assert!(codec.is_encrypted());

    let payload = codec.encode(&7u64, &doc()).unwrap();
    assert_eq!(payload.len() % 16, 0);

    let (key, value): (u64, Doc) = codec.decode(&payload).unwrap();
    assert_eq!(key, 7);
    assert_eq!(value, doc());
}

#[test]
fn test_round_trip_compressed_and_encrypted() {
    let codec = Codec::new(Serializer::BinaryContract, true, Some(encryptor()));

    let payload = codec.encode(&99u32, &doc()).unwrap();
    let (key, value): (u32, Doc) = codec.decode(&payload).unwrap();

    assert_eq!(key, 99);
    assert_eq!(value, doc());
}

#[test]
fn test_decode_wrong_key_fails() {
    let enc = Codec::new(Serializer::BinaryContractless, false, Some(encryptor()));
    let other = Encryptor::derive("wrong", b"fedcba9876543210", KeyDerivation::Sha256);
    let dec = Codec::new(Serializer::BinaryContractless, false, Some(other));

    let payload = enc.encode(&7u64, &doc()).unwrap();
    let result: Result<(u64, Doc), _> = dec.decode(&payload);
    assert!(matches!(
        result,
        Err(CombError::DecryptionFailure | CombError::DeserializationFailure(_))
    ));
}

#[test]
fn test_decode_garbage_fails() {
    let codec = Codec::new(Serializer::BinaryContractless, false, None);
    let result: Result<(u64, Doc), _> = codec.decode(&[0xFF, 0xFE, 0xFD]);
    assert!(matches!(result, Err(CombError::DeserializationFailure(_))));
}

#[test]
fn test_serializers_produce_distinct_framings() {
    let varint = Codec::new(Serializer::BinaryContractless, false, None);
    let fixint = Codec::new(Serializer::BinaryContract, false, None);

    let a = varint.encode(&1u64, &doc()).unwrap();
    let b = fixint.encode(&1u64, &doc()).unwrap();
    // Fixed-width integers make the contract framing strictly larger here.
    assert!(b.len() > a.len());
}

#[test]
fn test_shrink_clears_scratch() {
    let codec = Codec::new(Serializer::BinaryContractless, true, None);
    for i in 0..32u64 {
        codec.encode(&i, &doc()).unwrap();
    }
    codec.shrink();
    // No assertion beyond not panicking: the pool is internal.
}
