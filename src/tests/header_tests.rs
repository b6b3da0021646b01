use crate::config::{KeyDerivation, Options, Serializer};
use crate::constants::*;
use crate::error::CombError;
use crate::storage::header::Header;

fn plain_options() -> Options {
    Options::default()
}

fn encrypted_options(password: &str) -> Options {
    Options::builder()
        .encryption(password)
        .encryption_algorithm(KeyDerivation::Sha256)
        .build()
}

#[test]
fn test_synthesize_plain() {
    let (header, encryptor) = Header::synthesize(&plain_options()).unwrap();

    assert!(encryptor.is_none());
    assert_eq!(header.version, HEADER_VERSION);
    assert!(!header.encrypted);
    assert!(!header.compressed);
    assert_eq!(header.salt, [0u8; SALT_SIZE]);
    assert_eq!(header.checksum, [0u8; CHECKSUM_SIZE]);
}

#[test]
fn test_round_trip() {
    let options = Options::builder()
        .serializer(Serializer::JsonUtf8)
        .build();
    let (header, _) = Header::synthesize(&options).unwrap();

    let bytes = header.to_bytes();
    assert_eq!(bytes.len(), HEADER_SIZE);
    assert_eq!(Header::from_bytes(&bytes).unwrap(), header);
}

#[test]
fn test_round_trip_encrypted() {
    let options = encrypted_options("hunter2");
    let (header, encryptor) = Header::synthesize(&options).unwrap();

    assert!(encryptor.is_some());
    assert!(header.encrypted);
    assert_ne!(header.salt, [0u8; SALT_SIZE]);
    assert_ne!(header.checksum, [0u8; CHECKSUM_SIZE]);

    let parsed = Header::from_bytes(&header.to_bytes()).unwrap();
    assert_eq!(parsed, header);

    // Correct password reconciles.
    assert!(parsed.reconcile(&options).unwrap().is_some());
}

#[test]
fn test_reconcile_wrong_password() {
    let (header, _) = Header::synthesize(&encrypted_options("open-sesame")).unwrap();

    let result = header.reconcile(&encrypted_options("wrong"));
    assert!(matches!(result, Err(CombError::DecryptionFailure)));
}

#[test]
fn test_reconcile_missing_password() {
    let (header, _) = Header::synthesize(&encrypted_options("open-sesame")).unwrap();

    let result = header.reconcile(&plain_options());
    assert!(matches!(result, Err(CombError::EncryptionConfigMissing)));
}

#[test]
fn test_reconcile_tampered_salt() {
    let options = encrypted_options("open-sesame");
    let (mut header, _) = Header::synthesize(&options).unwrap();
    header.salt[0] ^= 0xFF;

    let result = header.reconcile(&options);
    assert!(matches!(result, Err(CombError::DecryptionFailure)));
}

#[test]
fn test_serializer_and_flags_pinned() {
    let options = Options::builder()
        .serializer(Serializer::BinaryContract)
        .compression(true)
        .build();
    let (header, _) = Header::synthesize(&options).unwrap();
    let parsed = Header::from_bytes(&header.to_bytes()).unwrap();

    assert_eq!(parsed.serializer, Serializer::BinaryContract);
    assert!(parsed.compressed);
}

#[test]
fn test_compression_flag_not_set_for_json() {
    // Compression applies to the binary framings only.
    let options = Options::builder()
        .serializer(Serializer::JsonUtf8)
        .compression(true)
        .build();
    let (header, _) = Header::synthesize(&options).unwrap();
    assert!(!header.compressed);
}

#[test]
fn test_unknown_version_rejected() {
    let (header, _) = Header::synthesize(&plain_options()).unwrap();
    let mut bytes = header.to_bytes();
    bytes[0] = 9;

    assert!(matches!(
        Header::from_bytes(&bytes),
        Err(CombError::UnsupportedVersion(9))
    ));
}

#[test]
fn test_truncated_header_rejected() {
    assert!(matches!(
        Header::from_bytes(&[0u8; 12]),
        Err(CombError::CorruptedFile(_))
    ));
}

#[test]
fn test_encryption_without_password() {
    let mut options = Options::default();
    options.encryption_enabled = true;

    assert!(matches!(
        Header::synthesize(&options),
        Err(CombError::EncryptionConfigMissing)
    ));
}
