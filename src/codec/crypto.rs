//! AES layer of the codec.
//!
//! Key and IV are derived once per collection open with PBKDF2 over
//! (password, salt) and are immutable afterwards; cipher instances are
//! constructed per call, so any number of transform tasks can encrypt
//! concurrently without shared mutable state.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;

use crate::config::KeyDerivation;
use crate::constants::{
    AES_IV_SIZE, AES_KEY_SIZE, CHECKSUM_PLAIN_LEN, CHECKSUM_SIZE, PBKDF2_ITERATIONS, SALT_SIZE,
};
use crate::error::{CombError, Result};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub struct Encryptor {
    key: [u8; AES_KEY_SIZE],
    iv: [u8; AES_IV_SIZE],
}

impl Encryptor {
    /// Derive the AES-256 key and CBC IV from a password and salt.
    pub fn derive(password: &str, salt: &[u8; SALT_SIZE], algorithm: KeyDerivation) -> Self {
        let mut okm = [0u8; AES_KEY_SIZE + AES_IV_SIZE];
        match algorithm {
            KeyDerivation::Sha1 => pbkdf2::pbkdf2_hmac::<sha1::Sha1>(
                password.as_bytes(),
                salt,
                PBKDF2_ITERATIONS,
                &mut okm,
            ),
            KeyDerivation::Sha256 => pbkdf2::pbkdf2_hmac::<sha2::Sha256>(
                password.as_bytes(),
                salt,
                PBKDF2_ITERATIONS,
                &mut okm,
            ),
            KeyDerivation::Sha512 => pbkdf2::pbkdf2_hmac::<sha2::Sha512>(
                password.as_bytes(),
                salt,
                PBKDF2_ITERATIONS,
                &mut okm,
            ),
        }

        let mut key = [0u8; AES_KEY_SIZE];
        let mut iv = [0u8; AES_IV_SIZE];
        key.copy_from_slice(&okm[..AES_KEY_SIZE]);
        iv.copy_from_slice(&okm[AES_KEY_SIZE..]);
        Self { key, iv }
    }

    pub fn encrypt(&self, plain: &[u8]) -> Vec<u8> {
        Aes256CbcEnc::new(&self.key.into(), &self.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plain)
    }

    pub fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>> {
        Aes256CbcDec::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(cipher)
            .map_err(|_| CombError::DecryptionFailure)
    }

    /// Header checksum: the first two salt bytes encrypted into one padded
    /// block.
    pub fn checksum(&self, salt: &[u8; SALT_SIZE]) -> [u8; CHECKSUM_SIZE] {
        let block = self.encrypt(&salt[..CHECKSUM_PLAIN_LEN]);
        debug_assert_eq!(block.len(), CHECKSUM_SIZE);
        let mut out = [0u8; CHECKSUM_SIZE];
        out.copy_from_slice(&block);
        out
    }

    /// Verify that this key decrypts `checksum` back to the leading salt
    /// bytes. Fails with `DecryptionFailure` on a wrong password or a
    /// tampered salt.
    pub fn verify_checksum(
        &self,
        checksum: &[u8; CHECKSUM_SIZE],
        salt: &[u8; SALT_SIZE],
    ) -> Result<()> {
        let plain = self.decrypt(checksum)?;
        if plain.as_slice() == &salt[..CHECKSUM_PLAIN_LEN] {
            Ok(())
        } else {
            Err(CombError::DecryptionFailure)
        }
    }
}

impl std::fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encryptor").finish_non_exhaustive()
    }
}
