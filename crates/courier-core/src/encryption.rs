//! Attachment cipher
//!
//! Attachments travel as `nonce (12 bytes) || AES-256-GCM(padded plaintext)`.
//! The digest is SHA-256 over the full ciphertext and is checked before any
//! decryption happens. Plaintext is zero-padded to a size bucket before
//! encryption; the pointer carries the unpadded size.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{DownloadError, DownloadResult};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_PADDED_SIZE: u64 = 541;

/// Ciphertext plus the digest a pointer would carry for it.
#[derive(Debug, Clone)]
pub struct EncryptedAttachment {
    pub ciphertext: Vec<u8>,
    pub digest: Vec<u8>,
}

/// AES-256-GCM attachment cipher with digest verification.
pub struct AttachmentCipher;

impl AttachmentCipher {
    /// Encrypt `plaintext`, padding it to its size bucket first.
    pub fn encrypt(plaintext: &[u8], key: &[u8]) -> DownloadResult<EncryptedAttachment> {
        let cipher = Self::cipher(key)?;

        let mut padded = plaintext.to_vec();
        padded.resize(padded_size(plaintext.len() as u64) as usize, 0);

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, padded.as_slice())
            .map_err(|e| DownloadError::Decrypt(format!("Encryption failed: {}", e)))?;

        let mut ciphertext = nonce.to_vec();
        ciphertext.extend_from_slice(&sealed);
        let digest = Sha256::digest(&ciphertext).to_vec();

        Ok(EncryptedAttachment { ciphertext, digest })
    }

    /// Verify `digest`, decrypt, and strip padding down to `unpadded_len` bytes.
    ///
    /// Fails closed: no plaintext is returned unless every check passes.
    pub fn decrypt(
        ciphertext: &[u8],
        key: &[u8],
        digest: &[u8],
        unpadded_len: u64,
    ) -> DownloadResult<Vec<u8>> {
        let cipher = Self::cipher(key)?;

        if ciphertext.len() < NONCE_LEN + TAG_LEN {
            return Err(DownloadError::Decrypt("Ciphertext too short".to_string()));
        }

        let actual_digest = Sha256::digest(ciphertext);
        if !bool::from(actual_digest.as_slice().ct_eq(digest)) {
            return Err(DownloadError::Decrypt("Digest mismatch".to_string()));
        }

        let nonce = Nonce::from_slice(&ciphertext[..NONCE_LEN]);
        let mut plaintext = cipher
            .decrypt(nonce, &ciphertext[NONCE_LEN..])
            .map_err(|e| DownloadError::Decrypt(format!("Decryption failed: {}", e)))?;

        if unpadded_len == 0 || unpadded_len > plaintext.len() as u64 {
            return Err(DownloadError::Decrypt(format!(
                "Declared size {} inconsistent with decrypted size {}",
                unpadded_len,
                plaintext.len()
            )));
        }
        plaintext.truncate(unpadded_len as usize);

        Ok(plaintext)
    }

    fn cipher(key: &[u8]) -> DownloadResult<Aes256Gcm> {
        if key.len() != KEY_LEN {
            return Err(DownloadError::Decrypt(format!(
                "Attachment key must be {} bytes, got {}",
                KEY_LEN,
                key.len()
            )));
        }
        Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)))
    }
}

/// Size bucket a plaintext of `size` bytes is padded to before encryption.
pub fn padded_size(size: u64) -> u64 {
    let bucket = 1.05_f64
        .powf(((size.max(1) as f64).ln() / 1.05_f64.ln()).ceil())
        .floor() as u64;
    bucket.max(MIN_PADDED_SIZE).max(size)
}
