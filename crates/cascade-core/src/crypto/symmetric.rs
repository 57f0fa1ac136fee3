//! AES-256-GCM layer of the connection-string cipher.
//! The key is derived with HKDF-SHA256 from a passphrase, salted with a digest
//! of the RSA public key so a ciphertext is bound to one key pair.

use aes_gcm::aead::{Aead, AeadCore, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use super::{CryptoError, CryptoResult, SymmetricCipher};

/// AES-GCM nonce size in bytes
pub const NONCE_LEN: usize = 12;
/// AES-GCM authentication tag size in bytes
pub const TAG_LEN: usize = 16;

const KEY_LEN: usize = 32;
const KEY_INFO: &[u8] = b"cascade/connection-string/v1";

/// Symmetric cipher producing `nonce || ciphertext || tag`
pub struct AesCipher {
    key: Key<Aes256Gcm>,
}

impl AesCipher {
    /// Builds a cipher from raw key bytes. The key must be 32 bytes.
    pub fn from_key_bytes(key_bytes: &[u8]) -> CryptoResult<Self> {
        if key_bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {KEY_LEN} byte AES key, got {}",
                key_bytes.len()
            )));
        }
        let mut key = Key::<Aes256Gcm>::default();
        key.copy_from_slice(key_bytes);
        Ok(Self { key })
    }

    /// Derives the AES key from a passphrase, salted with the SHA-256 digest of
    /// the public key PEM (surrounding whitespace ignored).
    pub fn derive(passphrase: &[u8], public_key_pem: &str) -> CryptoResult<Self> {
        let salt = Sha256::digest(public_key_pem.trim().as_bytes());
        let hk = Hkdf::<Sha256>::new(Some(salt.as_slice()), passphrase);

        let mut okm = [0u8; KEY_LEN];
        hk.expand(KEY_INFO, &mut okm)
            .map_err(|e| CryptoError::InvalidKey(format!("hkdf expansion failed: {e}")))?;

        let cipher = Self::from_key_bytes(&okm);
        okm.zeroize();
        cipher
    }
}

impl SymmetricCipher for AesCipher {
    fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let cipher = Aes256Gcm::new(&self.key);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let sealed = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(format!("aes-gcm: {e}")))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        if ciphertext.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::DecryptionFailed(
                "ciphertext shorter than nonce and authentication tag".to_string(),
            ));
        }
        let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);

        let cipher = Aes256Gcm::new(&self.key);
        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|e| CryptoError::DecryptionFailed(format!("aes-gcm: {e}")))
    }
}

impl Drop for AesCipher {
    fn drop(&mut self) {
        self.key.as_mut_slice().zeroize();
    }
}
