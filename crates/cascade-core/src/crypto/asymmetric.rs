//! RSA layer of the connection-string cipher.
//!
//! PKCS#1 v1.5 can only encrypt `modulus_len - 11` bytes per block, so the
//! plaintext is split into blocks and the encrypted blocks are concatenated.
//! Every encrypted block is exactly `modulus_len` bytes long.

use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use super::{AsymmetricCipher, CryptoError, CryptoResult};

const PKCS1_V15_OVERHEAD: usize = 11;

/// Block-wise RSA cipher. Decryption needs the private key.
#[derive(Clone)]
pub struct RsaCipher {
    private_key: Option<RsaPrivateKey>,
    public_key: RsaPublicKey,
}

impl std::fmt::Debug for RsaCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaCipher")
            .field("modulus_bits", &(self.public_key.size() * 8))
            .field("can_decrypt", &self.private_key.is_some())
            .finish()
    }
}

impl RsaCipher {
    /// Cipher able to encrypt and decrypt
    pub fn from_private_key(private_key: RsaPrivateKey) -> Self {
        let public_key = RsaPublicKey::from(&private_key);
        Self {
            private_key: Some(private_key),
            public_key,
        }
    }

    /// Encrypt-only cipher
    pub fn from_public_key(public_key: RsaPublicKey) -> Self {
        Self {
            private_key: None,
            public_key,
        }
    }

    /// Build from a PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1 (`BEGIN RSA PRIVATE KEY`) PEM
    pub fn from_private_pem(pem: &str) -> CryptoResult<Self> {
        parse_private_pem(pem).map(Self::from_private_key)
    }

    /// Build an encrypt-only cipher from a SubjectPublicKeyInfo PEM
    pub fn from_public_pem(pem: &str) -> CryptoResult<Self> {
        RsaPublicKey::from_public_key_pem(pem.trim())
            .map(Self::from_public_key)
            .map_err(|e| CryptoError::InvalidKey(format!("public key PEM: {e}")))
    }

    /// The public key as a PEM string
    pub fn public_key_pem(&self) -> CryptoResult<String> {
        self.public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(format!("public key encoding: {e}")))
    }

    /// Whether the private half is available
    pub fn can_decrypt(&self) -> bool {
        self.private_key.is_some()
    }

    fn block_len(&self) -> usize {
        self.public_key.size()
    }
}

impl AsymmetricCipher for RsaCipher {
    fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let chunk_len = self.block_len() - PKCS1_V15_OVERHEAD;
        let mut rng = OsRng;
        let mut out = Vec::with_capacity(plaintext.len().div_ceil(chunk_len) * self.block_len());

        for chunk in plaintext.chunks(chunk_len) {
            let block = self
                .public_key
                .encrypt(&mut rng, Pkcs1v15Encrypt, chunk)
                .map_err(|e| CryptoError::EncryptionFailed(format!("rsa: {e}")))?;
            out.extend_from_slice(&block);
        }
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        let private_key = self.private_key.as_ref().ok_or_else(|| {
            CryptoError::InvalidKey("private key required to decrypt".to_string())
        })?;

        let block_len = self.block_len();
        if ciphertext.len() % block_len != 0 {
            return Err(CryptoError::DecryptionFailed(format!(
                "ciphertext length {} is not a multiple of the {block_len} byte RSA block",
                ciphertext.len()
            )));
        }

        let mut out = Vec::with_capacity(ciphertext.len());
        for block in ciphertext.chunks_exact(block_len) {
            let plain = private_key
                .decrypt(Pkcs1v15Encrypt, block)
                .map_err(|e| CryptoError::DecryptionFailed(format!("rsa: {e}")))?;
            out.extend_from_slice(&plain);
        }
        Ok(out)
    }
}

pub(crate) fn parse_private_pem(pem: &str) -> CryptoResult<RsaPrivateKey> {
    let pem = pem.trim();
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| CryptoError::InvalidKey(format!("private key PEM: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_support::TEST_KEYS;

    fn cipher() -> RsaCipher {
        RsaCipher::from_private_key(TEST_KEYS.private_key().clone())
    }

    #[test]
    fn round_trips_multi_block_plaintext() {
        let cipher = cipher();
        let plaintext = "Server=tcp:db.internal,1433;Password=".repeat(12);

        let sealed = cipher.encrypt(plaintext.as_bytes()).unwrap();
        assert_eq!(sealed.len() % cipher.block_len(), 0);
        assert!(sealed.len() > cipher.block_len());

        let opened = cipher.decrypt(&sealed).unwrap();
        assert_eq!(opened, plaintext.as_bytes());
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let cipher = cipher();
        let sealed = cipher.encrypt(b"").unwrap();
        assert_eq!(cipher.decrypt(&sealed).unwrap(), b"");
    }

    #[test]
    fn public_only_cipher_cannot_decrypt() {
        let pem = cipher().public_key_pem().unwrap();
        let public_only = RsaCipher::from_public_pem(&pem).unwrap();
        assert!(!public_only.can_decrypt());

        let sealed = public_only.encrypt(b"secret").unwrap();
        assert!(public_only.decrypt(&sealed).is_err());
        assert_eq!(cipher().decrypt(&sealed).unwrap(), b"secret");
    }

    #[test]
    fn rejects_ragged_ciphertext() {
        let err = cipher().decrypt(&[0u8; 17]).unwrap_err();
        assert!(err.to_string().contains("not a multiple"));
    }

    #[test]
    fn rejects_garbage_pem() {
        assert!(RsaCipher::from_private_pem("not a key").is_err());
        assert!(RsaCipher::from_public_pem("not a key").is_err());
    }
}
