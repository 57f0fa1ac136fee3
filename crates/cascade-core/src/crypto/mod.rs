//! Connection-string encryption
//!
//! Connection strings are protected in two layers. The plaintext is first
//! encrypted block-wise with RSA, and that ciphertext is encrypted again with
//! AES-256-GCM under a key derived from a passphrase and the RSA public key.
//! The result is base64 encoded for storage in JSON.
//!
//! Both layers sit behind the [`SymmetricCipher`] and [`AsymmetricCipher`]
//! traits so the composition in [`ConnectionCipher`] can be exercised with
//! other primitives.

pub mod asymmetric;
pub mod connection;
pub mod keys;
pub mod symmetric;

pub use asymmetric::RsaCipher;
pub use connection::{ConnectionCipher, DEFAULT_ENCRYPTION_THRESHOLD, ProtectedString, SEALED_PREFIX};
pub use keys::{DEFAULT_PASSPHRASE_ENV, KeyMaterial, KeySource};
pub use symmetric::AesCipher;

use thiserror::Error;

/// Result type for the crypto layer
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by the cipher layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("key source unreadable: {0}")]
    KeySourceUnreadable(String),

    #[error("no key material configured")]
    MissingKeySource,

    #[error("ciphertext is not valid base64: {0}")]
    Base64DecodeFailed(String),

    #[error("decrypted value is not valid UTF-8")]
    Utf8,
}

/// Symmetric layer (AES in the default composition)
pub trait SymmetricCipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>>;
    fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>>;
}

/// Asymmetric layer (RSA in the default composition)
pub trait AsymmetricCipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>>;
    fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>>;
}
