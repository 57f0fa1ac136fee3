//! Sealing and opening connection strings

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::keys::KeyMaterial;
use super::symmetric::{NONCE_LEN, TAG_LEN};
use super::{AesCipher, AsymmetricCipher, CryptoError, CryptoResult, RsaCipher, SymmetricCipher};

/// Longest plaintext (in chars) that gets sealed; longer values are stored as-is
pub const DEFAULT_ENCRYPTION_THRESHOLD: usize = 512;

/// Marks a stored value as output of [`ConnectionCipher::seal`]
pub const SEALED_PREFIX: &str = "enc:v1:";

/// A connection string in its at-rest form
#[derive(Clone, PartialEq, Eq)]
pub enum ProtectedString {
    /// Prefixed base64 ciphertext produced by [`ConnectionCipher::seal`]
    Sealed(String),
    /// Stored unencrypted (too long to seal, or no cipher configured)
    Plain(String),
}

impl ProtectedString {
    /// Classify a raw stored value.
    ///
    /// Only [`SEALED_PREFIX`] followed by standard base64 of at least one
    /// nonce plus authentication tag is treated as ciphertext. Plain values
    /// that happen to be valid base64 stay plain.
    pub fn classify(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let looks_sealed = raw
            .trim()
            .strip_prefix(SEALED_PREFIX)
            .and_then(|body| STANDARD.decode(body).ok())
            .is_some_and(|bytes| bytes.len() >= NONCE_LEN + TAG_LEN);
        if looks_sealed {
            Self::Sealed(raw.trim().to_string())
        } else {
            Self::Plain(raw)
        }
    }

    /// The value as it is written to disk
    pub fn stored(&self) -> &str {
        match self {
            Self::Sealed(value) | Self::Plain(value) => value,
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self, Self::Sealed(_))
    }
}

impl std::fmt::Debug for ProtectedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sealed(value) => write!(f, "Sealed({} chars)", value.len()),
            Self::Plain(_) => f.write_str("Plain(<redacted>)"),
        }
    }
}

impl Serialize for ProtectedString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.stored())
    }
}

impl<'de> Deserialize<'de> for ProtectedString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::classify)
    }
}

/// RSA-then-AES composition used for connection strings
#[derive(Clone)]
pub struct ConnectionCipher {
    symmetric: Arc<dyn SymmetricCipher>,
    asymmetric: Arc<dyn AsymmetricCipher>,
    threshold: usize,
}

impl std::fmt::Debug for ConnectionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCipher")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl ConnectionCipher {
    pub fn new(symmetric: Arc<dyn SymmetricCipher>, asymmetric: Arc<dyn AsymmetricCipher>) -> Self {
        Self {
            symmetric,
            asymmetric,
            threshold: DEFAULT_ENCRYPTION_THRESHOLD,
        }
    }

    /// Build the default RSA + AES-GCM composition from loaded key material
    pub fn from_key_material(keys: &KeyMaterial) -> CryptoResult<Self> {
        let asymmetric = RsaCipher::from_private_key(keys.private_key().clone());
        let symmetric = AesCipher::derive(keys.passphrase(), keys.public_key_pem())?;
        Ok(Self::new(Arc::new(symmetric), Arc::new(asymmetric)))
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Encrypt with RSA, then AES, and base64 the result behind [`SEALED_PREFIX`]
    pub fn seal(&self, plaintext: &str) -> CryptoResult<String> {
        let inner = self.asymmetric.encrypt(plaintext.as_bytes())?;
        let outer = self.symmetric.encrypt(&inner)?;
        Ok(format!("{SEALED_PREFIX}{}", STANDARD.encode(outer)))
    }

    /// Reverse of [`seal`](Self::seal); the prefix is optional
    pub fn open(&self, sealed: &str) -> CryptoResult<String> {
        let sealed = sealed.trim();
        let body = sealed.strip_prefix(SEALED_PREFIX).unwrap_or(sealed);
        let outer = STANDARD
            .decode(body)
            .map_err(|e| CryptoError::Base64DecodeFailed(e.to_string()))?;
        let inner = self.symmetric.decrypt(&outer)?;
        let plain = self.asymmetric.decrypt(&inner)?;
        String::from_utf8(plain).map_err(|_| CryptoError::Utf8)
    }

    /// Seal `plaintext` unless it is longer than the threshold
    pub fn protect(&self, plaintext: &str) -> CryptoResult<ProtectedString> {
        let len = plaintext.chars().count();
        if len > self.threshold {
            tracing::debug!(
                len,
                threshold = self.threshold,
                "connection string exceeds encryption threshold, storing unencrypted"
            );
            return Ok(ProtectedString::Plain(plaintext.to_string()));
        }
        self.seal(plaintext).map(ProtectedString::Sealed)
    }

    /// Plaintext of a protected value
    pub fn reveal(&self, value: &ProtectedString) -> CryptoResult<String> {
        match value {
            ProtectedString::Sealed(sealed) => self.open(sealed),
            ProtectedString::Plain(plain) => Ok(plain.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_support::test_cipher;

    #[test]
    fn seal_then_open_round_trips() {
        let cipher = test_cipher();
        let plaintext = "Server=localhost;Database=orders;User Id=app;Password=s3cr3t;";
        let sealed = cipher.seal(plaintext).unwrap();
        assert_ne!(sealed, plaintext);
        assert_eq!(cipher.open(&sealed).unwrap(), plaintext);
    }

    #[test]
    fn threshold_boundary() {
        let cipher = test_cipher();
        for (len, sealed) in [(511, true), (512, true), (513, false)] {
            let plaintext = "x".repeat(len);
            let protected = cipher.protect(&plaintext).unwrap();
            assert_eq!(protected.is_sealed(), sealed, "length {len}");
            assert_eq!(cipher.reveal(&protected).unwrap(), plaintext);
        }
    }

    #[test]
    fn threshold_counts_chars_not_bytes() {
        let cipher = test_cipher().with_threshold(4);
        assert!(cipher.protect("ééé").unwrap().is_sealed());
        assert!(!cipher.protect("ééééé").unwrap().is_sealed());
    }

    #[test]
    fn sealed_values_classify_as_sealed() {
        let cipher = test_cipher();
        let sealed = cipher.seal("Data Source=app.db").unwrap();
        assert!(ProtectedString::classify(sealed.clone()).is_sealed());
        assert!(!ProtectedString::classify("Data Source=app.db").is_sealed());
        // too short to be ciphertext
        assert!(!ProtectedString::classify(format!("{SEALED_PREFIX}abcd")).is_sealed());
    }

    #[test]
    fn base64_shaped_plain_values_stay_plain() {
        let raw = "OrdersPrimaryReplicaWestEurope2024Shard1";
        assert!(STANDARD.decode(raw).is_ok());

        let protected = ProtectedString::classify(raw);
        assert_eq!(protected, ProtectedString::Plain(raw.to_string()));
        assert_eq!(test_cipher().reveal(&protected).unwrap(), raw);
    }

    #[test]
    fn open_rejects_foreign_ciphertext() {
        let cipher = test_cipher();
        let err = cipher.open("not base64 at all!").unwrap_err();
        assert!(matches!(err, CryptoError::Base64DecodeFailed(_)));

        let garbage = STANDARD.encode([0u8; 64]);
        assert!(matches!(
            cipher.open(&garbage).unwrap_err(),
            CryptoError::DecryptionFailed(_)
        ));
    }

    #[test]
    fn serde_uses_stored_form() {
        let plain = ProtectedString::Plain("Host=db;Port=5432".to_string());
        let json = serde_json::to_string(&plain).unwrap();
        assert_eq!(json, "\"Host=db;Port=5432\"");
        let back: ProtectedString = serde_json::from_str(&json).unwrap();
        assert_eq!(back, plain);
    }

    #[test]
    fn debug_hides_plaintext() {
        let plain = ProtectedString::Plain("Password=hunter2".to_string());
        assert!(!format!("{plain:?}").contains("hunter2"));
    }
}
