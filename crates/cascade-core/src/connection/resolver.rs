//! Resolving named connection strings to usable plaintext

use super::placeholders::PlaceholderMap;
use crate::crypto::{ConnectionCipher, ProtectedString};
use crate::error::{CascadeError, CascadeResult};
use crate::settings::{ConfigurationRoot, connection_string_key};

/// Opens sealed connection strings and substitutes placeholders
#[derive(Debug, Clone, Default)]
pub struct ConnectionStringResolver {
    cipher: Option<ConnectionCipher>,
    placeholders: PlaceholderMap,
}

impl ConnectionStringResolver {
    pub fn new(placeholders: PlaceholderMap) -> Self {
        Self {
            cipher: None,
            placeholders,
        }
    }

    pub fn with_cipher(mut self, cipher: Option<ConnectionCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn cipher(&self) -> Option<&ConnectionCipher> {
        self.cipher.as_ref()
    }

    pub fn placeholders(&self) -> &PlaceholderMap {
        &self.placeholders
    }

    /// Plaintext of `ConnectionStrings:{name}`, `None` when absent
    pub fn resolve(&self, root: &ConfigurationRoot, name: &str) -> CascadeResult<Option<String>> {
        let key = connection_string_key(name);
        match root.try_get::<String>(&key)? {
            Some(raw) if !raw.trim().is_empty() => self.parse_connection_string(&raw).map(Some),
            _ => Ok(None),
        }
    }

    /// Open a stored value when it is sealed, then substitute placeholders
    pub fn parse_connection_string(&self, raw: &str) -> CascadeResult<String> {
        self.reveal(&ProtectedString::classify(raw))
    }

    /// Plaintext of a protected value with placeholders substituted
    pub fn reveal(&self, value: &ProtectedString) -> CascadeResult<String> {
        let plaintext = match value {
            ProtectedString::Plain(plain) => plain.clone(),
            ProtectedString::Sealed(_) => {
                let cipher = self.cipher.as_ref().ok_or_else(|| {
                    CascadeError::crypto(
                        "connection string is sealed but no key material is configured",
                    )
                })?;
                cipher.reveal(value)?
            }
        };
        Ok(self.placeholders.apply(&plaintext))
    }

    /// At-rest form of `plaintext`: sealed when a cipher is configured and the
    /// value is within its threshold
    pub fn protect(&self, plaintext: &str) -> CascadeResult<ProtectedString> {
        match &self.cipher {
            Some(cipher) => Ok(cipher.protect(plaintext)?),
            None => Ok(ProtectedString::Plain(plaintext.to_string())),
        }
    }
}
