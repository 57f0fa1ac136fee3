//! Key material for the connection-string cipher.
//! The RSA key pair is read from PEM files; the AES passphrase comes from an
//! environment variable or a file so it never has to live in settings JSON.

use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::asymmetric::{RsaCipher, parse_private_pem};
use super::{CryptoError, CryptoResult};

/// Environment variable consulted for the AES passphrase by default
pub const DEFAULT_PASSPHRASE_ENV: &str = "CASCADE_PASSPHRASE";
/// File name used for the private key by `KeyMaterial::write_pem`
pub const PRIVATE_KEY_FILE: &str = "cascade_private.pem";
/// File name used for the public key by `KeyMaterial::write_pem`
pub const PUBLIC_KEY_FILE: &str = "cascade_public.pem";

/// Where the key material lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySource {
    /// PEM file holding the RSA private key
    pub private_key_path: Option<PathBuf>,
    /// PEM file holding the RSA public key; derived from the private key when absent
    pub public_key_path: Option<PathBuf>,
    /// Environment variable holding the AES passphrase
    pub passphrase_env: Option<String>,
    /// File holding the AES passphrase (used when the variable is unset)
    pub passphrase_path: Option<PathBuf>,
}

impl Default for KeySource {
    fn default() -> Self {
        Self {
            private_key_path: None,
            public_key_path: None,
            passphrase_env: Some(DEFAULT_PASSPHRASE_ENV.to_string()),
            passphrase_path: None,
        }
    }
}

impl KeySource {
    /// Key source reading both PEM files from a directory written by `write_pem`
    pub fn from_directory(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            private_key_path: Some(dir.join(PRIVATE_KEY_FILE)),
            public_key_path: Some(dir.join(PUBLIC_KEY_FILE)),
            ..Self::default()
        }
    }

    /// Whether enough is configured to attempt loading
    pub fn is_configured(&self) -> bool {
        self.private_key_path.is_some()
    }

    /// Read the key pair and passphrase
    pub fn load(&self) -> CryptoResult<KeyMaterial> {
        let private_path = self
            .private_key_path
            .as_ref()
            .ok_or(CryptoError::MissingKeySource)?;
        let private_pem = read_secret_file(private_path)?;
        let private_key = parse_private_pem(&private_pem)?;

        let public_key_pem = match &self.public_key_path {
            Some(path) if path.exists() => read_secret_file(path)?.trim().to_string(),
            _ => RsaCipher::from_private_key(private_key.clone()).public_key_pem()?,
        };

        let passphrase = self.read_passphrase()?;
        KeyMaterial::new(private_key, public_key_pem, passphrase)
    }

    fn read_passphrase(&self) -> CryptoResult<Zeroizing<Vec<u8>>> {
        if let Some(var) = &self.passphrase_env {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    return Ok(Zeroizing::new(value.into_bytes()));
                }
            }
        }
        if let Some(path) = &self.passphrase_path {
            let content = read_secret_file(path)?;
            return Ok(Zeroizing::new(content.trim().as_bytes().to_vec()));
        }
        Err(CryptoError::MissingKeySource)
    }
}

fn read_secret_file(path: &Path) -> CryptoResult<String> {
    fs::read_to_string(path)
        .map_err(|e| CryptoError::KeySourceUnreadable(format!("{}: {e}", path.display())))
}

/// Loaded key pair plus AES passphrase
pub struct KeyMaterial {
    private_key: RsaPrivateKey,
    public_key_pem: String,
    passphrase: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("public_key_pem", &self.public_key_pem)
            .field("private_key", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

impl KeyMaterial {
    /// Assemble key material, checking that the public PEM parses
    pub fn new(
        private_key: RsaPrivateKey,
        public_key_pem: impl Into<String>,
        passphrase: Zeroizing<Vec<u8>>,
    ) -> CryptoResult<Self> {
        if passphrase.is_empty() {
            return Err(CryptoError::InvalidKey("passphrase is empty".to_string()));
        }
        let public_key_pem = public_key_pem.into();
        RsaCipher::from_public_pem(&public_key_pem)?;
        Ok(Self {
            private_key,
            public_key_pem,
            passphrase,
        })
    }

    /// Generate a fresh RSA key pair of `bits` size
    pub fn generate(bits: usize, passphrase: &[u8]) -> CryptoResult<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::InvalidKey(format!("rsa key generation: {e}")))?;
        let public_key_pem = RsaCipher::from_private_key(private_key.clone()).public_key_pem()?;
        Self::new(
            private_key,
            public_key_pem,
            Zeroizing::new(passphrase.to_vec()),
        )
    }

    /// The RSA private key
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// The RSA public key
    pub fn public_key(&self) -> RsaPublicKey {
        RsaPublicKey::from(&self.private_key)
    }

    /// The public key PEM string; also the HKDF salt input for the AES layer
    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    /// The AES passphrase bytes
    pub fn passphrase(&self) -> &[u8] {
        &self.passphrase
    }

    /// Write `cascade_private.pem` and `cascade_public.pem` into `dir`
    pub fn write_pem(&self, dir: impl AsRef<Path>) -> CryptoResult<(PathBuf, PathBuf)> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .map_err(|e| CryptoError::KeySourceUnreadable(format!("{}: {e}", dir.display())))?;

        let private_pem = self
            .private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(format!("private key encoding: {e}")))?;

        let private_path = dir.join(PRIVATE_KEY_FILE);
        let public_path = dir.join(PUBLIC_KEY_FILE);
        write_key_file(&private_path, private_pem.as_bytes(), true)?;
        write_key_file(&public_path, self.public_key_pem.as_bytes(), false)?;

        tracing::info!(path = %private_path.display(), "wrote RSA key pair");
        Ok((private_path, public_path))
    }
}

fn write_key_file(path: &Path, contents: &[u8], private: bool) -> CryptoResult<()> {
    fs::write(path, contents)
        .map_err(|e| CryptoError::KeySourceUnreadable(format!("{}: {e}", path.display())))?;

    #[cfg(unix)]
    if private {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| CryptoError::KeySourceUnreadable(format!("{}: {e}", path.display())))?;
    }
    #[cfg(not(unix))]
    let _ = private;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_support::{TEST_KEYS, TEST_PASSPHRASE};
    use tempfile::TempDir;

    #[test]
    fn writes_and_loads_pem_files() {
        let dir = TempDir::new().unwrap();
        let (private_path, public_path) = TEST_KEYS.write_pem(dir.path()).unwrap();
        assert!(private_path.exists());
        assert!(public_path.exists());

        let passphrase_path = dir.path().join("passphrase.txt");
        fs::write(&passphrase_path, format!("{}\n", TEST_PASSPHRASE)).unwrap();

        let source = KeySource {
            passphrase_env: None,
            passphrase_path: Some(passphrase_path),
            ..KeySource::from_directory(dir.path())
        };
        let loaded = source.load().expect("key material should load");

        assert_eq!(loaded.public_key_pem(), TEST_KEYS.public_key_pem().trim());
        assert_eq!(loaded.passphrase(), TEST_PASSPHRASE.as_bytes());
    }

    #[test]
    fn derives_public_key_when_file_missing() {
        let dir = TempDir::new().unwrap();
        let (_, public_path) = TEST_KEYS.write_pem(dir.path()).unwrap();
        fs::remove_file(&public_path).unwrap();
        let passphrase_path = dir.path().join("passphrase.txt");
        fs::write(&passphrase_path, "pw").unwrap();

        let source = KeySource {
            passphrase_env: None,
            passphrase_path: Some(passphrase_path),
            ..KeySource::from_directory(dir.path())
        };
        let loaded = source.load().unwrap();
        assert_eq!(loaded.public_key(), TEST_KEYS.public_key());
    }

    #[test]
    fn missing_private_key_is_reported() {
        let err = KeySource::default().load().unwrap_err();
        assert!(matches!(err, CryptoError::MissingKeySource));
    }

    #[test]
    fn missing_passphrase_is_reported() {
        let dir = TempDir::new().unwrap();
        TEST_KEYS.write_pem(dir.path()).unwrap();
        let source = KeySource {
            passphrase_env: Some("CASCADE_TEST_PASSPHRASE_THAT_IS_NEVER_SET".to_string()),
            passphrase_path: None,
            ..KeySource::from_directory(dir.path())
        };
        assert!(matches!(
            source.load().unwrap_err(),
            CryptoError::MissingKeySource
        ));
    }

    #[test]
    fn debug_output_is_redacted() {
        let rendered = format!("{:?}", *TEST_KEYS);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(TEST_PASSPHRASE));
    }
}
