//! Key generation and connection string sealing

use crate::console::CliConsole;
use cascade_core::crypto::keys::{PRIVATE_KEY_FILE, PUBLIC_KEY_FILE};
use cascade_core::crypto::{ConnectionCipher, DEFAULT_PASSPHRASE_ENV, KeyMaterial};
use cascade_core::error::{CascadeError, CascadeResult};
use cascade_core::options::CascadeOptions;
use std::path::Path;

const MIN_KEY_BITS: usize = 1024;

/// Generate an RSA key pair and verify it seals with the configured passphrase
pub async fn keygen(
    options: &CascadeOptions,
    out_dir: &Path,
    bits: usize,
    force: bool,
    console: &CliConsole,
) -> CascadeResult<()> {
    if bits < MIN_KEY_BITS {
        return Err(CascadeError::invalid_field(
            "bits",
            format!("RSA keys need at least {MIN_KEY_BITS} bits"),
        ));
    }

    let existing = [out_dir.join(PRIVATE_KEY_FILE), out_dir.join(PUBLIC_KEY_FILE)]
        .into_iter()
        .any(|path| path.exists());
    if existing && !force {
        let overwrite = console.is_interactive()
            && console
                .confirm(&format!("Overwrite keys in {}?", out_dir.display()))
                .map_err(|e| CascadeError::io_with_path(&e, out_dir))?;
        if !overwrite {
            return Err(CascadeError::invalid_input(format!(
                "key files already exist in {}, pass --force to replace them",
                out_dir.display()
            )));
        }
    }

    let passphrase = passphrase(options, console)?;
    console.info(&format!("Generating {bits}-bit RSA key pair"));

    let out = out_dir.to_path_buf();
    let (private_path, public_path) = tokio::task::spawn_blocking(move || -> CascadeResult<_> {
        let keys = KeyMaterial::generate(bits, passphrase.as_bytes())?;
        let cipher = ConnectionCipher::from_key_material(&keys)?;
        let probe = "Server=localhost";
        if cipher.open(&cipher.seal(probe)?)? != probe {
            return Err(CascadeError::crypto("generated keys failed a seal round trip"));
        }
        Ok(keys.write_pem(&out)?)
    })
    .await??;

    console.success(&format!("Wrote {}", private_path.display()));
    console.success(&format!("Wrote {}", public_path.display()));
    Ok(())
}

/// Passphrase from the configured source, else prompted for
fn passphrase(options: &CascadeOptions, console: &CliConsole) -> CascadeResult<String> {
    if let Some(var) = options.keys.passphrase_env.as_deref() {
        if let Some(value) = std::env::var(var).ok().filter(|v| !v.is_empty()) {
            return Ok(value);
        }
    }
    if let Some(path) = &options.keys.passphrase_path {
        let content =
            std::fs::read_to_string(path).map_err(|e| CascadeError::io_with_path(&e, path))?;
        return Ok(content.trim().to_string());
    }
    if !console.is_interactive() {
        let var = options
            .keys
            .passphrase_env
            .as_deref()
            .unwrap_or(DEFAULT_PASSPHRASE_ENV);
        return Err(CascadeError::config(format!(
            "no passphrase configured, set {var} or pass --passphrase-file"
        )));
    }
    let entered = console
        .secret("AES passphrase")
        .map_err(|e| CascadeError::io(e.to_string()))?;
    if entered.is_empty() {
        return Err(CascadeError::invalid_input("passphrase must not be empty"));
    }
    Ok(entered)
}

fn cipher(options: &CascadeOptions) -> CascadeResult<ConnectionCipher> {
    if !options.keys.is_configured() {
        return Err(CascadeError::config(
            "no private key configured, pass --private-key or set CASCADE_PRIVATE_KEY",
        ));
    }
    let keys = options.keys.load()?;
    Ok(ConnectionCipher::from_key_material(&keys)?.with_threshold(options.encryption_threshold))
}

pub fn seal(options: &CascadeOptions, plaintext: &str, console: &CliConsole) -> CascadeResult<()> {
    let cipher = cipher(options)?;
    if plaintext.chars().count() > cipher.threshold() {
        console.warn(&format!(
            "longer than {} chars, settings would store this value unencrypted",
            cipher.threshold()
        ));
    }
    println!("{}", cipher.seal(plaintext)?);
    Ok(())
}

pub fn open(options: &CascadeOptions, ciphertext: &str) -> CascadeResult<()> {
    let cipher = cipher(options)?;
    println!("{}", cipher.open(ciphertext.trim())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::crypto::KeySource;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_keygen_then_seal_and_open() {
        let dir = TempDir::new().unwrap();
        let key_dir = dir.path().join("keys");
        let passphrase_file = dir.path().join("passphrase");
        std::fs::write(&passphrase_file, "cli-passphrase\n").unwrap();

        let keys = KeySource {
            passphrase_env: None,
            passphrase_path: Some(passphrase_file),
            ..KeySource::from_directory(&key_dir)
        };
        let options = CascadeOptions::for_application("cli-test").with_keys(keys);
        let console = CliConsole::new(false);

        keygen(&options, &key_dir, 1024, false, &console).await.unwrap();
        assert!(key_dir.join(PRIVATE_KEY_FILE).is_file());

        // second run refuses to overwrite without --force when not interactive
        if !console.is_interactive() {
            assert!(keygen(&options, &key_dir, 1024, false, &console).await.is_err());
        }

        let cipher = cipher(&options).unwrap();
        let sealed = cipher.seal("Server=db").unwrap();
        assert_eq!(cipher.open(&sealed).unwrap(), "Server=db");
    }

    #[tokio::test]
    async fn test_keygen_rejects_small_keys() {
        let dir = TempDir::new().unwrap();
        let options = CascadeOptions::for_application("cli-test");
        let err = keygen(&options, dir.path(), 512, true, &CliConsole::new(false))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1024"));
    }
}
