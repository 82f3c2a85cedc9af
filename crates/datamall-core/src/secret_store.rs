use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use keyring::Entry;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::config_directory;

const SERVICE_NAME: &str = "sg.datamall.puller";
const ACCOUNT_PREFIX: &str = "datamall-";
const MASTER_KEY_FILE: &str = "secret.key";
const FALLBACK_DIR: &str = "secrets";
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Where a persisted secret lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum SecretReference {
    /// Secret is stored in the host operating system's keyring, with an encrypted copy on disk.
    Keyring { account: String },
    /// Secret is stored inline, encrypted with the local master key.
    LocalEncrypted { nonce: String, ciphertext: String },
}

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("keyring operation failed: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("local encryption failed: {0}")]
    Crypto(String),
    #[error("cannot store an empty secret")]
    Empty,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct SealedSecret {
    nonce: String,
    ciphertext: String,
}

/// Secret persistence rooted at a directory that holds the master key and keyring copies.
#[derive(Debug, Clone)]
pub struct SecretStore {
    root: PathBuf,
    service: String,
}

impl SecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            service: SERVICE_NAME.to_string(),
        }
    }

    /// Use a different keyring service name.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Store rooted at the configuration directory.
    pub fn default_location() -> Self {
        Self::new(config_directory())
    }

    /// Persist `secret`, preferring the OS keyring.
    ///
    /// The keyring is used only when the value can be read back through a fresh entry; some
    /// backends accept writes without persisting them. Otherwise the secret is sealed with the
    /// local master key and the reference carries the ciphertext.
    pub fn store(&self, label: &str, secret: &str) -> Result<SecretReference, SecretStoreError> {
        let trimmed = secret.trim();
        if trimmed.is_empty() {
            return Err(SecretStoreError::Empty);
        }

        let account = format!("{ACCOUNT_PREFIX}{label}");
        match self.write_keyring(&account, trimmed) {
            Ok(true) => {
                if let Err(err) = self.write_copy(label, trimmed) {
                    warn!(label, error = %err, "failed to write encrypted copy of keyring secret");
                }
                debug!(account = %account, "secret stored in keyring");
                return Ok(SecretReference::Keyring { account });
            }
            Ok(false) => warn!(label, "keyring did not retain the secret; sealing it locally"),
            Err(err) => warn!(label, error = %err, "keyring unavailable; sealing secret locally"),
        }

        let reference = self.seal(trimmed)?;
        if let Err(err) = self.remove_copy(label) {
            warn!(label, error = %err, "failed to remove stale encrypted copy");
        }
        Ok(reference)
    }

    /// Seal a secret with the local master key without touching the keyring.
    pub fn seal(&self, secret: &str) -> Result<SecretReference, SecretStoreError> {
        let (nonce, ciphertext) = self.encrypt(secret.trim().as_bytes())?;
        Ok(SecretReference::LocalEncrypted {
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
        })
    }

    /// Fetch a secret. A keyring entry that vanished falls back to the encrypted copy; with no
    /// copy either the result is `Ok(None)`.
    pub fn load(&self, reference: &SecretReference) -> Result<Option<String>, SecretStoreError> {
        match reference {
            SecretReference::Keyring { account } => {
                let label = label_from_account(account);
                let keyring_err = match self.read_keyring(account) {
                    Ok(Some(value)) => return Ok(Some(value)),
                    Ok(None) => None,
                    Err(err) => {
                        warn!(label, error = %err, "keyring read failed; trying encrypted copy");
                        Some(err)
                    }
                };
                match (self.read_copy(label)?, keyring_err) {
                    (Some(value), _) => {
                        debug!(label, "secret loaded from encrypted copy");
                        Ok(Some(value))
                    }
                    (None, Some(err)) => Err(err.into()),
                    (None, None) => Ok(None),
                }
            }
            SecretReference::LocalEncrypted { nonce, ciphertext } => {
                let plaintext = self.decrypt(&STANDARD.decode(nonce)?, &STANDARD.decode(ciphertext)?)?;
                Ok(non_empty(String::from_utf8_lossy(&plaintext).into_owned()))
            }
        }
    }

    /// Remove a secret from its store. Missing entries are not an error.
    pub fn delete(&self, reference: &SecretReference) -> Result<(), SecretStoreError> {
        match reference {
            SecretReference::Keyring { account } => {
                match Entry::new(&self.service, account).and_then(|entry| entry.delete_credential()) {
                    Ok(()) | Err(keyring::Error::NoEntry) => {}
                    Err(err) => warn!(account = %account, error = %err, "keyring delete failed"),
                }
                self.remove_copy(label_from_account(account))
            }
            SecretReference::LocalEncrypted { .. } => Ok(()),
        }
    }

    /// Write to the keyring and confirm through a fresh entry that the value stuck.
    fn write_keyring(&self, account: &str, secret: &str) -> Result<bool, keyring::Error> {
        Entry::new(&self.service, account)?.set_password(secret)?;
        Ok(self.read_keyring(account)?.as_deref() == Some(secret))
    }

    fn read_keyring(&self, account: &str) -> Result<Option<String>, keyring::Error> {
        match Entry::new(&self.service, account)?.get_password() {
            Ok(value) => Ok(non_empty(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn copy_path(&self, label: &str) -> PathBuf {
        self.root.join(FALLBACK_DIR).join(format!("{label}.json"))
    }

    fn write_copy(&self, label: &str, secret: &str) -> Result<(), SecretStoreError> {
        let (nonce, ciphertext) = self.encrypt(secret.as_bytes())?;
        let sealed = SealedSecret {
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
        };
        let path = self.copy_path(label);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string(&sealed)?)?;
        Ok(())
    }

    fn read_copy(&self, label: &str) -> Result<Option<String>, SecretStoreError> {
        let raw = match fs::read_to_string(self.copy_path(label)) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let sealed: SealedSecret = serde_json::from_str(&raw)?;
        let plaintext = self.decrypt(
            &STANDARD.decode(sealed.nonce)?,
            &STANDARD.decode(sealed.ciphertext)?,
        )?;
        Ok(non_empty(String::from_utf8_lossy(&plaintext).into_owned()))
    }

    fn remove_copy(&self, label: &str) -> Result<(), SecretStoreError> {
        match fs::remove_file(self.copy_path(label)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<([u8; NONCE_LEN], Vec<u8>), SecretStoreError> {
        let cipher = self.cipher()?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(&Nonce::from(nonce_bytes), plaintext)
            .map_err(|err| SecretStoreError::Crypto(err.to_string()))?;
        Ok((nonce_bytes, ciphertext))
    }

    fn decrypt(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, SecretStoreError> {
        let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| {
            SecretStoreError::Crypto(format!("nonce must be {NONCE_LEN} bytes, got {}", nonce.len()))
        })?;
        self.cipher()?
            .decrypt(&Nonce::from(nonce), ciphertext)
            .map_err(|err| SecretStoreError::Crypto(err.to_string()))
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305, SecretStoreError> {
        let key = self.master_key()?;
        ChaCha20Poly1305::new_from_slice(&key).map_err(|err| SecretStoreError::Crypto(err.to_string()))
    }

    fn master_key(&self) -> Result<[u8; KEY_LEN], SecretStoreError> {
        let path = self.root.join(MASTER_KEY_FILE);
        match fs::read(&path) {
            Ok(bytes) => match <[u8; KEY_LEN]>::try_from(bytes.as_slice()) {
                Ok(key) => return Ok(key),
                Err(_) => warn!(
                    path = %path.display(),
                    len = bytes.len(),
                    "master key has unexpected length; regenerating"
                ),
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let mut key = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut key);
        fs::create_dir_all(&self.root)?;
        write_key_file(&path, &key)?;
        Ok(key)
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn label_from_account(account: &str) -> &str {
    account.strip_prefix(ACCOUNT_PREFIX).unwrap_or(account)
}

fn write_key_file(path: &Path, key: &[u8]) -> Result<(), SecretStoreError> {
    let mut file = fs::File::create(path)?;
    file.write_all(key)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
