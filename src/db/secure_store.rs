// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Encrypted key-value store for tokens and the device session.
//!
//! Two files live in the data directory:
//! - `keystore.key`: a random AES-256 key (base64)
//! - `secure_prefs.json`: key name -> base64(nonce || AES-256-GCM ciphertext)
//!
//! The key name is bound as associated data, so a value copied under a
//! different name fails to decrypt. If the key material or any entry cannot
//! be decrypted, the store deletes both files and starts over with a fresh
//! key. After [`MAX_RECOVERY_ATTEMPTS`] failed recreations it gives up with
//! [`StoreError::Unrecoverable`].

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub const KEYSTORE_FILE: &str = "keystore.key";
pub const PREFS_FILE: &str = "secure_prefs.json";

/// Delete-and-recreate attempts before the store is declared unusable.
pub const MAX_RECOVERY_ATTEMPTS: u32 = 2;

const KEY_LEN: usize = 32;

/// Secure store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Corrupted secure storage: {0}")]
    Corrupted(String),

    #[error("Encryption failed")]
    Crypto,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Secure storage could not be recovered after {attempts} attempts; cannot continue securely")]
    Unrecoverable { attempts: u32 },
}

impl StoreError {
    /// Whether the error should trigger delete-and-recreate.
    fn is_corruption(&self) -> bool {
        matches!(
            self,
            StoreError::Corrupted(_) | StoreError::Crypto | StoreError::Serialization(_)
        )
    }
}

struct Inner {
    key: LessSafeKey,
    /// Ciphertext as stored on disk
    entries: BTreeMap<String, String>,
}

/// File-backed encrypted preferences.
pub struct SecureStore {
    dir: PathBuf,
    rng: SystemRandom,
    inner: Mutex<Inner>,
    /// Bumped whenever the store is wiped after it was opened.
    generation: AtomicU64,
}

impl std::fmt::Debug for SecureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureStore")
            .field("dir", &self.dir)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl SecureStore {
    /// Open the store in `dir`, creating it if needed.
    ///
    /// Every entry is decrypted once up front so corrupted key material is
    /// detected here rather than on some later read.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let rng = SystemRandom::new();

        let inner = match load(&dir, &rng) {
            Ok(inner) => inner,
            Err(e) if e.is_corruption() => {
                tracing::warn!(error = %e, dir = %dir.display(), "Secure storage corrupted, recreating");
                recreate(&dir, &rng)?
            }
            Err(StoreError::Io(e)) => {
                // Unreadable key material is handled like corrupted key material.
                tracing::warn!(error = %e, dir = %dir.display(), "Secure storage unreadable, recreating");
                recreate(&dir, &rng)?
            }
            Err(e) => return Err(e),
        };

        tracing::debug!(entries = inner.entries.len(), "Secure storage opened");

        Ok(Self {
            dir,
            rng,
            inner: Mutex::new(inner),
            generation: AtomicU64::new(0),
        })
    }

    /// Read and decrypt a value.
    ///
    /// A value that fails to decrypt wipes the store (see module docs),
    /// bumps [`SecureStore::generation`] and reads as absent.
    pub fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        let mut inner = self.lock();
        let Some(stored) = inner.entries.get(name) else {
            return Ok(None);
        };

        match decrypt(&inner.key, name, stored) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key = name, error = %e, "Secure storage decryption failed, recreating");
                self.generation.fetch_add(1, Ordering::AcqRel);
                *inner = recreate(&self.dir, &self.rng)?;
                Ok(None)
            }
        }
    }

    /// Number of times the store has been wiped since it was opened.
    /// Holders of values read earlier compare this to notice a wipe.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Encrypt and persist a value.
    pub fn put(&self, name: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let sealed = encrypt(&inner.key, &self.rng, name, value)?;
        inner.entries.insert(name.to_string(), sealed);
        write_prefs(&self.dir, &inner.entries)
    }

    /// Persist several values with one disk write.
    pub fn put_all(&self, values: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for (name, value) in values {
            let sealed = encrypt(&inner.key, &self.rng, name, value)?;
            inner.entries.insert((*name).to_string(), sealed);
        }
        write_prefs(&self.dir, &inner.entries)
    }

    pub fn remove(&self, name: &str) -> Result<(), StoreError> {
        self.remove_all(&[name])
    }

    /// Remove several keys with one disk write.
    pub fn remove_all(&self, names: &[&str]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let before = inner.entries.len();
        for name in names {
            inner.entries.remove(*name);
        }
        if inner.entries.len() == before {
            return Ok(());
        }
        write_prefs(&self.dir, &inner.entries)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().entries.contains_key(name)
    }

    /// Remove every value but keep the key.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.entries.clear();
        write_prefs(&self.dir, &inner.entries)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace a stored entry's ciphertext, as disk or memory corruption would.
    #[cfg(test)]
    pub(crate) fn corrupt_entry(&self, name: &str) {
        let mut inner = self.lock();
        if let Some(stored) = inner.entries.get_mut(name) {
            *stored = BASE64.encode([0u8; NONCE_LEN + 16]);
        }
    }
}

/// Load key and entries, verifying that every entry decrypts.
fn load(dir: &Path, rng: &SystemRandom) -> Result<Inner, StoreError> {
    let key_path = dir.join(KEYSTORE_FILE);
    let prefs_path = dir.join(PREFS_FILE);

    let key_bytes = match fs::read_to_string(&key_path) {
        Ok(encoded) => BASE64
            .decode(encoded.trim())
            .map_err(|e| StoreError::Corrupted(format!("keystore is not base64: {}", e)))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if prefs_path.exists() {
                // Entries without their key can never be read again.
                return Err(StoreError::Corrupted("keystore missing".to_string()));
            }
            return create_fresh(dir, rng);
        }
        Err(e) => return Err(e.into()),
    };

    let key = make_key(&key_bytes)?;

    let entries: BTreeMap<String, String> = match fs::read_to_string(&prefs_path) {
        Ok(raw) => serde_json::from_str(&raw)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
        Err(e) => return Err(e.into()),
    };

    for (name, stored) in &entries {
        decrypt(&key, name, stored)?;
    }

    Ok(Inner { key, entries })
}

/// Delete both files and start again, retrying up to [`MAX_RECOVERY_ATTEMPTS`].
fn recreate(dir: &Path, rng: &SystemRandom) -> Result<Inner, StoreError> {
    for attempt in 1..=MAX_RECOVERY_ATTEMPTS {
        let result = delete_files(dir)
            .and_then(|()| create_fresh(dir, rng))
            .and_then(|_| load(dir, rng));

        match result {
            Ok(inner) => {
                tracing::info!(attempt, "Secure storage recreated");
                return Ok(inner);
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Secure storage recreation failed");
            }
        }
    }

    tracing::error!(
        attempts = MAX_RECOVERY_ATTEMPTS,
        "Secure storage unrecoverable"
    );
    Err(StoreError::Unrecoverable {
        attempts: MAX_RECOVERY_ATTEMPTS,
    })
}

fn delete_files(dir: &Path) -> Result<(), StoreError> {
    for file in [PREFS_FILE, KEYSTORE_FILE] {
        match fs::remove_file(dir.join(file)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn create_fresh(dir: &Path, rng: &SystemRandom) -> Result<Inner, StoreError> {
    let mut key_bytes = [0u8; KEY_LEN];
    rng.fill(&mut key_bytes).map_err(|_| StoreError::Crypto)?;

    write_atomic(&dir.join(KEYSTORE_FILE), BASE64.encode(key_bytes).as_bytes())?;
    let entries = BTreeMap::new();
    write_prefs(dir, &entries)?;

    Ok(Inner {
        key: make_key(&key_bytes)?,
        entries,
    })
}

fn make_key(bytes: &[u8]) -> Result<LessSafeKey, StoreError> {
    if bytes.len() != KEY_LEN {
        return Err(StoreError::Corrupted(format!(
            "keystore has {} bytes, expected {}",
            bytes.len(),
            KEY_LEN
        )));
    }
    let unbound = UnboundKey::new(&AES_256_GCM, bytes).map_err(|_| StoreError::Crypto)?;
    Ok(LessSafeKey::new(unbound))
}

fn encrypt(
    key: &LessSafeKey,
    rng: &SystemRandom,
    name: &str,
    plaintext: &str,
) -> Result<String, StoreError> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill(&mut nonce_bytes).map_err(|_| StoreError::Crypto)?;

    let mut in_out = plaintext.as_bytes().to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::from(name.as_bytes()),
        &mut in_out,
    )
    .map_err(|_| StoreError::Crypto)?;

    let mut sealed = nonce_bytes.to_vec();
    sealed.extend_from_slice(&in_out);
    Ok(BASE64.encode(sealed))
}

fn decrypt(key: &LessSafeKey, name: &str, stored: &str) -> Result<String, StoreError> {
    let sealed = BASE64
        .decode(stored)
        .map_err(|e| StoreError::Corrupted(format!("entry {} is not base64: {}", name, e)))?;

    if sealed.len() < NONCE_LEN + AES_256_GCM.tag_len() {
        return Err(StoreError::Corrupted(format!("entry {} is truncated", name)));
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| StoreError::Crypto)?;
    let mut buf = ciphertext.to_vec();
    let plaintext = key
        .open_in_place(nonce, Aad::from(name.as_bytes()), &mut buf)
        .map_err(|_| StoreError::Crypto)?;

    String::from_utf8(plaintext.to_vec())
        .map_err(|_| StoreError::Corrupted(format!("entry {} is not UTF-8", name)))
}

fn write_prefs(dir: &Path, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
    let raw = serde_json::to_vec_pretty(entries)?;
    write_atomic(&dir.join(PREFS_FILE), &raw)
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
