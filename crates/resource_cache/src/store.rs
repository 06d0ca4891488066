use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use sha2::{Digest, Sha256};

use crate::error::CacheError;

const TEMP_EXTENSION: &str = "tmp";
const RECORD_MAGIC: &[u8] = b"WSC1";
const HEADER_LEN: usize = 8;
const MAX_KEY_LEN: usize = 64 * 1024;

/// Blob store backing the resource cache. Writes replace a value as a unit.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    fn put(&self, key: &str, value: &[u8]) -> Result<(), CacheError>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), CacheError>;

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;
}

/// Process-local store, used in tests and when no cache directory is configured.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(lock_unpoisoned(&self.entries).get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        lock_unpoisoned(&self.entries).insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        lock_unpoisoned(&self.entries).remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        Ok(lock_unpoisoned(&self.entries)
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

/// One file per key under a root directory.
///
/// File names are the SHA-256 of the key; each file starts with a small
/// header carrying the key itself so prefix scans never depend on file name
/// length limits. Values are written to a sibling temp file and renamed into
/// place.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    root: PathBuf,
}

impl FileKvStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|source| CacheError::io("creating cache directory", &root, source))?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(record_file_name(key))
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::io("reading cache record", path, source)),
        };
        match split_record(&bytes) {
            Some((stored_key, value)) if stored_key == key.as_bytes() => {
                Ok(Some(value.to_vec()))
            }
            _ => {
                tracing::warn!(
                    path = %path.display(),
                    "cache record header mismatch; treating as missing"
                );
                Ok(None)
            }
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        let path = self.path_for(key);
        let mut temp = path.clone().into_os_string();
        temp.push(".");
        temp.push(TEMP_EXTENSION);
        let temp = PathBuf::from(temp);

        fs::write(&temp, encode_record(key, value))
            .map_err(|source| CacheError::io("writing cache record", &temp, source))?;
        fs::rename(&temp, &path)
            .map_err(|source| CacheError::io("replacing cache record", &path, source))
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::io("removing cache record", path, source)),
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let entries = fs::read_dir(&self.root)
            .map_err(|source| CacheError::io("listing cache directory", &self.root, source))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|source| CacheError::io("listing cache directory", &self.root, source))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == TEMP_EXTENSION) {
                continue;
            }
            match read_record_key(&path)? {
                Some(key) if key.starts_with(prefix) => keys.push(key),
                Some(_) => {}
                None => {
                    tracing::debug!(
                        path = %path.display(),
                        "ignoring foreign file in cache directory"
                    );
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[must_use]
pub fn record_file_name(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn encode_record(key: &str, value: &[u8]) -> Vec<u8> {
    let key = key.as_bytes();
    let mut out = Vec::with_capacity(HEADER_LEN + key.len() + value.len());
    out.extend_from_slice(RECORD_MAGIC);
    out.extend_from_slice(&(key.len() as u32).to_le_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(value);
    out
}

fn split_record(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    if bytes.len() < HEADER_LEN || !bytes.starts_with(RECORD_MAGIC) {
        return None;
    }
    let (header, rest) = bytes.split_at(HEADER_LEN);
    let len = key_len(header)?;
    (rest.len() >= len).then(|| rest.split_at(len))
}

fn read_record_key(path: &Path) -> Result<Option<String>, CacheError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(CacheError::io("opening cache record", path, source)),
    };
    let mut header = [0u8; HEADER_LEN];
    if file.read_exact(&mut header).is_err() || !header.starts_with(RECORD_MAGIC) {
        return Ok(None);
    }
    let Some(len) = key_len(&header).filter(|len| *len <= MAX_KEY_LEN) else {
        return Ok(None);
    };
    let mut key = vec![0u8; len];
    if file.read_exact(&mut key).is_err() {
        return Ok(None);
    }
    Ok(String::from_utf8(key).ok())
}

fn key_len(header: &[u8]) -> Option<usize> {
    let bytes: [u8; 4] = header.get(RECORD_MAGIC.len()..HEADER_LEN)?.try_into().ok()?;
    usize::try_from(u32::from_le_bytes(bytes)).ok()
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
