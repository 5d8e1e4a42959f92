pub mod keys;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage read failed for `{key}`: {reason}")]
    Read { key: String, reason: String },
    #[error("storage write failed for `{key}`: {reason}")]
    Write { key: String, reason: String },
    #[error("object at `{key}` is not valid JSON: {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },
    #[error("failed to encode object for `{key}`: {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ObjectMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, String>,
    /// Relative lifetime; stores turn this into an absolute expiry at write
    /// time. None means the object lives until deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<Duration>,
}

impl ObjectMetadata {
    pub fn json() -> Self {
        Self {
            content_type: Some("application/json".to_string()),
            ..Self::default()
        }
    }

    pub fn json_with_ttl(ttl: Duration) -> Self {
        Self {
            content_type: Some("application/json".to_string()),
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub metadata: ObjectMetadata,
}

impl StoredObject {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Flat key -> bytes map with per-object metadata and optional TTL. The
/// production deployment backs this with a bucket; the pipeline only ever
/// needs get/put/delete.
pub trait ObjectStore: Send + Sync {
    fn put(&self, key: &str, bytes: Vec<u8>, metadata: ObjectMetadata) -> Result<(), StorageError>;
    fn get(&self, key: &str) -> Result<Option<StoredObject>, StorageError>;
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

pub fn put_json<T: Serialize>(
    store: &dyn ObjectStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec(value).map_err(|source| StorageError::Encode {
        key: key.to_string(),
        source,
    })?;
    let metadata = match ttl {
        Some(ttl) => ObjectMetadata::json_with_ttl(ttl),
        None => ObjectMetadata::json(),
    };
    store.put(key, bytes, metadata)
}

pub fn get_json<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(object) = store.get(key)? else {
        return Ok(None);
    };
    let value = serde_json::from_slice(&object.bytes).map_err(|source| StorageError::Decode {
        key: key.to_string(),
        source,
    })?;
    Ok(Some(value))
}

struct MemoryEntry {
    bytes: Vec<u8>,
    metadata: ObjectMetadata,
    expires_at: Option<DateTime<Utc>>,
}

/// Mutex-guarded map with lazy TTL expiry. Single-writer-per-key holds by
/// construction upstream; the lock only protects map structure.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, MemoryEntry>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Test hook: force an object to an already-expired state.
    pub fn expire_now(&self, key: &str) {
        if let Ok(mut guard) = self.objects.lock() {
            if let Some(entry) = guard.get_mut(key) {
                entry.expires_at = Some(Utc::now() - chrono::TimeDelta::seconds(1));
            }
        }
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(&self, key: &str, bytes: Vec<u8>, metadata: ObjectMetadata) -> Result<(), StorageError> {
        let expires_at = metadata
            .ttl
            .and_then(|ttl| chrono::TimeDelta::from_std(ttl).ok())
            .map(|delta| Utc::now() + delta);
        let mut guard = self.objects.lock().map_err(|_| StorageError::Write {
            key: key.to_string(),
            reason: "store lock poisoned".to_string(),
        })?;
        guard.insert(
            key.to_string(),
            MemoryEntry {
                bytes,
                metadata,
                expires_at,
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<StoredObject>, StorageError> {
        let mut guard = self.objects.lock().map_err(|_| StorageError::Read {
            key: key.to_string(),
            reason: "store lock poisoned".to_string(),
        })?;
        let expired = matches!(
            guard.get(key),
            Some(entry) if entry.expires_at.is_some_and(|at| at <= Utc::now())
        );
        if expired {
            guard.remove(key);
            return Ok(None);
        }
        Ok(guard.get(key).map(|entry| StoredObject {
            bytes: entry.bytes.clone(),
            metadata: entry.metadata.clone(),
        }))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self.objects.lock().map_err(|_| StorageError::Write {
            key: key.to_string(),
            reason: "store lock poisoned".to_string(),
        })?;
        guard.remove(key);
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct FsSidecar {
    metadata: ObjectMetadata,
    expires_at: Option<DateTime<Utc>>,
}

/// Directory-backed store for CLI runs. Keys carry `/` and `:`; both are
/// percent-encoded into a flat file name, with a `.meta` sidecar for
/// metadata and expiry.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn open(root: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&root).map_err(|err| StorageError::Write {
            key: root.display().to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self { root })
    }

    fn data_path(&self, key: &str) -> PathBuf {
        self.root.join(encode_key(key))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.meta", encode_key(key)))
    }
}

fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

impl ObjectStore for FsObjectStore {
    fn put(&self, key: &str, bytes: Vec<u8>, metadata: ObjectMetadata) -> Result<(), StorageError> {
        let expires_at = metadata
            .ttl
            .and_then(|ttl| chrono::TimeDelta::from_std(ttl).ok())
            .map(|delta| Utc::now() + delta);
        let sidecar = FsSidecar {
            metadata,
            expires_at,
        };
        fs::write(self.data_path(key), bytes).map_err(|err| StorageError::Write {
            key: key.to_string(),
            reason: err.to_string(),
        })?;
        let encoded = serde_json::to_vec(&sidecar).map_err(|source| StorageError::Encode {
            key: key.to_string(),
            source,
        })?;
        fs::write(self.meta_path(key), encoded).map_err(|err| StorageError::Write {
            key: key.to_string(),
            reason: err.to_string(),
        })?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<StoredObject>, StorageError> {
        let data_path = self.data_path(key);
        if !data_path.exists() {
            return Ok(None);
        }
        let sidecar: FsSidecar = match fs::read(self.meta_path(key)) {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|source| StorageError::Decode {
                key: key.to_string(),
                source,
            })?,
            Err(_) => FsSidecar {
                metadata: ObjectMetadata::default(),
                expires_at: None,
            },
        };
        if sidecar.expires_at.is_some_and(|at| at <= Utc::now()) {
            let _ = fs::remove_file(&data_path);
            let _ = fs::remove_file(self.meta_path(key));
            return Ok(None);
        }
        let bytes = fs::read(&data_path).map_err(|err| StorageError::Read {
            key: key.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Some(StoredObject {
            bytes,
            metadata: sidecar.metadata,
        }))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let _ = fs::remove_file(self.data_path(key));
        let _ = fs::remove_file(self.meta_path(key));
        Ok(())
    }
}
