use std::collections::BTreeMap;
use std::sync::Mutex;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::{Depot, DepotFile, Tag};
use crate::error::{CertDepotError, Result};

/// A flat key/value keyspace with an atomic create-if-absent write.
pub trait KvStore {
    /// Stores `value` under `key` unless the key exists. Returns whether it
    /// was stored.
    fn create(&self, key: &str, value: &[u8]) -> Result<bool>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Returns whether the key existed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// All keys, in ascending order.
    fn keys(&self) -> Result<Vec<String>>;
}

/// Process-local store, mostly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|e| CertDepotError::Backend(e.to_string()))
    }
}

impl KvStore for MemoryStore {
    fn create(&self, key: &str, value: &[u8]) -> Result<bool> {
        let mut entries = self.lock()?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

/// Stored value: the artifact's mode next to its base64 bytes.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    mode: u32,
    data: String,
}

impl Envelope {
    fn decode_data(&self, name: &str) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| CertDepotError::ParseError(format!("{name}: {e}")))
    }
}

/// A depot over any [`KvStore`].
///
/// The store has no file modes, so each entry records the mode it was put
/// with and the same permission gate as the file depot applies on read.
#[derive(Debug)]
pub struct KvDepot<S> {
    store: S,
}

impl<S: KvStore> KvDepot<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn envelope(&self, name: &str) -> Result<Envelope> {
        let value = self
            .store
            .get(name)?
            .ok_or_else(|| CertDepotError::NotFound(name.to_string()))?;
        Ok(serde_json::from_slice(&value)?)
    }

    fn checked_envelope(&self, tag: &Tag) -> Result<Envelope> {
        let envelope = self.envelope(tag.name())?;
        if !tag.permits(envelope.mode) {
            return Err(tag.permission_denied(envelope.mode));
        }
        Ok(envelope)
    }
}

impl<S: KvStore> Depot for KvDepot<S> {
    fn put(&self, tag: &Tag, data: &[u8]) -> Result<()> {
        let envelope = Envelope {
            mode: tag.perm(),
            data: STANDARD.encode(data),
        };
        if !self.store.create(tag.name(), &serde_json::to_vec(&envelope)?)? {
            return Err(CertDepotError::AlreadyExists(tag.name().to_string()));
        }
        tracing::debug!(name = %tag.name(), size = data.len(), "stored artifact");
        Ok(())
    }

    fn check(&self, tag: &Tag) -> bool {
        self.envelope(tag.name())
            .map(|envelope| tag.permits(envelope.mode))
            .unwrap_or(false)
    }

    fn get(&self, tag: &Tag) -> Result<Vec<u8>> {
        let data = self.checked_envelope(tag)?.decode_data(tag.name())?;
        tracing::debug!(name = %tag.name(), "read artifact");
        Ok(data)
    }

    fn delete(&self, tag: &Tag) -> Result<()> {
        if !self.store.delete(tag.name())? {
            return Err(CertDepotError::NotFound(tag.name().to_string()));
        }
        tracing::debug!(name = %tag.name(), "deleted artifact");
        Ok(())
    }

    fn list(&self) -> Result<Vec<Tag>> {
        let mut tags = Vec::new();
        for key in self.store.keys()? {
            match self.envelope(&key) {
                Ok(envelope) => tags.push(Tag::new(key, envelope.mode)),
                Err(CertDepotError::NotFound(_)) => {}
                Err(err) => tracing::warn!(key = %key, error = %err, "skipping unreadable entry"),
            }
        }
        Ok(tags)
    }

    fn get_file(&self, tag: &Tag) -> Result<DepotFile> {
        let envelope = self.checked_envelope(tag)?;
        let data = envelope.decode_data(tag.name())?;
        Ok(DepotFile {
            mode: envelope.mode,
            size: data.len() as u64,
            data,
        })
    }
}
