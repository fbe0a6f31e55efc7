use std::collections::HashMap;

use thiserror::Error;

use crate::record::{decode, encode, Decoded, Record, RecordError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend failed: {0}")]
    Backend(String),
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Named byte blobs that survive deep sleep.
pub trait DurableStore {
    /// `Ok(None)` means the record was never written, which is normal on first boot.
    fn load(&mut self, name: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn save(&mut self, name: &str, bytes: &[u8]) -> Result<(), StoreError>;

    fn append(&mut self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut existing = self.load(name)?.unwrap_or_default();
        existing.extend_from_slice(bytes);
        self.save(name, &existing)
    }
}

/// Outcome of loading a record at boot.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded<T> {
    /// No record existed.
    Absent(T),
    Stored(Decoded<T>),
}

impl<T> Loaded<T> {
    pub fn into_value(self) -> T {
        match self {
            Self::Absent(value) => value,
            Self::Stored(decoded) => decoded.value,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent(_))
    }
}

/// Zero-length blobs count as absent.
pub fn load_record<T: Record>(store: &mut dyn DurableStore) -> Result<Loaded<T>, StoreError> {
    match store.load(T::NAME)? {
        Some(bytes) if !bytes.is_empty() => Ok(Loaded::Stored(decode(&bytes))),
        _ => Ok(Loaded::Absent(T::default())),
    }
}

pub fn save_record<T: Record>(store: &mut dyn DurableStore, record: &T) -> Result<(), StoreError> {
    let bytes = encode(record)?;
    store.save(T::NAME, &bytes)
}

/// Writes `loaded` back only when nothing was stored before; an existing
/// record is never replaced by defaults. Returns whether a write happened.
pub fn bootstrap_record<T: Record>(
    store: &mut dyn DurableStore,
    loaded: &Loaded<T>,
) -> Result<bool, StoreError> {
    match loaded {
        Loaded::Absent(value) => {
            save_record(store, value)?;
            Ok(true)
        }
        Loaded::Stored(_) => Ok(false),
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.records.get(name).map(Vec::as_slice)
    }

    pub fn insert(&mut self, name: &str, bytes: impl Into<Vec<u8>>) {
        self.records.insert(name.to_string(), bytes.into());
    }
}

impl DurableStore for MemoryStore {
    fn load(&mut self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.records.get(name).cloned())
    }

    fn save(&mut self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.records.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}
