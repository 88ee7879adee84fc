//! Access to WSL distro registration records.
//!
//! The Windows WSL service owns these records; this module never invents
//! them, it only reads and conditionally overwrites individual fields. The
//! `DistroStore` trait exists so commands can be exercised against an
//! in-memory fake instead of the live registry.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[cfg(windows)]
mod registry;
#[cfg(windows)]
pub use registry::RegistryStore;

/// Errors from distro record access.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("distribution not registered: {0}")]
    NotFound(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("the distro registry is only available on Windows")]
    Unsupported,
}

/// A WSL distro registration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistroRecord {
    pub name: String,
    pub base_path: PathBuf,
    pub default_uid: u32,
    pub flags: u32,
    pub version: u32,
}

/// Read/write access to distro registrations.
pub trait DistroStore {
    fn list(&self) -> Result<Vec<DistroRecord>, StoreError>;

    fn get(&self, name: &str) -> Result<DistroRecord, StoreError>;

    fn set_default_uid(&mut self, name: &str, uid: u32) -> Result<(), StoreError>;

    fn set_flags(&mut self, name: &str, flags: u32) -> Result<(), StoreError>;
}

/// Open the store backing the current platform.
pub fn open_default_store() -> Result<Box<dyn DistroStore>, StoreError> {
    #[cfg(windows)]
    {
        Ok(Box::new(RegistryStore::open()?))
    }
    #[cfg(not(windows))]
    {
        Err(StoreError::Unsupported)
    }
}

/// In-memory store used in tests and wherever the registry is unavailable.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, DistroRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: DistroRecord) {
        self.records.insert(record.name.clone(), record);
    }
}

impl DistroStore for MemoryStore {
    fn list(&self) -> Result<Vec<DistroRecord>, StoreError> {
        Ok(self.records.values().cloned().collect())
    }

    fn get(&self, name: &str) -> Result<DistroRecord, StoreError> {
        self.records
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn set_default_uid(&mut self, name: &str, uid: u32) -> Result<(), StoreError> {
        let record = self
            .records
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        record.default_uid = uid;
        Ok(())
    }

    fn set_flags(&mut self, name: &str, flags: u32) -> Result<(), StoreError> {
        let record = self
            .records
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        record.flags = flags;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str) -> DistroRecord {
        DistroRecord {
            name: name.to_string(),
            base_path: PathBuf::from(r"C:\WSL\distros").join(name),
            default_uid: 0,
            flags: 0xf,
            version: 2,
        }
    }

    #[test]
    fn memory_store_get_and_update() {
        let mut store = MemoryStore::new();
        store.insert(sample("Ubuntu"));

        assert_eq!(store.get("Ubuntu").unwrap().default_uid, 0);

        store.set_default_uid("Ubuntu", 1000).unwrap();
        assert_eq!(store.get("Ubuntu").unwrap().default_uid, 1000);

        store.set_flags("Ubuntu", 0x7).unwrap();
        assert_eq!(store.get("Ubuntu").unwrap().flags, 0x7);
    }

    #[test]
    fn missing_distro_is_not_found() {
        let mut store = MemoryStore::new();
        assert!(matches!(store.get("Arch"), Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.set_default_uid("Arch", 1000),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn list_is_sorted_by_name() {
        let mut store = MemoryStore::new();
        store.insert(sample("Fedora"));
        store.insert(sample("Arch"));

        let names: Vec<String> = store.list().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Arch".to_string(), "Fedora".to_string()]);
    }
}
