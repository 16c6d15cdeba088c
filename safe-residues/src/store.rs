//! Persistent residue store.
//!
//! The core only needs `load` / `save` by modulus; `JsonStore` keeps one
//! pretty-printed JSON file per modulus in a directory, `MemoryStore` keeps
//! sets in a map for tests and one-shot runs.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::residue::{Modulus, ResidueSet};

pub const SCHEMA_VERSION: u32 = 1;

/// Load/save a residue set by modulus.
pub trait ResidueStore {
    /// `StoreError::NotFound` means the caller may regenerate the set.
    fn load(&self, modulus: Modulus) -> Result<ResidueSet, StoreError>;

    fn save(&mut self, set: &ResidueSet) -> Result<(), StoreError>;

    fn contains(&self, modulus: Modulus) -> bool {
        self.load(modulus).is_ok()
    }
}

/// On-disk layout of one stored set.
#[derive(Debug, Serialize, Deserialize)]
struct ResidueFile {
    schema_version: u32,
    modulus: u64,
    count: usize,
    residues: Vec<u64>,
}

/// One `residues_mod{M}.json` file per modulus under `dir`.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, modulus: Modulus) -> PathBuf {
        self.dir.join(format!("residues_mod{}.json", modulus))
    }
}

impl ResidueStore for JsonStore {
    fn load(&self, modulus: Modulus) -> Result<ResidueSet, StoreError> {
        let path = self.path_for(modulus);
        if !path.exists() {
            return Err(StoreError::NotFound(modulus.value()));
        }
        let content = fs::read_to_string(&path)?;
        let file: ResidueFile = serde_json::from_str(&content)?;

        if file.modulus != modulus.value() {
            return Err(StoreError::ModulusMismatch {
                path,
                expected: modulus.value(),
                found: file.modulus,
            });
        }
        if file.count != file.residues.len() {
            return Err(StoreError::Corrupt {
                path,
                reason: format!(
                    "header count {} but {} residues",
                    file.count,
                    file.residues.len()
                ),
            });
        }

        let set = ResidueSet::from_residues(modulus, file.residues)?;
        if set.len() != file.count {
            return Err(StoreError::Corrupt {
                path,
                reason: format!("{} duplicate residues", file.count - set.len()),
            });
        }
        log::info!("Loaded {} residues mod {} from {}", set.len(), modulus, path.display());
        Ok(set)
    }

    fn save(&mut self, set: &ResidueSet) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(set.modulus());
        let file = ResidueFile {
            schema_version: SCHEMA_VERSION,
            modulus: set.modulus().value(),
            count: set.len(),
            residues: set.sorted(),
        };
        fs::write(&path, serde_json::to_string_pretty(&file)?)?;
        log::info!("Saved {} residues mod {} to {}", set.len(), set.modulus(), path.display());
        Ok(())
    }

    fn contains(&self, modulus: Modulus) -> bool {
        self.path_for(modulus).exists()
    }
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    sets: HashMap<Modulus, ResidueSet>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

impl ResidueStore for MemoryStore {
    fn load(&self, modulus: Modulus) -> Result<ResidueSet, StoreError> {
        self.sets
            .get(&modulus)
            .cloned()
            .ok_or(StoreError::NotFound(modulus.value()))
    }

    fn save(&mut self, set: &ResidueSet) -> Result<(), StoreError> {
        self.sets.insert(set.modulus(), set.clone());
        Ok(())
    }

    fn contains(&self, modulus: Modulus) -> bool {
        self.sets.contains_key(&modulus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResidueSet {
        ResidueSet::from_residues(Modulus::new(30).unwrap(), [11, 23, 29]).unwrap()
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        assert!(matches!(
            store.load(Modulus::new(30).unwrap()),
            Err(StoreError::NotFound(30))
        ));
        store.save(&sample()).unwrap();
        assert_eq!(store.load(Modulus::new(30).unwrap()).unwrap(), sample());
        assert!(store.contains(Modulus::new(30).unwrap()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_json_file_name() {
        let store = JsonStore::new("data");
        assert_eq!(
            store.path_for(Modulus::P5),
            PathBuf::from("data").join("residues_mod2310.json")
        );
    }
}
