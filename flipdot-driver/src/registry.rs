//! Sign registry
//!
//! Holds the configured signs in registration order with a name lookup on the
//! side, so listing order never depends on hashing.

use crate::types::{DriverError, Result, SignInfo, SignSpec};
use std::collections::HashMap;

/// A configured sign and the view of it the panel link reported
#[derive(Debug, Clone)]
pub struct SignEntry {
    pub spec: SignSpec,
    pub info: SignInfo,
}

/// Ordered, name-keyed set of signs
#[derive(Debug, Clone, Default)]
pub struct SignRegistry {
    /// Entries in registration order
    entries: Vec<SignEntry>,

    /// Sign name lookup
    /// Key: sign name (case-sensitive), Value: index into `entries`
    index: HashMap<String, usize>,
}

impl SignRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from specs, rejecting invalid or duplicate signs
    pub fn from_specs(specs: impl IntoIterator<Item = SignSpec>) -> Result<Self> {
        let mut registry = Self::new();
        for spec in specs {
            registry.insert(spec)?;
        }
        Ok(registry)
    }

    /// Append a sign; its info starts out as the configured dimensions
    pub fn insert(&mut self, spec: SignSpec) -> Result<()> {
        spec.validate()?;
        if self.index.contains_key(&spec.name) {
            return Err(DriverError::Configuration(format!(
                "duplicate sign name: {}",
                spec.name
            )));
        }
        if let Some(clash) = self.entries.iter().find(|e| e.spec.address == spec.address) {
            return Err(DriverError::Configuration(format!(
                "signs {} and {} share bus address {}",
                clash.spec.name, spec.name, spec.address
            )));
        }

        self.index.insert(spec.name.clone(), self.entries.len());
        let info = spec.info();
        self.entries.push(SignEntry { spec, info });
        Ok(())
    }

    /// Replace the cached view of a sign with what the panel link reported
    pub fn update_info(&mut self, name: &str, info: SignInfo) -> Result<()> {
        let idx = self.position(name)?;
        self.entries[idx].info = info;
        Ok(())
    }

    /// Look up a sign by exact name
    pub fn get(&self, name: &str) -> Option<&SignEntry> {
        self.index.get(name).map(|&idx| &self.entries[idx])
    }

    /// Look up a sign's info, failing with NotFound
    pub fn info(&self, name: &str) -> Result<SignInfo> {
        self.get(name)
            .map(|entry| entry.info.clone())
            .ok_or_else(|| DriverError::NotFound(name.to_string()))
    }

    /// All sign infos in registration order
    pub fn infos(&self) -> Vec<SignInfo> {
        self.entries.iter().map(|e| e.info.clone()).collect()
    }

    /// Iterate entries in registration order
    pub fn iter(&self) -> impl Iterator<Item = &SignEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| DriverError::NotFound(name.to_string()))
    }
}
