//! Enrolled face encodings, one per person.

use crate::error::ValidationError;
use crate::resilient::Document;
use crate::roster::PersonId;
use rollcall_core::Encoding;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: PersonId,
    pub encoding: Encoding,
}

/// Ordered `(id, encoding)` pairs with unique ids.
///
/// Order is insertion order and is what match indices refer to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Registry {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn id_at(&self, index: usize) -> Option<&PersonId> {
        self.entries.get(index).map(|e| &e.id)
    }

    /// Encodings in registry order, for distance computation.
    pub fn encodings(&self) -> Vec<Encoding> {
        self.entries.iter().map(|e| e.encoding.clone()).collect()
    }

    pub fn contains(&self, id: &PersonId) -> bool {
        self.entries.iter().any(|e| &e.id == id)
    }

    pub fn insert(&mut self, id: PersonId, encoding: Encoding) -> Result<(), ValidationError> {
        if self.contains(&id) {
            return Err(ValidationError::DuplicateId(id.to_string()));
        }
        if encoding.is_empty() {
            return Err(ValidationError::Empty("encoding"));
        }
        self.entries.push(RegistryEntry { id, encoding });
        Ok(())
    }

    pub fn remove(&mut self, id: &PersonId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.id != id);
        self.entries.len() != before
    }
}

impl Document for Registry {
    const FILE_NAME: &'static str = "registry.json";

    fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let registry: Registry = serde_json::from_slice(bytes)?;
        // A hand-merged file could repeat an id; the first one wins.
        let mut seen = std::collections::HashSet::new();
        let entries = registry
            .entries
            .into_iter()
            .filter(|e| seen.insert(e.id.clone()))
            .collect();
        Ok(Self { entries })
    }

    fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilient::DataDir;
    use tempfile::TempDir;

    fn id(s: &str) -> PersonId {
        PersonId::parse(s).unwrap()
    }

    #[test]
    fn test_round_trip_preserves_order_and_values() {
        let tmp = TempDir::new().unwrap();
        let data = DataDir::open(tmp.path()).unwrap();

        let mut registry = Registry::default();
        registry.insert(id("b"), Encoding(vec![0.25, -1.5, 3.0])).unwrap();
        registry.insert(id("a"), Encoding(vec![0.1, 0.2, 0.3])).unwrap();
        data.save(&registry).unwrap();

        let loaded = data.load::<Registry>().value;
        assert_eq!(loaded, registry);
        assert_eq!(loaded.id_at(0), Some(&id("b")));
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let mut registry = Registry::default();
        registry.insert(id("1"), Encoding(vec![1.0])).unwrap();
        assert_eq!(
            registry.insert(id("1"), Encoding(vec![2.0])),
            Err(ValidationError::DuplicateId("1".into()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_insert_rejects_empty_encoding() {
        let mut registry = Registry::default();
        assert_eq!(
            registry.insert(id("1"), Encoding(vec![])),
            Err(ValidationError::Empty("encoding"))
        );
    }

    #[test]
    fn test_remove() {
        let mut registry = Registry::default();
        registry.insert(id("1"), Encoding(vec![1.0])).unwrap();
        assert!(registry.remove(&id("1")));
        assert!(!registry.remove(&id("1")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_decode_drops_repeated_ids() {
        let json = br#"[{"id":"1","encoding":[1.0]},{"id":"1","encoding":[2.0]}]"#;
        let registry = Registry::decode(json).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.entries()[0].encoding, Encoding(vec![1.0]));
    }

    #[test]
    fn test_unsafe_stored_id_fails_decode() {
        let json = br#"[{"id":"../../etc/passwd","encoding":[1.0]}]"#;
        assert!(Registry::decode(json).is_err());
    }
}
