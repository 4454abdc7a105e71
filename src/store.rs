//! Entity Store
//!
//! Owns the in-memory fixture document together with its identity index.
//! Structural mutations go through [`EntityStore::document_mut`] followed by
//! [`EntityStore::reindex`].

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{FixtureError, Result};
use crate::index::{EntityRef, IdentityIndex, Role};
use crate::model::FixtureDocument;
use crate::persist::serialize_document;
use crate::snapshot::Snapshot;

/// Loaded fixture document plus per-role ID index
#[derive(Debug, Clone)]
pub struct EntityStore {
    source: PathBuf,
    doc: FixtureDocument,
    index: IdentityIndex,
}

impl EntityStore {
    /// Load a fixture document from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let store = Self::parse(path, &content)?;
        info!(
            path = %path.display(),
            nodes = store.doc.nodes.len(),
            services = store.doc.services.len(),
            tasks = store.doc.tasks.len(),
            "Loaded fixture document"
        );
        Ok(store)
    }

    /// Parse a document from text; `source` names it in parse errors
    pub fn parse(source: impl Into<PathBuf>, content: &str) -> Result<Self> {
        let source = source.into();
        let doc: FixtureDocument =
            serde_json::from_str(content).map_err(|e| FixtureError::parse(&source, &e))?;
        Ok(Self::from_document(source, doc))
    }

    pub fn from_document(source: impl Into<PathBuf>, doc: FixtureDocument) -> Self {
        let index = IdentityIndex::build(&doc);
        Self {
            source: source.into(),
            doc,
            index,
        }
    }

    /// Write the document in the one-line-per-key layout. This is a plain
    /// write; use [`crate::persist::AtomicPersister`] for the guarded path.
    pub fn save(&self, destination: impl AsRef<Path>) -> Result<()> {
        let destination = destination.as_ref();
        let content = serialize_document(&self.doc)?;
        fs::write(destination, content)?;
        debug!(path = %destination.display(), "Saved fixture document");
        Ok(())
    }

    /// Path the document was loaded from
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn document(&self) -> &FixtureDocument {
        &self.doc
    }

    /// Mutable access. Call [`Self::reindex`] after inserting or renaming.
    pub fn document_mut(&mut self) -> &mut FixtureDocument {
        &mut self.doc
    }

    pub fn index(&self) -> &IdentityIndex {
        &self.index
    }

    /// Rebuild the identity index after a structural change
    pub fn reindex(&mut self) {
        self.index = IdentityIndex::build(&self.doc);
    }

    pub fn resolve(&self, role: Role, id: &str) -> Result<EntityRef<'_>> {
        self.index.resolve(&self.doc, role, id)
    }

    pub fn contains(&self, role: Role, id: &str) -> bool {
        self.index.contains(role, id)
    }

    /// Read-only view handed to the HTTP facade
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot::new(self)
    }

    pub fn into_document(self) -> FixtureDocument {
        self.doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_carries_location() {
        let err = EntityStore::parse("broken.json", "{\n  \"nodes\": [\n").unwrap_err();
        match err {
            FixtureError::Parse { path, line, .. } => {
                assert_eq!(path, PathBuf::from("broken.json"));
                assert!(line >= 2);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_reindex_after_insert() {
        let mut store = EntityStore::parse("mem", r#"{"services": []}"#).unwrap();
        store.document_mut().services.push(crate::model::Service::stub("s1", None, None));
        assert!(!store.contains(Role::Service, "s1"));
        store.reindex();
        assert!(store.contains(Role::Service, "s1"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let store = EntityStore::parse("mem", r#"{"nodes": [{"ID": "n1"}]}"#).unwrap();
        store.save(&path).unwrap();

        let loaded = EntityStore::load(&path).unwrap();
        assert_eq!(loaded.document(), store.document());
        assert_eq!(loaded.resolve(Role::Node, "n1").unwrap().id(), "n1");
    }
}
