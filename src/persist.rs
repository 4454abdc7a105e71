//! Atomic write-back
//!
//! Layout: one top-level key per line, each value compact, so a change to
//! one collection shows up as a one-line diff.
//!
//! Protocol: backup the destination, write a temp sibling, rename it over
//! the destination, then read back, checksum and parse. A failed check
//! restores the backup.

use serde::Serialize;
use serde_json::Value;
use similar::TextDiff;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::checksum::Checksum;
use crate::config::PersistConfig;
use crate::error::{PersistFailure, PersistStage, Result};
use crate::model::FixtureDocument;

/// Serialize with one compact line per top-level key
pub fn serialize_document(doc: &FixtureDocument) -> Result<String> {
    let value = serde_json::to_value(doc)?;
    let map = match value {
        Value::Object(map) => map,
        other => return Ok(format!("{}\n", serde_json::to_string(&other)?)),
    };
    if map.is_empty() {
        return Ok("{}\n".to_string());
    }

    let mut lines = Vec::with_capacity(map.len());
    for (key, value) in &map {
        lines.push(format!(
            "  {}: {}",
            serde_json::to_string(key)?,
            serde_json::to_string(value)?
        ));
    }
    Ok(format!("{{\n{}\n}}\n", lines.join(",\n")))
}

/// `data.json` + `bak` -> `data.json.bak`
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Unified diff between the file on disk and what would be written
pub fn render_diff(destination: &Path, doc: &FixtureDocument) -> Result<String> {
    let current = match fs::read_to_string(destination) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    let next = serialize_document(doc)?;
    let name = destination.display().to_string();
    let new_name = format!("{name} (new)");

    let diff = TextDiff::from_lines(&current, &next);
    Ok(diff
        .unified_diff()
        .context_radius(1)
        .header(&name, &new_name)
        .to_string())
}

/// A successful write-back
#[derive(Debug, Clone, Serialize)]
pub struct PersistReport {
    pub path: PathBuf,
    /// Copy of the previous file, if there was one
    pub backup: Option<PathBuf>,
    pub bytes: usize,
    pub checksum: Checksum,
}

/// Writes documents with backup, validation and rollback
#[derive(Debug, Clone)]
pub struct AtomicPersister {
    backup_suffix: String,
    temp_suffix: String,
}

impl AtomicPersister {
    pub fn new(config: &PersistConfig) -> Self {
        Self {
            backup_suffix: config.backup_suffix.clone(),
            temp_suffix: config.temp_suffix.clone(),
        }
    }

    pub fn persist(&self, doc: &FixtureDocument, destination: &Path) -> Result<PersistReport> {
        let content = serialize_document(doc)?;
        Ok(self.commit(&content, destination)?)
    }

    /// Run the write protocol for already-serialized content
    pub fn commit(&self, content: &str, destination: &Path) -> std::result::Result<PersistReport, PersistFailure> {
        let backup = self.backup(destination)?;

        let tmp = sibling_path(destination, &self.temp_suffix);
        if let Err(e) = fs::write(&tmp, content) {
            remove_temp(&tmp);
            return Err(failure(PersistStage::WriteTemp, &tmp, e, false));
        }
        if let Err(e) = fs::rename(&tmp, destination) {
            remove_temp(&tmp);
            return Err(failure(PersistStage::Rename, destination, e, false));
        }

        let checksum = Checksum::from_text(content);
        if let Err(message) = verify(destination, &checksum) {
            let restored = self.rollback(destination, backup.as_deref());
            warn!(path = %destination.display(), %message, restored, "Written document failed validation");
            return Err(PersistFailure {
                stage: PersistStage::Validate,
                path: destination.to_path_buf(),
                message,
                restored,
            });
        }

        info!(
            path = %destination.display(),
            bytes = content.len(),
            checksum = %checksum.short(),
            "Persisted fixture document"
        );
        Ok(PersistReport {
            path: destination.to_path_buf(),
            backup,
            bytes: content.len(),
            checksum,
        })
    }

    fn backup(&self, destination: &Path) -> std::result::Result<Option<PathBuf>, PersistFailure> {
        if !destination.exists() {
            return Ok(None);
        }
        let backup = sibling_path(destination, &self.backup_suffix);
        fs::copy(destination, &backup).map_err(|e| failure(PersistStage::Backup, &backup, e, false))?;
        debug!(backup = %backup.display(), "Backed up destination");
        Ok(Some(backup))
    }

    /// Put the backup back. Without one, the invalid file is removed.
    fn rollback(&self, destination: &Path, backup: Option<&Path>) -> bool {
        match backup {
            Some(backup) => match fs::copy(backup, destination) {
                Ok(_) => true,
                Err(e) => {
                    warn!(error = %e, "Failed to restore backup");
                    false
                }
            },
            None => {
                remove_temp(destination);
                false
            }
        }
    }
}

/// Read back, compare checksums, parse
fn verify(destination: &Path, expected: &Checksum) -> std::result::Result<(), String> {
    let written = fs::read(destination).map_err(|e| format!("read back failed: {e}"))?;
    if !expected.verify(&written) {
        return Err("checksum mismatch after write".to_string());
    }
    serde_json::from_slice::<FixtureDocument>(&written).map_err(|e| format!("written file does not parse: {e}"))?;
    Ok(())
}

fn failure(stage: PersistStage, path: &Path, err: io::Error, restored: bool) -> PersistFailure {
    PersistFailure {
        stage,
        path: path.to_path_buf(),
        message: err.to_string(),
        restored,
    }
}

/// Best effort; a leftover temp file is not an error
fn remove_temp(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "Could not remove temp file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;

    fn doc() -> FixtureDocument {
        let mut doc = FixtureDocument::default();
        doc.nodes.push(Node { id: "n1".into(), ..Default::default() });
        doc
    }

    #[test]
    fn test_one_line_per_key() {
        let text = serialize_document(&doc()).unwrap();
        assert!(text.starts_with("{\n  \"nodes\": [{\"ID\":\"n1\"}],\n"));
        assert!(text.ends_with("\n}\n"));
        let lines = text.lines().count();
        // braces plus one line per top-level key
        let keys = serde_json::to_value(doc()).unwrap().as_object().unwrap().len();
        assert_eq!(lines, keys + 2);
    }

    #[test]
    fn test_sibling_path() {
        assert_eq!(
            sibling_path(Path::new("/tmp/data.json"), "bak"),
            PathBuf::from("/tmp/data.json.bak")
        );
    }

    #[test]
    fn test_commit_writes_backup() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("data.json");
        fs::write(&dest, "{}").unwrap();

        let persister = AtomicPersister::new(&PersistConfig::default());
        let report = persister.persist(&doc(), &dest).unwrap();

        assert_eq!(report.backup, Some(dir.path().join("data.json.bak")));
        assert_eq!(fs::read_to_string(dir.path().join("data.json.bak")).unwrap(), "{}");
        assert!(!dir.path().join("data.json.tmp").exists());
        assert!(report.checksum.verify(&fs::read(&dest).unwrap()));
    }

    #[test]
    fn test_invalid_content_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("data.json");
        fs::write(&dest, "{\"nodes\": []}").unwrap();

        let persister = AtomicPersister::new(&PersistConfig::default());
        let err = persister.commit("{ not json", &dest).unwrap_err();

        assert_eq!(err.stage, PersistStage::Validate);
        assert!(err.restored);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "{\"nodes\": []}");
    }

    #[test]
    fn test_diff_shows_changed_key() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("data.json");
        fs::write(&dest, serialize_document(&FixtureDocument::default()).unwrap()).unwrap();

        let diff = render_diff(&dest, &doc()).unwrap();
        assert!(diff.contains("-  \"nodes\": [],"));
        assert!(diff.contains("+  \"nodes\": [{\"ID\":\"n1\"}],"));
    }
}
