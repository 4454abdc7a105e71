//! Duplicate task ID resolution
//!
//! The flat task list is the only place task records live; grouping
//! references and timeline entries share their task's ID by construction
//! and are rebuilt from it afterwards.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::model::Task;
use crate::store::EntityStore;
use crate::visit::{walk_mut, DocumentVisitor};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

/// Outcome of [`DuplicateIdResolver::dedupe`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupeReport {
    pub renamed: Vec<Rename>,
    pub diagnostics: Diagnostics,
}

impl DedupeReport {
    pub fn change_count(&self) -> usize {
        self.renamed.len()
    }
}

/// Renames later occurrences of a repeated task ID to `{id}-dup{N}`
pub struct DuplicateIdResolver;

impl DuplicateIdResolver {
    pub fn dedupe(store: &mut EntityStore) -> DedupeReport {
        let taken: HashSet<String> = store.document().tasks.iter().map(|t| t.id.clone()).collect();
        let mut visitor = DedupeVisitor {
            occurrences: HashMap::new(),
            taken,
            renamed: Vec::new(),
        };
        walk_mut(store.document_mut(), &mut visitor);

        let mut report = DedupeReport {
            renamed: visitor.renamed,
            diagnostics: Diagnostics::new(),
        };
        for rename in &report.renamed {
            report.diagnostics.report(
                rename.to.as_str(),
                DiagnosticCode::DuplicateTaskRenamed,
                format!("Duplicate task ID '{}' renamed to '{}'", rename.from, rename.to),
            );
        }

        if !report.renamed.is_empty() {
            store.reindex();
        }
        info!(renamed = report.change_count(), "Deduplicated task IDs");
        report
    }
}

struct DedupeVisitor {
    /// Occurrences seen so far per original ID
    occurrences: HashMap<String, usize>,
    /// Every ID in use, including assigned replacements
    taken: HashSet<String>,
    renamed: Vec<Rename>,
}

impl DocumentVisitor for DedupeVisitor {
    fn visit_task(&mut self, task: &mut Task) {
        if !task.looks_like_task() {
            return;
        }
        let seen = self.occurrences.entry(task.id.clone()).or_default();
        *seen += 1;
        if *seen == 1 {
            return;
        }

        let mut rank = *seen - 1;
        let mut candidate = format!("{}-dup{}", task.id, rank);
        while self.taken.contains(&candidate) {
            rank += 1;
            candidate = format!("{}-dup{}", task.id, rank);
        }

        warn!(from = %task.id, to = %candidate, "Renaming duplicate task");
        self.taken.insert(candidate.clone());
        let from = std::mem::replace(&mut task.id, candidate.clone());
        self.renamed.push(Rename { from, to: candidate });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(tasks: &str) -> EntityStore {
        EntityStore::parse("mem", &format!(r#"{{"tasks": {tasks}}}"#)).unwrap()
    }

    #[test]
    fn test_three_copies_get_ranked_suffixes() {
        let mut store = store(
            r#"[
                {"ID": "task-1", "ServiceID": "s1"},
                {"ID": "task-1", "ServiceID": "s1"},
                {"ID": "task-1", "NodeID": "n1"}
            ]"#,
        );
        let report = DuplicateIdResolver::dedupe(&mut store);

        let ids: Vec<&str> = store.document().tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["task-1", "task-1-dup1", "task-1-dup2"]);
        assert_eq!(report.change_count(), 2);
        assert_eq!(report.diagnostics.len(), 2);
    }

    #[test]
    fn test_existing_suffix_is_skipped() {
        let mut store = store(
            r#"[
                {"ID": "a", "Slot": 1},
                {"ID": "a-dup1", "Slot": 1},
                {"ID": "a", "Slot": 2}
            ]"#,
        );
        DuplicateIdResolver::dedupe(&mut store);
        let ids: Vec<&str> = store.document().tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["a", "a-dup1", "a-dup2"]);
    }

    #[test]
    fn test_records_without_task_fields_are_ignored() {
        let mut store = store(r#"[{"ID": "x"}, {"ID": "x"}]"#);
        let report = DuplicateIdResolver::dedupe(&mut store);
        assert_eq!(report.change_count(), 0);
    }
}
