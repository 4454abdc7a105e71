//! Diagnostics
//!
//! Collects the recovered findings of a run: collisions that were renamed,
//! references that still dangle, backfills, and write-back failures.
//! Nothing in here stops a run; fatal conditions are [`crate::FixtureError`].

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // === Repaired ===
    /// A node ID equal to a service ID was renamed
    CollisionDetected,
    /// A service known only from a listing received a stub record
    ServiceStubBackfilled,
    /// A task found only in a grouping was added to the flat list
    TaskBackfilled,
    /// A repeated task ID was renamed with a `-dup` suffix
    DuplicateTaskRenamed,

    // === Dangling ===
    /// Task ServiceID does not resolve
    DanglingServiceRef,
    /// Task NodeID does not resolve
    DanglingNodeRef,
    /// Per-node grouping keyed by an unknown service
    DanglingGroupingServiceKey,
    /// Per-service grouping keyed by an unknown node
    DanglingGroupingNodeKey,

    // === Duplicates left in place ===
    DuplicateNodeId,
    DuplicateServiceId,

    // === Persistence ===
    /// Write-back failed; destination restored or left untouched
    PersistenceFailure,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CollisionDetected => "I001",
            Self::ServiceStubBackfilled => "I002",
            Self::TaskBackfilled => "I003",
            Self::DuplicateTaskRenamed => "I004",
            Self::DanglingServiceRef => "W001",
            Self::DanglingNodeRef => "W002",
            Self::DanglingGroupingServiceKey => "W003",
            Self::DanglingGroupingNodeKey => "W004",
            Self::DuplicateNodeId => "W005",
            Self::DuplicateServiceId => "W006",
            Self::PersistenceFailure => "E001",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::CollisionDetected
            | Self::ServiceStubBackfilled
            | Self::TaskBackfilled
            | Self::DuplicateTaskRenamed => Severity::Info,

            Self::DanglingServiceRef
            | Self::DanglingNodeRef
            | Self::DanglingGroupingServiceKey
            | Self::DanglingGroupingNodeKey
            | Self::DuplicateNodeId
            | Self::DuplicateServiceId => Severity::Warning,

            Self::PersistenceFailure => Severity::Error,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Diagnostic Item
// =============================================================================

/// A single diagnostic item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticItem {
    /// Entity the finding is about (task, node or service ID, or a path)
    pub entity_id: String,
    pub code: DiagnosticCode,
    pub message: String,
    /// Additional context (e.g., the grouping a key was found in)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl DiagnosticItem {
    pub fn new(entity_id: impl Into<String>, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for DiagnosticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.code,
            self.code.severity(),
            self.message,
            self.entity_id
        )?;

        for ctx in &self.context {
            write!(f, "\n  - {}", ctx)?;
        }

        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

/// Findings of one run, in the order they were recorded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<DiagnosticItem>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: DiagnosticItem) {
        self.items.push(item);
    }

    /// Record a finding with no extra context
    pub fn report(&mut self, entity_id: impl Into<String>, code: DiagnosticCode, message: impl Into<String>) {
        self.push(DiagnosticItem::new(entity_id, code, message));
    }

    /// Record a task reference that does not resolve
    pub fn dangling(&mut self, task_id: &str, code: DiagnosticCode, target: &str) {
        let what = match code {
            DiagnosticCode::DanglingNodeRef => "NodeID",
            _ => "ServiceID",
        };
        self.push(DiagnosticItem::new(
            task_id,
            code,
            format!("{} '{}' does not resolve", what, target),
        ));
    }

    /// Record a grouping key that names an unknown entity
    pub fn dangling_key(&mut self, owner: &str, code: DiagnosticCode, key: &str) {
        let (what, grouping) = match code {
            DiagnosticCode::DanglingGroupingNodeKey => ("node", "per-node task grouping of service"),
            _ => ("service", "per-service task grouping of node"),
        };
        self.push(
            DiagnosticItem::new(owner, code, format!("Grouping key '{}' names an unknown {}", key, what))
                .with_context(format!("{} {}", grouping, owner)),
        );
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|i| i.severity() == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Warning)
    }

    /// Items carrying a given code
    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(move |i| i.code == code)
    }

    pub fn all(&self) -> &[DiagnosticItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    /// Format all diagnostics for display
    pub fn format_all(&self) -> String {
        let mut output = String::new();

        for item in &self.items {
            output.push_str(&format!("{}\n", item));
        }

        if self.has_errors() {
            output.push_str(&format!(
                "\n{} error(s), {} warning(s)\n",
                self.error_count(),
                self.warning_count()
            ));
        } else if self.warning_count() > 0 {
            output.push_str(&format!("\n{} warning(s)\n", self.warning_count()));
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_all())
    }
}

impl IntoIterator for Diagnostics {
    type Item = DiagnosticItem;
    type IntoIter = std::vec::IntoIter<DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a DiagnosticItem;
    type IntoIter = std::slice::Iter<'a, DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_severity() {
        assert_eq!(DiagnosticCode::CollisionDetected.severity(), Severity::Info);
        assert_eq!(DiagnosticCode::DanglingNodeRef.severity(), Severity::Warning);
        assert_eq!(DiagnosticCode::PersistenceFailure.severity(), Severity::Error);
    }

    #[test]
    fn test_diagnostics_collection() {
        let mut diags = Diagnostics::new();
        diags.dangling("task-1", DiagnosticCode::DanglingServiceRef, "ghost");
        diags.report("fixtures.json", DiagnosticCode::PersistenceFailure, "rename failed");
        diags.report("x", DiagnosticCode::CollisionDetected, "renamed");

        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.warning_count(), 1);
        assert_eq!(diags.len(), 3);
        assert!(diags.has_errors());
        assert!(diags.format_all().contains("1 error(s), 1 warning(s)"));
    }

    #[test]
    fn test_dangling_key_context() {
        let mut diags = Diagnostics::new();
        diags.dangling_key("svc1", DiagnosticCode::DanglingGroupingNodeKey, "n9");
        let item = &diags.all()[0];
        assert_eq!(item.code.as_str(), "W004");
        assert!(item.message.contains("unknown node"));
        assert_eq!(item.context.len(), 1);
    }
}
