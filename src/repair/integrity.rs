//! Referential Integrity Fixer
//!
//! Renames node IDs that collide with service IDs, rewriting every node-ID
//! position the document has, then re-validates task and grouping
//! references. Tasks known only from a grouping join the flat list first so
//! they are validated too. Unresolvable references are reported, never removed.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::RepairConfig;
use crate::diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics};
use crate::index::{NodeListing, Role};
use crate::model::{Extra, FixtureDocument, Service};
use crate::store::EntityStore;
use crate::views::{ViewBuilder, UNASSIGNED};
use crate::visit::{walk_mut, DocumentVisitor, NodeIdSite};

/// A node ID that was also a service ID, and the node's new ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    pub old_id: String,
    pub new_id: String,
}

/// Where a rename was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum UpdateKind {
    #[serde(rename = "node-id")]
    NodeId,
    #[serde(rename = "dashboardh.node")]
    DashboardhNode,
    #[serde(rename = "dashboardv.node")]
    DashboardvNode,
    #[serde(rename = "tasks.nodeid")]
    TasksNodeId,
    #[serde(rename = "grouping.nodeid")]
    GroupingNodeId,
    #[serde(rename = "grouping.key")]
    GroupingKey,
    #[serde(rename = "other.nodeid.refs")]
    OtherNodeIdRefs,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeId => "node-id",
            Self::DashboardhNode => "dashboardh.node",
            Self::DashboardvNode => "dashboardv.node",
            Self::TasksNodeId => "tasks.nodeid",
            Self::GroupingNodeId => "grouping.nodeid",
            Self::GroupingKey => "grouping.key",
            Self::OtherNodeIdRefs => "other.nodeid.refs",
        }
    }

    fn for_site(site: NodeIdSite) -> Self {
        match site {
            NodeIdSite::NodeRecord(NodeListing::Primary) => Self::NodeId,
            NodeIdSite::NodeRecord(NodeListing::Horizontal) => Self::DashboardhNode,
            NodeIdSite::NodeRecord(NodeListing::Vertical) => Self::DashboardvNode,
            NodeIdSite::TaskNodeId => Self::TasksNodeId,
            NodeIdSite::GroupingEntry | NodeIdSite::UnassignedEntry => Self::GroupingNodeId,
            NodeIdSite::ServiceGroupingKey => Self::GroupingKey,
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rewrites of one kind for one collision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Update {
    pub kind: UpdateKind,
    pub from: String,
    pub to: String,
    pub count: usize,
}

/// Outcome of [`ReferentialIntegrityFixer::repair`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairReport {
    pub collisions: Vec<Collision>,
    pub updated: Vec<Update>,
    /// Service IDs that received a stub record
    pub stubs: Vec<String>,
    /// Tasks found only in a grouping and added to the task list
    pub backfilled: usize,
    pub diagnostics: Diagnostics,
}

impl RepairReport {
    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.diagnostics.warnings()
    }

    /// Total number of rewritten positions
    pub fn rewrite_count(&self) -> usize {
        self.updated.iter().map(|u| u.count).sum()
    }
}

/// Detects and repairs node/service ID collisions
pub struct ReferentialIntegrityFixer<'a> {
    config: &'a RepairConfig,
}

impl<'a> ReferentialIntegrityFixer<'a> {
    pub fn new(config: &'a RepairConfig) -> Self {
        Self { config }
    }

    pub fn repair(&self, store: &mut EntityStore) -> RepairReport {
        let mut diagnostics = Diagnostics::new();
        let backfilled = ViewBuilder::backfill(store.document_mut(), &mut diagnostics);
        if backfilled > 0 {
            store.reindex();
        }
        let mut report = RepairReport {
            backfilled,
            diagnostics,
            ..Default::default()
        };

        if self.config.backfill_service_stubs {
            report.stubs = backfill_stubs(store, &mut report.diagnostics);
        }

        let renames = plan_renames(store);
        if !renames.is_empty() {
            let mut visitor = RenameVisitor {
                renames: renames.iter().cloned().collect(),
                counts: BTreeMap::new(),
                rewrite_extra: self.config.rewrite_unknown_fields,
            };
            walk_mut(store.document_mut(), &mut visitor);
            store.reindex();

            for (old_id, new_id) in &renames {
                info!(from = %old_id, to = %new_id, "Renamed node colliding with a service");
                report.diagnostics.push(
                    DiagnosticItem::new(
                        old_id.as_str(),
                        DiagnosticCode::CollisionDetected,
                        format!("Node ID '{}' is also a service ID; node renamed to '{}'", old_id, new_id),
                    )
                    .with_context(format!("{} node-ID position(s) rewritten", visitor.total_for(old_id))),
                );
                report.collisions.push(Collision {
                    old_id: old_id.clone(),
                    new_id: new_id.clone(),
                });
            }
            for ((old_id, kind), count) in &visitor.counts {
                if let Some(new_id) = visitor.renames.get(old_id) {
                    report.updated.push(Update {
                        kind: *kind,
                        from: old_id.clone(),
                        to: new_id.clone(),
                        count: *count,
                    });
                }
            }
            // collision order, then kind order
            let order: HashMap<&str, usize> = renames.iter().enumerate().map(|(i, (old, _))| (old.as_str(), i)).collect();
            report.updated.sort_by_key(|u| (order.get(u.from.as_str()).copied(), u.kind));
        }

        validate(store.document(), store, &mut report.diagnostics);

        info!(
            collisions = report.collisions.len(),
            stubs = report.stubs.len(),
            backfilled = report.backfilled,
            warnings = report.diagnostics.warning_count(),
            "Repair pass complete"
        );
        report
    }
}

// =============================================================================
// Stub backfill
// =============================================================================

/// Give every service known only from a listing a minimal record
fn backfill_stubs(store: &mut EntityStore, diagnostics: &mut Diagnostics) -> Vec<String> {
    let missing: Vec<String> = store
        .index()
        .known_ids(Role::Service)
        .iter()
        .filter(|id| !store.contains(Role::Service, id))
        .cloned()
        .collect();
    if missing.is_empty() {
        return missing;
    }

    let stubs: Vec<Service> = missing
        .iter()
        .map(|id| {
            let (name, stack) = listing_details(store.document(), id);
            Service::stub(id.as_str(), name, stack)
        })
        .collect();

    for stub in stubs {
        warn!(service = %stub.id, "Service known only from a listing; adding stub record");
        diagnostics.report(
            stub.id.as_str(),
            DiagnosticCode::ServiceStubBackfilled,
            "Service listed but missing from services; stub record added",
        );
        store.document_mut().services.push(stub);
    }
    store.reindex();
    missing
}

/// Name and stack of a service from the first listing that mentions it
fn listing_details(doc: &FixtureDocument, id: &str) -> (Option<String>, Option<String>) {
    let mut name = None;
    let mut stack = None;

    for summary in doc.dashboardh.services.iter().chain(&doc.dashboardv.services) {
        if summary.id == id {
            name = name.or_else(|| summary.name.clone());
            stack = stack.or_else(|| summary.stack.clone());
        }
    }
    for entry in &doc.log_services {
        if entry.id == id {
            name = name.or_else(|| entry.name.clone());
        }
    }
    for entry in &doc.stacks {
        for svc in entry.services.iter().filter(|s| s.id == id) {
            name = name.or_else(|| svc.service_name.clone());
            stack = stack.or_else(|| Some(entry.name.clone()));
        }
    }
    (name, stack)
}

// =============================================================================
// Collision renames
// =============================================================================

/// `(old, new)` node IDs in first-seen node order
fn plan_renames(store: &EntityStore) -> Vec<(String, String)> {
    let doc = store.document();
    let index = store.index();

    let mut service_ids: HashSet<&str> = index.known_ids(Role::Service).iter().map(String::as_str).collect();
    // Per-node groupings are keyed by service ID
    for node in doc.nodes.iter().chain(&doc.dashboardh.nodes).chain(&doc.dashboardv.nodes) {
        for key in node.tasks.iter().flat_map(|g| g.keys()) {
            if key != UNASSIGNED {
                service_ids.insert(key.as_str());
            }
        }
    }

    let mut taken: HashSet<String> = service_ids.iter().map(|s| s.to_string()).collect();
    taken.extend(index.known_ids(Role::Node).iter().cloned());

    let mut renames = Vec::new();
    for old_id in index.known_ids(Role::Node) {
        if !service_ids.contains(old_id.as_str()) {
            continue;
        }
        let mut new_id = format!("node-{old_id}");
        let mut suffix = 1;
        while taken.contains(&new_id) {
            new_id = format!("node-{old_id}-{suffix}");
            suffix += 1;
        }
        debug!(from = %old_id, to = %new_id, "Planned node rename");
        taken.insert(new_id.clone());
        renames.push((old_id.clone(), new_id));
    }
    renames
}

struct RenameVisitor {
    renames: HashMap<String, String>,
    counts: BTreeMap<(String, UpdateKind), usize>,
    rewrite_extra: bool,
}

impl RenameVisitor {
    fn bump(&mut self, old_id: &str, kind: UpdateKind) {
        *self.counts.entry((old_id.to_string(), kind)).or_default() += 1;
    }

    fn total_for(&self, old_id: &str) -> usize {
        self.counts
            .iter()
            .filter(|((id, _), _)| id == old_id)
            .map(|(_, count)| count)
            .sum()
    }

    /// Untyped data: `NodeID` fields anywhere, and `ID` fields of objects
    /// inside a `Nodes` array
    fn rewrite_map(&mut self, map: &mut Extra, node_record: bool) {
        for (key, child) in map.iter_mut() {
            if key == "NodeID" || (node_record && key == "ID") {
                if let Value::String(id) = child {
                    if let Some(new_id) = self.renames.get(id.as_str()).cloned() {
                        let old_id = std::mem::replace(id, new_id);
                        self.bump(&old_id, UpdateKind::OtherNodeIdRefs);
                    }
                    continue;
                }
            }
            self.rewrite_value(child, key == "Nodes");
        }
    }

    fn rewrite_value(&mut self, value: &mut Value, nodes_array: bool) {
        match value {
            Value::Object(map) => self.rewrite_map(map, false),
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::Object(map) => self.rewrite_map(map, nodes_array),
                        other => self.rewrite_value(other, false),
                    }
                }
            }
            _ => {}
        }
    }
}

impl DocumentVisitor for RenameVisitor {
    fn visit_node_id(&mut self, site: NodeIdSite, id: &mut String) {
        if let Some(new_id) = self.renames.get(id.as_str()).cloned() {
            let old_id = std::mem::replace(id, new_id);
            self.bump(&old_id, UpdateKind::for_site(site));
        }
    }

    fn visit_extra(&mut self, extra: &mut Extra) {
        if self.rewrite_extra {
            self.rewrite_map(extra, false);
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

fn validate(doc: &FixtureDocument, store: &EntityStore, diagnostics: &mut Diagnostics) {
    for id in store.index().duplicates(Role::Node) {
        diagnostics.report(id.as_str(), DiagnosticCode::DuplicateNodeId, format!("Node ID '{}' is listed more than once", id));
    }
    for id in store.index().duplicates(Role::Service) {
        diagnostics.report(
            id.as_str(),
            DiagnosticCode::DuplicateServiceId,
            format!("Service ID '{}' is listed more than once", id),
        );
    }

    for task in &doc.tasks {
        match task.service_id.as_deref().filter(|s| !s.is_empty()) {
            Some(service_id) if !store.contains(Role::Service, service_id) => {
                warn!(task = %task.id, service = %service_id, "Dangling ServiceID");
                diagnostics.dangling(&task.id, DiagnosticCode::DanglingServiceRef, service_id);
            }
            Some(_) => {}
            None => {
                warn!(task = %task.id, "Task has no ServiceID");
                diagnostics.report(task.id.as_str(), DiagnosticCode::DanglingServiceRef, "Task has no ServiceID");
            }
        }
        if let Some(node_id) = task.node_id.as_deref().filter(|n| !n.is_empty()) {
            if !store.contains(Role::Node, node_id) {
                warn!(task = %task.id, node = %node_id, "Dangling NodeID");
                diagnostics.dangling(&task.id, DiagnosticCode::DanglingNodeRef, node_id);
            }
        }
    }

    for node in doc.nodes.iter().chain(&doc.dashboardh.nodes).chain(&doc.dashboardv.nodes) {
        for key in node.tasks.iter().flat_map(|g| g.keys()) {
            if key != UNASSIGNED && !store.contains(Role::Service, key) {
                diagnostics.dangling_key(&node.id, DiagnosticCode::DanglingGroupingServiceKey, key);
            }
        }
    }

    let service_groupings = doc
        .services
        .iter()
        .map(|s| (&s.id, &s.tasks))
        .chain(doc.dashboardh.services.iter().map(|s| (&s.id, &s.tasks)))
        .chain(doc.dashboardv.services.iter().map(|s| (&s.id, &s.tasks)));
    for (service_id, grouping) in service_groupings {
        for key in grouping.iter().flat_map(|g| g.keys()) {
            if key != UNASSIGNED && !store.contains(Role::Node, key) {
                diagnostics.dangling_key(service_id, DiagnosticCode::DanglingGroupingNodeKey, key);
            }
        }
    }
}
