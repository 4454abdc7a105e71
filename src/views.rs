//! Denormalized views
//!
//! The flat task list is the only source of truth. The per-node grouping
//! (service ID -> tasks, on roster nodes), the per-service grouping
//! (node ID -> tasks, on `dashboardv.Services`) and the timeline are
//! projections of it:
//!
//! - `project_*` functions compute a projection from a task slice
//! - [`ViewBuilder::insert_task`] adds one task to the list and both groupings
//! - [`ViewBuilder::sync`] brings an existing document back in line
//!
//! The timeline is always regenerated whole, never patched.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::model::{FixtureDocument, Node, ServiceSummary, Task, TaskGrouping, TaskRef, TimelineEntry};

/// Grouping key for tasks with no node
pub const UNASSIGNED: &str = "unassigned";

// =============================================================================
// Projections
// =============================================================================

/// Timeline record for one task
pub fn timeline_entry(task: &Task) -> TimelineEntry {
    let created = task
        .extra_str("CreatedTimestamp")
        .or_else(|| task.extra_str("createdTimestamp"))
        .or(task.created_at.as_deref())
        .or(task.timestamp.as_deref())
        .unwrap_or_default();

    let stopped = task
        .extra_str("StoppedTimestamp")
        .or_else(|| task.extra_str("StoppedAt"))
        .or_else(|| match task.state.as_deref() {
            Some(state) if !state.is_empty() && state != "running" => {
                task.updated_at.as_deref().or(task.timestamp.as_deref())
            }
            _ => None,
        })
        .unwrap_or_default();

    let service_id = task.service_id.as_deref().unwrap_or_default();
    let service_name = task
        .service_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(service_id);

    TimelineEntry {
        id: task.id.clone(),
        created_timestamp: created.to_string(),
        stopped_timestamp: stopped.to_string(),
        state: task.current_state().unwrap_or_default().to_string(),
        desired_state: task.desired_state.clone().unwrap_or_default(),
        slot: task.slot.unwrap_or(0),
        service_name: service_name.to_string(),
        service_id: service_id.to_string(),
        stack: task.stack.clone().unwrap_or_default(),
    }
}

/// One timeline entry per task, in task order
pub fn project_timeline(tasks: &[Task]) -> Vec<TimelineEntry> {
    tasks.iter().map(timeline_entry).collect()
}

/// Per-node projection of the task list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeGroupings {
    /// Node ID -> service ID -> task references
    pub by_node: BTreeMap<String, TaskGrouping>,
    /// Tasks with no NodeID
    pub unassigned: Vec<TaskRef>,
}

/// Group tasks by node, then by service. Tasks without a ServiceID are left out.
pub fn project_node_groupings(tasks: &[Task]) -> NodeGroupings {
    let mut groupings = NodeGroupings::default();
    for task in tasks {
        let Some(service_id) = task.service_id.as_deref() else {
            continue;
        };
        match task.node_id.as_deref() {
            Some(node_id) => groupings
                .by_node
                .entry(node_id.to_string())
                .or_default()
                .entry(service_id.to_string())
                .or_default()
                .push(TaskRef::from(task)),
            None => groupings.unassigned.push(unassigned_ref(task)),
        }
    }
    groupings
}

/// Group tasks by service, then by node (or [`UNASSIGNED`])
pub fn project_service_groupings(tasks: &[Task]) -> BTreeMap<String, TaskGrouping> {
    let mut groupings: BTreeMap<String, TaskGrouping> = BTreeMap::new();
    for task in tasks {
        let Some(service_id) = task.service_id.as_deref() else {
            continue;
        };
        groupings
            .entry(service_id.to_string())
            .or_default()
            .entry(node_key(task).to_string())
            .or_default()
            .push(TaskRef::from(task));
    }
    groupings
}

fn node_key(task: &Task) -> &str {
    task.node_id.as_deref().unwrap_or(UNASSIGNED)
}

/// Unassigned references also carry the service name
fn unassigned_ref(task: &Task) -> TaskRef {
    TaskRef {
        service_name: task.service_name.clone(),
        ..TaskRef::from(task)
    }
}

// =============================================================================
// View Builder
// =============================================================================

/// Counters from [`ViewBuilder::sync`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewStats {
    /// Tasks found only in a grouping and added to the flat list
    pub backfilled: usize,
    pub node_refs_added: usize,
    pub service_refs_added: usize,
    pub unassigned_refs_added: usize,
    /// References dropped because their task moved or left the list
    pub stale_refs_removed: usize,
    pub timeline_entries: usize,
}

/// Keeps the groupings and the timeline in line with the flat task list.
///
/// Per-node groupings live on roster nodes and on any other node record
/// that already carries a `Tasks` map. Per-service groupings live on
/// `dashboardv.Services` and on any `services` or `dashboardh.Services`
/// entry that already carries one.
pub struct ViewBuilder;

impl ViewBuilder {
    /// Append a task to the flat list and file its reference in every
    /// grouping holder. The timeline is left for [`Self::regenerate_timeline`].
    pub fn insert_task(doc: &mut FixtureDocument, task: Task) {
        if let Some(service_id) = task.service_id.as_deref() {
            match task.node_id.as_deref() {
                Some(node_id) => {
                    for (nodes, roster) in node_holders(doc) {
                        for node in nodes.iter_mut().filter(|n| n.id == node_id) {
                            file_ref(&mut node.tasks, service_id, TaskRef::from(&task), roster);
                        }
                    }
                }
                None => doc.dashboardh.unassigned_tasks.push(unassigned_ref(&task)),
            }

            let key = node_key(&task);
            for service in doc.services.iter_mut().filter(|s| s.id == service_id) {
                file_ref(&mut service.tasks, key, TaskRef::from(&task), false);
            }
            for (summaries, create) in summary_holders(doc) {
                for summary in summaries.iter_mut().filter(|s| s.id == service_id) {
                    file_ref(&mut summary.tasks, key, TaskRef::from(&task), create);
                }
            }
        }

        doc.tasks.push(task);
    }

    /// Recompute the timeline from the flat task list. Returns its length.
    pub fn regenerate_timeline(doc: &mut FixtureDocument) -> usize {
        doc.timeline = project_timeline(&doc.tasks);
        doc.timeline.len()
    }

    /// Repair an existing document's views:
    /// 1. tasks present only in a grouping are backfilled into the flat list
    ///    (first occurrence wins)
    /// 2. every grouping is replaced by its projection; surviving references
    ///    keep their untyped fields
    /// 3. the timeline is regenerated
    pub fn sync(doc: &mut FixtureDocument, diagnostics: &mut Diagnostics) -> ViewStats {
        let mut stats = ViewStats {
            backfilled: Self::backfill(doc, diagnostics),
            ..Default::default()
        };

        let mut by_node = project_node_groupings(&doc.tasks);
        let by_service = project_service_groupings(&doc.tasks);

        for (nodes, roster) in node_holders(doc) {
            for node in nodes.iter_mut() {
                let changes = replace_grouping(&mut node.tasks, by_node.by_node.get(&node.id), roster);
                stats.node_refs_added += changes.added;
                stats.stale_refs_removed += changes.removed;
            }
        }

        let mut unassigned = TaskGrouping::new();
        let old = std::mem::take(&mut doc.dashboardh.unassigned_tasks);
        if !old.is_empty() {
            unassigned.insert(UNASSIGNED.to_string(), old);
        }
        let projected = std::mem::take(&mut by_node.unassigned);
        let projected: TaskGrouping = [(UNASSIGNED.to_string(), projected)].into_iter().collect();
        let mut slot = Some(unassigned);
        let changes = replace_grouping(&mut slot, Some(&projected), true);
        stats.unassigned_refs_added += changes.added;
        stats.stale_refs_removed += changes.removed;
        doc.dashboardh.unassigned_tasks = slot
            .and_then(|mut grouping| grouping.remove(UNASSIGNED))
            .unwrap_or_default();

        for service in &mut doc.services {
            let changes = replace_grouping(&mut service.tasks, by_service.get(&service.id), false);
            stats.service_refs_added += changes.added;
            stats.stale_refs_removed += changes.removed;
        }
        for (summaries, create) in summary_holders(doc) {
            for summary in summaries.iter_mut() {
                let changes = replace_grouping(&mut summary.tasks, by_service.get(&summary.id), create);
                stats.service_refs_added += changes.added;
                stats.stale_refs_removed += changes.removed;
            }
        }

        stats.timeline_entries = Self::regenerate_timeline(doc);
        debug!(?stats, "Synchronized views");
        stats
    }

    /// Add tasks that appear only in a grouping to the flat list, rebuilt
    /// from the reference and the grouping's key. Returns how many were added.
    pub fn backfill(doc: &mut FixtureDocument, diagnostics: &mut Diagnostics) -> usize {
        let mut known: HashSet<String> = doc.tasks.iter().map(|t| t.id.clone()).collect();
        let mut found = Vec::new();

        let nodes = doc.nodes.iter().chain(&doc.dashboardh.nodes).chain(&doc.dashboardv.nodes);
        for node in nodes {
            for (service_id, refs) in node.tasks.iter().flatten() {
                let service_hint = Some(service_id.as_str()).filter(|k| *k != UNASSIGNED);
                for task_ref in refs {
                    found.push(Task::from_ref(task_ref, service_hint, Some(node.id.as_str())));
                }
            }
        }
        for task_ref in &doc.dashboardh.unassigned_tasks {
            found.push(Task::from_ref(task_ref, None, None));
        }

        let services = doc.services.iter().map(|s| (&s.id, &s.tasks));
        let summaries = doc
            .dashboardh
            .services
            .iter()
            .chain(&doc.dashboardv.services)
            .map(|s| (&s.id, &s.tasks));
        for (service_id, grouping) in services.chain(summaries) {
            for (node_id, refs) in grouping.iter().flatten() {
                let node_hint = Some(node_id.as_str()).filter(|k| *k != UNASSIGNED);
                for task_ref in refs {
                    found.push(Task::from_ref(task_ref, Some(service_id.as_str()), node_hint));
                }
            }
        }

        let mut count = 0;
        for task in found {
            if task.id.is_empty() || !known.insert(task.id.clone()) {
                continue;
            }
            warn!(task = %task.id, "Task present only in a grouping; adding to task list");
            diagnostics.report(
                task.id.as_str(),
                DiagnosticCode::TaskBackfilled,
                "Task found only in a grouping was added to the task list",
            );
            doc.tasks.push(task);
            count += 1;
        }
        count
    }
}

/// Node listings paired with whether they are the roster. Only the roster
/// gains a grouping it did not have.
fn node_holders(doc: &mut FixtureDocument) -> [(&mut Vec<Node>, bool); 3] {
    let horizontal = !doc.dashboardh.nodes.is_empty();
    [
        (&mut doc.nodes, !horizontal),
        (&mut doc.dashboardh.nodes, horizontal),
        (&mut doc.dashboardv.nodes, false),
    ]
}

/// Dashboard service listings paired with whether they gain new groupings
fn summary_holders(doc: &mut FixtureDocument) -> [(&mut Vec<ServiceSummary>, bool); 2] {
    [
        (&mut doc.dashboardh.services, false),
        (&mut doc.dashboardv.services, true),
    ]
}

fn file_ref(slot: &mut Option<TaskGrouping>, key: &str, task_ref: TaskRef, create: bool) {
    if slot.is_none() && !create {
        return;
    }
    slot.get_or_insert_with(BTreeMap::new)
        .entry(key.to_string())
        .or_default()
        .push(task_ref);
}

#[derive(Debug, Clone, Copy, Default)]
struct RefChanges {
    added: usize,
    removed: usize,
}

/// Replace a holder's grouping with its projection. A holder without a
/// grouping only gains one when `create` is set and there is something to
/// file. References that survive keep the untyped fields of the old copy.
fn replace_grouping(slot: &mut Option<TaskGrouping>, projected: Option<&TaskGrouping>, create: bool) -> RefChanges {
    let projected = projected.filter(|p| p.values().any(|refs| !refs.is_empty()));
    let old = match slot.take() {
        Some(old) => old,
        None if create && projected.is_some() => TaskGrouping::new(),
        None => return RefChanges::default(),
    };

    let mut previous: HashMap<&str, &TaskRef> = HashMap::new();
    let mut old_pairs: HashSet<(&str, &str)> = HashSet::new();
    for (key, refs) in &old {
        for task_ref in refs {
            previous.entry(task_ref.id.as_str()).or_insert(task_ref);
            old_pairs.insert((key.as_str(), task_ref.id.as_str()));
        }
    }

    let mut next = projected.cloned().unwrap_or_default();
    let mut changes = RefChanges::default();
    let mut kept: HashSet<(String, String)> = HashSet::new();
    for (key, refs) in next.iter_mut() {
        for task_ref in refs.iter_mut() {
            if let Some(prev) = previous.get(task_ref.id.as_str()) {
                task_ref.extra = prev.extra.clone();
            }
            if !old_pairs.contains(&(key.as_str(), task_ref.id.as_str())) {
                changes.added += 1;
            } else {
                kept.insert((key.clone(), task_ref.id.clone()));
            }
        }
    }
    changes.removed = old_pairs.len().saturating_sub(kept.len());

    *slot = Some(next);
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(id: &str, service: &str, node: Option<&str>, state: &str) -> Task {
        Task {
            id: id.into(),
            service_id: Some(service.into()),
            node_id: node.map(Into::into),
            state: Some(state.into()),
            updated_at: Some("2024-01-01T00:05:00.000Z".into()),
            created_at: Some("2024-01-01T00:00:00.000Z".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_timeline_fallbacks() {
        let running = timeline_entry(&task("t1", "svc", None, "running"));
        assert_eq!(running.stopped_timestamp, "");
        assert_eq!(running.service_name, "svc");
        assert_eq!(running.created_timestamp, "2024-01-01T00:00:00.000Z");

        let failed = timeline_entry(&task("t2", "svc", None, "failed"));
        assert_eq!(failed.stopped_timestamp, "2024-01-01T00:05:00.000Z");

        let mut explicit = task("t3", "svc", None, "failed");
        explicit.extra.insert("StoppedAt".into(), json!("2024-02-02T00:00:00.000Z"));
        assert_eq!(timeline_entry(&explicit).stopped_timestamp, "2024-02-02T00:00:00.000Z");
    }

    #[test]
    fn test_projections() {
        let tasks = vec![
            task("t1", "s1", Some("n1"), "running"),
            task("t2", "s1", None, "pending"),
            task("t3", "s2", Some("n1"), "running"),
        ];
        let by_node = project_node_groupings(&tasks);
        assert_eq!(by_node.by_node["n1"].len(), 2);
        assert_eq!(by_node.unassigned.len(), 1);

        let by_service = project_service_groupings(&tasks);
        assert_eq!(by_service["s1"][UNASSIGNED][0].id, "t2");
        assert_eq!(by_service["s1"]["n1"][0].id, "t1");
    }

    #[test]
    fn test_insert_task_fills_both_groupings() {
        let mut doc: FixtureDocument = serde_json::from_value(json!({
            "dashboardh": {"Services": [], "Nodes": [{"ID": "n1"}]},
            "dashboardv": {"Services": [{"ID": "s1"}], "Nodes": []}
        }))
        .unwrap();

        ViewBuilder::insert_task(&mut doc, task("t1", "s1", Some("n1"), "running"));
        ViewBuilder::insert_task(&mut doc, task("t2", "s1", None, "pending"));

        assert_eq!(doc.tasks.len(), 2);
        let node_grouping = doc.dashboardh.nodes[0].tasks.as_ref().unwrap();
        assert_eq!(node_grouping["s1"][0].id, "t1");
        assert_eq!(doc.dashboardh.unassigned_tasks[0].id, "t2");
        let service_grouping = doc.dashboardv.services[0].tasks.as_ref().unwrap();
        assert_eq!(service_grouping["n1"][0].id, "t1");
        assert_eq!(service_grouping[UNASSIGNED][0].id, "t2");
    }

    #[test]
    fn test_sync_backfills_and_files() {
        let mut doc: FixtureDocument = serde_json::from_value(json!({
            "nodes": [{"ID": "n1", "Tasks": {"s1": [{"ID": "orphan", "Status": {"State": "running"}}]}}],
            "dashboardv": {"Services": [{"ID": "s1"}], "Nodes": []},
            "tasks": [{"ID": "t1", "ServiceID": "s1", "NodeID": "n1", "State": "running"}]
        }))
        .unwrap();
        let mut diags = Diagnostics::new();

        let stats = ViewBuilder::sync(&mut doc, &mut diags);
        assert_eq!(stats.backfilled, 1);
        assert_eq!(doc.tasks.len(), 2);
        assert_eq!(doc.tasks[1].service_id.as_deref(), Some("s1"));
        assert_eq!(doc.tasks[1].node_id.as_deref(), Some("n1"));
        assert_eq!(stats.node_refs_added, 1);
        assert_eq!(stats.service_refs_added, 2);
        assert_eq!(stats.timeline_entries, 2);
        assert_eq!(diags.len(), 1);

        let again = ViewBuilder::sync(&mut doc, &mut diags);
        assert_eq!(again.backfilled + again.node_refs_added + again.service_refs_added, 0);
    }
    fn ids(refs: &[TaskRef]) -> Vec<&str> {
        refs.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_sync_covers_every_grouping_holder() {
        let mut doc: FixtureDocument = serde_json::from_value(json!({
            "nodes": [{"ID": "n1", "Tasks": {"s1": [{"ID": "orphan"}]}}],
            "services": [{"ID": "s1", "Tasks": {"n1": [{"ID": "orphan2"}]}}],
            "dashboardh": {"Services": [], "Nodes": [{"ID": "n1"}]},
            "dashboardv": {"Services": [{"ID": "s1"}], "Nodes": []},
            "tasks": [{"ID": "t1", "ServiceID": "s1", "NodeID": "n1", "State": "running"}]
        }))
        .unwrap();
        let mut diags = Diagnostics::new();

        let stats = ViewBuilder::sync(&mut doc, &mut diags);
        assert_eq!(stats.backfilled, 2);
        let flat: Vec<&str> = doc.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(flat, ["t1", "orphan", "orphan2"]);

        let expected = ["t1", "orphan", "orphan2"];
        assert_eq!(ids(&doc.nodes[0].tasks.as_ref().unwrap()["s1"]), expected);
        assert_eq!(ids(&doc.dashboardh.nodes[0].tasks.as_ref().unwrap()["s1"]), expected);
        assert_eq!(ids(&doc.services[0].tasks.as_ref().unwrap()["n1"]), expected);
        assert_eq!(ids(&doc.dashboardv.services[0].tasks.as_ref().unwrap()["n1"]), expected);
        assert_eq!(stats.timeline_entries, 3);
    }

    #[test]
    fn test_insert_task_files_into_existing_groupings() {
        let mut doc: FixtureDocument = serde_json::from_value(json!({
            "nodes": [{"ID": "n1", "Tasks": {}}, {"ID": "n2"}],
            "services": [{"ID": "s1", "Tasks": {}}, {"ID": "s2"}],
            "dashboardh": {"Services": [], "Nodes": [{"ID": "n1"}]},
            "dashboardv": {"Services": [{"ID": "s1"}], "Nodes": []}
        }))
        .unwrap();

        ViewBuilder::insert_task(&mut doc, task("t1", "s1", Some("n1"), "running"));

        assert_eq!(ids(&doc.nodes[0].tasks.as_ref().unwrap()["s1"]), ["t1"]);
        assert_eq!(ids(&doc.dashboardh.nodes[0].tasks.as_ref().unwrap()["s1"]), ["t1"]);
        assert_eq!(ids(&doc.services[0].tasks.as_ref().unwrap()["n1"]), ["t1"]);
        assert!(doc.nodes[1].tasks.is_none());
        assert!(doc.services[1].tasks.is_none());
    }

    #[test]
    fn test_sync_moves_task_between_nodes() {
        let mut doc: FixtureDocument = serde_json::from_value(json!({
            "nodes": [
                {"ID": "n1", "Tasks": {"s1": [{"ID": "t1", "NodeID": "n1"}]}},
                {"ID": "n2"}
            ],
            "dashboardv": {"Services": [
                {"ID": "s1", "Tasks": {"n1": [{"ID": "t1", "NodeID": "n1", "Pinned": true}]}}
            ], "Nodes": []},
            "tasks": [{"ID": "t1", "ServiceID": "s1", "NodeID": "n2", "State": "running"}]
        }))
        .unwrap();
        let mut diags = Diagnostics::new();

        let stats = ViewBuilder::sync(&mut doc, &mut diags);
        assert_eq!(stats.backfilled, 0);
        assert!(doc.nodes[0].tasks.as_ref().unwrap().is_empty());
        assert_eq!(ids(&doc.nodes[1].tasks.as_ref().unwrap()["s1"]), ["t1"]);

        let grouping = doc.dashboardv.services[0].tasks.as_ref().unwrap();
        let keys: Vec<&str> = grouping.keys().map(String::as_str).collect();
        assert_eq!(keys, ["n2"]);
        assert_eq!(grouping["n2"][0].node_id.as_deref(), Some("n2"));
        assert_eq!(grouping["n2"][0].extra["Pinned"], true);

        assert_eq!(stats.node_refs_added, 1);
        assert_eq!(stats.service_refs_added, 1);
        assert_eq!(stats.stale_refs_removed, 2);
    }

    #[test]
    fn test_sync_drops_unassigned_ref_once_placed() {
        let mut doc: FixtureDocument = serde_json::from_value(json!({
            "nodes": [{"ID": "n1"}],
            "dashboardh": {"Services": [], "Nodes": [], "UnassignedTasks": [{"ID": "t1"}]},
            "tasks": [{"ID": "t1", "ServiceID": "s1", "NodeID": "n1"}]
        }))
        .unwrap();
        let stats = ViewBuilder::sync(&mut doc, &mut Diagnostics::new());

        assert!(doc.dashboardh.unassigned_tasks.is_empty());
        assert_eq!(stats.stale_refs_removed, 1);
        assert_eq!(ids(&doc.nodes[0].tasks.as_ref().unwrap()["s1"]), ["t1"]);
    }
}
