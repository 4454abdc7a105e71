//! Typed document traversal
//!
//! [`walk_mut`] enumerates every position in a [`FixtureDocument`] that can
//! hold a node ID, every flat task record, and every untyped `extra` map.
//! Repair passes implement [`DocumentVisitor`] instead of searching the
//! document for field names.

use crate::index::NodeListing;
use crate::model::{
    Endpoint, Extra, FixtureDocument, Node, PortSpec, Service, ServiceSummary, Task, TaskGrouping, TaskRef,
};

/// Kind of position a node ID was found at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeIdSite {
    /// `ID` of a node record in one of the node listings
    NodeRecord(NodeListing),
    /// `NodeID` of a flat task
    TaskNodeId,
    /// `NodeID` of a task reference filed in a grouping
    GroupingEntry,
    /// `NodeID` of a task reference in `dashboardh.UnassignedTasks`
    UnassignedEntry,
    /// Key of a per-service grouping (node ID -> tasks)
    ServiceGroupingKey,
}

/// Callbacks for [`walk_mut`]. All methods default to doing nothing.
pub trait DocumentVisitor {
    /// A node ID. Changing `id` rewrites it in place; for grouping keys the
    /// bucket is moved (and merged if the new key already exists).
    fn visit_node_id(&mut self, _site: NodeIdSite, _id: &mut String) {}

    /// A record of the flat task list, in document order
    fn visit_task(&mut self, _task: &mut Task) {}

    /// Fields of some entity that the model does not type
    fn visit_extra(&mut self, _extra: &mut Extra) {}
}

/// Walk the document in a fixed order: node listings, services, dashboard
/// service listings, unassigned tasks, flat tasks, then the remaining
/// collections (extra maps only).
pub fn walk_mut<V: DocumentVisitor + ?Sized>(doc: &mut FixtureDocument, visitor: &mut V) {
    walk_nodes(&mut doc.nodes, NodeListing::Primary, visitor);
    walk_nodes(&mut doc.dashboardh.nodes, NodeListing::Horizontal, visitor);
    walk_nodes(&mut doc.dashboardv.nodes, NodeListing::Vertical, visitor);

    for service in &mut doc.services {
        walk_service(service, visitor);
    }
    for summary in doc.dashboardh.services.iter_mut().chain(doc.dashboardv.services.iter_mut()) {
        walk_summary(summary, visitor);
    }

    for task_ref in &mut doc.dashboardh.unassigned_tasks {
        walk_task_ref(task_ref, NodeIdSite::UnassignedEntry, visitor);
    }

    for task in &mut doc.tasks {
        visitor.visit_task(task);
        if let Some(node_id) = task.node_id.as_mut() {
            visitor.visit_node_id(NodeIdSite::TaskNodeId, node_id);
        }
        if let Some(status) = task.status.as_mut() {
            visitor.visit_extra(&mut status.extra);
        }
        visitor.visit_extra(&mut task.extra);
    }

    for stack in &mut doc.stacks {
        for svc in &mut stack.services {
            visitor.visit_extra(&mut svc.extra);
        }
        visitor.visit_extra(&mut stack.extra);
    }
    for entry in &mut doc.log_services {
        visitor.visit_extra(&mut entry.extra);
    }
    for port in &mut doc.ports {
        visitor.visit_extra(&mut port.extra);
    }

    visitor.visit_extra(&mut doc.dashboardh.extra);
    visitor.visit_extra(&mut doc.dashboardv.extra);
    visitor.visit_extra(&mut doc.extra);
}

fn walk_nodes<V: DocumentVisitor + ?Sized>(nodes: &mut [Node], listing: NodeListing, visitor: &mut V) {
    for node in nodes {
        visitor.visit_node_id(NodeIdSite::NodeRecord(listing), &mut node.id);
        // Per-node groupings are keyed by service ID; only the entries carry node IDs
        if let Some(grouping) = node.tasks.as_mut() {
            for task_ref in grouping.values_mut().flatten() {
                walk_task_ref(task_ref, NodeIdSite::GroupingEntry, visitor);
            }
        }
        visitor.visit_extra(&mut node.extra);
    }
}

fn walk_service<V: DocumentVisitor + ?Sized>(service: &mut Service, visitor: &mut V) {
    if let Some(grouping) = service.tasks.as_mut() {
        walk_service_grouping(grouping, visitor);
    }
    if let Some(spec) = service.spec.as_mut() {
        visitor.visit_extra(&mut spec.extra);
    }
    if let Some(endpoint) = service.endpoint.as_mut() {
        walk_endpoint(endpoint, visitor);
    }
    visitor.visit_extra(&mut service.extra);
}

fn walk_summary<V: DocumentVisitor + ?Sized>(summary: &mut ServiceSummary, visitor: &mut V) {
    if let Some(grouping) = summary.tasks.as_mut() {
        walk_service_grouping(grouping, visitor);
    }
    visitor.visit_extra(&mut summary.extra);
}

fn walk_endpoint<V: DocumentVisitor + ?Sized>(endpoint: &mut Endpoint, visitor: &mut V) {
    let spec_ports = endpoint.spec.as_mut().map(|spec| &mut spec.ports);
    let ports = endpoint.ports.iter_mut().chain(spec_ports.into_iter().flatten());
    for port in ports {
        walk_port(port, visitor);
    }
    if let Some(spec) = endpoint.spec.as_mut() {
        visitor.visit_extra(&mut spec.extra);
    }
    visitor.visit_extra(&mut endpoint.extra);
}

fn walk_port<V: DocumentVisitor + ?Sized>(port: &mut PortSpec, visitor: &mut V) {
    visitor.visit_extra(&mut port.extra);
}

/// Node ID keyed grouping: visit each key, re-filing the bucket when the
/// visitor changes it
fn walk_service_grouping<V: DocumentVisitor + ?Sized>(grouping: &mut TaskGrouping, visitor: &mut V) {
    let keys: Vec<String> = grouping.keys().cloned().collect();
    for key in keys {
        let mut new_key = key.clone();
        visitor.visit_node_id(NodeIdSite::ServiceGroupingKey, &mut new_key);
        if new_key != key {
            if let Some(bucket) = grouping.remove(&key) {
                grouping.entry(new_key).or_default().extend(bucket);
            }
        }
    }
    for task_ref in grouping.values_mut().flatten() {
        walk_task_ref(task_ref, NodeIdSite::GroupingEntry, visitor);
    }
}

fn walk_task_ref<V: DocumentVisitor + ?Sized>(task_ref: &mut TaskRef, site: NodeIdSite, visitor: &mut V) {
    if let Some(node_id) = task_ref.node_id.as_mut() {
        visitor.visit_node_id(site, node_id);
    }
    if let Some(status) = task_ref.status.as_mut() {
        visitor.visit_extra(&mut status.extra);
    }
    visitor.visit_extra(&mut task_ref.extra);
}
