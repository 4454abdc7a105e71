//! Fixture document model
//!
//! Typed view of the mock data set served to the dashboard. Every entity
//! keeps the fields it does not model in a flattened `extra` map, so a
//! hand-authored fixture survives a load/save round trip intact.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Fields not modelled explicitly, kept in document order
pub type Extra = Map<String, Value>;

/// Task references grouped by a foreign key (service ID on a node, node ID on a service)
pub type TaskGrouping = BTreeMap<String, Vec<TaskRef>>;

/// Label carrying the stack a service belongs to
pub const STACK_NAMESPACE_LABEL: &str = "com.docker.stack.namespace";

// =============================================================================
// Document
// =============================================================================

/// The whole fixture document, one field per top-level key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureDocument {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub stacks: Vec<Stack>,
    #[serde(default)]
    pub dashboardh: DashboardH,
    #[serde(default)]
    pub dashboardv: DashboardV,
    #[serde(rename = "ui.logs.services", default)]
    pub log_services: Vec<LogService>,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
    #[serde(default)]
    pub ports: Vec<PortEntry>,
    /// Top-level keys this engine does not own (e.g. dashboard settings)
    #[serde(flatten)]
    pub extra: Extra,
}

impl FixtureDocument {
    /// Nodes tasks are scheduled onto: the horizontal dashboard's node list
    /// when it has entries, otherwise the primary node list.
    pub fn node_roster(&self) -> &[Node] {
        if self.dashboardh.nodes.is_empty() {
            &self.nodes
        } else {
            &self.dashboardh.nodes
        }
    }

    pub fn node_roster_mut(&mut self) -> &mut Vec<Node> {
        if self.dashboardh.nodes.is_empty() {
            &mut self.nodes
        } else {
            &mut self.dashboardh.nodes
        }
    }
}

/// Horizontal dashboard: services and nodes, tasks grouped per node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardH {
    #[serde(rename = "Services", default)]
    pub services: Vec<ServiceSummary>,
    #[serde(rename = "Nodes", default)]
    pub nodes: Vec<Node>,
    /// Tasks with no node assignment
    #[serde(rename = "UnassignedTasks", default, skip_serializing_if = "Vec::is_empty")]
    pub unassigned_tasks: Vec<TaskRef>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Vertical dashboard: services with tasks grouped per node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardV {
    #[serde(rename = "Services", default)]
    pub services: Vec<ServiceSummary>,
    #[serde(rename = "Nodes", default)]
    pub nodes: Vec<Node>,
    #[serde(flatten)]
    pub extra: Extra,
}

// =============================================================================
// Nodes
// =============================================================================

/// A cluster host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Hostname", default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Service ID -> this node's tasks for that service
    #[serde(rename = "Tasks", default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TaskGrouping>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Node {
    /// Hostname, falling back to Name, then empty
    pub fn display_name(&self) -> &str {
        self.hostname
            .as_deref()
            .filter(|h| !h.is_empty())
            .or(self.name.as_deref())
            .unwrap_or("")
    }
}

// =============================================================================
// Services
// =============================================================================

/// A deployable service definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "Stack", default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(rename = "Replication", default, skip_serializing_if = "Option::is_none")]
    pub replication: Option<String>,
    #[serde(rename = "Spec", default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<ServiceSpec>,
    #[serde(rename = "Endpoint", default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
    /// Node ID -> this service's tasks on that node
    #[serde(rename = "Tasks", default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TaskGrouping>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Service {
    /// Minimal service record standing in for one known only by reference
    pub fn stub(id: impl Into<String>, name: Option<String>, stack: Option<String>) -> Self {
        let mut labels = Extra::new();
        if let Some(stack) = &stack {
            labels.insert(STACK_NAMESPACE_LABEL.to_string(), Value::String(stack.clone()));
        }
        Self {
            id: id.into(),
            spec: Some(ServiceSpec {
                name: name.clone(),
                labels,
                extra: Extra::new(),
            }),
            name,
            stack,
            ..Default::default()
        }
    }

    /// Stack name from the Stack field, else the stack namespace label
    pub fn stack_name(&self) -> Option<&str> {
        self.stack.as_deref().filter(|s| !s.is_empty()).or_else(|| {
            self.spec
                .as_ref()
                .and_then(|spec| spec.labels.get(STACK_NAMESPACE_LABEL))
                .and_then(Value::as_str)
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "Labels", default, skip_serializing_if = "Map::is_empty")]
    pub labels: Extra,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "Ports", default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortSpec>,
    #[serde(rename = "Spec", default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<EndpointSpec>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    #[serde(rename = "Ports", default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortSpec>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A published port on a service endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    #[serde(rename = "Protocol", default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(rename = "TargetPort", default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u32>,
    #[serde(rename = "PublishedPort", default, skip_serializing_if = "Option::is_none")]
    pub published_port: Option<u32>,
    #[serde(rename = "PublishMode", default, skip_serializing_if = "Option::is_none")]
    pub publish_mode: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Lightweight service entry used by the dashboard listings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSummary {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "Stack", default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(rename = "Replication", default, skip_serializing_if = "Option::is_none")]
    pub replication: Option<String>,
    /// Node ID -> this service's tasks on that node
    #[serde(rename = "Tasks", default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TaskGrouping>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Entry in the log viewer's service list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogService {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

// =============================================================================
// Stacks and ports
// =============================================================================

/// A named group of services
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Services", default)]
    pub services: Vec<StackService>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackService {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "ServiceName", default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(rename = "ShortName", default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(rename = "Replication", default, skip_serializing_if = "Option::is_none")]
    pub replication: Option<String>,
    #[serde(rename = "Created", default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(rename = "Updated", default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Flat port listing entry, one per published service port
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortEntry {
    #[serde(rename = "PublishedPort", default, skip_serializing_if = "Option::is_none")]
    pub published_port: Option<u32>,
    #[serde(rename = "TargetPort", default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u32>,
    #[serde(rename = "Protocol", default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(rename = "PublishMode", default, skip_serializing_if = "Option::is_none")]
    pub publish_mode: Option<String>,
    #[serde(rename = "ServiceName", default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(rename = "ServiceID", default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(rename = "Stack", default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

// =============================================================================
// Tasks
// =============================================================================

/// Lifecycle states cycled through by task synthesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Running,
    Pending,
    Failed,
    Shutdown,
    Complete,
}

impl TaskState {
    /// Fixed rotation order
    pub const CYCLE: [TaskState; 5] = [
        TaskState::Running,
        TaskState::Pending,
        TaskState::Failed,
        TaskState::Shutdown,
        TaskState::Complete,
    ];

    /// State at position `n` of the rotation
    pub fn cycle(n: usize) -> Self {
        Self::CYCLE[n % Self::CYCLE.len()]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Running => "running",
            TaskState::Pending => "pending",
            TaskState::Failed => "failed",
            TaskState::Shutdown => "shutdown",
            TaskState::Complete => "complete",
        }
    }

    /// Desired state the orchestrator would hold for a task in this state
    pub fn desired(&self) -> TaskState {
        match self {
            TaskState::Running => TaskState::Running,
            _ => TaskState::Shutdown,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nested status block used by hand-authored tasks and task references
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    #[serde(rename = "State", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "Err", default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(rename = "Timestamp", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A scheduled unit of work. The flat task list is the source of truth
/// for every grouping and for the timeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "ServiceID", default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(rename = "ServiceName", default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(rename = "Stack", default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(rename = "NodeID", default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(rename = "NodeName", default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(rename = "State", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "Err", default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(rename = "CreatedAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(rename = "UpdatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(rename = "DesiredState", default, skip_serializing_if = "Option::is_none")]
    pub desired_state: Option<String>,
    #[serde(rename = "Timestamp", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(rename = "Slot", default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<u64>,
    #[serde(rename = "Status", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Task {
    /// Current state, from State or Status.State
    pub fn current_state(&self) -> Option<&str> {
        self.state
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.status.as_ref().and_then(|s| s.state.as_deref()))
    }

    /// Error message, from Err or Status.Err
    pub fn error_message(&self) -> Option<&str> {
        self.err
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.status.as_ref().and_then(|s| s.err.as_deref()))
    }

    /// Whether the record carries any task-identifying reference
    pub fn looks_like_task(&self) -> bool {
        !self.id.is_empty()
            && (self.service_id.is_some() || self.node_id.is_some() || self.slot.is_some())
    }

    /// String field not modelled explicitly (e.g. CreatedTimestamp)
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// Rebuild a task from a grouping reference. `service_hint` and
    /// `node_hint` come from the grouping key the reference was filed under.
    pub fn from_ref(task_ref: &TaskRef, service_hint: Option<&str>, node_hint: Option<&str>) -> Self {
        let status = task_ref.status.as_ref();
        Self {
            id: task_ref.id.clone(),
            service_id: task_ref
                .service_id
                .clone()
                .or_else(|| service_hint.map(str::to_string)),
            service_name: task_ref.service_name.clone(),
            stack: task_ref.stack.clone(),
            node_id: task_ref.node_id.clone().or_else(|| node_hint.map(str::to_string)),
            node_name: task_ref.node_name.clone(),
            state: status.and_then(|s| s.state.clone()),
            err: status.and_then(|s| s.err.clone()),
            created_at: task_ref.created_at.clone(),
            updated_at: task_ref.updated_at.clone(),
            timestamp: status.and_then(|s| s.timestamp.clone()),
            ..Default::default()
        }
    }
}

/// Copy of a task filed inside a per-node or per-service grouping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRef {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Status", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(rename = "NodeID", default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(rename = "NodeName", default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(rename = "ServiceID", default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(rename = "ServiceName", default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(rename = "Stack", default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(rename = "CreatedAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(rename = "UpdatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl From<&Task> for TaskRef {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            status: Some(TaskStatus {
                state: task.current_state().map(str::to_string),
                err: Some(task.error_message().unwrap_or_default().to_string()),
                timestamp: task.timestamp.clone(),
                extra: Extra::new(),
            }),
            node_id: task.node_id.clone(),
            node_name: task.node_name.clone(),
            service_id: task.service_id.clone(),
            service_name: None,
            stack: task.stack.clone(),
            created_at: task.created_at.clone(),
            updated_at: task.updated_at.clone(),
            extra: Extra::new(),
        }
    }
}

// =============================================================================
// Timeline
// =============================================================================

/// Derived lifecycle record, one per task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "CreatedTimestamp", default)]
    pub created_timestamp: String,
    #[serde(rename = "StoppedTimestamp", default)]
    pub stopped_timestamp: String,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "DesiredState", default)]
    pub desired_state: String,
    #[serde(rename = "Slot", default)]
    pub slot: u64,
    #[serde(rename = "ServiceName", default)]
    pub service_name: String,
    #[serde(rename = "ServiceID", default)]
    pub service_id: String,
    #[serde(rename = "Stack", default)]
    pub stack: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let raw = serde_json::json!({
            "nodes": [{"ID": "n1", "Hostname": "alpha", "Role": "manager"}],
            "dashboard-settings": [{"theme": "dark"}]
        });
        let doc: FixtureDocument = serde_json::from_value(raw).unwrap();
        assert_eq!(doc.nodes[0].extra.get("Role"), Some(&Value::from("manager")));
        assert!(doc.extra.contains_key("dashboard-settings"));

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["nodes"][0]["Role"], "manager");
        assert_eq!(back["dashboard-settings"][0]["theme"], "dark");
    }

    #[test]
    fn test_task_state_cycle() {
        assert_eq!(TaskState::cycle(0), TaskState::Running);
        assert_eq!(TaskState::cycle(7), TaskState::Failed);
        assert_eq!(TaskState::Failed.desired(), TaskState::Shutdown);
        assert_eq!(TaskState::Running.desired(), TaskState::Running);
    }

    #[test]
    fn test_node_roster_prefers_dashboard_nodes() {
        let mut doc = FixtureDocument::default();
        doc.nodes.push(Node { id: "primary".into(), ..Default::default() });
        assert_eq!(doc.node_roster()[0].id, "primary");

        doc.dashboardh.nodes.push(Node { id: "dash".into(), ..Default::default() });
        assert_eq!(doc.node_roster()[0].id, "dash");
    }

    #[test]
    fn test_task_state_falls_back_to_status() {
        let task: Task = serde_json::from_value(serde_json::json!({
            "ID": "t1",
            "Status": {"State": "running"}
        }))
        .unwrap();
        assert_eq!(task.current_state(), Some("running"));
        assert!(!task.looks_like_task());
    }
}
