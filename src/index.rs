//! Identity Index
//!
//! Per-role ID lookups over a [`FixtureDocument`]. Rebuilt after structural
//! changes (inserts, renames); field edits never invalidate it.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{FixtureError, Result};
use crate::model::{FixtureDocument, Node, Service, Stack, Task};

/// Entity roles. IDs are unique within a role and must not collide across
/// the node and service roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Node,
    Service,
    Task,
    Stack,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Node => "node",
            Role::Service => "service",
            Role::Task => "task",
            Role::Stack => "stack",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which node listing a node record lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeListing {
    /// `nodes`
    Primary,
    /// `dashboardh.Nodes`
    Horizontal,
    /// `dashboardv.Nodes`
    Vertical,
}

/// Borrowed entity returned by [`IdentityIndex::resolve`]
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    Node(&'a Node),
    Service(&'a Service),
    Task(&'a Task),
    Stack(&'a Stack),
}

impl<'a> EntityRef<'a> {
    pub fn id(&self) -> &'a str {
        match self {
            EntityRef::Node(n) => &n.id,
            EntityRef::Service(s) => &s.id,
            EntityRef::Task(t) => &t.id,
            EntityRef::Stack(s) => &s.name,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            EntityRef::Node(_) => Role::Node,
            EntityRef::Service(_) => Role::Service,
            EntityRef::Task(_) => Role::Task,
            EntityRef::Stack(_) => Role::Stack,
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        let value = match self {
            EntityRef::Node(n) => serde_json::to_value(n)?,
            EntityRef::Service(s) => serde_json::to_value(s)?,
            EntityRef::Task(t) => serde_json::to_value(t)?,
            EntityRef::Stack(s) => serde_json::to_value(s)?,
        };
        Ok(value)
    }
}

/// IDs of one role in first-seen order, with O(1) membership
#[derive(Debug, Clone, Default)]
struct IdSet {
    ordered: Vec<String>,
    members: HashSet<String>,
}

impl IdSet {
    fn insert(&mut self, id: &str) {
        if id.is_empty() {
            return;
        }
        if self.members.insert(id.to_string()) {
            self.ordered.push(id.to_string());
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }
}

/// Per-role identifier index
#[derive(Debug, Clone, Default)]
pub struct IdentityIndex {
    /// Node ID -> first record position (primary list wins over dashboards)
    nodes: HashMap<String, (NodeListing, usize)>,
    services: HashMap<String, usize>,
    tasks: HashMap<String, usize>,
    stacks: HashMap<String, usize>,

    /// Every node ID in any node listing
    known_nodes: IdSet,
    /// Every service ID in `services`, dashboard listings, log list and stacks
    known_services: IdSet,

    /// IDs appearing more than once in a role's primary list
    duplicates: HashMap<Role, Vec<String>>,
}

impl IdentityIndex {
    /// Index every listing of the document
    pub fn build(doc: &FixtureDocument) -> Self {
        let mut index = Self::default();

        let listings = [
            (NodeListing::Primary, &doc.nodes),
            (NodeListing::Horizontal, &doc.dashboardh.nodes),
            (NodeListing::Vertical, &doc.dashboardv.nodes),
        ];
        for (listing, nodes) in listings {
            for (pos, node) in nodes.iter().enumerate() {
                if node.id.is_empty() {
                    continue;
                }
                index.known_nodes.insert(&node.id);
                index.nodes.entry(node.id.clone()).or_insert((listing, pos));
            }
        }

        index.services = positions(doc.services.iter().map(|s| s.id.as_str()));
        index.tasks = positions(doc.tasks.iter().map(|t| t.id.as_str()));
        index.stacks = positions(doc.stacks.iter().map(|s| s.name.as_str()));

        for service in &doc.services {
            index.known_services.insert(&service.id);
        }
        for summary in doc.dashboardh.services.iter().chain(&doc.dashboardv.services) {
            index.known_services.insert(&summary.id);
        }
        for entry in &doc.log_services {
            index.known_services.insert(&entry.id);
        }
        for stack in &doc.stacks {
            for svc in &stack.services {
                index.known_services.insert(&svc.id);
            }
        }

        index.duplicates.insert(Role::Node, repeated(doc.nodes.iter().map(|n| n.id.as_str())));
        index.duplicates.insert(Role::Service, repeated(doc.services.iter().map(|s| s.id.as_str())));
        index.duplicates.insert(Role::Task, repeated(doc.tasks.iter().map(|t| t.id.as_str())));
        index.duplicates.insert(Role::Stack, repeated(doc.stacks.iter().map(|s| s.name.as_str())));

        index
    }

    /// Resolve an ID to its entity record
    pub fn resolve<'a>(&self, doc: &'a FixtureDocument, role: Role, id: &str) -> Result<EntityRef<'a>> {
        let not_found = || FixtureError::NotFound {
            role,
            id: id.to_string(),
        };

        let found = match role {
            Role::Node => self
                .nodes
                .get(id)
                .and_then(|&(listing, pos)| {
                    let list = match listing {
                        NodeListing::Primary => &doc.nodes,
                        NodeListing::Horizontal => &doc.dashboardh.nodes,
                        NodeListing::Vertical => &doc.dashboardv.nodes,
                    };
                    list.get(pos).filter(|n| n.id == id)
                })
                .map(EntityRef::Node),
            Role::Service => lookup(&self.services, &doc.services, id, |s| &s.id).map(EntityRef::Service),
            Role::Task => lookup(&self.tasks, &doc.tasks, id, |t| &t.id).map(EntityRef::Task),
            Role::Stack => lookup(&self.stacks, &doc.stacks, id, |s| &s.name).map(EntityRef::Stack),
        };

        found.ok_or_else(not_found)
    }

    /// Whether the role's primary record exists
    pub fn contains(&self, role: Role, id: &str) -> bool {
        match role {
            Role::Node => self.nodes.contains_key(id),
            Role::Service => self.services.contains_key(id),
            Role::Task => self.tasks.contains_key(id),
            Role::Stack => self.stacks.contains_key(id),
        }
    }

    /// Whether the ID appears in any listing of the role
    pub fn is_known(&self, role: Role, id: &str) -> bool {
        match role {
            Role::Node => self.known_nodes.contains(id),
            Role::Service => self.known_services.contains(id),
            _ => self.contains(role, id),
        }
    }

    /// Every node or service ID across all listings, in first-seen order.
    /// Other roles only have a primary list and return nothing here.
    pub fn known_ids(&self, role: Role) -> &[String] {
        match role {
            Role::Node => &self.known_nodes.ordered,
            Role::Service => &self.known_services.ordered,
            _ => &[],
        }
    }

    /// IDs repeated within the role's primary list
    pub fn duplicates(&self, role: Role) -> &[String] {
        self.duplicates.get(&role).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of indexed primary records for a role
    pub fn len(&self, role: Role) -> usize {
        match role {
            Role::Node => self.nodes.len(),
            Role::Service => self.services.len(),
            Role::Task => self.tasks.len(),
            Role::Stack => self.stacks.len(),
        }
    }
}

fn positions<'a>(ids: impl Iterator<Item = &'a str>) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for (pos, id) in ids.enumerate() {
        if !id.is_empty() {
            map.entry(id.to_string()).or_insert(pos);
        }
    }
    map
}

fn repeated<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut dups = Vec::new();
    for id in ids {
        if id.is_empty() {
            continue;
        }
        if !seen.insert(id) && !dups.iter().any(|d: &String| d == id) {
            dups.push(id.to_string());
        }
    }
    dups
}

/// Indexed lookup with a linear fallback if the index went stale
fn lookup<'a, T>(
    index: &HashMap<String, usize>,
    list: &'a [T],
    id: &str,
    key: impl Fn(&T) -> &String,
) -> Option<&'a T> {
    index
        .get(id)
        .and_then(|&pos| list.get(pos))
        .filter(|item| key(item) == id)
        .or_else(|| list.iter().find(|item| key(item) == id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LogService, ServiceSummary, StackService};

    fn sample() -> FixtureDocument {
        let mut doc = FixtureDocument::default();
        doc.nodes.push(Node { id: "n1".into(), ..Default::default() });
        doc.dashboardv.nodes.push(Node { id: "n2".into(), ..Default::default() });
        doc.services.push(Service { id: "s1".into(), ..Default::default() });
        doc.services.push(Service { id: "s1".into(), ..Default::default() });
        doc.dashboardh.services.push(ServiceSummary { id: "s2".into(), ..Default::default() });
        doc.log_services.push(LogService { id: "s3".into(), ..Default::default() });
        doc.stacks.push(Stack {
            name: "backend".into(),
            services: vec![StackService { id: "s4".into(), ..Default::default() }],
            ..Default::default()
        });
        doc
    }

    #[test]
    fn test_resolve_and_not_found() {
        let doc = sample();
        let index = IdentityIndex::build(&doc);

        let node = index.resolve(&doc, Role::Node, "n2").unwrap();
        assert_eq!(node.id(), "n2");
        assert_eq!(node.role(), Role::Node);

        let err = index.resolve(&doc, Role::Service, "missing").unwrap_err();
        assert!(matches!(err, FixtureError::NotFound { role: Role::Service, .. }));
    }

    #[test]
    fn test_known_ids_span_all_listings() {
        let doc = sample();
        let index = IdentityIndex::build(&doc);

        assert_eq!(index.known_ids(Role::Node), ["n1", "n2"]);
        assert_eq!(index.known_ids(Role::Service), ["s1", "s2", "s3", "s4"]);
        assert!(index.is_known(Role::Service, "s4"));
        assert!(!index.contains(Role::Service, "s4"));
    }

    #[test]
    fn test_duplicates_reported_once() {
        let doc = sample();
        let index = IdentityIndex::build(&doc);
        assert_eq!(index.duplicates(Role::Service), ["s1"]);
        assert!(index.duplicates(Role::Node).is_empty());
    }

    #[test]
    fn test_stale_position_falls_back_to_scan() {
        let mut doc = sample();
        let index = IdentityIndex::build(&doc);
        doc.services.insert(0, Service { id: "s0".into(), ..Default::default() });
        assert_eq!(index.resolve(&doc, Role::Service, "s1").unwrap().id(), "s1");
    }
}
