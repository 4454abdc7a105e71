//! Read-only view for the HTTP facade
//!
//! The facade serves collections and single entities; joins such as a
//! service bundled with its tasks are its own business.

use serde_json::Value;

use crate::error::Result;
use crate::index::Role;
use crate::model::FixtureDocument;
use crate::store::EntityStore;

/// Borrowed, read-only handle on a store
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    store: &'a EntityStore,
}

impl<'a> Snapshot<'a> {
    pub fn new(store: &'a EntityStore) -> Self {
        Self { store }
    }

    pub fn document(&self) -> &'a FixtureDocument {
        self.store.document()
    }

    /// A top-level collection by its document key, `None` if absent
    pub fn resource(&self, name: &str) -> Result<Option<Value>> {
        let doc = self.document();
        let value = match name {
            "nodes" => serde_json::to_value(&doc.nodes)?,
            "services" => serde_json::to_value(&doc.services)?,
            "tasks" => serde_json::to_value(&doc.tasks)?,
            "stacks" => serde_json::to_value(&doc.stacks)?,
            "dashboardh" => serde_json::to_value(&doc.dashboardh)?,
            "dashboardv" => serde_json::to_value(&doc.dashboardv)?,
            "ui.logs.services" => serde_json::to_value(&doc.log_services)?,
            "timeline" => serde_json::to_value(&doc.timeline)?,
            "ports" => serde_json::to_value(&doc.ports)?,
            other => return Ok(doc.extra.get(other).cloned()),
        };
        Ok(Some(value))
    }

    /// One entity as JSON, or [`crate::FixtureError::NotFound`]
    pub fn entity(&self, role: Role, id: &str) -> Result<Value> {
        self.store.resolve(role, id)?.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FixtureError;

    fn store() -> EntityStore {
        EntityStore::parse(
            "mem",
            r#"{
                "services": [{"ID": "s1", "Name": "web"}],
                "ui.logs.services": [{"ID": "s1", "Name": "web"}],
                "settings": {"refresh": 5}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_resource_lookup() {
        let store = store();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.resource("ui.logs.services").unwrap().unwrap()[0]["ID"], "s1");
        assert_eq!(snapshot.resource("settings").unwrap().unwrap()["refresh"], 5);
        assert!(snapshot.resource("missing").unwrap().is_none());
    }

    #[test]
    fn test_entity_lookup() {
        let store = store();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.entity(Role::Service, "s1").unwrap()["Name"], "web");
        assert!(matches!(
            snapshot.entity(Role::Task, "nope"),
            Err(FixtureError::NotFound { role: Role::Task, .. })
        ));
    }
}
