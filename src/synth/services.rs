//! Synthetic Service Generator

use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::SynthesisContext;
use crate::index::Role;
use crate::model::{
    Endpoint, EndpointSpec, Extra, FixtureDocument, LogService, PortEntry, PortSpec, Service, ServiceSpec,
    ServiceSummary, Stack, StackService, STACK_NAMESPACE_LABEL,
};
use crate::store::EntityStore;

/// Base names rotated through by service index
pub const BASE_NAMES: [&str; 6] = [
    "auth-service",
    "user-service",
    "payment-service",
    "email-service",
    "analytics-service",
    "cache-service",
];

/// Stack names rotated through by service index
pub const STACK_NAMES: [&str; 3] = ["backend", "frontend", "infra"];

/// Service `i` publishes port `BASE_PORT + i`
pub const BASE_PORT: u32 = 8000;

/// Highest service index whose port still fits in a TCP port number
pub const MAX_SERVICE_COUNT: usize = (u16::MAX as u32 - BASE_PORT) as usize;

/// Published port of service `i`, `None` past [`MAX_SERVICE_COUNT`]
pub fn synthetic_port(i: usize) -> Option<u32> {
    u32::try_from(i)
        .ok()
        .and_then(|i| BASE_PORT.checked_add(i))
        .filter(|port| *port <= u32::from(u16::MAX))
}

pub fn synthetic_service_id(i: usize) -> String {
    format!("gensvc{i}")
}

/// `(name, stack)` for service `i` (1-based)
pub fn synthetic_service_name(i: usize) -> (String, &'static str) {
    let idx = i.saturating_sub(1);
    let base = BASE_NAMES[idx % BASE_NAMES.len()];
    let stack = STACK_NAMES[idx % STACK_NAMES.len()];
    (format!("{stack}_{base}"), stack)
}

/// Creates `gensvc{i}` services up to a target count
pub struct SyntheticServiceGenerator<'a> {
    ctx: &'a SynthesisContext,
}

impl<'a> SyntheticServiceGenerator<'a> {
    pub fn new(ctx: &'a SynthesisContext) -> Self {
        Self { ctx }
    }

    /// Ensure `gensvc1..=gensvc{count}` exist. Returns the IDs created.
    pub fn ensure_services(&self, store: &mut EntityStore, count: usize) -> Vec<String> {
        let mut created = Vec::new();

        for i in 1..=count {
            let id = synthetic_service_id(i);
            if store.contains(Role::Service, &id) {
                debug!(service = %id, "Synthetic service already present");
                continue;
            }
            let Some(port) = synthetic_port(i) else {
                warn!(service = %id, "No port left for synthetic service; stopping");
                break;
            };
            self.add_service(store.document_mut(), i, &id, port);
            created.push(id);
        }

        if !created.is_empty() {
            store.reindex();
            info!(count = created.len(), "Synthesized services");
        }
        created
    }

    fn add_service(&self, doc: &mut FixtureDocument, i: usize, id: &str, port: u32) {
        let (name, stack) = synthetic_service_name(i);
        let now = self.ctx.timestamp(0);

        let port_spec = PortSpec {
            protocol: Some("tcp".to_string()),
            target_port: Some(port),
            published_port: Some(port),
            publish_mode: Some("ingress".to_string()),
            extra: Extra::new(),
        };

        let mut labels = Extra::new();
        labels.insert(STACK_NAMESPACE_LABEL.to_string(), Value::from(stack));
        let mut extra = Extra::new();
        extra.insert("Version".to_string(), json!({ "Index": 1 }));

        doc.services.push(Service {
            id: id.to_string(),
            name: Some(name.clone()),
            stack: Some(stack.to_string()),
            replication: Some("1".to_string()),
            spec: Some(ServiceSpec {
                name: Some(name.clone()),
                labels,
                extra: Extra::new(),
            }),
            endpoint: Some(Endpoint {
                ports: vec![port_spec.clone()],
                spec: Some(EndpointSpec {
                    ports: vec![port_spec],
                    extra: Extra::new(),
                }),
                extra: Extra::new(),
            }),
            tasks: None,
            extra,
        });

        if !doc.ports.iter().any(|p| p.service_id.as_deref() == Some(id)) {
            doc.ports.push(PortEntry {
                published_port: Some(port),
                target_port: Some(port),
                protocol: Some("tcp".to_string()),
                publish_mode: Some("ingress".to_string()),
                service_name: Some(name.clone()),
                service_id: Some(id.to_string()),
                stack: Some(stack.to_string()),
                extra: Extra::new(),
            });
        }

        if !doc.dashboardh.services.iter().any(|s| s.id == id) {
            doc.dashboardh.services.push(ServiceSummary {
                id: id.to_string(),
                name: Some(name.clone()),
                stack: Some(stack.to_string()),
                ..Default::default()
            });
        }
        if !doc.dashboardv.services.iter().any(|s| s.id == id) {
            doc.dashboardv.services.push(ServiceSummary {
                id: id.to_string(),
                name: Some(name.clone()),
                stack: Some(stack.to_string()),
                replication: Some("1".to_string()),
                tasks: Some(BTreeMap::new()),
                extra: Extra::new(),
            });
        }
        if !doc.log_services.iter().any(|s| s.id == id) {
            doc.log_services.push(LogService {
                id: id.to_string(),
                name: Some(name.clone()),
                extra: Extra::new(),
            });
        }

        let stack_pos = match doc.stacks.iter().position(|s| s.name == stack) {
            Some(pos) => pos,
            None => {
                doc.stacks.push(Stack {
                    name: stack.to_string(),
                    ..Default::default()
                });
                doc.stacks.len() - 1
            }
        };
        let entry = &mut doc.stacks[stack_pos];
        if !entry.services.iter().any(|s| s.id == id) {
            entry.services.push(StackService {
                id: id.to_string(),
                short_name: Some(name.replace(['-', '_'], "")),
                service_name: Some(name),
                replication: Some("1".to_string()),
                created: Some(now.clone()),
                updated: Some(now),
                extra: Extra::new(),
            });
        }

        debug!(service = %id, port, "Added synthetic service");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> EntityStore {
        EntityStore::parse("mem", r#"{"stacks": [{"Name": "backend", "Services": []}]}"#).unwrap()
    }

    #[test]
    fn test_name_rotation() {
        assert_eq!(synthetic_service_name(1), ("backend_auth-service".to_string(), "backend"));
        assert_eq!(synthetic_service_name(5), ("frontend_analytics-service".to_string(), "frontend"));
        assert_eq!(synthetic_service_name(7), ("backend_auth-service".to_string(), "backend"));
    }

    #[test]
    fn test_port_range() {
        assert_eq!(synthetic_port(1), Some(8001));
        assert_eq!(synthetic_port(MAX_SERVICE_COUNT), Some(65535));
        assert_eq!(synthetic_port(MAX_SERVICE_COUNT + 1), None);
        assert_eq!(synthetic_port(usize::MAX), None);
    }

    #[test]
    fn test_ensure_services_populates_listings() {
        let ctx = SynthesisContext::now();
        let mut store = store();
        let created = SyntheticServiceGenerator::new(&ctx).ensure_services(&mut store, 3);
        assert_eq!(created, ["gensvc1", "gensvc2", "gensvc3"]);

        let doc = store.document();
        assert_eq!(doc.services.len(), 3);
        assert_eq!(doc.ports.len(), 3);
        assert_eq!(doc.ports[1].published_port, Some(8002));
        assert_eq!(doc.log_services.len(), 3);
        assert_eq!(doc.dashboardv.services[0].replication.as_deref(), Some("1"));

        let svc = &doc.services[2];
        assert_eq!(svc.stack_name(), Some("infra"));
        let endpoint = svc.endpoint.as_ref().unwrap();
        assert_eq!(endpoint.ports, endpoint.spec.as_ref().unwrap().ports);

        // existing stack reused, two new ones created
        assert_eq!(doc.stacks.len(), 3);
        assert_eq!(doc.stacks[0].services[0].short_name.as_deref(), Some("backendauthservice"));
    }

    #[test]
    fn test_ensure_services_is_idempotent() {
        let ctx = SynthesisContext::now();
        let generator = SyntheticServiceGenerator::new(&ctx);
        let mut store = store();
        generator.ensure_services(&mut store, 6);
        let before = store.document().clone();

        let created = generator.ensure_services(&mut store, 6);
        assert!(created.is_empty());
        assert_eq!(store.document(), &before);
    }
}
