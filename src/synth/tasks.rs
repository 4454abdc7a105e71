//! Task Synthesizer
//!
//! Spreads tasks for the synthetic services over the node roster. The
//! primary pass gives service `i` `1 + (i % 3)` tasks placed round-robin;
//! the extra pass pins one more task per service to the first roster node
//! so that node carries tasks from several services.

use tracing::{debug, info};

use super::services::synthetic_service_id;
use super::SynthesisContext;
use crate::index::Role;
use crate::model::{FixtureDocument, Task, TaskState};
use crate::store::EntityStore;
use crate::views::ViewBuilder;

/// Canned failure reasons, rotated by task index
pub const FAILURE_MESSAGES: [&str; 5] = [
    "OOMKilled while starting container",
    "ImagePullBackOff: failed to fetch image",
    "Permission denied mounting volume",
    "Container exited with code 1",
    "Network attach failed",
];

/// Slot number given to extra-pass tasks
pub const EXTRA_TASK_SLOT: u64 = 99;

/// Node a task is placed on
#[derive(Debug, Clone)]
struct Placement {
    id: String,
    name: String,
}

/// Name and stack of the service a task belongs to
#[derive(Debug, Clone)]
struct Owner {
    id: String,
    name: String,
    stack: String,
}

impl Owner {
    /// Look up `gensvc{i}`, falling back to `service-{i}` with no stack
    fn lookup(doc: &FixtureDocument, i: usize) -> Self {
        let id = synthetic_service_id(i);
        match doc.services.iter().find(|s| s.id == id) {
            Some(service) => Self {
                name: service.name.clone().unwrap_or_default(),
                stack: service.stack_name().unwrap_or_default().to_string(),
                id,
            },
            None => Self {
                id,
                name: format!("service-{i}"),
                stack: String::new(),
            },
        }
    }
}

/// Creates tasks for the synthetic services
pub struct TaskSynthesizer<'a> {
    ctx: &'a SynthesisContext,
}

impl<'a> TaskSynthesizer<'a> {
    pub fn new(ctx: &'a SynthesisContext) -> Self {
        Self { ctx }
    }

    /// Primary pass over `gensvc1..=gensvc{services}`. Returns the number of
    /// tasks created; IDs already present are skipped.
    pub fn synthesize_tasks(&self, store: &mut EntityStore, services: usize) -> usize {
        let roster = roster(store.document());
        let mut created = 0;

        for i in 1..=services {
            let owner = Owner::lookup(store.document(), i);
            let count = 1 + (i % 3);

            for j in 0..count {
                let id = format!("task-{}-{}", owner.id, j + 1);
                if store.contains(Role::Task, &id) || has_task(store.document(), &id) {
                    debug!(task = %id, "Task already present");
                    continue;
                }

                let placement = if roster.is_empty() {
                    None
                } else {
                    Some(&roster[(i + j) % roster.len()])
                };
                let state = TaskState::cycle(i + j);
                let err = failure_message(state, i + j, &owner.name);

                let task = Task {
                    id,
                    service_id: Some(owner.id.clone()),
                    service_name: Some(owner.name.clone()),
                    stack: Some(owner.stack.clone()),
                    node_id: placement.map(|p| p.id.clone()),
                    node_name: placement.map(|p| p.name.clone()),
                    state: Some(state.to_string()),
                    err: Some(err),
                    created_at: Some(self.ctx.timestamp(j as i64)),
                    updated_at: Some(self.ctx.timestamp(0)),
                    desired_state: Some(state.desired().to_string()),
                    timestamp: Some(self.ctx.timestamp(0)),
                    slot: Some(j as u64 + 1),
                    ..Default::default()
                };
                ViewBuilder::insert_task(store.document_mut(), task);
                created += 1;
            }
        }

        finish(store, created, "primary");
        created
    }

    /// Extra pass: one `task-{svc}-extra` per service on the first roster
    /// node. Does nothing when the roster is empty.
    pub fn synthesize_extra_tasks(&self, store: &mut EntityStore, services: usize) -> usize {
        let roster = roster(store.document());
        let Some(first) = roster.first() else {
            debug!("No nodes; skipping extra tasks");
            return 0;
        };
        let mut created = 0;

        for i in 1..=services {
            let owner = Owner::lookup(store.document(), i);
            let id = format!("task-{}-extra", owner.id);
            if store.contains(Role::Task, &id) || has_task(store.document(), &id) {
                continue;
            }

            let state = TaskState::cycle(i + 2);
            let err = failure_message(state, i + 2, &owner.name);
            let task = Task {
                id,
                service_id: Some(owner.id.clone()),
                service_name: Some(owner.name.clone()),
                stack: Some(owner.stack.clone()),
                node_id: Some(first.id.clone()),
                node_name: Some(first.name.clone()),
                state: Some(state.to_string()),
                err: Some(err),
                desired_state: Some(state.desired().to_string()),
                timestamp: Some(self.ctx.timestamp(0)),
                slot: Some(EXTRA_TASK_SLOT),
                ..Default::default()
            };
            ViewBuilder::insert_task(store.document_mut(), task);
            created += 1;
        }

        finish(store, created, "extra");
        created
    }
}

fn roster(doc: &FixtureDocument) -> Vec<Placement> {
    doc.node_roster()
        .iter()
        .filter(|n| !n.id.is_empty())
        .map(|n| Placement {
            id: n.id.clone(),
            name: n.display_name().to_string(),
        })
        .collect()
}

/// Tasks inserted earlier in the same pass are not in the index yet
fn has_task(doc: &FixtureDocument, id: &str) -> bool {
    doc.tasks.iter().any(|t| t.id == id)
}

fn failure_message(state: TaskState, n: usize, service_name: &str) -> String {
    match state {
        TaskState::Failed => format!("{} for {}", FAILURE_MESSAGES[n % FAILURE_MESSAGES.len()], service_name),
        _ => String::new(),
    }
}

fn finish(store: &mut EntityStore, created: usize, pass: &str) {
    if created > 0 {
        ViewBuilder::regenerate_timeline(store.document_mut());
        store.reindex();
    }
    info!(pass, created, "Synthesized tasks");
}
