//! Swarm Fixtures
//!
//! Deterministic synthesis and referential-integrity repair for the mock
//! data set a swarm dashboard is developed against.
//!
//! ## Features
//!
//! - **Synthesis**: `gensvc{i}` services with ports, listings and stacks,
//!   plus tasks spread across the node roster with rotating lifecycle states
//! - **Single source of truth**: per-node and per-service task groupings and
//!   the timeline are projections of the flat task list
//! - **Repair**: node/service ID collisions renamed through a typed visitor,
//!   duplicate task IDs suffixed, dangling references reported
//! - **Atomic write-back**: backup, temp file, rename, checksum and parse check
//!
//! ## Document layout
//!
//! ```text
//! {
//!   "nodes": [...],
//!   "services": [...],
//!   "tasks": [...],
//!   "stacks": [...],
//!   "dashboardh": {"Services": [...], "Nodes": [...]},
//!   "dashboardv": {"Services": [...], "Nodes": [...]},
//!   "ui.logs.services": [...],
//!   "timeline": [...],
//!   "ports": [...]
//! }
//! ```

pub mod checksum;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod index;
pub mod model;
pub mod persist;
pub mod pipeline;
pub mod repair;
pub mod snapshot;
pub mod store;
pub mod synth;
pub mod views;
pub mod visit;

pub use checksum::Checksum;
pub use config::FixtureConfig;
pub use diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics, Severity};
pub use error::{FixtureError, PersistFailure, PersistStage, Result};
pub use index::{EntityRef, IdentityIndex, Role};
pub use model::{FixtureDocument, Node, Service, Task, TaskRef, TaskState, TimelineEntry};
pub use persist::{AtomicPersister, PersistReport};
pub use pipeline::{Artifact, Pipeline, RunSummary, Stage};
pub use repair::{DedupeReport, DuplicateIdResolver, ReferentialIntegrityFixer, RepairReport};
pub use snapshot::Snapshot;
pub use store::EntityStore;
pub use synth::{SynthesisContext, SyntheticServiceGenerator, TaskSynthesizer};
pub use views::{ViewBuilder, ViewStats};
