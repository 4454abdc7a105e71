//! Stage pipeline
//!
//! Each [`Stage`] declares the artifacts it reads and writes. A plan is
//! rejected when a stage reads something no earlier stage (or the loaded
//! document) provides, or when it ends with a derived artifact stale.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{info, info_span, warn};

use crate::config::FixtureConfig;
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::error::{FixtureError, PersistFailure, Result};
use crate::persist::{AtomicPersister, PersistReport};
use crate::repair::{DuplicateIdResolver, ReferentialIntegrityFixer, Rename, RepairReport};
use crate::store::EntityStore;
use crate::synth::{SynthesisContext, SyntheticServiceGenerator, TaskSynthesizer};
use crate::views::{ViewBuilder, ViewStats};

/// Data a stage consumes or produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Artifact {
    Nodes,
    Services,
    /// `gensvc{i}` services; never present until a stage creates them
    SyntheticServices,
    Tasks,
    /// Per-node and per-service task groupings
    Views,
    Timeline,
}

impl Artifact {
    /// Available as soon as a document is loaded
    const LOADED: [Artifact; 5] = [
        Artifact::Nodes,
        Artifact::Services,
        Artifact::Tasks,
        Artifact::Views,
        Artifact::Timeline,
    ];
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    EnsureServices,
    SynthesizeTasks,
    SynthesizeExtraTasks,
    RepairReferences,
    DedupeTasks,
    SyncViews,
}

impl Stage {
    pub fn reads(&self) -> &'static [Artifact] {
        use Artifact::*;
        match self {
            Stage::EnsureServices => &[Services],
            Stage::SynthesizeTasks | Stage::SynthesizeExtraTasks => &[Nodes, SyntheticServices, Tasks],
            Stage::RepairReferences => &[Nodes, Services, Tasks],
            Stage::DedupeTasks => &[Tasks],
            Stage::SyncViews => &[Tasks, Views],
        }
    }

    pub fn writes(&self) -> &'static [Artifact] {
        use Artifact::*;
        match self {
            Stage::EnsureServices => &[Services, SyntheticServices, Views],
            Stage::SynthesizeTasks | Stage::SynthesizeExtraTasks => &[Tasks, Views, Timeline],
            Stage::RepairReferences => &[Nodes, Services, Tasks, Views],
            Stage::DedupeTasks => &[Tasks],
            Stage::SyncViews => &[Tasks, Views, Timeline],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::EnsureServices => "ensure-services",
            Stage::SynthesizeTasks => "synthesize-tasks",
            Stage::SynthesizeExtraTasks => "synthesize-extra-tasks",
            Stage::RepairReferences => "repair-references",
            Stage::DedupeTasks => "dedupe-tasks",
            Stage::SyncViews => "sync-views",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Aggregated outcome of a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub stages: Vec<Stage>,
    pub services_created: Vec<String>,
    pub tasks_created: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair: Option<RepairReport>,
    pub duplicates_renamed: Vec<Rename>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views: Option<ViewStats>,
    pub diagnostics: Diagnostics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persisted: Option<PersistReport>,
    /// A write-back failed and was recovered from
    pub degraded: bool,
}

impl RunSummary {
    pub fn record_persist(&mut self, outcome: std::result::Result<PersistReport, PersistFailure>) {
        match outcome {
            Ok(report) => self.persisted = Some(report),
            Err(failure) => {
                warn!(%failure, "Write-back failed");
                self.diagnostics.report(
                    failure.path.display().to_string(),
                    DiagnosticCode::PersistenceFailure,
                    failure.to_string(),
                );
                self.degraded = true;
            }
        }
    }

    /// 0 on success, 2 on degraded success
    pub fn exit_code(&self) -> i32 {
        if self.degraded {
            2
        } else {
            0
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages: Vec<&str> = self.stages.iter().map(Stage::name).collect();
        writeln!(f, "Stages: {}", stages.join(" -> "))?;
        writeln!(f, "Services created: {}", self.services_created.len())?;
        writeln!(f, "Tasks created: {}", self.tasks_created)?;
        if let Some(repair) = &self.repair {
            writeln!(f, "Collisions repaired: {}", repair.collisions.len())?;
            for collision in &repair.collisions {
                writeln!(f, "  {} -> {}", collision.old_id, collision.new_id)?;
            }
            for update in &repair.updated {
                writeln!(f, "  {} {} -> {} ({})", update.kind, update.from, update.to, update.count)?;
            }
            if repair.backfilled > 0 {
                writeln!(f, "Tasks backfilled from groupings: {}", repair.backfilled)?;
            }
            if !repair.stubs.is_empty() {
                writeln!(f, "Service stubs added: {}", repair.stubs.join(", "))?;
            }
        }
        writeln!(f, "Duplicate task IDs renamed: {}", self.duplicates_renamed.len())?;
        if let Some(views) = &self.views {
            writeln!(
                f,
                "Views: {} backfilled, {} node refs, {} service refs, {} unassigned refs, {} stale refs dropped, {} timeline entries",
                views.backfilled,
                views.node_refs_added,
                views.service_refs_added,
                views.unassigned_refs_added,
                views.stale_refs_removed,
                views.timeline_entries
            )?;
        }
        if let Some(persisted) = &self.persisted {
            writeln!(f, "Persisted {} bytes to {} ({})", persisted.bytes, persisted.path.display(), persisted.checksum.short())?;
        }
        if !self.diagnostics.is_empty() {
            write!(f, "\n{}", self.diagnostics)?;
        }
        Ok(())
    }
}

/// A validated sequence of stages
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Result<Self> {
        Self::validate(&stages)?;
        Ok(Self { stages })
    }

    /// Services, tasks, extra tasks, then a view sync
    pub fn synthesis() -> Self {
        Self {
            stages: vec![
                Stage::EnsureServices,
                Stage::SynthesizeTasks,
                Stage::SynthesizeExtraTasks,
                Stage::SyncViews,
            ],
        }
    }

    /// Integrity repair and dedupe over an existing document
    pub fn repair() -> Self {
        Self {
            stages: vec![Stage::RepairReferences, Stage::DedupeTasks, Stage::SyncViews],
        }
    }

    /// Synthesis followed by repair
    pub fn full() -> Self {
        Self {
            stages: vec![
                Stage::EnsureServices,
                Stage::SynthesizeTasks,
                Stage::SynthesizeExtraTasks,
                Stage::RepairReferences,
                Stage::DedupeTasks,
                Stage::SyncViews,
            ],
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn validate(stages: &[Stage]) -> Result<()> {
        let mut available: BTreeSet<Artifact> = Artifact::LOADED.into_iter().collect();
        let mut stale: BTreeSet<Artifact> = BTreeSet::new();

        for stage in stages {
            if let Some(missing) = stage.reads().iter().find(|a| !available.contains(*a)) {
                return Err(FixtureError::Pipeline(format!(
                    "stage {} reads {} before any stage produces it",
                    stage, missing
                )));
            }

            let writes = stage.writes();
            available.extend(writes.iter().copied());
            for derived in [Artifact::Views, Artifact::Timeline] {
                if writes.contains(&derived) {
                    stale.remove(&derived);
                } else if writes.contains(&Artifact::Tasks) {
                    stale.insert(derived);
                }
            }
        }

        if !stale.is_empty() {
            let names: Vec<String> = stale.iter().map(ToString::to_string).collect();
            return Err(FixtureError::Pipeline(format!(
                "plan ends with {} out of date; finish with {}",
                names.join(" and "),
                Stage::SyncViews
            )));
        }
        Ok(())
    }

    pub fn run(&self, store: &mut EntityStore, config: &FixtureConfig, ctx: &SynthesisContext) -> RunSummary {
        let mut summary = RunSummary {
            stages: self.stages.clone(),
            ..Default::default()
        };

        for stage in &self.stages {
            let span = info_span!("stage", stage = %stage);
            let _enter = span.enter();

            match stage {
                Stage::EnsureServices => {
                    let created = SyntheticServiceGenerator::new(ctx)
                        .ensure_services(store, config.synthesis.service_count);
                    summary.services_created.extend(created);
                }
                Stage::SynthesizeTasks => {
                    summary.tasks_created +=
                        TaskSynthesizer::new(ctx).synthesize_tasks(store, config.synthesis.task_services);
                }
                Stage::SynthesizeExtraTasks => {
                    summary.tasks_created +=
                        TaskSynthesizer::new(ctx).synthesize_extra_tasks(store, config.synthesis.task_services);
                }
                Stage::RepairReferences => {
                    let mut report = ReferentialIntegrityFixer::new(&config.repair).repair(store);
                    summary.diagnostics.merge(std::mem::take(&mut report.diagnostics));
                    summary.repair = Some(report);
                }
                Stage::DedupeTasks => {
                    let report = DuplicateIdResolver::dedupe(store);
                    summary.diagnostics.merge(report.diagnostics);
                    summary.duplicates_renamed.extend(report.renamed);
                }
                Stage::SyncViews => {
                    let stats = ViewBuilder::sync(store.document_mut(), &mut summary.diagnostics);
                    store.reindex();
                    summary.views = Some(stats);
                }
            }
        }

        info!(
            services = summary.services_created.len(),
            tasks = summary.tasks_created,
            diagnostics = summary.diagnostics.len(),
            "Pipeline finished"
        );
        summary
    }
}

/// Write the store back when persistence is enabled. Serialization errors
/// are fatal; write-back failures degrade the summary.
pub fn persist_if_enabled(store: &EntityStore, config: &FixtureConfig, summary: &mut RunSummary) -> Result<()> {
    if !config.persist.enabled {
        info!("Persistence disabled; document left untouched");
        return Ok(());
    }
    let content = crate::persist::serialize_document(store.document())?;
    let persister = AtomicPersister::new(&config.persist);
    summary.record_persist(persister.commit(&content, store.source()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for pipeline in [Pipeline::synthesis(), Pipeline::repair(), Pipeline::full()] {
            assert!(Pipeline::validate(pipeline.stages()).is_ok());
        }
    }

    #[test]
    fn test_tasks_before_services_rejected() {
        let err = Pipeline::new(vec![Stage::SynthesizeTasks, Stage::SyncViews]).unwrap_err();
        assert!(err.to_string().contains("SyntheticServices"));
    }

    #[test]
    fn test_stale_views_rejected() {
        let err = Pipeline::new(vec![Stage::RepairReferences, Stage::DedupeTasks]).unwrap_err();
        assert!(err.to_string().contains("Views and Timeline"));
    }

    #[test]
    fn test_degraded_exit_code() {
        let mut summary = RunSummary::default();
        assert_eq!(summary.exit_code(), 0);
        summary.record_persist(Err(PersistFailure {
            stage: crate::error::PersistStage::Rename,
            path: "data.json".into(),
            message: "denied".into(),
            restored: false,
        }));
        assert_eq!(summary.exit_code(), 2);
        assert!(summary.diagnostics.has_errors());
    }
}
