//! Fixture Repair CLI
//!
//! Repairs ID collisions and duplicate task IDs in an existing fixture
//! document and reports references that could not be resolved.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use swarm_fixtures::persist::render_diff;
use swarm_fixtures::pipeline::persist_if_enabled;
use swarm_fixtures::{EntityStore, FixtureConfig, Pipeline, SynthesisContext};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fixture-repair")]
#[command(about = "Repair referential integrity of a fixture document")]
struct Cli {
    /// Fixture document (defaults to document.path from the config)
    #[arg(short, long)]
    document: Option<PathBuf>,

    /// Config file layered over the default locations
    #[arg(short, long)]
    config: Option<String>,

    /// Do not create stub services for IDs known only from listings
    #[arg(long)]
    no_stubs: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Print a diff of the document against the file on disk
    #[arg(long)]
    diff: bool,

    /// Write the document back (same as FIXTURES__PERSIST__ENABLED=true)
    #[arg(short, long)]
    write: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut config = FixtureConfig::load_from(cli.config.as_deref())?;
    if cli.write {
        config.persist.enabled = true;
    }
    if cli.no_stubs {
        config.repair.backfill_service_stubs = false;
    }
    config.validate().map_err(anyhow::Error::msg)?;

    let path = cli.document.unwrap_or_else(|| config.document_path());
    let mut store = EntityStore::load(&path)
        .with_context(|| format!("loading fixture document {}", path.display()))?;

    let mut summary = Pipeline::repair().run(&mut store, &config, &SynthesisContext::now());

    if cli.diff {
        print!("{}", render_diff(&path, store.document())?);
    }

    persist_if_enabled(&store, &config, &mut summary).context("serializing fixture document")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(summary.exit_code());
    }

    println!("🔍 Fixture repair: {:?}", path);
    println!();

    if let Some(repair) = &summary.repair {
        if repair.collisions.is_empty() {
            println!("✅ No node/service ID collisions");
        } else {
            println!("🔧 {} collision(s) repaired:", repair.collisions.len());
            for collision in &repair.collisions {
                println!("   {} -> {}", collision.old_id, collision.new_id);
            }
            for update in &repair.updated {
                println!("   └─ {}: {} position(s)", update.kind, update.count);
            }
        }
        if repair.backfilled > 0 {
            println!("➕ {} task(s) found only in groupings added to the task list", repair.backfilled);
        }
        for stub in &repair.stubs {
            println!("➕ Stub service added: {}", stub);
        }
    }

    for rename in &summary.duplicates_renamed {
        println!("🔧 Duplicate task {} renamed to {}", rename.from, rename.to);
    }

    let warnings: Vec<_> = summary.diagnostics.warnings().collect();
    if warnings.is_empty() {
        println!("✅ All references resolve");
    } else {
        println!();
        println!("⚠️  {} unresolved reference(s):", warnings.len());
        for warning in warnings {
            println!("   {}", warning);
        }
    }

    if let Some(persisted) = &summary.persisted {
        println!();
        println!("💾 Written to {:?} ({} bytes)", persisted.path, persisted.bytes);
    }
    for error in summary.diagnostics.errors() {
        println!("❌ {}", error);
    }

    Ok(summary.exit_code())
}
