//! Fixture Synthesis CLI
//!
//! Loads a fixture document, ensures the synthetic services and their tasks
//! exist, resyncs the views and optionally writes the result back.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use swarm_fixtures::persist::render_diff;
use swarm_fixtures::pipeline::persist_if_enabled;
use swarm_fixtures::{EntityStore, FixtureConfig, Pipeline, SynthesisContext};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fixture-synth")]
#[command(about = "Synthesize services and tasks into a fixture document")]
struct Cli {
    /// Fixture document (defaults to document.path from the config)
    #[arg(short, long)]
    document: Option<PathBuf>,

    /// Config file layered over the default locations
    #[arg(short, long)]
    config: Option<String>,

    /// Number of gensvc services to ensure
    #[arg(short, long)]
    services: Option<usize>,

    /// Run the repair stages after synthesis
    #[arg(long)]
    repair: bool,

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
    if let Some(count) = cli.services {
        config.synthesis.service_count = count;
        config.synthesis.task_services = config.synthesis.task_services.min(count);
    }
    config.validate().map_err(anyhow::Error::msg)?;

    let path = cli.document.unwrap_or_else(|| config.document_path());
    let mut store = EntityStore::load(&path)
        .with_context(|| format!("loading fixture document {}", path.display()))?;

    let pipeline = if cli.repair {
        Pipeline::full()
    } else {
        Pipeline::synthesis()
    };
    let ctx = SynthesisContext::now();
    let mut summary = pipeline.run(&mut store, &config, &ctx);

    if cli.diff {
        let diff = render_diff(&path, store.document())?;
        if diff.is_empty() {
            println!("No changes");
        } else {
            print!("{}", diff);
        }
    }

    persist_if_enabled(&store, &config, &mut summary).context("serializing fixture document")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("📦 Fixture synthesis: {:?}", path);
        println!();
        print!("{}", summary);
        if summary.degraded {
            println!("⚠️  Write-back failed; see diagnostics above");
        } else if summary.persisted.is_none() {
            println!("ℹ️  Document not written (use --write to persist)");
        }
    }

    Ok(summary.exit_code())
}
