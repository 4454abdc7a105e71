//! Fixture Config CLI
//!
//! Shows, initializes and validates the engine configuration.

use clap::{Parser, Subcommand};
use std::path::Path;
use swarm_fixtures::FixtureConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fixture-config")]
#[command(about = "Inspect and manage fixture engine configuration")]
struct Cli {
    /// Config file layered over the default locations
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration as TOML
    Show,

    /// Write a default configuration file
    Init {
        #[arg(default_value = "fixtures.toml")]
        path: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Check the effective configuration
    Validate,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Show => {
            let config = FixtureConfig::load_from(cli.config.as_deref())?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }

        Commands::Init { path, force } => {
            if Path::new(&path).exists() && !force {
                return Err(format!("{} already exists (use --force to overwrite)", path).into());
            }
            FixtureConfig::default().save(&path)?;
            println!("✅ Wrote default configuration to {}", path);
            Ok(())
        }

        Commands::Validate => {
            let config = FixtureConfig::load_from(cli.config.as_deref())?;
            config.validate()?;

            let document = config.document_path();
            if document.exists() {
                println!("✅ Configuration valid; document at {:?}", document);
            } else {
                println!("✅ Configuration valid");
                println!("⚠️  Document {:?} does not exist yet", document);
            }
            Ok(())
        }
    }
}
