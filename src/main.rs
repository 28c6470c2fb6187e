use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;

use composite_rs::composite::{CompositeEngine, RequestLoader};
use composite_rs::config::EngineConfig;
use composite_rs::platform::PlatformCollaborators;
use composite_rs::server::{self, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine config file (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a composite graph file
    Validate {
        /// Path to the graph or run request file
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Run a composite strategy request
    Run {
        /// Path to the run request file
        #[arg(short, long)]
        file: PathBuf,

        /// Override the per-run AI call budget
        #[arg(long)]
        max_ai_calls: Option<usize>,
    },
    /// List registered local strategies
    Strategies,
    /// Serve the HTTP API
    Serve {
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.apply_env().context("Invalid environment override")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let mut config = load_config(args.config.as_ref())?;

    match args.command {
        Commands::Validate { file } => {
            let raw = RequestLoader::new()
                .load_graph(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let platform = PlatformCollaborators::new(&config);
            let engine = CompositeEngine::new(Arc::new(platform));

            let result = engine.validate(&raw).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.valid {
                std::process::exit(1);
            }
        }
        Commands::Run { file, max_ai_calls } => {
            if let Some(max) = max_ai_calls {
                config.max_ai_calls_per_run = max;
            }
            let request = RequestLoader::new()
                .load_request(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let platform = PlatformCollaborators::from_config(&config);
            let engine =
                CompositeEngine::new(Arc::new(platform)).with_options(config.run_options());

            log::info!("Running composite: {}", request.composite_id);
            let result = engine
                .run(&request)
                .await
                .with_context(|| format!("Composite {} failed", request.composite_id))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Strategies => {
            let platform = PlatformCollaborators::new(&config);
            for item in platform.runner().registry().list().await {
                println!("{} ({}) v{}", item.strategy_type, item.name, item.version);
            }
            for instance in platform.runner().instances() {
                println!(
                    "  instance {} -> {}{}",
                    instance.id,
                    instance.strategy_type,
                    if instance.enabled { "" } else { " [disabled]" }
                );
            }
        }
        Commands::Serve { port } => {
            let platform = PlatformCollaborators::from_config(&config);
            let runner = platform.runner().clone();
            let engine =
                CompositeEngine::new(Arc::new(platform)).with_options(config.run_options());
            server::serve(port, AppState::new(engine, runner)).await?;
        }
    }

    Ok(())
}
