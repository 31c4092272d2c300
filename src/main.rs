use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use hyphal_growth::api::{run_server, ApiState};
use hyphal_growth::config::SimulationConfig;
use hyphal_growth::persist;
use hyphal_growth::simulation::Simulation;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML or JSON). If not specified, searches for config.yaml, config.yml, or config.json in current directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of steps to run before reporting
    #[arg(short, long, default_value_t = 100)]
    steps: u64,

    /// RNG seed; overrides the configured one
    #[arg(long)]
    seed: Option<u64>,

    /// Resume from a network saved with --save instead of seeding at the origin
    #[arg(long)]
    load: Option<PathBuf>,

    /// Write the grown network as JSON
    #[arg(long)]
    save: Option<PathBuf>,

    /// Serve the headless HTTP API on this port after the run
    #[arg(long)]
    serve: Option<u16>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Load configuration from file or the default search paths
fn load_config(config_path: Option<&PathBuf>) -> Result<SimulationConfig> {
    match config_path {
        Some(path) => SimulationConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => SimulationConfig::from_default_paths().context("failed to load default config"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut sim = match &args.load {
        Some(path) => persist::load_json(path)
            .with_context(|| format!("failed to load network from {}", path.display()))?,
        None => Simulation::with_config(load_config(args.config.as_ref())?)?,
    };
    let seed = args.seed.unwrap_or(sim.config.seed);
    let mut rng = StdRng::seed_from_u64(seed);
    if sim.segments.is_empty() {
        sim.seed_at_origin(&mut rng);
    }

    let summary = sim.run(args.steps, &mut rng);
    let stats = summary.stats;
    tracing::info!(
        seed,
        steps = summary.steps_run,
        stopped_early = summary.stopped_early,
        time = stats.time,
        segments = stats.segments,
        live_tips = stats.live_tips,
        dead = stats.dead,
        biomass = stats.biomass,
        "run finished"
    );

    if let Some(path) = &args.save {
        persist::save_json(&sim, path)
            .with_context(|| format!("failed to save network to {}", path.display()))?;
    }

    if let Some(port) = args.serve {
        run_server(ApiState::with_rng(sim, rng), port).await?;
    }

    Ok(())
}
