use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use selfdrive_sim::{NeuralNetwork, Simulation, SimulationConfig};

/// Evolves car controllers without drawing anything.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML file with the simulation configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Number of generations to run.
    #[arg(short, long, default_value_t = 10)]
    generations: usize,
    /// Number of ticks per generation.
    #[arg(short, long, default_value_t = 2000)]
    ticks: usize,
    /// Overrides the configured cohort size.
    #[arg(long)]
    cars: Option<usize>,
    /// Overrides the configured mutation rate.
    #[arg(long)]
    mutation_rate: Option<f64>,
    /// Overrides the configured seed.
    #[arg(long)]
    seed: Option<u64>,
    /// JSON controller to seed the first generation with.
    #[arg(long)]
    load: Option<PathBuf>,
    /// Where to write the best controller as JSON.
    #[arg(long)]
    save: Option<PathBuf>,
}

fn load_config(args: &Args) -> anyhow::Result<SimulationConfig> {
    let mut config: SimulationConfig = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => SimulationConfig::default(),
    };
    if let Some(cars) = args.cars {
        config.population.cohort_size = cars;
    }
    if let Some(rate) = args.mutation_rate {
        anyhow::ensure!((0.0..=1.0).contains(&rate), "mutation rate must be within [0, 1]");
        config.population.mutation_rate = rate;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    log::debug!("Loaded config: {:#?}", config);
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args)?;
    let cohort_size = config.population.cohort_size;
    let mutation_rate = config.population.mutation_rate;
    let mut sim = Simulation::new(config).context("invalid configuration")?;

    let base = match &args.load {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let network = NeuralNetwork::from_json(&json)
                .with_context(|| format!("loading controller from {}", path.display()))?;
            log::info!("Seeding from controller {:?}", network.topology());
            Some(network)
        }
        None => None,
    };
    sim.spawn_cohort(cohort_size, base.as_ref(), mutation_rate)?;

    for generation in 0..args.generations {
        if generation > 0 {
            sim.next_generation(cohort_size)?;
        }
        let start = Instant::now();
        for _ in 0..args.ticks {
            sim.step();
        }
        let frame = start.elapsed() / args.ticks.max(1) as u32;
        println!(
            "Generation {}: best progress {:.1}, {} cars left, avg. frame {:?}",
            sim.generation(),
            sim.reference_progress().unwrap_or(0.0),
            sim.car_count(),
            frame,
        );
    }

    if let Some(path) = &args.save {
        let network = sim
            .best_network()
            .context("no controller survived to be saved")?;
        std::fs::write(path, network.to_json()?)
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("Saved best controller to {}", path.display());
    }
    Ok(())
}
