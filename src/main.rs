use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use env_logger::Env;
use ml_predator_prey::config::{Config, Goal};
use ml_predator_prey::modes::TrainingLoop;
use ml_predator_prey::rl::{TrainingBackend, default_device};

#[derive(Parser)]
#[command(name = "ml_predator_prey")]
#[command(version, about = "Grid predator-prey simulation with actor-critic agents")]
struct Cli {
    /// Run configuration (TOML)
    #[arg(long, default_value = "configs/default.toml")]
    config: PathBuf,

    /// Override sim.goal
    #[arg(long)]
    goal: Option<GoalArg>,

    /// Override sim.episodes
    #[arg(long)]
    episodes: Option<usize>,

    /// Override sim.steps
    #[arg(long)]
    steps: Option<usize>,

    /// Override sim.seed
    #[arg(long)]
    seed: Option<u64>,

    /// Checkpoint directory to resume from
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Log progress every N episodes
    #[arg(long, default_value = "10")]
    log_every: usize,
}

#[derive(Clone, ValueEnum)]
enum GoalArg {
    /// Update both policies after every episode
    Training,
    /// Run frozen policies
    Testing,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration {:?}", cli.config))?;

    if let Some(goal) = cli.goal {
        config.sim.goal = match goal {
            GoalArg::Training => Goal::Training,
            GoalArg::Testing => Goal::Testing,
        };
    }
    if let Some(episodes) = cli.episodes {
        config.sim.episodes = episodes;
    }
    if let Some(steps) = cli.steps {
        config.sim.steps = steps;
    }
    if let Some(seed) = cli.seed {
        config.sim.seed = seed;
    }
    if cli.resume.is_some() {
        config.sim.resume_state_from = cli.resume;
    }
    config.validate().context("Invalid command line overrides")?;

    let mut training = TrainingLoop::<TrainingBackend>::new(config, default_device())?
        .with_log_every(cli.log_every);
    training.run()?;

    Ok(())
}
