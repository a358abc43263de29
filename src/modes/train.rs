//! Training loop
//!
//! Runs `sim.episodes` episodes on freshly initialised grids, updating both
//! species' policies after each episode when training. The simulation-wide
//! generation counter and the random stream carry over from one episode to the
//! next, and both are part of every checkpoint.
//!
//! # Example
//!
//! ```rust,ignore
//! use ml_predator_prey::config::Config;
//! use ml_predator_prey::modes::TrainingLoop;
//! use ml_predator_prey::rl::{default_device, TrainingBackend};
//!
//! let config = Config::load("configs/default.toml".as_ref())?;
//! let mut training = TrainingLoop::<TrainingBackend>::new(config, default_device())?;
//! training.run()?;
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use super::episode::{CancelToken, EpisodeController, EpisodeObserver, EpisodeReport, Termination};
use crate::config::{Config, Goal};
use crate::metrics::{MetricsLog, TrainingStats};
use crate::rl::{ActorCriticPolicy, AgentPolicy, PolicyMetadata, PolicyPair, load_policy, save_policy};
use crate::rng::{SimRng, create_rng};
use crate::sim::{GridState, Species, SpeciesPair, StepEngine};

/// File holding the simulation part of a checkpoint
pub const STATE_FILE: &str = "state.json";

/// Checkpoint format version
const SNAPSHOT_VERSION: u32 = 1;

/// Simulation state written next to the policy files of a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub version: u32,
    /// First episode the resumed run executes
    pub next_episode: usize,
    pub generation: u64,
    /// Grid at the end of the last completed episode
    pub grid: Option<GridState>,
    pub rng: SimRng,
    pub policies: SpeciesPair<PolicyMetadata>,
}

impl SimulationSnapshot {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(STATE_FILE);
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read checkpoint state {:?}", path))?;
        let snapshot: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse checkpoint state {:?}", path))?;
        if snapshot.version != SNAPSHOT_VERSION {
            bail!(
                "Checkpoint {:?} has version {}, expected {}",
                path,
                snapshot.version,
                SNAPSHOT_VERSION
            );
        }
        Ok(snapshot)
    }
}

/// Location of a species' policy inside a checkpoint directory
pub fn policy_path(dir: &Path, species: Species) -> PathBuf {
    dir.join(species.name())
}

/// Training loop over both species
///
/// # Type Parameters
///
/// * `B` - Autodiff backend the policies train on
pub struct TrainingLoop<B: AutodiffBackend> {
    config: Config,

    controller: EpisodeController,

    policies: PolicyPair<ActorCriticPolicy<B>>,

    rng: SimRng,

    /// Rolling statistics for progress logging
    stats: TrainingStats,

    metrics: MetricsLog,

    next_episode: usize,

    generation: u64,

    last_grid: Option<GridState>,

    /// Log progress every N episodes
    log_every: usize,

    checkpoints_written: usize,
}

impl<B: AutodiffBackend> TrainingLoop<B> {
    /// Build a run from a validated configuration
    ///
    /// Resumes from `sim.resume_state_from` when it is set; any failure to do so
    /// is returned as an error.
    pub fn new(config: Config, device: B::Device) -> Result<Self> {
        let goal = config.sim.goal;
        let input_dim = config.model.observation_size();

        B::seed(config.sim.seed);
        let build = |species| {
            ActorCriticPolicy::<B>::new(species, input_dim, config.network.clone(), goal, device.clone())
        };
        let mut policies = SpeciesPair::new(build(Species::Predator), build(Species::Prey));
        let mut rng = create_rng(config.sim.seed);
        let mut next_episode = 0;
        let mut generation = 0;
        let mut last_grid = None;

        if let Some(dir) = &config.sim.resume_state_from {
            let snapshot = SimulationSnapshot::load(dir)
                .with_context(|| format!("Failed to resume from {:?}", dir))?;
            for species in Species::ALL {
                let (policy, _) = load_policy::<B>(&policy_path(dir, species), species, input_dim, goal, &device)
                    .with_context(|| format!("Failed to resume {} policy from {:?}", species, dir))?;
                *policies.get_mut(species) = policy;
            }
            rng = snapshot.rng;
            next_episode = snapshot.next_episode;
            generation = snapshot.generation;
            last_grid = snapshot.grid;
            log::info!(
                "Resumed from {:?} at episode {} (generation {})",
                dir,
                next_episode,
                generation
            );
        }

        let metrics = match &config.sim.metrics_path {
            Some(path) => MetricsLog::open(path)?,
            None => MetricsLog::in_memory(),
        };

        let controller = EpisodeController::new(
            StepEngine::new(config.model.clone()),
            config.sim.clone(),
            config.plot.clone(),
        );

        Ok(Self {
            config,
            controller,
            policies,
            rng,
            stats: TrainingStats::new(100),
            metrics,
            next_episode,
            generation,
            last_grid,
            log_every: 10,
            checkpoints_written: 0,
        })
    }

    pub fn with_log_every(mut self, log_every: usize) -> Self {
        self.log_every = log_every.max(1);
        self
    }

    pub fn add_observer(&mut self, observer: Box<dyn EpisodeObserver>) {
        self.controller.add_observer(observer);
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.controller.cancel_token()
    }

    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    pub fn metrics(&self) -> &MetricsLog {
        &self.metrics
    }

    pub fn policy(&self, species: Species) -> &ActorCriticPolicy<B> {
        self.policies.get(species)
    }

    pub fn next_episode(&self) -> usize {
        self.next_episode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Checkpoints written by this run
    pub fn checkpoints_written(&self) -> usize {
        self.checkpoints_written
    }

    /// Run the remaining episodes
    ///
    /// `sim.episodes` counts episodes over the whole run, resumed ones included.
    pub fn run(&mut self) -> Result<()> {
        self.log_header();
        let mut checkpoint_current = false;

        while self.next_episode < self.config.sim.episodes {
            let report = self.run_episode()?;

            if (report.episode + 1) % self.log_every == 0 {
                log::info!(
                    "[Episode {}/{}] {}",
                    report.episode + 1,
                    self.config.sim.episodes,
                    self.stats.format_summary()
                );
            }

            checkpoint_current = report.checkpoint_due;
            if checkpoint_current {
                self.save_checkpoint()?;
            }

            if report.termination == Termination::Cancelled || self.cancel_token().is_cancelled() {
                log::warn!("Run cancelled after episode {}", report.episode);
                break;
            }
        }

        if !checkpoint_current {
            self.save_checkpoint()?;
        }

        log::info!("Run finished: {}", self.stats.format_summary());
        Ok(())
    }

    /// Run one episode and, when training, update both policies
    fn run_episode(&mut self) -> Result<EpisodeReport> {
        let episode = self.next_episode;

        let mut grid = GridState::initialize(&self.config.model, &mut self.rng);
        grid.set_generation(self.generation);

        let outcome = self.controller.run(
            episode,
            &mut grid,
            &self.policies,
            &mut self.rng,
            &mut self.metrics,
        )?;

        if let Some(trajectories) = &outcome.trajectories {
            let gamma = self.config.network.gamma;
            for species in Species::ALL {
                let update = self
                    .policies
                    .get_mut(species)
                    .update(trajectories.get(species), gamma)
                    .with_context(|| {
                        format!("Policy update failed in episode {} for {}", episode, species)
                    })?;
                if update.samples > 0 {
                    self.stats.record_update(species, &update);
                }
            }
        }

        self.stats.record_episode(&outcome.report);
        self.generation = grid.generation();
        self.last_grid = Some(grid);
        self.next_episode = episode + 1;

        Ok(outcome.report)
    }

    /// Write a checkpoint to `sim.save_state_to`, if set
    pub fn save_checkpoint(&mut self) -> Result<()> {
        let Some(dir) = &self.config.sim.save_state_to else {
            return Ok(());
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {:?}", dir))?;

        for species in Species::ALL {
            save_policy(self.policies.get(species), &policy_path(dir, species))
                .with_context(|| format!("Failed to save checkpoint to {:?}", dir))?;
        }

        let snapshot = SimulationSnapshot {
            version: SNAPSHOT_VERSION,
            next_episode: self.next_episode,
            generation: self.generation,
            grid: self.last_grid.clone(),
            rng: self.rng.clone(),
            policies: SpeciesPair::new(
                PolicyMetadata::of(self.policies.get(Species::Predator)),
                PolicyMetadata::of(self.policies.get(Species::Prey)),
            ),
        };
        let path = dir.join(STATE_FILE);
        let json = serde_json::to_string_pretty(&snapshot).context("Failed to serialize checkpoint")?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))?;

        self.checkpoints_written += 1;
        log::info!("Checkpoint saved: {:?} (next episode {})", dir, self.next_episode);
        Ok(())
    }

    fn log_header(&self) {
        let model = &self.config.model;
        let goal = match self.config.sim.goal {
            Goal::Training => "training",
            Goal::Testing => "testing",
        };
        log::info!(
            "Predator-prey {} run: {}x{} grid, episodes {}..{}, {} steps each, seed {}",
            goal,
            model.rows(),
            model.cols(),
            self.next_episode,
            self.config.sim.episodes,
            self.config.sim.steps,
            self.config.sim.seed
        );
        log::info!(
            "Network: hidden {:?} ({:?}), lr {}, gamma {}",
            self.config.network.layers.hidden,
            self.config.network.mode,
            self.config.network.learning_rate,
            self.config.network.gamma
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::read_records;
    use crate::rl::{TrainingBackend, default_device};
    use crate::sim::ModelConfig;
    use tempfile::TempDir;

    fn small_config(episodes: usize) -> Config {
        let mut config = Config {
            model: ModelConfig {
                densities: SpeciesPair::new(0.1, 0.3),
                ..ModelConfig::new(5, 5)
            },
            ..Default::default()
        };
        config.sim.episodes = episodes;
        config.sim.steps = 6;
        config.sim.seed = 5;
        config.network.layers.hidden = vec![16];
        config
    }

    #[test]
    fn test_short_training_run() {
        let dir = TempDir::new().unwrap();
        let mut config = small_config(3);
        config.sim.save_state_to = Some(dir.path().join("ckpt"));
        config.sim.metrics_path = Some(dir.path().join("metrics.jsonl"));

        let mut training = TrainingLoop::<TrainingBackend>::new(config, default_device()).unwrap();
        training.run().unwrap();

        assert_eq!(training.next_episode(), 3);
        assert_eq!(training.stats().total_episodes(), 3);
        assert!(training.policy(Species::Prey).training_step() > 0);

        let snapshot = SimulationSnapshot::load(&dir.path().join("ckpt")).unwrap();
        assert_eq!(snapshot.next_episode, 3);
        assert_eq!(snapshot.generation, training.generation());
        assert!(snapshot.grid.is_some());

        let records = read_records(&dir.path().join("metrics.jsonl")).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].generation.is_some());
    }

    #[test]
    fn test_testing_goal_leaves_policies_alone() {
        let mut config = small_config(2);
        config.sim.goal = Goal::Testing;

        let mut training = TrainingLoop::<TrainingBackend>::new(config, default_device()).unwrap();
        training.run().unwrap();

        assert_eq!(training.stats().total_episodes(), 2);
        for species in Species::ALL {
            assert_eq!(training.policy(species).training_step(), 0);
            assert!(training.policy(species).last_trajectory().is_none());
        }
    }

    #[test]
    fn test_missing_resume_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut config = small_config(1);
        config.sim.resume_state_from = Some(dir.path().join("nowhere"));

        assert!(TrainingLoop::<TrainingBackend>::new(config, default_device()).is_err());
    }

    #[test]
    fn test_resume_continues_run() {
        let dir = TempDir::new().unwrap();
        let ckpt = dir.path().join("ckpt");

        let mut first = small_config(2);
        first.sim.save_state_to = Some(ckpt.clone());
        let mut training = TrainingLoop::<TrainingBackend>::new(first, default_device()).unwrap();
        training.run().unwrap();
        let steps_done = training.policy(Species::Predator).training_step();

        let mut second = small_config(4);
        second.sim.resume_state_from = Some(ckpt.clone());
        let mut resumed = TrainingLoop::<TrainingBackend>::new(second, default_device()).unwrap();
        assert_eq!(resumed.next_episode(), 2);
        assert_eq!(resumed.generation(), training.generation());
        assert_eq!(resumed.policy(Species::Predator).training_step(), steps_done);

        resumed.run().unwrap();
        assert_eq!(resumed.next_episode(), 4);
        assert_eq!(resumed.stats().total_episodes(), 2);
    }

    #[test]
    fn test_cancelled_run_stops_early() {
        let mut config = small_config(5);
        config.sim.steps = 3;
        let mut training = TrainingLoop::<TrainingBackend>::new(config, default_device()).unwrap();
        training.cancel_token().cancel();

        training.run().unwrap();
        assert_eq!(training.next_episode(), 1);
    }

    #[test]
    fn test_failed_update_halts_run() {
        let mut config = small_config(3);
        let rewards = &mut config.model.rewards;
        rewards.wrong_action = f32::MAX;
        rewards.default_prey = Some(f32::MAX);
        rewards.default_predator = Some(f32::MAX);
        rewards.indifferent = f32::MAX;
        rewards.successful_predator = f32::MAX;
        rewards.offspring = f32::MAX;
        rewards.death_starvation = f32::MAX;
        rewards.death_prey = f32::MAX;
        rewards.default = f32::MAX;
        rewards.instadeath = f32::MAX;

        let mut training = TrainingLoop::<TrainingBackend>::new(config, default_device()).unwrap();
        let err = training.run().unwrap_err();
        let message = format!("{:#}", err);

        assert!(message.contains("episode 0"), "{}", message);
        assert!(
            message.contains("for predator") || message.contains("for prey"),
            "{}",
            message
        );
        assert!(message.contains("non-finite"), "{}", message);
        assert_eq!(training.next_episode(), 0);
        assert_eq!(training.stats().total_episodes(), 0);
    }

    #[test]
    fn test_final_checkpoint_not_repeated() {
        let dir = TempDir::new().unwrap();

        let mut config = small_config(4);
        config.sim.save_state_to = Some(dir.path().join("even"));
        config.sim.save_state_every = Some(2);
        let mut training = TrainingLoop::<TrainingBackend>::new(config, default_device()).unwrap();
        training.run().unwrap();
        // After episodes 2 and 4, the last one doubling as the final save
        assert_eq!(training.checkpoints_written(), 2);

        let mut config = small_config(3);
        config.sim.save_state_to = Some(dir.path().join("odd"));
        config.sim.save_state_every = Some(2);
        let mut training = TrainingLoop::<TrainingBackend>::new(config, default_device()).unwrap();
        training.run().unwrap();
        assert_eq!(training.checkpoints_written(), 2);
        assert_eq!(SimulationSnapshot::load(&dir.path().join("odd")).unwrap().next_episode, 3);
    }
}
