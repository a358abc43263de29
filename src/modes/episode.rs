//! Episode controller
//!
//! Drives the step engine for up to `sim.steps` timesteps, turning the step
//! reports into per-species trajectories and an [`EpisodeReport`]. Side effects
//! (metrics, plot observers) only happen once the episode has ended.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use rand::Rng;

use crate::config::{Goal, PlotConfig, SimConfig};
use crate::metrics::{MetricsLog, MetricsRecord};
use crate::rl::{AgentPolicy, PolicyPair, Trajectory, Transition, create_observation};
use crate::sim::{GridState, Species, SpeciesPair, StepEngine};

/// Why an episode stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// `sim.steps` timesteps were simulated
    StepLimit,
    /// A species present at the start died out
    Extinction(Species),
    /// No agent left on the grid
    Empty,
    /// Cancellation was requested
    Cancelled,
}

/// Summary of one finished episode
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeReport {
    /// 0-based episode index over the whole run
    pub episode: usize,
    /// Timesteps simulated
    pub steps: usize,
    /// Total reward collected by each species
    pub rewards: SpeciesPair<f32>,
    /// Populations at the end of the episode
    pub populations: SpeciesPair<usize>,
    /// Simulation-wide generation counter at the end of the episode
    pub generation: u64,
    pub births: usize,
    pub deaths: usize,
    pub termination: Termination,
    /// A checkpoint should be written after this episode
    pub checkpoint_due: bool,
}

/// Cooperative cancellation flag, checked between timesteps
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Hook invoked at the `plot.every` cadence
///
/// Rendering is left entirely to the implementor.
pub trait EpisodeObserver {
    fn on_episode(&mut self, report: &EpisodeReport, grid: &GridState, plot: &PlotConfig) -> Result<()>;
}

/// Everything an episode produced
#[derive(Debug, Clone)]
pub struct EpisodeOutcome {
    pub report: EpisodeReport,
    /// Collected trajectories; `None` when testing
    pub trajectories: Option<SpeciesPair<Trajectory>>,
}

pub struct EpisodeController {
    engine: StepEngine,
    sim: SimConfig,
    plot: PlotConfig,
    observers: Vec<Box<dyn EpisodeObserver>>,
    cancel: CancelToken,
}

impl EpisodeController {
    pub fn new(engine: StepEngine, sim: SimConfig, plot: PlotConfig) -> Self {
        Self {
            engine,
            sim,
            plot,
            observers: Vec::new(),
            cancel: CancelToken::new(),
        }
    }

    pub fn engine(&self) -> &StepEngine {
        &self.engine
    }

    pub fn sim(&self) -> &SimConfig {
        &self.sim
    }

    /// Token that stops the current and every later episode
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn add_observer(&mut self, observer: Box<dyn EpisodeObserver>) {
        self.observers.push(observer);
    }

    /// Whether a checkpoint is due after the given (0-based) episode
    pub fn checkpoint_due(&self, episode: usize) -> bool {
        self.sim
            .save_state_every
            .is_some_and(|every| every > 0 && (episode + 1) % every == 0)
    }

    /// Run one episode on `grid`
    ///
    /// The in-flight timestep always completes before a stop condition is
    /// checked. Trajectories are collected only when the goal is training; the
    /// agents still alive at the end get a bootstrap value from their policy.
    pub fn run<P, R>(
        &mut self,
        episode: usize,
        grid: &mut GridState,
        policies: &PolicyPair<P>,
        rng: &mut R,
        metrics: &mut MetricsLog,
    ) -> Result<EpisodeOutcome>
    where
        P: AgentPolicy,
        R: Rng + ?Sized,
    {
        let collect = self.sim.goal == Goal::Training;
        let mut trajectories = SpeciesPair::new(
            Trajectory::new(Species::Predator),
            Trajectory::new(Species::Prey),
        );

        let present = grid.populations().map(|_, count| count > 0);
        let mut rewards = SpeciesPair::<f32>::default();
        let mut births = 0;
        let mut deaths = 0;
        let mut steps = 0;
        let mut termination = Termination::StepLimit;

        if grid.is_empty() {
            termination = Termination::Empty;
        }

        while termination == Termination::StepLimit && steps < self.sim.steps {
            let report = self
                .engine
                .step(grid, policies, rng)
                .with_context(|| format!("Episode {} failed at timestep {}", episode, steps))?;
            steps += 1;
            births += report.births.len();
            deaths += report.deaths();

            for record in report.records {
                *rewards.get_mut(record.species) += record.reward;
                if !collect {
                    continue;
                }
                let trajectory = trajectories.get_mut(record.species);
                match record.decision {
                    Some(decision) => trajectory.push(
                        record.id,
                        Transition {
                            observation: decision.observation.into_inner(),
                            action: decision.action_index,
                            log_prob: decision.log_prob,
                            value: decision.value,
                            reward: record.reward,
                            done: record.done,
                        },
                    ),
                    None => {
                        trajectory.terminate_last(record.id, record.reward);
                    }
                }
            }

            termination = self.stop_condition(grid, &present);
        }

        if collect {
            for species in Species::ALL {
                let trajectory = trajectories.get_mut(species);
                let policy = policies.get(species);
                for id in trajectory.open_agents() {
                    if !grid.contains(id) {
                        continue;
                    }
                    let observation = create_observation(grid, id, self.engine.config())?;
                    let value = policy
                        .evaluate(&observation)
                        .with_context(|| format!("Failed to bootstrap {} value", species))?;
                    trajectory.set_bootstrap(id, value);
                }
            }
        }

        let report = EpisodeReport {
            episode,
            steps,
            rewards,
            populations: grid.populations(),
            generation: grid.generation(),
            births,
            deaths,
            termination,
            checkpoint_due: self.checkpoint_due(episode),
        };

        log::debug!(
            "Episode {} ended after {} steps ({:?}), populations {}/{}",
            episode,
            steps,
            termination,
            report.populations.predator,
            report.populations.prey
        );

        metrics.append(MetricsRecord::from_report(&report, &self.sim.record_values))?;

        if self.plot.is_due(episode) {
            for observer in &mut self.observers {
                observer.on_episode(&report, grid, &self.plot)?;
            }
        }

        Ok(EpisodeOutcome {
            report,
            trajectories: collect.then_some(trajectories),
        })
    }

    fn stop_condition(&self, grid: &GridState, present: &SpeciesPair<bool>) -> Termination {
        if grid.is_empty() {
            return Termination::Empty;
        }
        if let Some(species) = Species::ALL
            .into_iter()
            .find(|&s| *present.get(s) && grid.population(s) == 0)
        {
            return Termination::Extinction(species);
        }
        if self.cancel.is_cancelled() {
            return Termination::Cancelled;
        }
        Termination::StepLimit
    }
}
