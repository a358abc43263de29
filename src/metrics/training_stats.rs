//! Rolling training statistics
//!
//! Tracks per-species episode rewards, populations and update losses over a
//! rolling window, for periodic progress logging.

use std::collections::VecDeque;

use crate::modes::EpisodeReport;
use crate::rl::UpdateStats;
use crate::sim::{Species, SpeciesPair};

/// Rolling windows of one species
#[derive(Debug, Clone, Default)]
struct SpeciesWindows {
    rewards: VecDeque<f32>,
    populations: VecDeque<usize>,
    policy_losses: VecDeque<f32>,
    value_losses: VecDeque<f32>,
    entropies: VecDeque<f32>,
}

/// Training statistics tracker with rolling averages
///
/// # Example
///
/// ```rust
/// use ml_predator_prey::metrics::TrainingStats;
/// use ml_predator_prey::rl::UpdateStats;
/// use ml_predator_prey::sim::Species;
///
/// let mut stats = TrainingStats::new(100);
/// stats.record_update(Species::Prey, &UpdateStats { policy_loss: 0.02, ..Default::default() });
///
/// assert!((stats.mean_policy_loss(Species::Prey) - 0.02).abs() < 1e-6);
/// println!("{}", stats.format_summary());
/// ```
#[derive(Debug, Clone)]
pub struct TrainingStats {
    species: SpeciesPair<SpeciesWindows>,

    /// Episode lengths in timesteps (rolling window)
    episode_lengths: VecDeque<usize>,

    /// Simulation-wide generation counter after the last episode
    generation: u64,

    /// Total number of episodes completed
    total_episodes: usize,

    /// Total number of timesteps simulated
    total_steps: usize,

    /// Window size for rolling averages
    window_size: usize,
}

impl TrainingStats {
    /// Create a tracker keeping the last `window_size` values of everything
    pub fn new(window_size: usize) -> Self {
        Self {
            species: SpeciesPair::default(),
            episode_lengths: VecDeque::with_capacity(window_size),
            generation: 0,
            total_episodes: 0,
            total_steps: 0,
            window_size,
        }
    }

    /// Record the completion of an episode
    pub fn record_episode(&mut self, report: &EpisodeReport) {
        for species in Species::ALL {
            let windows = self.species.get_mut(species);
            Self::push_deque(&mut windows.rewards, *report.rewards.get(species), self.window_size);
            Self::push_deque(
                &mut windows.populations,
                *report.populations.get(species),
                self.window_size,
            );
        }
        Self::push_deque(&mut self.episode_lengths, report.steps, self.window_size);
        self.generation = report.generation;
        self.total_episodes += 1;
        self.total_steps += report.steps;
    }

    /// Record one species' policy update
    pub fn record_update(&mut self, species: Species, update: &UpdateStats) {
        let windows = self.species.get_mut(species);
        Self::push_deque(&mut windows.policy_losses, update.policy_loss, self.window_size);
        Self::push_deque(&mut windows.value_losses, update.value_loss, self.window_size);
        Self::push_deque(&mut windows.entropies, update.entropy, self.window_size);
    }

    /// Mean total episode reward of a species, 0.0 before the first episode
    pub fn mean_episode_reward(&self, species: Species) -> f32 {
        Self::mean(&self.species.get(species).rewards)
    }

    /// Mean population at episode end
    pub fn mean_population(&self, species: Species) -> f32 {
        Self::mean_count(&self.species.get(species).populations)
    }

    pub fn mean_episode_length(&self) -> f32 {
        Self::mean_count(&self.episode_lengths)
    }

    pub fn mean_policy_loss(&self, species: Species) -> f32 {
        Self::mean(&self.species.get(species).policy_losses)
    }

    pub fn mean_value_loss(&self, species: Species) -> f32 {
        Self::mean(&self.species.get(species).value_losses)
    }

    pub fn mean_entropy(&self, species: Species) -> f32 {
        Self::mean(&self.species.get(species).entropies)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn total_episodes(&self) -> usize {
        self.total_episodes
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// One-line summary of the current statistics
    pub fn format_summary(&self) -> String {
        let species: Vec<String> = Species::ALL
            .iter()
            .map(|&s| {
                format!(
                    "{}: reward {:.2} pop {:.1} p_loss {:.4} v_loss {:.4} entropy {:.4}",
                    s,
                    self.mean_episode_reward(s),
                    self.mean_population(s),
                    self.mean_policy_loss(s),
                    self.mean_value_loss(s),
                    self.mean_entropy(s),
                )
            })
            .collect();

        format!(
            "Episodes: {} | Steps: {} | Len: {:.1} | Generation: {} | {}",
            self.total_episodes,
            self.total_steps,
            self.mean_episode_length(),
            self.generation,
            species.join(" | "),
        )
    }

    fn mean(deque: &VecDeque<f32>) -> f32 {
        if deque.is_empty() {
            0.0
        } else {
            deque.iter().sum::<f32>() / deque.len() as f32
        }
    }

    fn mean_count(deque: &VecDeque<usize>) -> f32 {
        if deque.is_empty() {
            0.0
        } else {
            deque.iter().sum::<usize>() as f32 / deque.len() as f32
        }
    }

    fn push_deque<T>(deque: &mut VecDeque<T>, value: T, window_size: usize) {
        if deque.len() >= window_size {
            deque.pop_front();
        }
        deque.push_back(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::Termination;

    fn report(reward: f32, steps: usize, prey: usize) -> EpisodeReport {
        EpisodeReport {
            episode: 0,
            steps,
            rewards: SpeciesPair::new(-reward, reward),
            populations: SpeciesPair::new(2, prey),
            generation: steps as u64,
            births: 0,
            deaths: 0,
            termination: Termination::StepLimit,
            checkpoint_due: false,
        }
    }

    fn update(policy_loss: f32) -> UpdateStats {
        UpdateStats {
            policy_loss,
            value_loss: policy_loss * 2.0,
            entropy: 1.0 - policy_loss,
            total_loss: 0.0,
            samples: 1,
        }
    }

    #[test]
    fn test_new() {
        let stats = TrainingStats::new(100);
        assert_eq!(stats.window_size(), 100);
        assert_eq!(stats.total_episodes(), 0);
        assert_eq!(stats.total_steps(), 0);
        assert_eq!(stats.mean_episode_reward(Species::Prey), 0.0);
        assert_eq!(stats.mean_population(Species::Predator), 0.0);
        assert_eq!(stats.mean_entropy(Species::Prey), 0.0);
    }

    #[test]
    fn test_record_episode() {
        let mut stats = TrainingStats::new(100);
        stats.record_episode(&report(10.0, 50, 7));

        assert_eq!(stats.total_episodes(), 1);
        assert_eq!(stats.total_steps(), 50);
        assert_eq!(stats.generation(), 50);
        assert!((stats.mean_episode_reward(Species::Prey) - 10.0).abs() < 1e-5);
        assert!((stats.mean_episode_reward(Species::Predator) + 10.0).abs() < 1e-5);
        assert!((stats.mean_population(Species::Prey) - 7.0).abs() < 1e-5);
        assert!((stats.mean_episode_length() - 50.0).abs() < 1e-5);
    }

    #[test]
    fn test_updates_are_per_species() {
        let mut stats = TrainingStats::new(100);
        stats.record_update(Species::Predator, &update(0.1));

        assert!((stats.mean_policy_loss(Species::Predator) - 0.1).abs() < 1e-5);
        assert!((stats.mean_value_loss(Species::Predator) - 0.2).abs() < 1e-5);
        assert_eq!(stats.mean_policy_loss(Species::Prey), 0.0);
    }

    #[test]
    fn test_rolling_average() {
        let mut stats = TrainingStats::new(3);

        stats.record_episode(&report(1.0, 10, 1));
        stats.record_episode(&report(2.0, 20, 2));
        stats.record_episode(&report(3.0, 30, 3));
        assert!((stats.mean_episode_reward(Species::Prey) - 2.0).abs() < 1e-5);

        // A 4th episode evicts the first
        stats.record_episode(&report(4.0, 40, 4));
        assert_eq!(stats.total_episodes(), 4);
        assert_eq!(stats.total_steps(), 100);
        assert!((stats.mean_episode_reward(Species::Prey) - 3.0).abs() < 1e-5);
        assert!((stats.mean_population(Species::Prey) - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_format_summary() {
        let mut stats = TrainingStats::new(100);
        stats.record_episode(&report(15.5, 150, 5));
        stats.record_update(Species::Prey, &update(0.02));

        let summary = stats.format_summary();
        assert!(summary.contains("Episodes: 1"));
        assert!(summary.contains("Steps: 150"));
        assert!(summary.contains("Generation: 150"));
        assert!(summary.contains("prey: reward 15.50 pop 5.0 p_loss 0.0200"));
        assert!(summary.contains("predator: reward -15.50"));
    }
}
