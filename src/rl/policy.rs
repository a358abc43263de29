//! Per-species decision interface
//!
//! The step engine only talks to agents through [`AgentPolicy`]: given the flattened
//! observation of one agent it returns a categorical distribution over the 27
//! discrete actions and a value estimate. Predators and prey each own an
//! independent instance, selected through a [`PolicyPair`].

use rand::Rng;
use thiserror::Error;

use super::buffer::Trajectory;
use crate::sim::{Species, SpeciesPair};

/// Flattened observation of one agent: window cells followed by its own food reserve
#[derive(Debug, Clone, PartialEq)]
pub struct Observation(Vec<f32>);

impl Observation {
    pub fn new(features: Vec<f32>) -> Self {
        Self(features)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

/// Categorical distribution over discrete actions
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDistribution {
    probs: Vec<f32>,
}

impl ActionDistribution {
    /// Numerically stable softmax over raw logits
    pub fn from_logits(logits: &[f32]) -> Self {
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        Self {
            probs: exps.into_iter().map(|e| e / sum).collect(),
        }
    }

    /// Every action equally likely
    pub fn uniform(n: usize) -> Self {
        Self {
            probs: vec![1.0 / n as f32; n],
        }
    }

    /// All probability mass on one action
    pub fn one_hot(n: usize, idx: usize) -> Self {
        let mut probs = vec![0.0; n];
        probs[idx] = 1.0;
        Self { probs }
    }

    pub fn probs(&self) -> &[f32] {
        &self.probs
    }

    pub fn len(&self) -> usize {
        self.probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    /// Sample an action index
    ///
    /// Always consumes exactly one draw from `rng`, so runs stay in lockstep
    /// regardless of the distribution's shape.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let random_val: f32 = rng.gen();
        let mut cumsum = 0.0;

        for (idx, &prob) in self.probs.iter().enumerate() {
            cumsum += prob;
            if random_val < cumsum {
                return idx;
            }
        }

        // Rounding left the cumulative sum just below 1.0
        self.probs
            .iter()
            .rposition(|&p| p > 0.0)
            .unwrap_or(self.probs.len().saturating_sub(1))
    }

    pub fn log_prob(&self, idx: usize) -> f32 {
        self.probs
            .get(idx)
            .map(|p| p.max(f32::MIN_POSITIVE).ln())
            .unwrap_or(f32::NEG_INFINITY)
    }

    pub fn entropy(&self) -> f32 {
        -self
            .probs
            .iter()
            .filter(|&&p| p > 0.0)
            .map(|p| p * p.ln())
            .sum::<f32>()
    }
}

/// What a policy returns for one observation
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyOutput {
    pub distribution: ActionDistribution,
    pub value: f32,
}

/// Averages reported by one optimisation step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateStats {
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    pub total_loss: f32,
    /// Transitions the step was computed from
    pub samples: usize,
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("{species} policy update produced a non-finite {quantity}")]
    NonFiniteLoss {
        species: Species,
        quantity: &'static str,
    },

    #[error("{species} network produced non-finite outputs")]
    NonFiniteOutput { species: Species },

    #[error("{0} policy is frozen in testing mode")]
    Frozen(Species),

    #[error("observation has {got} features, the {species} network expects {expected}")]
    ObservationSize {
        species: Species,
        expected: usize,
        got: usize,
    },

    #[error("tensor conversion failed: {0}")]
    Tensor(String),
}

/// Decision and value function of one species
pub trait AgentPolicy {
    /// Action distribution and state value for one observation
    fn act(&self, observation: &Observation) -> Result<PolicyOutput, PolicyError>;

    /// State value only, used to bootstrap unfinished trajectories
    fn evaluate(&self, observation: &Observation) -> Result<f32, PolicyError> {
        Ok(self.act(observation)?.value)
    }

    /// One actor-critic optimisation step on a collected trajectory
    fn update(&mut self, trajectory: &Trajectory, gamma: f32) -> Result<UpdateStats, PolicyError>;
}

/// One policy per species
pub type PolicyPair<P> = SpeciesPair<P>;

#[cfg(test)]
pub(crate) mod testing {
    //! Hand-written policies for exercising the engine without a network

    use super::*;
    use crate::sim::Action;

    /// Always picks the same action
    pub struct ScriptedPolicy {
        pub action: Action,
        pub value: f32,
        pub updates: usize,
    }

    impl ScriptedPolicy {
        pub fn new(action: Action) -> Self {
            Self {
                action,
                value: 0.0,
                updates: 0,
            }
        }
    }

    impl AgentPolicy for ScriptedPolicy {
        fn act(&self, _observation: &Observation) -> Result<PolicyOutput, PolicyError> {
            Ok(PolicyOutput {
                distribution: ActionDistribution::one_hot(Action::COUNT, self.action.index()),
                value: self.value,
            })
        }

        fn update(&mut self, trajectory: &Trajectory, _gamma: f32) -> Result<UpdateStats, PolicyError> {
            self.updates += 1;
            Ok(UpdateStats {
                samples: trajectory.len(),
                ..Default::default()
            })
        }
    }

    /// Picks uniformly among all actions
    pub struct UniformPolicy;

    impl AgentPolicy for UniformPolicy {
        fn act(&self, _observation: &Observation) -> Result<PolicyOutput, PolicyError> {
            Ok(PolicyOutput {
                distribution: ActionDistribution::uniform(Action::COUNT),
                value: 0.0,
            })
        }

        fn update(&mut self, trajectory: &Trajectory, _gamma: f32) -> Result<UpdateStats, PolicyError> {
            Ok(UpdateStats {
                samples: trajectory.len(),
                ..Default::default()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::create_rng;

    #[test]
    fn test_softmax_normalised() {
        let dist = ActionDistribution::from_logits(&[1.0, 2.0, 3.0, 4.0]);
        let sum: f32 = dist.probs().iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(dist.probs()[3] > dist.probs()[0]);
    }

    #[test]
    fn test_one_hot_always_sampled() {
        let dist = ActionDistribution::one_hot(27, 11);
        let mut rng = create_rng(1);
        for _ in 0..100 {
            assert_eq!(dist.sample(&mut rng), 11);
        }
        assert_eq!(dist.log_prob(11), 0.0);
        assert_eq!(dist.entropy(), 0.0);
    }

    #[test]
    fn test_uniform_sampling_covers_actions() {
        let dist = ActionDistribution::uniform(4);
        let mut rng = create_rng(5);
        let mut seen = [false; 4];
        for _ in 0..200 {
            seen[dist.sample(&mut rng)] = true;
        }
        assert!(seen.iter().all(|&s| s));
        assert!((dist.entropy() - 4f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_sampling_is_seeded() {
        let dist = ActionDistribution::from_logits(&[0.3, -0.2, 1.4, 0.0, 0.9]);
        let mut a = create_rng(77);
        let mut b = create_rng(77);
        let xs: Vec<usize> = (0..50).map(|_| dist.sample(&mut a)).collect();
        let ys: Vec<usize> = (0..50).map(|_| dist.sample(&mut b)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_log_prob_of_zero_probability_is_finite_floor() {
        let dist = ActionDistribution::one_hot(3, 0);
        assert!(dist.log_prob(1) < -80.0);
        assert_eq!(dist.log_prob(7), f32::NEG_INFINITY);
    }
}
