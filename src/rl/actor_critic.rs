//! Advantage actor-critic policy backed by a burn network
//!
//! Each species owns one [`ActorCriticPolicy`]. Action selection runs on a
//! gradient-free copy of the network; updates run on the autodiff network and
//! refresh that copy afterwards.

use burn::{
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{Adam, AdamConfig, GradientsParams, Optimizer, adaptor::OptimizerAdaptor},
    tensor::{
        ElementConversion, Int, Tensor, TensorData,
        activation::{log_softmax, softmax},
        backend::AutodiffBackend,
    },
};

use super::buffer::Trajectory;
use super::config::NetworkConfig;
use super::network::{ActorCriticConfig, ActorCriticNetwork};
use super::observation::{batch_tensor, observation_tensor};
use super::policy::{ActionDistribution, AgentPolicy, Observation, PolicyError, PolicyOutput, UpdateStats};
use crate::config::Goal;
use crate::sim::Species;

/// Actor-critic policy of one species
///
/// # Type Parameters
///
/// * `B` - Autodiff backend for gradient computation
pub struct ActorCriticPolicy<B: AutodiffBackend> {
    species: Species,

    /// Network trained by `update`
    network: ActorCriticNetwork<B>,

    /// Gradient-free copy used by `act`
    inference: ActorCriticNetwork<B::InnerBackend>,

    optim: OptimizerAdaptor<Adam, ActorCriticNetwork<B>, B>,

    config: NetworkConfig,

    /// Observation length the network was built for
    input_dim: usize,

    goal: Goal,

    /// Trajectory of the most recent update (training only)
    last_trajectory: Option<Trajectory>,

    training_step: usize,

    device: B::Device,
}

impl<B: AutodiffBackend> ActorCriticPolicy<B> {
    /// Build a freshly initialised policy
    pub fn new(
        species: Species,
        input_dim: usize,
        config: NetworkConfig,
        goal: Goal,
        device: B::Device,
    ) -> Self {
        let network = ActorCriticConfig::from_network_config(input_dim, &config).init::<B>(&device);
        Self::from_network(species, network, config, input_dim, goal, device)
    }

    /// Wrap an existing network, e.g. one loaded from a checkpoint
    pub fn from_network(
        species: Species,
        network: ActorCriticNetwork<B>,
        config: NetworkConfig,
        input_dim: usize,
        goal: Goal,
        device: B::Device,
    ) -> Self {
        let optim = AdamConfig::new()
            .with_grad_clipping(Some(GradientClippingConfig::Norm(config.max_grad_norm)))
            .init();
        let inference = network.valid();

        Self {
            species,
            network,
            inference,
            optim,
            config,
            input_dim,
            goal,
            last_trajectory: None,
            training_step: 0,
            device,
        }
    }

    pub fn species(&self) -> Species {
        self.species
    }

    pub fn network(&self) -> &ActorCriticNetwork<B> {
        &self.network
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn goal(&self) -> Goal {
        self.goal
    }

    /// Number of optimisation steps performed so far
    pub fn training_step(&self) -> usize {
        self.training_step
    }

    pub(crate) fn set_training_step(&mut self, step: usize) {
        self.training_step = step;
    }

    /// Trajectory consumed by the last update
    pub fn last_trajectory(&self) -> Option<&Trajectory> {
        self.last_trajectory.as_ref()
    }

    fn check_finite(&self, quantity: &'static str, value: f32) -> Result<f32, PolicyError> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(PolicyError::NonFiniteLoss {
                species: self.species,
                quantity,
            })
        }
    }
}

impl<B: AutodiffBackend> AgentPolicy for ActorCriticPolicy<B> {
    fn act(&self, observation: &Observation) -> Result<PolicyOutput, PolicyError> {
        if observation.len() != self.input_dim {
            return Err(PolicyError::ObservationSize {
                species: self.species,
                expected: self.input_dim,
                got: observation.len(),
            });
        }

        let input = observation_tensor::<B::InnerBackend>(observation, &self.device);
        let (action_logits, value) = self.inference.forward(input);

        let logits: Vec<f32> = action_logits
            .into_data()
            .to_vec()
            .map_err(|e| PolicyError::Tensor(format!("{:?}", e)))?;
        let value = value.squeeze::<1>(1).into_scalar().elem::<f32>();
        if !value.is_finite() || logits.iter().any(|l| !l.is_finite()) {
            return Err(PolicyError::NonFiniteOutput {
                species: self.species,
            });
        }

        Ok(PolicyOutput {
            distribution: ActionDistribution::from_logits(&logits),
            value,
        })
    }

    /// One advantage actor-critic step over the whole trajectory
    ///
    /// ```text
    /// L = -mean(log π(a|s) * A) + c_v * mean((V(s) - G)²) - c_e * H(π)
    /// ```
    ///
    /// The loss is checked before the backward pass, so a non-finite loss leaves
    /// the parameters untouched.
    fn update(&mut self, trajectory: &Trajectory, gamma: f32) -> Result<UpdateStats, PolicyError> {
        if self.goal == Goal::Testing {
            return Err(PolicyError::Frozen(self.species));
        }

        let Some(batch) = trajectory.to_batch(gamma, self.config.normalize_advantages) else {
            return Ok(UpdateStats::default());
        };
        let n = batch.len();

        let obs: Tensor<B, 2> = batch_tensor(batch.observations, n, batch.width, &self.device);
        let actions: Tensor<B, 1, Int> =
            Tensor::from_data(TensorData::new(batch.actions, [n]), &self.device);
        let advantages: Tensor<B, 1> =
            Tensor::from_data(TensorData::new(batch.advantages, [n]), &self.device);
        let returns: Tensor<B, 1> =
            Tensor::from_data(TensorData::new(batch.returns, [n]), &self.device);

        let (action_logits, values) = self.network.forward(obs);

        let log_probs = log_softmax(action_logits.clone(), 1);
        let chosen_log_probs = log_probs
            .clone()
            .gather(1, actions.unsqueeze_dim(1))
            .squeeze::<1>(1);
        let policy_loss = (chosen_log_probs * advantages).neg().mean();

        let diff = values.squeeze::<1>(1) - returns;
        let value_loss = (diff.clone() * diff).mean();

        let probs = softmax(action_logits, 1);
        let entropy = (probs * log_probs).sum_dim(1).neg().mean();

        let total_loss = policy_loss.clone() + value_loss.clone() * self.config.value_coef
            - entropy.clone() * self.config.entropy_coef;

        let stats = UpdateStats {
            policy_loss: self.check_finite("policy loss", policy_loss.into_scalar().elem())?,
            value_loss: self.check_finite("value loss", value_loss.into_scalar().elem())?,
            entropy: self.check_finite("entropy", entropy.into_scalar().elem())?,
            total_loss: self.check_finite("total loss", total_loss.clone().into_scalar().elem())?,
            samples: n,
        };

        let grads = total_loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.network);
        self.network = self
            .optim
            .step(self.config.learning_rate, self.network.clone(), grads);
        self.inference = self.network.valid();

        self.training_step += 1;
        self.last_trajectory = Some(trajectory.clone());

        Ok(stats)
    }
}
