//! Actor-Critic neural network for one species
//!
//! A multilayer perceptron with two heads:
//! - **Actor head**: action logits over the 27 discrete actions
//! - **Critic head**: value estimate of the observed state
//!
//! # Architecture
//!
//! ```text
//! Input: [batch, neighbourhood + 1]
//!   ↓ Linear(in → h0) + ReLU
//!   ↓ ...
//!   ↓ Linear(h(n-1) → hn) + ReLU
//!   ├─→ Actor: Linear(hn → 27) → Action logits
//!   └─→ Critic: Linear(hn → 1) → Value estimate
//! ```
//!
//! In [`NetworkMode::Separate`] the critic gets its own copy of the hidden stack
//! instead of reading the actor's.
//!
//! # Example
//!
//! ```rust
//! use ml_predator_prey::rl::ActorCriticConfig;
//! use burn::backend::ndarray::NdArrayDevice;
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//!
//! type Backend = NdArray<f32>;
//!
//! let device = NdArrayDevice::default();
//! let network = ActorCriticConfig::new(10).init::<Backend>(&device);
//!
//! let observation = Tensor::zeros([4, 10], &device);
//! let (action_logits, value) = network.forward(observation);
//!
//! assert_eq!(action_logits.dims(), [4, 27]);
//! assert_eq!(value.dims(), [4, 1]);
//! ```

use burn::{
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{Tensor, activation::relu, backend::Backend},
};

use super::config::{NetworkConfig, NetworkMode};
use crate::sim::Action;

/// Shape of an actor-critic network
#[derive(Debug, Clone, PartialEq)]
pub struct ActorCriticConfig {
    /// Observation length (`neighbourhood + 1`)
    pub input_dim: usize,

    /// Number of actions the policy can output (27)
    pub num_actions: usize,

    /// Hidden layer widths (default: [64, 64])
    pub hidden: Vec<usize>,

    pub mode: NetworkMode,
}

impl ActorCriticConfig {
    /// Shared two-layer network for the given observation length
    pub fn new(input_dim: usize) -> Self {
        Self {
            input_dim,
            num_actions: Action::COUNT,
            hidden: vec![64, 64],
            mode: NetworkMode::Shared,
        }
    }

    /// Shape described by the `[network]` section
    pub fn from_network_config(input_dim: usize, config: &NetworkConfig) -> Self {
        Self {
            input_dim,
            num_actions: config.layers.action_head,
            hidden: config.layers.hidden.clone(),
            mode: config.mode,
        }
    }

    /// Width feeding the heads
    fn feature_dim(&self) -> usize {
        self.hidden.last().copied().unwrap_or(self.input_dim)
    }

    fn init_trunk<B: Backend>(&self, device: &B::Device) -> Vec<Linear<B>> {
        let mut layers = Vec::with_capacity(self.hidden.len());
        let mut width = self.input_dim;

        for &next in &self.hidden {
            layers.push(LinearConfig::new(width, next).init(device));
            width = next;
        }

        layers
    }

    /// Initialize the network on a device
    pub fn init<B: Backend>(&self, device: &B::Device) -> ActorCriticNetwork<B> {
        let critic_trunk = match self.mode {
            NetworkMode::Shared => None,
            NetworkMode::Separate => Some(self.init_trunk(device)),
        };

        ActorCriticNetwork {
            trunk: self.init_trunk(device),
            critic_trunk,
            actor_head: LinearConfig::new(self.feature_dim(), self.num_actions).init(device),
            critic_head: LinearConfig::new(self.feature_dim(), 1).init(device),
        }
    }
}

/// Actor-Critic multilayer perceptron
///
/// Generic over the Backend so the same module is used for training
/// (`Autodiff<NdArray<f32>>`) and for gradient-free inference (`NdArray<f32>`).
#[derive(Module, Debug)]
pub struct ActorCriticNetwork<B: Backend> {
    /// Hidden stack read by the actor (and by the critic when shared)
    trunk: Vec<Linear<B>>,
    /// Critic's own hidden stack in separate mode
    critic_trunk: Option<Vec<Linear<B>>>,
    actor_head: Linear<B>,
    critic_head: Linear<B>,
}

fn run_trunk<B: Backend>(layers: &[Linear<B>], input: Tensor<B, 2>) -> Tensor<B, 2> {
    layers
        .iter()
        .fold(input, |x, layer| relu(layer.forward(x)))
}

impl<B: Backend> ActorCriticNetwork<B> {
    /// Forward pass
    ///
    /// # Arguments
    ///
    /// * `observation` - Tensor with shape `[batch, input_dim]`
    ///
    /// # Returns
    ///
    /// A tuple of:
    /// - `action_logits`: `[batch, num_actions]`
    /// - `value`: `[batch, 1]`
    pub fn forward(&self, observation: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let features = run_trunk(&self.trunk, observation.clone());
        let action_logits = self.actor_head.forward(features.clone());

        let value = match &self.critic_trunk {
            Some(critic_trunk) => self
                .critic_head
                .forward(run_trunk(critic_trunk, observation)),
            None => self.critic_head.forward(features),
        };

        (action_logits, value)
    }
}
