//! Policy network and optimiser configuration (`[network]` section)

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::sim::Action;

/// Family of the policy network
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkKind {
    #[default]
    ActorCritic,
}

/// Whether actor and critic share their hidden layers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    /// One trunk feeding both heads
    #[default]
    Shared,
    /// Independent trunks for the actor and the critic
    Separate,
}

/// Layer widths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Hidden layer widths, input side first
    pub hidden: Vec<usize>,
    /// Width of the action logits (must match the action space)
    pub action_head: usize,
    /// Width of the value output (must be 1)
    pub value_head: usize,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            hidden: vec![64, 64],
            action_head: Action::COUNT,
            value_head: 1,
        }
    }
}

/// Configuration of one species' actor-critic policy
///
/// Both species are built from the same configuration; only their parameters
/// diverge during training.
///
/// # Example
///
/// ```rust
/// use ml_predator_prey::rl::NetworkConfig;
///
/// let config = NetworkConfig {
///     learning_rate: 1e-3,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub kind: NetworkKind,
    pub mode: NetworkMode,
    pub layers: LayerConfig,

    /// Discount factor for future rewards
    ///
    /// Default: 0.99
    pub gamma: f32,

    /// Learning rate for the Adam optimizer
    ///
    /// Default: 1e-3
    pub learning_rate: f64,

    /// Weight of the entropy bonus in the loss
    ///
    /// Default: 0.01
    pub entropy_coef: f32,

    /// Weight of the critic's squared error in the loss
    ///
    /// Default: 0.5
    pub value_coef: f32,

    /// Gradient norm clipping threshold
    ///
    /// Default: 0.5
    pub max_grad_norm: f32,

    /// Normalise advantages to zero mean and unit variance before the update
    pub normalize_advantages: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            kind: NetworkKind::ActorCritic,
            mode: NetworkMode::Shared,
            layers: LayerConfig::default(),
            gamma: 0.99,
            learning_rate: 1e-3,
            entropy_coef: 0.01,
            value_coef: 0.5,
            max_grad_norm: 0.5,
            normalize_advantages: true,
        }
    }
}

impl NetworkConfig {
    /// Validate network parameters
    ///
    /// # Errors
    ///
    /// [`ConfigError::Validation`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.layers.action_head != Action::COUNT {
            return Err(ConfigError::validation(format!(
                "network.layers.action_head must be {}, got {}",
                Action::COUNT,
                self.layers.action_head
            )));
        }

        if self.layers.value_head != 1 {
            return Err(ConfigError::validation(format!(
                "network.layers.value_head must be 1, got {}",
                self.layers.value_head
            )));
        }

        if self.layers.hidden.iter().any(|&w| w == 0) {
            return Err(ConfigError::validation(
                "network.layers.hidden widths must be at least 1",
            ));
        }

        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(ConfigError::validation(format!(
                "network.gamma must be in [0, 1], got {}",
                self.gamma
            )));
        }

        if !(self.learning_rate > 0.0) {
            return Err(ConfigError::validation(format!(
                "network.learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }

        if !(self.entropy_coef >= 0.0) {
            return Err(ConfigError::validation(format!(
                "network.entropy_coef must be non-negative, got {}",
                self.entropy_coef
            )));
        }

        if !(self.value_coef >= 0.0) {
            return Err(ConfigError::validation(format!(
                "network.value_coef must be non-negative, got {}",
                self.value_coef
            )));
        }

        if !(self.max_grad_norm > 0.0) {
            return Err(ConfigError::validation(format!(
                "network.max_grad_norm must be positive, got {}",
                self.max_grad_norm
            )));
        }

        Ok(())
    }
}
