use serde::{Deserialize, Serialize};

use super::reward::RewardTable;
use super::species::SpeciesPair;
use crate::config::ConfigError;

/// Per-species metabolism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metabolism {
    /// Reserve lost every timestep
    pub fast: u32,
    /// Reserve gained when eating
    pub satiety: u32,
    /// Reserve spent on producing an offspring
    pub exhaust: u32,
}

/// How the grid treats its edges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// Edges wrap around
    #[default]
    Toroidal,
    /// Cells outside the grid are walls
    Bounded,
}

/// Configuration of the simulated world (`[model]` section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Grid dimensions as `[rows, cols]`
    pub dim: [usize; 2],
    /// Initial population probability per cell
    pub densities: SpeciesPair<f64>,
    /// Cap on every agent's food reserve
    pub max_food_reserve: u32,
    /// Food reserve of agents placed at initialisation (defaults to the cap)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_food_reserve: Option<u32>,
    pub metabolism: SpeciesPair<Metabolism>,
    /// Number of cells in the square observation window
    pub neighbourhood: usize,
    #[serde(default)]
    pub boundary: Boundary,
    pub p_breed: f64,
    pub p_flee: f64,
    pub p_eat: f64,
    /// Require `p_eat == 1 - p_flee`
    #[serde(default = "default_true")]
    pub enforce_p_eat_complement: bool,
    /// Enables death by starvation
    pub mortality: bool,
    /// Per-step predator death probability
    pub instadeath: f64,
    /// Only apply instadeath when `mortality` is enabled
    #[serde(default)]
    pub instadeath_requires_mortality: bool,
    pub rewards: RewardTable,
}

fn default_true() -> bool {
    true
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dim: [20, 20],
            densities: SpeciesPair::new(0.05, 0.2),
            max_food_reserve: 8,
            initial_food_reserve: None,
            metabolism: SpeciesPair::new(
                Metabolism {
                    fast: 1,
                    satiety: 4,
                    exhaust: 3,
                },
                Metabolism {
                    fast: 1,
                    satiety: 2,
                    exhaust: 2,
                },
            ),
            neighbourhood: 9,
            boundary: Boundary::Toroidal,
            p_breed: 0.5,
            p_flee: 0.3,
            p_eat: 0.7,
            enforce_p_eat_complement: true,
            mortality: true,
            instadeath: 0.01,
            instadeath_requires_mortality: false,
            rewards: RewardTable::default(),
        }
    }
}

impl ModelConfig {
    /// Create a configuration with a custom grid size
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            dim: [rows, cols],
            ..Default::default()
        }
    }

    /// Create a small grid for testing
    pub fn small() -> Self {
        Self::new(6, 6)
    }

    pub fn rows(&self) -> usize {
        self.dim[0]
    }

    pub fn cols(&self) -> usize {
        self.dim[1]
    }

    /// Side length of the observation window
    pub fn window_side(&self) -> usize {
        integer_sqrt(self.neighbourhood)
    }

    /// Length of the flattened observation (window cells plus own food reserve)
    pub fn observation_size(&self) -> usize {
        self.neighbourhood + 1
    }

    pub fn initial_food_reserve(&self) -> u32 {
        self.initial_food_reserve
            .unwrap_or(self.max_food_reserve)
            .min(self.max_food_reserve)
    }

    /// Validate the model parameters
    ///
    /// # Errors
    ///
    /// [`ConfigError::Validation`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rows() == 0 || self.cols() == 0 {
            return Err(ConfigError::validation(format!(
                "model.dim must be positive in both directions, got {:?}",
                self.dim
            )));
        }

        for (name, density) in [
            ("predator", self.densities.predator),
            ("prey", self.densities.prey),
        ] {
            if !(0.0..=1.0).contains(&density) {
                return Err(ConfigError::validation(format!(
                    "model.densities.{name} must be in [0, 1], got {density}"
                )));
            }
        }

        let side = self.window_side();
        if self.neighbourhood == 0 || side * side != self.neighbourhood || side % 2 == 0 {
            return Err(ConfigError::validation(format!(
                "model.neighbourhood must be an odd perfect square (9, 25, ...), got {}",
                self.neighbourhood
            )));
        }

        for (name, p) in [
            ("p_breed", self.p_breed),
            ("p_flee", self.p_flee),
            ("p_eat", self.p_eat),
            ("instadeath", self.instadeath),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::validation(format!(
                    "model.{name} must be in [0, 1], got {p}"
                )));
            }
        }

        if self.enforce_p_eat_complement && (self.p_eat - (1.0 - self.p_flee)).abs() > 1e-9 {
            return Err(ConfigError::validation(format!(
                "model.p_eat ({}) must equal 1 - p_flee ({}); set enforce_p_eat_complement = false to waive",
                self.p_eat,
                1.0 - self.p_flee
            )));
        }

        if self.max_food_reserve == 0 {
            return Err(ConfigError::validation(
                "model.max_food_reserve must be at least 1",
            ));
        }

        if let Some(reward) = self.rewards.values().find(|r| !r.is_finite()) {
            return Err(ConfigError::validation(format!(
                "model.rewards must be finite, got {reward}"
            )));
        }

        Ok(())
    }
}

fn integer_sqrt(n: usize) -> usize {
    let mut root = (n as f64).sqrt() as usize;
    while root * root > n {
        root -= 1;
    }
    while (root + 1) * (root + 1) <= n {
        root += 1;
    }
    root
}
