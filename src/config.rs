//! Simulation configuration
//!
//! A run is described by one TOML file with four sections:
//!
//! ```toml
//! [model]    # the world: grid, metabolism, probabilities, rewards
//! [sim]      # goal, loop bounds, seed, checkpoints, metrics
//! [plot]     # cadence of the plot observers
//! [network]  # policy network shape and optimiser
//! ```
//!
//! Section names are also accepted capitalised (`[Model]`, ...).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::rl::NetworkConfig;
use crate::sim::ModelConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Whether the policies learn during the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    /// Collect trajectories and update both policies after every episode
    #[default]
    Training,
    /// Frozen policies, nothing retained
    Testing,
}

/// Quantities written to the metrics log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordValue {
    Generation,
    Reward,
    Population,
    Steps,
}

/// Run configuration (`[sim]` section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub goal: Goal,
    /// Maximum timesteps per episode
    pub steps: usize,
    pub episodes: usize,
    pub seed: u64,
    /// Checkpoint directory written during and after the run
    pub save_state_to: Option<PathBuf>,
    /// Checkpoint directory to resume from
    pub resume_state_from: Option<PathBuf>,
    /// Episodes between checkpoints; `None` only writes the final one
    pub save_state_every: Option<usize>,
    pub record_values: Vec<RecordValue>,
    /// JSON-lines file the metrics log is appended to
    pub metrics_path: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            goal: Goal::Training,
            steps: 100,
            episodes: 10,
            seed: 42,
            save_state_to: None,
            resume_state_from: None,
            save_state_every: None,
            record_values: vec![RecordValue::Generation, RecordValue::Reward],
            metrics_path: None,
        }
    }
}

impl SimConfig {
    pub fn records(&self, value: RecordValue) -> bool {
        self.record_values.contains(&value)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps == 0 {
            return Err(ConfigError::validation("sim.steps must be at least 1"));
        }
        if self.episodes == 0 {
            return Err(ConfigError::validation("sim.episodes must be at least 1"));
        }
        if self.save_state_every == Some(0) {
            return Err(ConfigError::validation("sim.save_state_every must be at least 1"));
        }
        Ok(())
    }
}

/// Plot cadence (`[plot]` section)
///
/// Rendering itself belongs to whoever registers a plot observer; the crate only
/// decides when they are invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// Episodes between plot invocations; `None` disables plotting
    pub every: Option<usize>,
    /// Output format hint passed to observers, e.g. `png`
    pub format: String,
    /// Output directory hint passed to observers
    pub dir: Option<PathBuf>,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            every: None,
            format: "png".to_string(),
            dir: None,
        }
    }
}

impl PlotConfig {
    /// Whether observers run after the given (0-based) episode
    pub fn is_due(&self, episode: usize) -> bool {
        self.every.is_some_and(|every| every > 0 && (episode + 1) % every == 0)
    }
}

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, alias = "Model")]
    pub model: ModelConfig,

    #[serde(default, alias = "Sim")]
    pub sim: SimConfig,

    #[serde(default, alias = "Plot")]
    pub plot: PlotConfig,

    #[serde(default, alias = "Network")]
    pub network: NetworkConfig,
}

impl Config {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a configuration string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model.validate()?;
        self.sim.validate()?;
        self.network.validate()?;
        if self.plot.every == Some(0) {
            return Err(ConfigError::validation("plot.every must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Boundary, Species};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
        [Model]
        dim = [12, 16]
        densities = { predator = 0.05, prey = 0.25 }
        max_food_reserve = 10
        neighbourhood = 25
        p_breed = 0.4
        p_flee = 0.25
        p_eat = 0.75
        mortality = true
        instadeath = 0.02

        [Model.metabolism.predator]
        fast = 1
        satiety = 5
        exhaust = 4

        [Model.metabolism.prey]
        fast = 1
        satiety = 3
        exhaust = 2

        [Model.rewards]
        wrong_action = -1.0
        default_prey = 0.1
        indifferent = 0.0
        succesful_predator = 2.0
        offspring = 1.0
        death_starvation = -1.0
        death_prey = -2.0
        default = 0.05
        instadeath = 0.0

        [Sim]
        goal = "testing"
        steps = 50
        episodes = 3
        seed = 7
        record_values = ["generation", "population"]

        [Network]
        mode = "separate"
        gamma = 0.95

        [Network.layers]
        hidden = [32, 32]
        action_head = 27
        value_head = 1
    "#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.model.dim, [12, 16]);
        assert_eq!(config.model.metabolism.get(Species::Predator).satiety, 5);
        assert_eq!(config.model.boundary, Boundary::Toroidal);
        assert_eq!(config.model.rewards.successful_predator, 2.0);
        // default_predator falls back to default
        assert_eq!(
            config.model.rewards.reward(crate::sim::Outcome::DefaultPredator),
            0.05
        );

        assert_eq!(config.sim.goal, Goal::Testing);
        assert_eq!(config.sim.steps, 50);
        assert!(config.sim.records(RecordValue::Population));
        assert!(!config.sim.records(RecordValue::Reward));

        assert_eq!(config.network.gamma, 0.95);
        assert_eq!(config.plot, PlotConfig::default());
    }

    #[test]
    fn test_validation_fails_fast() {
        let bad = SAMPLE.replace("neighbourhood = 25", "neighbourhood = 16");
        assert!(matches!(
            Config::from_toml_str(&bad),
            Err(ConfigError::Validation(_))
        ));

        let bad = SAMPLE.replace("p_eat = 0.75", "p_eat = 0.5");
        assert!(matches!(
            Config::from_toml_str(&bad),
            Err(ConfigError::Validation(_))
        ));

        let bad = SAMPLE.replace("action_head = 27", "action_head = 9");
        assert!(matches!(
            Config::from_toml_str(&bad),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_shipped_default_config() {
        let config = Config::from_toml_str(include_str!("../configs/default.toml")).unwrap();
        assert_eq!(config.model.dim, [20, 20]);
        assert_eq!(config.sim.save_state_every, Some(50));
        assert!(config.sim.records(RecordValue::Population));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            Config::from_toml_str("[model\ndim = "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.sim.seed, 7);

        let missing = Config::load(Path::new("/definitely/not/here.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_sim_validation() {
        let sim = SimConfig {
            steps: 0,
            ..Default::default()
        };
        assert!(sim.validate().is_err());

        let sim = SimConfig {
            save_state_every: Some(0),
            ..Default::default()
        };
        assert!(sim.validate().is_err());
    }

    #[test]
    fn test_plot_cadence() {
        let plot = PlotConfig {
            every: Some(3),
            ..Default::default()
        };
        let due: Vec<usize> = (0..9).filter(|&e| plot.is_due(e)).collect();
        assert_eq!(due, vec![2, 5, 8]);
        assert!(!PlotConfig::default().is_due(0));
    }
}
