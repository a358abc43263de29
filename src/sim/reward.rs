use serde::{Deserialize, Serialize};

use super::species::Species;

/// What happened to an agent during one timestep
///
/// Every agent alive at the start of a timestep ends it with exactly one outcome,
/// which the [`RewardTable`] turns into its scalar reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Illegal or impossible action (occupied or missing target, not enough food, ...)
    WrongAction,
    /// Prey step without a special event
    DefaultPrey,
    /// Predator step without a special event
    DefaultPredator,
    /// Legal action whose probabilistic resolution did not succeed
    Indifferent,
    /// Predator ate a prey
    #[serde(rename = "succesful_predator", alias = "successful_predator")]
    SuccessfulPredator,
    /// Agent bred successfully
    Offspring,
    /// Agent ran out of food with mortality enabled
    DeathStarvation,
    /// Prey was eaten (assigned to the victim)
    DeathPrey,
    /// Fallback outcome
    Default,
    /// Predator died from the per-step instadeath roll
    Instadeath,
}

impl Outcome {
    /// The "nothing special happened" outcome for a species
    pub fn default_for(species: Species) -> Self {
        match species {
            Species::Predator => Outcome::DefaultPredator,
            Species::Prey => Outcome::DefaultPrey,
        }
    }

    /// Whether the agent is removed from the grid with this outcome
    pub fn is_death(&self) -> bool {
        matches!(
            self,
            Outcome::DeathStarvation | Outcome::DeathPrey | Outcome::Instadeath
        )
    }
}

/// Reward per outcome kind
///
/// Keys follow the configuration file (`[model.rewards]`). The species defaults
/// fall back to `default` when they are left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardTable {
    pub wrong_action: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_prey: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_predator: Option<f32>,
    pub indifferent: f32,
    #[serde(rename = "succesful_predator", alias = "successful_predator")]
    pub successful_predator: f32,
    pub offspring: f32,
    pub death_starvation: f32,
    pub death_prey: f32,
    #[serde(default)]
    pub default: f32,
    pub instadeath: f32,
}

impl RewardTable {
    /// Look up the reward for an outcome
    pub fn reward(&self, outcome: Outcome) -> f32 {
        match outcome {
            Outcome::WrongAction => self.wrong_action,
            Outcome::DefaultPrey => self.default_prey.unwrap_or(self.default),
            Outcome::DefaultPredator => self.default_predator.unwrap_or(self.default),
            Outcome::Indifferent => self.indifferent,
            Outcome::SuccessfulPredator => self.successful_predator,
            Outcome::Offspring => self.offspring,
            Outcome::DeathStarvation => self.death_starvation,
            Outcome::DeathPrey => self.death_prey,
            Outcome::Default => self.default,
            Outcome::Instadeath => self.instadeath,
        }
    }

    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        [
            self.wrong_action,
            self.reward(Outcome::DefaultPrey),
            self.reward(Outcome::DefaultPredator),
            self.indifferent,
            self.successful_predator,
            self.offspring,
            self.death_starvation,
            self.death_prey,
            self.default,
            self.instadeath,
        ]
        .into_iter()
    }
}

impl Default for RewardTable {
    fn default() -> Self {
        Self {
            wrong_action: -1.0,
            default_prey: Some(0.1),
            default_predator: Some(-0.1),
            indifferent: 0.0,
            successful_predator: 1.0,
            offspring: 1.0,
            death_starvation: -1.0,
            death_prey: -1.0,
            default: 0.0,
            instadeath: 0.0,
        }
    }
}
