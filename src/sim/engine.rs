use rand::Rng;
use std::collections::HashMap;
use thiserror::Error;

use super::action::{Action, Direction, Intent};
use super::config::ModelConfig;
use super::reward::Outcome;
use super::species::{Species, SpeciesPair};
use super::state::{AgentId, GridError, GridState};
use crate::rl::observation::create_observation;
use crate::rl::{AgentPolicy, Observation, PolicyError, PolicyPair};

/// What an agent chose this timestep
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub observation: Observation,
    pub action: Action,
    /// Index into the policy's action head
    pub action_index: usize,
    pub log_prob: f32,
    pub value: f32,
}

/// Result of one timestep for one agent alive at its start
#[derive(Debug, Clone, PartialEq)]
pub struct AgentStepRecord {
    pub id: AgentId,
    pub species: Species,
    /// `None` when the agent was eaten before its turn
    pub decision: Option<Decision>,
    pub outcome: Outcome,
    pub reward: f32,
    /// Food reserve at the end of the timestep (or at death)
    pub food_reserve: u32,
    /// The agent died during this timestep
    pub done: bool,
}

/// Result of a timestep
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Timestep index, counted from the creation of the grid
    pub timestep: u64,
    /// One record per agent alive at the start, in processing order
    pub records: Vec<AgentStepRecord>,
    /// Offspring created during the timestep
    pub births: Vec<AgentId>,
    /// Populations after the timestep
    pub populations: SpeciesPair<usize>,
}

impl StepReport {
    pub fn record(&self, id: AgentId) -> Option<&AgentStepRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Sum of rewards handed to a species
    pub fn reward(&self, species: Species) -> f32 {
        self.records
            .iter()
            .filter(|r| r.species == species)
            .map(|r| r.reward)
            .sum()
    }

    pub fn deaths(&self) -> usize {
        self.records.iter().filter(|r| r.done).count()
    }
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("grid inconsistency: {0}")]
    Grid(#[from] GridError),
}

/// One Bernoulli draw
fn roll<R: Rng + ?Sized>(rng: &mut R, probability: f64) -> bool {
    rng.gen::<f64>() < probability
}

/// Advances a grid by whole timesteps
///
/// Agents act one after another in row-major order of their cells at the
/// start of the timestep, so conflicting intents are settled by that order
/// and the injected random source alone.
pub struct StepEngine {
    config: ModelConfig,
}

impl StepEngine {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Execute one timestep
    ///
    /// Every agent alive at the start receives exactly one record. Agents
    /// born during the timestep act from the next one on.
    pub fn step<P, R>(
        &self,
        grid: &mut GridState,
        policies: &PolicyPair<P>,
        rng: &mut R,
    ) -> Result<StepReport, StepError>
    where
        P: AgentPolicy,
        R: Rng + ?Sized,
    {
        let order = grid.agent_order();
        let mut records = Vec::with_capacity(order.len());
        let mut slots = HashMap::with_capacity(order.len());

        for &id in &order {
            let agent = grid.agent(id).ok_or(GridError::UnknownAgent(id))?;
            slots.insert(id, records.len());
            records.push(AgentStepRecord {
                id,
                species: agent.species,
                decision: None,
                outcome: Outcome::default_for(agent.species),
                reward: 0.0,
                food_reserve: agent.food_reserve,
                done: false,
            });
        }

        let mut births = Vec::new();

        for &id in &order {
            // Eaten earlier in this timestep
            if !grid.contains(id) {
                continue;
            }

            let species = {
                let agent = grid.agent_mut(id).ok_or(GridError::UnknownAgent(id))?;
                let fast = self.config.metabolism.get(agent.species).fast;
                agent.food_reserve = agent.food_reserve.saturating_sub(fast);
                agent.species
            };

            let observation = create_observation(grid, id, &self.config)?;
            let output = policies.get(species).act(&observation)?;
            let action_index = output.distribution.sample(rng);
            let action = Action::from_index(action_index);

            let mut outcome = match action.intent {
                Intent::Move => self.resolve_move(grid, id, action.direction, rng)?,
                Intent::Eat => self.resolve_eat(grid, id, action.direction, rng, &mut records, &slots)?,
                Intent::Breed => self.resolve_breed(grid, id, action.direction, rng, &mut births)?,
            };

            if let Some(death) = self.death_check(grid, id, rng)? {
                outcome = death;
            }

            let food_reserve = if outcome.is_death() {
                grid.remove(id)?.food_reserve
            } else {
                grid.agent(id).ok_or(GridError::UnknownAgent(id))?.food_reserve
            };

            let record = &mut records[slots[&id]];
            record.decision = Some(Decision {
                observation,
                action,
                action_index,
                log_prob: output.distribution.log_prob(action_index),
                value: output.value,
            });
            record.outcome = outcome;
            record.food_reserve = food_reserve;
            record.done = outcome.is_death();
        }

        for record in &mut records {
            record.reward = self.config.rewards.reward(record.outcome);
        }

        grid.advance_timestep();

        Ok(StepReport {
            timestep: grid.timestep(),
            records,
            births,
            populations: grid.populations(),
        })
    }

    fn resolve_move<R: Rng + ?Sized>(
        &self,
        grid: &mut GridState,
        id: AgentId,
        direction: Direction,
        rng: &mut R,
    ) -> Result<Outcome, StepError> {
        let agent = grid.agent(id).ok_or(GridError::UnknownAgent(id))?;
        let (species, position) = (agent.species, agent.position);
        let default = Outcome::default_for(species);

        if direction == Direction::Stay {
            return Ok(default);
        }

        let Some(target) = grid.resolve(position.moved_in_direction(direction)) else {
            return Ok(Outcome::WrongAction);
        };
        if target == position {
            return Ok(default);
        }
        if grid.agent_at(target).is_some() {
            return Ok(Outcome::WrongAction);
        }

        if species == Species::Prey
            && grid.has_adjacent(position, Species::Predator)
            && !roll(rng, self.config.p_flee)
        {
            return Ok(Outcome::Indifferent);
        }

        grid.move_agent(id, target)?;
        Ok(default)
    }

    fn resolve_eat<R: Rng + ?Sized>(
        &self,
        grid: &mut GridState,
        id: AgentId,
        direction: Direction,
        rng: &mut R,
        records: &mut [AgentStepRecord],
        slots: &HashMap<AgentId, usize>,
    ) -> Result<Outcome, StepError> {
        let agent = grid.agent(id).ok_or(GridError::UnknownAgent(id))?;
        let (species, position) = (agent.species, agent.position);
        let target = grid.resolve(position.moved_in_direction(direction));

        match species {
            Species::Prey => {
                // Grazing on the own cell or an empty neighbouring one
                let grazable = target.is_some_and(|t| t == position || grid.agent_at(t).is_none());
                if !grazable {
                    return Ok(Outcome::WrongAction);
                }
                self.feed(grid, id)?;
                Ok(Outcome::DefaultPrey)
            }
            Species::Predator => {
                let victim = target
                    .filter(|t| *t != position)
                    .and_then(|t| grid.agent_at(t))
                    .filter(|a| a.species == Species::Prey)
                    .map(|a| a.id);
                let Some(victim) = victim else {
                    return Ok(Outcome::WrongAction);
                };

                if !roll(rng, self.config.p_eat) {
                    return Ok(Outcome::Indifferent);
                }

                let eaten = grid.remove(victim)?;
                if let Some(&slot) = slots.get(&victim) {
                    let record = &mut records[slot];
                    record.outcome = Outcome::DeathPrey;
                    record.food_reserve = eaten.food_reserve;
                    record.done = true;
                }
                self.feed(grid, id)?;
                Ok(Outcome::SuccessfulPredator)
            }
        }
    }

    fn resolve_breed<R: Rng + ?Sized>(
        &self,
        grid: &mut GridState,
        id: AgentId,
        direction: Direction,
        rng: &mut R,
        births: &mut Vec<AgentId>,
    ) -> Result<Outcome, StepError> {
        let agent = grid.agent(id).ok_or(GridError::UnknownAgent(id))?;
        let (species, position, food_reserve, generation) =
            (agent.species, agent.position, agent.food_reserve, agent.generation);
        let exhaust = self.config.metabolism.get(species).exhaust;

        if direction == Direction::Stay || food_reserve < exhaust {
            return Ok(Outcome::WrongAction);
        }

        let target = grid.resolve(position.moved_in_direction(direction));
        let Some(target) = target.filter(|t| grid.agent_at(*t).is_none()) else {
            return Ok(Outcome::WrongAction);
        };

        if !roll(rng, self.config.p_breed) {
            return Ok(Outcome::Indifferent);
        }

        if let Some(parent) = grid.agent_mut(id) {
            parent.food_reserve -= exhaust;
        }
        let child = grid.spawn(species, target, 0, generation + 1)?;
        grid.increment_generation();
        births.push(child);

        Ok(Outcome::Offspring)
    }

    /// Add the species' satiety to an agent's reserve, capped
    fn feed(&self, grid: &mut GridState, id: AgentId) -> Result<(), GridError> {
        let max = self.config.max_food_reserve;
        let agent = grid.agent_mut(id).ok_or(GridError::UnknownAgent(id))?;
        let satiety = self.config.metabolism.get(agent.species).satiety;
        agent.food_reserve = agent.food_reserve.saturating_add(satiety).min(max);
        Ok(())
    }

    fn instadeath_enabled(&self) -> bool {
        self.config.instadeath > 0.0 && (self.config.mortality || !self.config.instadeath_requires_mortality)
    }

    fn death_check<R: Rng + ?Sized>(
        &self,
        grid: &GridState,
        id: AgentId,
        rng: &mut R,
    ) -> Result<Option<Outcome>, GridError> {
        let agent = grid.agent(id).ok_or(GridError::UnknownAgent(id))?;

        if self.config.mortality && agent.food_reserve == 0 {
            return Ok(Some(Outcome::DeathStarvation));
        }

        if agent.species == Species::Predator
            && self.instadeath_enabled()
            && grid.population(Species::Predator) > 1
            && roll(rng, self.config.instadeath)
        {
            return Ok(Some(Outcome::Instadeath));
        }

        Ok(None)
    }
}
