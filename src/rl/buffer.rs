//! Per-species trajectory storage for actor-critic updates
//!
//! Transitions are grouped by agent, because discounted returns only make sense
//! along one agent's life. Each agent's segment ends either with a terminal
//! transition (the agent died) or with a bootstrap value estimated from its last
//! observation when the episode stopped.

use std::collections::BTreeMap;

use crate::sim::{AgentId, Species};

/// One agent's experience for one timestep
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub observation: Vec<f32>,
    pub action: usize,
    pub log_prob: f32,
    pub value: f32,
    pub reward: f32,
    /// The agent died during this timestep
    pub done: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Segment {
    transitions: Vec<Transition>,
    bootstrap_value: f32,
}

impl Segment {
    fn is_open(&self) -> bool {
        self.transitions.last().is_some_and(|t| !t.done)
    }
}

/// Flattened training data built from a trajectory
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryBatch {
    /// Row-major `[len, width]` observations
    pub observations: Vec<f32>,
    pub width: usize,
    pub actions: Vec<i32>,
    pub returns: Vec<f32>,
    pub advantages: Vec<f32>,
}

impl TrajectoryBatch {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Everything the agents of one species experienced during an episode
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    species: Species,
    segments: BTreeMap<AgentId, Segment>,
}

impl Trajectory {
    pub fn new(species: Species) -> Self {
        Self {
            species,
            segments: BTreeMap::new(),
        }
    }

    pub fn species(&self) -> Species {
        self.species
    }

    /// Append a transition to an agent's segment
    pub fn push(&mut self, agent: AgentId, transition: Transition) {
        self.segments.entry(agent).or_default().transitions.push(transition);
    }

    /// Close an agent's segment with a death that happened before it could act
    ///
    /// The reward is credited to the agent's previous transition. Returns `false`
    /// when the agent has no transition to attach it to.
    pub fn terminate_last(&mut self, agent: AgentId, reward: f32) -> bool {
        match self
            .segments
            .get_mut(&agent)
            .and_then(|s| s.transitions.last_mut())
        {
            Some(last) if !last.done => {
                last.reward += reward;
                last.done = true;
                true
            }
            _ => false,
        }
    }

    /// Set the value estimate used to bootstrap an unfinished segment
    pub fn set_bootstrap(&mut self, agent: AgentId, value: f32) {
        if let Some(segment) = self.segments.get_mut(&agent) {
            segment.bootstrap_value = value;
        }
    }

    /// Agents whose segment has not ended with a death
    pub fn open_agents(&self) -> Vec<AgentId> {
        self.segments
            .iter()
            .filter(|(_, s)| s.is_open())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Total number of transitions
    pub fn len(&self) -> usize {
        self.segments.values().map(|s| s.transitions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn agent_count(&self) -> usize {
        self.segments.len()
    }

    pub fn total_reward(&self) -> f32 {
        self.transitions().map(|t| t.reward).sum()
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.segments.values().flat_map(|s| s.transitions.iter())
    }

    /// Discounted returns, in the order of [`Trajectory::transitions`]
    ///
    /// ```text
    /// G_t = r_t + γ * G_{t+1} * (1 - done_t),   G_T = bootstrap
    /// ```
    pub fn discounted_returns(&self, gamma: f32) -> Vec<f32> {
        let mut all = Vec::with_capacity(self.len());

        for segment in self.segments.values() {
            let n = segment.transitions.len();
            let mut returns = vec![0.0; n];
            let mut next_return = segment.bootstrap_value;

            for t in (0..n).rev() {
                let transition = &segment.transitions[t];
                let mask = if transition.done { 0.0 } else { 1.0 };
                returns[t] = transition.reward + gamma * next_return * mask;
                next_return = returns[t];
            }

            all.extend(returns);
        }

        all
    }

    /// Build the flattened batch for one update
    ///
    /// Advantages are `G_t - V(s_t)`, optionally normalised to zero mean and
    /// unit variance. Returns `None` for an empty trajectory.
    pub fn to_batch(&self, gamma: f32, normalize_advantages: bool) -> Option<TrajectoryBatch> {
        let width = self.transitions().next()?.observation.len();
        let returns = self.discounted_returns(gamma);

        let mut observations = Vec::with_capacity(self.len() * width);
        let mut actions = Vec::with_capacity(self.len());
        let mut advantages = Vec::with_capacity(self.len());

        for (transition, ret) in self.transitions().zip(&returns) {
            observations.extend_from_slice(&transition.observation);
            actions.push(transition.action as i32);
            advantages.push(ret - transition.value);
        }

        let n = advantages.len();
        if normalize_advantages && n > 1 {
            // (A - mean(A)) / (std(A) + 1e-8)
            let mean = advantages.iter().sum::<f32>() / n as f32;
            let variance = advantages.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / n as f32;
            let std = variance.sqrt();
            for a in &mut advantages {
                *a = (*a - mean) / (std + 1e-8);
            }
        }

        Some(TrajectoryBatch {
            observations,
            width,
            actions,
            returns,
            advantages,
        })
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }
}
