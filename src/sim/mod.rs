//! Grid predator-prey world
//!
//! Contains the grid state, the per-agent action space, reward lookup and the
//! step engine that advances everything by one timestep.

pub mod action;
pub mod config;
pub mod engine;
pub mod reward;
pub mod species;
pub mod state;

pub use action::{Action, Direction, Intent};
pub use config::{Boundary, Metabolism, ModelConfig};
pub use engine::{AgentStepRecord, Decision, StepEngine, StepError, StepReport};
pub use reward::{Outcome, RewardTable};
pub use species::{Species, SpeciesPair};
pub use state::{Agent, AgentId, CellView, GridError, GridState, Position};
