//! Per-species decision making
//!
//! Provides:
//! - The [`AgentPolicy`] interface the step engine drives
//! - Flattened window observations
//! - Actor-critic MLP network and its training step
//! - Per-agent trajectories with discounted returns
//! - Policy persistence

pub mod actor_critic;
pub mod backend;
pub mod buffer;
pub mod config;
pub mod network;
pub mod observation;
pub mod persistence;
pub mod policy;

pub use actor_critic::ActorCriticPolicy;
pub use backend::{InferenceBackend, TrainingBackend, default_device};
pub use buffer::{Trajectory, TrajectoryBatch, Transition};
pub use config::{LayerConfig, NetworkConfig, NetworkKind, NetworkMode};
pub use network::{ActorCriticConfig, ActorCriticNetwork};
pub use observation::create_observation;
pub use persistence::{PolicyMetadata, load_policy, save_policy};
pub use policy::{
    ActionDistribution, AgentPolicy, Observation, PolicyError, PolicyOutput, PolicyPair, UpdateStats,
};
