//! ML Predator-Prey - a grid predator-prey simulation with learning agents
//!
//! This library provides:
//! - The grid world and its step semantics (sim module)
//! - Per-species actor-critic policies (rl module)
//! - Episode and training loops (modes module)
//! - Rolling statistics and the metrics log (metrics module)
//! - The TOML run configuration (config module)

pub mod config;
pub mod metrics;
pub mod modes;
pub mod rl;
pub mod rng;
pub mod sim;
