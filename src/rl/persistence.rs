//! Saving and loading species policies
//!
//! Each policy is stored as two files:
//! - `<path>.mpk` - Network weights (burn record format)
//! - `<path>.meta.json` - Metadata needed to rebuild the network

use std::path::Path;

use anyhow::{Context, Result, bail};
use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use super::{ActorCriticConfig, ActorCriticPolicy, NetworkConfig};
use crate::config::Goal;
use crate::sim::Species;

/// Metadata saved next to the network weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyMetadata {
    pub species: Species,

    /// Network configuration the policy was built with
    pub network: NetworkConfig,

    /// Observation length
    pub input_dim: usize,

    /// Optimisation steps completed
    pub training_steps: usize,

    /// Crate version that wrote the file
    pub version: String,
}

impl PolicyMetadata {
    pub fn new(species: Species, network: NetworkConfig, input_dim: usize, training_steps: usize) -> Self {
        Self {
            species,
            network,
            input_dim,
            training_steps,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn of<B: AutodiffBackend>(policy: &ActorCriticPolicy<B>) -> Self {
        Self::new(
            policy.species(),
            policy.config().clone(),
            policy.input_dim(),
            policy.training_step(),
        )
    }
}

fn metadata_path(path: &Path) -> std::path::PathBuf {
    path.with_extension("meta.json")
}

/// Save a policy's weights and metadata
///
/// Creates parent directories if they don't exist. `path` is given without
/// extension; the recorder appends `.mpk`.
pub fn save_policy<B: AutodiffBackend>(policy: &ActorCriticPolicy<B>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let record = policy.network().clone().into_record();
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .record(record, path.to_path_buf())
        .with_context(|| format!("Failed to save {} network weights", policy.species()))?;

    let meta_path = metadata_path(path);
    let meta_json = serde_json::to_string_pretty(&PolicyMetadata::of(policy))
        .context("Failed to serialize metadata")?;
    std::fs::write(&meta_path, meta_json)
        .with_context(|| format!("Failed to write metadata to {:?}", meta_path))?;

    Ok(())
}

/// Read the metadata of a saved policy
pub fn load_metadata(path: &Path) -> Result<PolicyMetadata> {
    let meta_path = metadata_path(path);
    let meta_json = std::fs::read_to_string(&meta_path)
        .with_context(|| format!("Failed to read metadata from {:?}", meta_path))?;
    serde_json::from_str(&meta_json).context("Failed to deserialize metadata")
}

/// Load a saved policy
///
/// Fails if the stored species or observation length differs from what the
/// caller expects, since such a network cannot drive the current grid.
pub fn load_policy<B: AutodiffBackend>(
    path: &Path,
    species: Species,
    input_dim: usize,
    goal: Goal,
    device: &B::Device,
) -> Result<(ActorCriticPolicy<B>, PolicyMetadata)> {
    let metadata = load_metadata(path)?;

    if metadata.species != species {
        bail!(
            "{:?} holds a {} policy, expected {}",
            path,
            metadata.species,
            species
        );
    }
    if metadata.input_dim != input_dim {
        bail!(
            "{:?} expects observations of length {}, the grid produces {}",
            path,
            metadata.input_dim,
            input_dim
        );
    }

    let network_config = ActorCriticConfig::from_network_config(input_dim, &metadata.network);
    let network = network_config.init::<B>(device);

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let record = recorder
        .load(path.to_path_buf(), device)
        .with_context(|| format!("Failed to load network weights from {:?}", path))?;
    let network = network.load_record(record);

    let mut policy = ActorCriticPolicy::from_network(
        species,
        network,
        metadata.network.clone(),
        input_dim,
        goal,
        device.clone(),
    );
    policy.set_training_step(metadata.training_steps);

    Ok((policy, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::{AgentPolicy, Observation, TrainingBackend, default_device};
    use tempfile::TempDir;

    fn small_config() -> NetworkConfig {
        let mut config = NetworkConfig::default();
        config.layers.hidden = vec![8];
        config
    }

    #[test]
    fn test_metadata_serialization() {
        let metadata = PolicyMetadata::new(Species::Predator, small_config(), 10, 42);

        let json = serde_json::to_string(&metadata).unwrap();
        let deserialized: PolicyMetadata = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized, metadata);
        assert_eq!(deserialized.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policies").join("prey");
        let device = default_device();

        let policy: ActorCriticPolicy<TrainingBackend> =
            ActorCriticPolicy::new(Species::Prey, 10, small_config(), Goal::Training, device.clone());
        save_policy(&policy, &path).unwrap();

        let (loaded, metadata) =
            load_policy::<TrainingBackend>(&path, Species::Prey, 10, Goal::Testing, &device).unwrap();
        assert_eq!(metadata.species, Species::Prey);
        assert_eq!(loaded.goal(), Goal::Testing);

        let obs = Observation::new((0..10).map(|i| i as f32 / 10.0).collect());
        let a = policy.act(&obs).unwrap();
        let b = loaded.act(&obs).unwrap();
        for (x, y) in a.distribution.probs().iter().zip(b.distribution.probs()) {
            assert!((x - y).abs() < 1e-6);
        }
        assert!((a.value - b.value).abs() < 1e-6);
    }

    #[test]
    fn test_load_rejects_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("predator");
        let device = default_device();

        let policy: ActorCriticPolicy<TrainingBackend> =
            ActorCriticPolicy::new(Species::Predator, 10, small_config(), Goal::Training, device.clone());
        save_policy(&policy, &path).unwrap();

        assert!(load_policy::<TrainingBackend>(&path, Species::Prey, 10, Goal::Training, &device).is_err());
        assert!(load_policy::<TrainingBackend>(&path, Species::Predator, 26, Goal::Training, &device).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let device = default_device();
        let result = load_policy::<TrainingBackend>(
            &dir.path().join("nothing"),
            Species::Prey,
            10,
            Goal::Training,
            &device,
        );
        assert!(result.is_err());
    }
}
