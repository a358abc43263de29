pub mod episode;
pub mod train;

pub use episode::{
    CancelToken, EpisodeController, EpisodeObserver, EpisodeOutcome, EpisodeReport, Termination,
};
pub use train::{SimulationSnapshot, TrainingLoop, policy_path};
