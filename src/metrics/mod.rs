pub mod log;
pub mod training_stats;

pub use log::{MetricsLog, MetricsRecord, read_records};
pub use training_stats::TrainingStats;
