pub mod config;
pub mod design;
pub mod score;
pub mod staircase;
pub mod state;
pub mod text;

pub use config::{ExperimentConfig, GoStimulus};
pub use design::{PlannedTrial, TrialKind, block_design};
pub use score::{BlockStats, Classification, TrialRecord, block_stats, classify};
pub use staircase::SsdStaircase;
pub use state::{ExperimentEvent, ExperimentStateMachine};
