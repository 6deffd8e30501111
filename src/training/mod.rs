//! Model training
//!
//! Fit loop, end-of-epoch callbacks, metrics tracking and the per-spec
//! orchestration that ties them together.

pub mod callbacks;
pub mod metrics;
pub mod orchestrator;
pub mod trainer;

pub use callbacks::{Action, Callback, CsvLogger, EarlyStopping, ModelCheckpoint};
pub use metrics::{EpochLogs, Metrics, Monitor, TrainingHistory};
pub use orchestrator::{TrainingArtifact, TrainingOrchestrator};
pub use trainer::{evaluate, FitOutcome, StopReason, Trainer};
