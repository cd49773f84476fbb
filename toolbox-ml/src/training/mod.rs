//! Training loop: configuration, lifecycle hooks, interruption and resume.

pub mod hooks;
pub mod interrupt;
pub mod runner;

pub use crate::config::{SgdSettings, TrainLoopConfig};
pub use hooks::Hooks;
pub use interrupt::{ResumePoint, TrainingInterrupted};
pub use runner::{DefaultOptimiser, RunSummary, TrainLoop, TrainLoopBuilder, TrainingParts};
